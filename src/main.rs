use std::env;
use std::process;

fn main() {
    let user = match env::var("USER") {
        Ok(user) => user,
        Err(err) => {
            eprintln!("Could not determine the current user: {}", err);
            process::exit(1);
        }
    };

    println!("Hello {}! This is the Monkey programming language!", user);
    println!("Feel free to type in commands");

    monkey::repl::run();
}
