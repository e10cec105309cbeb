use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::compiler::symbol_table::SymbolTable;
use crate::compiler::Compiler;
use crate::lexer::Lexer;
use crate::object::Object;
use crate::parser::{Parser, ParserError};
use crate::vm::{self, VM};

const PROMPT: &str = ">> ";

const MONKEY_FACE: &str = r#"            __,__
   .--.  .-"     "-.  .--.
  / .. \/  .-. .-.  \/ .. \
 | |  '|  /   Y   \  |'  | |
 | \   \  \ 0 | 0 /  /   / |
  \ '- ,\.-"""""""-./, -' /
   ''-' /_   ^ ^   _\ '-''
       |  \._   _./  |
       \   \ '~' /   /
        '._ '-=-' _.'
           '-----'
"#;

/// Reads a line at a time, runs it through the compiler and the VM, and
/// prints the value of the last expression. Global bindings, the constant
/// pool and the symbol table survive from one line to the next.
pub fn run() {
    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("Error initialising the line editor: {}", err);
            std::process::exit(1);
        }
    };

    let mut constants: Vec<Object> = vec![];
    let mut globals = vm::new_globals();
    let mut symbol_table = SymbolTable::new_with_builtins();

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => return,
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                return;
            }
        };

        let _ = rl.add_history_entry(line.as_str());

        let lexer = Lexer::new(&line);
        let mut parser = Parser::new(lexer);

        let program = parser.parse_program();

        if !parser.errors().is_empty() {
            print_parser_errors(parser.errors());
            continue;
        }

        // The compiler gets copies of the persistent state; a failed compile
        // leaves the originals untouched for the next line.
        let mut compiler = Compiler::new_with_state(symbol_table.clone(), constants.clone());

        let bytecode = match compiler.compile(&program) {
            Ok(bytecode) => bytecode,
            Err(err) => {
                println!("Woops! Compilation failed:\n {}", err);
                continue;
            }
        };

        let mut vm = VM::new_with_globals_store(bytecode, globals);

        match vm.run() {
            Ok(result) => println!("{}", result),
            Err(err) => println!("Woops! Executing bytecode failed:\n {}", err),
        }

        globals = vm.globals;
        let (table, consts) = compiler.into_state();
        symbol_table = table;
        constants = consts;
    }
}

fn print_parser_errors(errors: &[ParserError]) {
    print!("{}", MONKEY_FACE);
    println!("Woops! We ran into some monkey business here!");
    for error in errors {
        println!("\t{}", error);
    }
}
