use crate::code::Instructions;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

pub use crate::object::builtins::BuiltIn;

pub mod builtins;

/// The output of the compiler for one function body, together with the frame
/// layout the VM needs to execute it.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function bundled with the values it captured from enclosing
/// scopes. Every function is executed as a closure; `free` is empty for
/// functions that capture nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Object>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Null,
    Integer(i64),
    Boolean(bool),
    String(String),
    Array(Vec<Object>),
    Hash(IndexMap<HashKey, Object>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    BuiltIn(BuiltIn),
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Object::Null => write!(f, "null"),
            Object::Integer(v) => write!(f, "{}", v),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::String(s) => write!(f, "{}", s),
            Object::Array(elements) => write!(
                f,
                "[{}]",
                elements
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            Object::Hash(map) => write!(
                f,
                "{{{}}}",
                map.iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            Object::CompiledFunction(func) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func))
            }
            Object::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Object::BuiltIn(_) => write!(f, "built-in function"),
        }
    }
}

impl Object {
    pub fn is_truthy(&self) -> bool {
        match self {
            Object::Null => false,
            Object::Boolean(b) => *b,
            _ => true,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Object::Null => "NULL",
            Object::Integer(_) => "INTEGER",
            Object::Boolean(_) => "BOOLEAN",
            Object::String(_) => "STRING",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION",
            Object::Closure(_) => "FUNCTION",
            Object::BuiltIn(_) => "BUILTIN",
        }
    }
}

/// The subset of objects usable as hash keys. Value equality on the
/// tag-and-payload stands in for the reference identity a pointer-based
/// runtime would use.
#[derive(PartialEq, Eq, Clone, Hash, Debug)]
pub enum HashKey {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HashKey::Boolean(b) => write!(f, "{}", b),
            HashKey::Integer(i) => write!(f, "{}", i),
            HashKey::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl HashKey {
    pub fn from_object(obj: Object) -> Result<HashKey, EvalError> {
        match obj {
            Object::Boolean(b) => Ok(HashKey::Boolean(b)),
            Object::Integer(i) => Ok(HashKey::Integer(i)),
            Object::String(s) => Ok(HashKey::String(s)),
            _ => Err(EvalError::UnusableHashKey(obj)),
        }
    }
}

pub type EvalResult = std::result::Result<Object, EvalError>;

/// Errors raised while evaluating built-in functions or hashing keys. The VM
/// surfaces these as runtime errors.
#[derive(Debug, PartialEq)]
pub enum EvalError {
    UnsupportedArguments(String, Vec<Object>),
    UnusableHashKey(Object),
    WrongArgumentCount { expected: usize, given: usize },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EvalError::UnsupportedArguments(function, args) => write!(
                f,
                "argument to `{}` not supported, got {}",
                function,
                args.iter()
                    .map(|a| a.type_name())
                    .collect::<Vec<&str>>()
                    .join(", ")
            ),
            EvalError::UnusableHashKey(obj) => {
                write!(f, "unusable as hash key: {}", obj.type_name())
            }
            EvalError::WrongArgumentCount { expected, given } => write!(
                f,
                "wrong number of arguments. got={}, want={}",
                given, expected
            ),
        }
    }
}

pub fn assert_argument_count(expected: usize, arguments: &[Object]) -> Result<(), EvalError> {
    if arguments.len() != expected {
        return Err(EvalError::WrongArgumentCount {
            expected,
            given: arguments.len(),
        });
    }
    Ok(())
}
