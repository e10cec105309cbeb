use std::fmt;

pub struct Program {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Let(String, Expression),
    Return(Option<Expression>),
    Expression(Expression),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Statement::Let(name, value) => write!(f, "let {} = {};", name, value),
            Statement::Return(None) => write!(f, "return;"),
            Statement::Return(Some(value)) => write!(f, "return {};", value),
            Statement::Expression(expression) => write!(f, "{};", expression),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
}

impl fmt::Display for BlockStatement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // An empty block renders as nothing, matching the historic
        // pretty-printer output the parser tests assert against.
        if self.statements.is_empty() {
            return Ok(());
        }

        write!(f, "{{ ")?;
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        write!(f, " }}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Identifier(String),
    IntegerLiteral(i64),
    StringLiteral(String),
    Boolean(bool),
    Prefix(PrefixOperator, Box<Expression>),
    Infix(InfixOperator, Box<Expression>, Box<Expression>),
    If(Box<Expression>, BlockStatement, Option<BlockStatement>),
    /// Parameters, body, and the name of the `let` binding this literal was
    /// the value of, if any. The compiler uses the name for self-reference.
    FunctionLiteral(Vec<String>, BlockStatement, Option<String>),
    Call(Box<Expression>, Vec<Expression>),
    ArrayLiteral(Vec<Expression>),
    HashLiteral(HashLiteral),
    IndexExpression(Box<Expression>, Box<Expression>),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::IntegerLiteral(i) => write!(f, "{}", i),
            Expression::StringLiteral(s) => write!(f, "\"{}\"", s),
            Expression::Boolean(b) => write!(f, "{}", b),
            Expression::Prefix(operator, right) => write!(f, "({}{})", operator, right),
            Expression::Infix(operator, left, right) => {
                write!(f, "({} {} {})", left, operator, right)
            }
            Expression::If(condition, consequence, alternative) => {
                write!(f, "if {} {}", condition, consequence)?;
                if let Some(body) = alternative {
                    write!(f, " else {}", body)?;
                }
                Ok(())
            }
            Expression::FunctionLiteral(parameters, body, _) => {
                write!(f, "fn({}) {}", parameters.join(", "), body)
            }
            Expression::Call(function, arguments) => {
                write!(f, "{}({})", function, join_expressions(arguments))
            }
            Expression::ArrayLiteral(elements) => {
                write!(f, "[{}]", join_expressions(elements))
            }
            Expression::HashLiteral(hash) => write!(f, "{}", hash),
            Expression::IndexExpression(left, index) => write!(f, "{}[{}]", left, index),
        }
    }
}

fn join_expressions(expressions: &[Expression]) -> String {
    expressions
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

/// The pairs of a hash literal, in source order. Keys may be arbitrary
/// expressions, so the mapping cannot be resolved until runtime.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HashLiteral {
    pub pairs: Vec<(Expression, Expression)>,
}

impl HashLiteral {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, key: Expression, value: Expression) {
        self.pairs.push((key, value));
    }
}

impl fmt::Display for HashLiteral {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pairs = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "{{{}}}", pairs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefixOperator {
    Bang,
    Minus,
}

impl fmt::Display for PrefixOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrefixOperator::Bang => write!(f, "!"),
            PrefixOperator::Minus => write!(f, "-"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfixOperator {
    Plus,
    Minus,
    Asterisk,
    Slash,
    Gt,
    Lt,
    Eq,
    NotEq,
}

impl fmt::Display for InfixOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InfixOperator::Plus => write!(f, "+"),
            InfixOperator::Minus => write!(f, "-"),
            InfixOperator::Asterisk => write!(f, "*"),
            InfixOperator::Slash => write!(f, "/"),
            InfixOperator::Gt => write!(f, ">"),
            InfixOperator::Lt => write!(f, "<"),
            InfixOperator::Eq => write!(f, "=="),
            InfixOperator::NotEq => write!(f, "!="),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn display() {
        let program = Program {
            statements: vec![Statement::Let(
                "myVar".to_owned(),
                Expression::Identifier("anotherVar".to_owned()),
            )],
        };

        assert_eq!("let myVar = anotherVar;", program.to_string());
    }

    #[test]
    fn display_hash_literal() {
        let mut hash = HashLiteral::new();
        hash.insert(
            Expression::StringLiteral("one".to_owned()),
            Expression::IntegerLiteral(1),
        );
        hash.insert(
            Expression::Boolean(true),
            Expression::IntegerLiteral(2),
        );

        assert_eq!(
            "{\"one\": 1, true: 2}",
            Expression::HashLiteral(hash).to_string()
        );
    }
}
