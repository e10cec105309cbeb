use crate::ast::{
    BlockStatement, Expression, InfixOperator, PrefixOperator, Program, Statement,
};
use crate::code::{make_instruction, Instructions, Op};
use crate::compiler::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::object::{CompiledFunction, Object};
use std::rc::Rc;
use std::{error::Error, fmt};

pub mod symbol_table;

#[derive(Clone)]
struct EmittedInstruction {
    op: Op,
    position: usize,
}

/// One per function body being compiled. The main program is the bottom-most
/// scope; entering a function literal pushes a fresh one.
#[derive(Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

#[derive(Debug, PartialEq)]
pub enum CompilerError {
    UndefinedVariable(String),
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilerError::UndefinedVariable(name) => write!(f, "undefined variable: {}", name),
        }
    }
}

impl Error for CompilerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

/// Compiler is responsible for taking an AST and turning it into bytecode.
pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            constants: vec![],
            symbol_table: SymbolTable::new_with_builtins(),
            scopes: vec![CompilationScope::default()],
        }
    }

    /// A compiler that continues from an earlier one's symbol table and
    /// constant pool. The REPL uses this to keep bindings across lines.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Object>) -> Self {
        let mut compiler = Self::new();

        compiler.symbol_table = symbol_table;
        compiler.constants = constants;

        compiler
    }

    /// Hands back the symbol table and constant pool for reuse by a
    /// subsequent compiler.
    pub fn into_state(self) -> (SymbolTable, Vec<Object>) {
        (self.symbol_table, self.constants)
    }

    pub fn compile(&mut self, program: &Program) -> Result<Bytecode, CompilerError> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }

        Ok(self.bytecode())
    }

    fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_instructions().clone(),
            constants: self.constants.clone(),
        }
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), CompilerError> {
        match stmt {
            Statement::Expression(exp) => {
                self.compile_expression(exp)?;
                self.emit(Op::Pop, &[]);
                Ok(())
            }
            Statement::Let(name, value) => {
                // The name is defined before the value is compiled so that a
                // function literal can resolve a reference to itself.
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
                    _ => self.emit(Op::SetLocal, &[symbol.index]),
                };
                Ok(())
            }
            Statement::Return(value) => {
                match value {
                    Some(exp) => self.compile_expression(exp)?,
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                }
                self.emit(Op::ReturnValue, &[]);
                Ok(())
            }
        }
    }

    fn compile_block_statement(&mut self, body: &BlockStatement) -> Result<(), CompilerError> {
        for stmt in &body.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, exp: &Expression) -> Result<(), CompilerError> {
        match exp {
            Expression::If(condition, consequence, alternative) => {
                self.compile_expression(condition)?;

                // Emit an Op::JumpNotTruthy with a placeholder operand, to be
                // patched once the consequence length is known.
                let jump_not_truthy_position = self.emit(Op::JumpNotTruthy, &[9999]);

                self.compile_block_statement(consequence)?;

                if self.is_last_instruction(Op::Pop) {
                    self.remove_last_pop();
                }

                // Same for the Op::Jump that skips the alternative.
                let jump_position = self.emit(Op::Jump, &[9999]);

                let after_consequence_position = self.current_instructions().len();
                self.change_operand(jump_not_truthy_position, after_consequence_position);

                match alternative {
                    Some(body) => {
                        self.compile_block_statement(body)?;

                        if self.is_last_instruction(Op::Pop) {
                            self.remove_last_pop();
                        }
                    }
                    None => {
                        // No alternative: the expression evaluates to null.
                        self.emit(Op::Null, &[]);
                    }
                }

                let after_alternative_position = self.current_instructions().len();
                self.change_operand(jump_position, after_alternative_position);

                Ok(())
            }
            Expression::Infix(operator, left, right) => {
                if *operator == InfixOperator::Lt {
                    // Treat less-than as a special case.
                    // We re-order the operands and treat it as a greater-than
                    // expression; there is no Op::LessThan.
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Op::GreaterThan, &[]);

                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;

                match operator {
                    InfixOperator::Plus => self.emit(Op::Add, &[]),
                    InfixOperator::Minus => self.emit(Op::Sub, &[]),
                    InfixOperator::Asterisk => self.emit(Op::Mul, &[]),
                    InfixOperator::Slash => self.emit(Op::Div, &[]),
                    InfixOperator::Gt => self.emit(Op::GreaterThan, &[]),
                    InfixOperator::Eq => self.emit(Op::Equal, &[]),
                    InfixOperator::NotEq => self.emit(Op::NotEqual, &[]),
                    InfixOperator::Lt => unreachable!("handled above"),
                };

                Ok(())
            }
            Expression::Prefix(operator, right) => {
                self.compile_expression(right)?;

                match operator {
                    PrefixOperator::Bang => self.emit(Op::Bang, &[]),
                    PrefixOperator::Minus => self.emit(Op::Minus, &[]),
                };

                Ok(())
            }
            Expression::IntegerLiteral(v) => {
                let constant = self.add_constant(Object::Integer(*v));
                self.emit(Op::Constant, &[constant]);
                Ok(())
            }
            Expression::StringLiteral(s) => {
                let constant = self.add_constant(Object::String(s.to_string()));
                self.emit(Op::Constant, &[constant]);
                Ok(())
            }
            Expression::Boolean(v) => {
                if *v {
                    self.emit(Op::True, &[]);
                } else {
                    self.emit(Op::False, &[]);
                }
                Ok(())
            }
            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompilerError::UndefinedVariable(name.to_string()))?;
                self.load_symbol(&symbol);
                Ok(())
            }
            Expression::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Op::Array, &[elements.len()]);
                Ok(())
            }
            Expression::HashLiteral(hash) => {
                // Emit the pairs ordered by the printed form of the key so
                // the bytecode is deterministic.
                let mut pairs: Vec<&(Expression, Expression)> = hash.pairs.iter().collect();
                pairs.sort_by_key(|pair| pair.0.to_string());

                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Op::Hash, &[hash.pairs.len() * 2]);
                Ok(())
            }
            Expression::IndexExpression(left, index) => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Op::Index, &[]);
                Ok(())
            }
            Expression::FunctionLiteral(parameters, body, name) => {
                self.enter_scope();

                if let Some(name) = name {
                    self.symbol_table.define_function_name(name);
                }

                for parameter in parameters {
                    self.symbol_table.define(parameter);
                }

                self.compile_block_statement(body)?;

                // The body's value is its implicit return value.
                if self.is_last_instruction(Op::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.is_last_instruction(Op::ReturnValue) {
                    self.emit(Op::Return, &[]);
                }

                let free_symbols = self.symbol_table.free_symbols.clone();
                let num_locals = self.symbol_table.num_definitions();
                let instructions = self.leave_scope();

                // Push the captured values in the order the body resolved
                // them; Op::Closure bundles them with the function.
                for symbol in &free_symbols {
                    self.load_symbol(symbol);
                }

                let function = Object::CompiledFunction(Rc::new(CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len(),
                }));
                let constant = self.add_constant(function);
                self.emit(Op::Closure, &[constant, free_symbols.len()]);

                Ok(())
            }
            Expression::Call(function, arguments) => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Op::Call, &[arguments.len()]);
                Ok(())
            }
        }
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            SymbolScope::BuiltIn => self.emit(Op::GetBuiltIn, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Op::CurrentClosure, &[]),
        };
    }

    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = make_instruction(op, operands);
        let pos = self.add_instruction(instruction);

        self.set_last_instruction(op, pos);

        pos
    }

    fn add_instruction(&mut self, instruction: Instructions) -> usize {
        let scope = self.current_scope_mut();
        let pos_new_instruction = scope.instructions.len();
        scope.instructions.extend(instruction);
        pos_new_instruction
    }

    fn add_constant(&mut self, obj: Object) -> usize {
        self.constants.push(obj);
        self.constants.len() - 1
    }

    fn set_last_instruction(&mut self, op: Op, pos: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction.take();
        scope.last_instruction = Some(EmittedInstruction { op, position: pos });
    }

    fn is_last_instruction(&self, op: Op) -> bool {
        self.current_scope()
            .last_instruction
            .as_ref()
            .filter(|emitted| emitted.op == op)
            .is_some()
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(emitted) = scope.last_instruction.take() {
            scope.instructions.truncate(emitted.position);
            scope.last_instruction = scope.previous_instruction.take();
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.current_scope().last_instruction.clone() {
            self.replace_instruction(last.position, make_instruction(Op::ReturnValue, &[]));
            self.current_scope_mut().last_instruction = Some(EmittedInstruction {
                op: Op::ReturnValue,
                position: last.position,
            });
        }
    }

    fn change_operand(&mut self, op_pos: usize, operand: usize) {
        if let Some(op) = Op::lookup_op(self.current_instructions()[op_pos]) {
            let new_instruction = make_instruction(op, &[operand]);
            self.replace_instruction(op_pos, new_instruction);
        } else {
            panic!("No such instruction at {}", op_pos);
        }
    }

    fn replace_instruction(&mut self, pos: usize, instruction: Instructions) {
        let instructions = &mut self.current_scope_mut().instructions;
        for (i, b) in instruction.iter().enumerate() {
            instructions[pos + i] = *b;
        }
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());

        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self
            .scopes
            .pop()
            .expect("left a scope that was never entered");

        self.symbol_table = std::mem::take(&mut self.symbol_table)
            .pop()
            .expect("left a scope without an enclosing symbol table");

        scope.instructions
    }

    fn current_instructions(&self) -> &Instructions {
        &self.current_scope().instructions
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("no compilation scope")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("no compilation scope")
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}
