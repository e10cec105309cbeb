pub mod frame;

use crate::code::{self, Op};
use crate::compiler::Bytecode;
use crate::object::{BuiltIn, Closure, CompiledFunction, EvalError, HashKey, Object};
use crate::vm::frame::Frame;
use indexmap::IndexMap;
use std::rc::Rc;
use std::{error, fmt};

#[derive(Debug, PartialEq)]
pub enum VMError {
    CallingNonFunction(Object),
    Eval(EvalError),
    FrameOverflow(),
    IndexNotSupported(Object),
    NonFunction(Object),
    StackEmpty(),
    StackOverflow(),
    UnknownBuiltIn(usize),
    UnknownOpCode(u8),
    UnknownOperation(Op),
    UnsupportedBinaryTypes(Object, Object),
    UnsupportedNegationType(Object),
    WrongArity(usize, usize),
}

impl fmt::Display for VMError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VMError::StackOverflow() => write!(f, "stack overflow"),
            VMError::StackEmpty() => write!(f, "stack empty"),
            VMError::FrameOverflow() => write!(f, "frames overflow"),
            VMError::UnsupportedBinaryTypes(left, right) => write!(
                f,
                "unsupported types for binary operation: {} {}",
                left.type_name(),
                right.type_name()
            ),
            VMError::UnknownOperation(op) => write!(f, "unknown operation {}", op.name()),
            VMError::UnknownBuiltIn(index) => write!(f, "unknown builtin index {}", index),
            VMError::UnknownOpCode(byte) => write!(f, "unknown opcode {}", byte),
            VMError::UnsupportedNegationType(obj) => {
                write!(f, "unsupported type for negation: {}", obj.type_name())
            }
            VMError::Eval(e) => write!(f, "{}", e),
            VMError::IndexNotSupported(obj) => {
                write!(f, "index operator not supported: {}", obj.type_name())
            }
            VMError::CallingNonFunction(obj) => {
                write!(f, "calling non-function: {}", obj.type_name())
            }
            VMError::WrongArity(want, got) => {
                write!(f, "wrong number of arguments: want={}, got={}", want, got)
            }
            VMError::NonFunction(obj) => write!(f, "not a function: {}", obj.type_name()),
        }
    }
}

impl error::Error for VMError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

/// STACK_SIZE is how deep we can go
const STACK_SIZE: usize = 2048;

/// GLOBALS_SIZE is the maximum number of global variables that we can support. This is tied to how
/// wide the operands of Op::SetGlobal and Op::GetGlobal are – currently u8[2]
const GLOBALS_SIZE: usize = 1 << 16;

/// MAX_FRAMES limits how many frames we can execute.
const MAX_FRAMES: usize = 1024;

/// VM is responsible for executing bytecode. It will do the fetch/decode/execute loop for instructions.
pub struct VM {
    constants: Vec<Object>,
    pub globals: Vec<Object>,

    stack: Vec<Object>,
    sp: usize, // aka stack pointer. Always points to the next value. Top of stack is `stack[sp-1]`

    frames: Vec<Frame>,
}

pub fn new_globals() -> Vec<Object> {
    let mut globals = Vec::with_capacity(GLOBALS_SIZE);
    globals.resize(GLOBALS_SIZE, Object::Null);

    globals
}

impl VM {
    pub fn new(bytecode: Bytecode) -> Self {
        let mut stack = Vec::with_capacity(STACK_SIZE);
        stack.resize(STACK_SIZE, Object::Null);

        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_fn,
            free: vec![],
        });
        let main_frame = Frame::new(main_closure, 0);

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(main_frame);

        VM {
            constants: bytecode.constants,
            globals: new_globals(),
            stack,
            sp: 0,
            frames,
        }
    }

    /// A VM that shares a globals store with an earlier one. The REPL uses
    /// this to keep global bindings across lines.
    pub fn new_with_globals_store(bytecode: Bytecode, globals: Vec<Object>) -> Self {
        let mut vm = Self::new(bytecode);

        vm.globals = globals;

        vm
    }

    pub fn run(&mut self) -> Result<Object, VMError> {
        while self.current_frame().ip < self.current_frame().instructions().len() {
            let ip = self.current_frame().ip;
            let op_code = self.current_frame().instructions()[ip];
            let op = Op::lookup_op(op_code);

            match op {
                Some(Op::Constant) => {
                    let const_index = self.read_u16(ip + 1);
                    self.increment_ip(2);

                    self.push(self.constants[const_index].clone())?;
                }
                Some(Op::Add) | Some(Op::Sub) | Some(Op::Mul) | Some(Op::Div) => {
                    self.execute_binary_operation(op.unwrap())?
                }
                Some(Op::True) => self.push(Object::Boolean(true))?,
                Some(Op::False) => self.push(Object::Boolean(false))?,
                Some(Op::Pop) => {
                    self.pop()?;
                }
                Some(Op::Equal) | Some(Op::NotEqual) | Some(Op::GreaterThan) => {
                    self.execute_comparison_operation(op.unwrap())?
                }
                Some(Op::Bang) => self.execute_bang_operator()?,
                Some(Op::Minus) => self.execute_minus_operator()?,
                Some(Op::Jump) => {
                    let pos = self.read_u16(ip + 1);
                    self.set_ip(pos - 1);
                }
                Some(Op::JumpNotTruthy) => {
                    let pos = self.read_u16(ip + 1);
                    self.increment_ip(2);

                    let condition = self.pop()?;

                    if !condition.is_truthy() {
                        self.set_ip(pos - 1);
                    }
                }
                Some(Op::Null) => self.push(Object::Null)?,
                Some(Op::SetGlobal) => {
                    let global_index = self.read_u16(ip + 1);
                    self.increment_ip(2);
                    self.globals[global_index] = self.pop()?;
                }
                Some(Op::GetGlobal) => {
                    let global_index = self.read_u16(ip + 1);
                    self.increment_ip(2);
                    self.push(self.globals[global_index].clone())?;
                }
                Some(Op::Array) => {
                    let num_elements = self.read_u16(ip + 1);
                    self.increment_ip(2);

                    let array = self.build_array(self.sp - num_elements, self.sp);
                    self.sp -= num_elements;

                    self.push(array)?;
                }
                Some(Op::Hash) => {
                    let num_elements = self.read_u16(ip + 1);
                    self.increment_ip(2);

                    let hash = self.build_hash(self.sp - num_elements, self.sp)?;
                    self.sp -= num_elements;

                    self.push(hash)?;
                }
                Some(Op::Index) => {
                    let index = self.pop()?;
                    let left = self.pop()?;

                    self.execute_index_expression(left, index)?;
                }
                Some(Op::Call) => {
                    let num_args = self.read_u8(ip + 1);
                    self.increment_ip(1);

                    if self.execute_call(num_args)? {
                        continue; // we pushed a new frame, so we don't want to increment the new current_frame ip
                    }
                }
                Some(Op::ReturnValue) => {
                    let return_value = self.pop()?;

                    // Pop the frame and update the stack pointer. The additional 1 means that we don't
                    // need to pop the object.CompiledFunction too – just move the stack pointer.
                    let frame = self.pop_frame();

                    if self.frames.is_empty() {
                        // `return` at the top level halts the program with
                        // its value.
                        self.push(return_value)?;
                        self.pop()?;
                        break;
                    }

                    self.sp = frame.base_pointer - 1;

                    self.push(return_value)?;
                }
                Some(Op::Return) => {
                    let frame = self.pop_frame();

                    if self.frames.is_empty() {
                        self.push(Object::Null)?;
                        self.pop()?;
                        break;
                    }

                    self.sp = frame.base_pointer - 1;

                    self.push(Object::Null)?;
                }
                Some(Op::SetLocal) => {
                    let local_index = self.read_u8(ip + 1);
                    self.increment_ip(1);

                    let base_pointer = self.current_frame().base_pointer;

                    let obj = self.pop()?;
                    self.stack[base_pointer + local_index] = obj;
                }
                Some(Op::GetLocal) => {
                    let local_index = self.read_u8(ip + 1);
                    self.increment_ip(1);

                    let base_pointer = self.current_frame().base_pointer;
                    self.push(self.stack[base_pointer + local_index].clone())?;
                }
                Some(Op::GetBuiltIn) => {
                    let builtin_index = self.read_u8(ip + 1);
                    self.increment_ip(1);

                    let builtin = BuiltIn::by_index(builtin_index)
                        .ok_or(VMError::UnknownBuiltIn(builtin_index))?;

                    self.push(Object::BuiltIn(builtin))?;
                }
                Some(Op::Closure) => {
                    let const_index = self.read_u16(ip + 1);
                    self.increment_ip(2);

                    let num_free = self.read_u8(ip + 3);
                    self.increment_ip(1);

                    self.push_closure(const_index, num_free)?;
                }
                Some(Op::GetFree) => {
                    let free_index = self.read_u8(ip + 1);
                    self.increment_ip(1);

                    let free = self.current_frame().closure.free[free_index].clone();
                    self.push(free)?;
                }
                Some(Op::CurrentClosure) => {
                    let closure = Rc::clone(&self.current_frame().closure);
                    self.push(Object::Closure(closure))?;
                }
                None => return Err(VMError::UnknownOpCode(op_code)),
            }
            self.increment_ip(1);
        }

        Ok(self.last_popped_stack_elem())
    }

    fn build_array(&self, start: usize, end: usize) -> Object {
        Object::Array(self.stack[start..end].to_vec())
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Object, VMError> {
        let mut hash = IndexMap::new();

        let mut i = start;

        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let hash_key = HashKey::from_object(key).map_err(VMError::Eval)?;
            hash.insert(hash_key, value);
            i += 2;
        }

        Ok(Object::Hash(hash))
    }

    /// Dispatches Op::Call. Returns true if a new frame was pushed, in which
    /// case the caller must not advance the instruction pointer.
    fn execute_call(&mut self, num_args: usize) -> Result<bool, VMError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();

        match callee {
            Object::Closure(closure) => self.call_closure(closure, num_args),
            Object::BuiltIn(builtin) => self.call_builtin(builtin, num_args),
            other => Err(VMError::CallingNonFunction(other)),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<bool, VMError> {
        if closure.func.num_parameters != num_args {
            return Err(VMError::WrongArity(closure.func.num_parameters, num_args));
        }

        if self.frames.len() >= MAX_FRAMES {
            return Err(VMError::FrameOverflow());
        }

        let base_pointer = self.sp - num_args;
        let num_locals = closure.func.num_locals;

        self.push_frame(Frame::new(closure, base_pointer));

        // The arguments already occupy the first num_args local slots.
        self.sp = base_pointer + num_locals;

        Ok(true)
    }

    fn call_builtin(&mut self, builtin: BuiltIn, num_args: usize) -> Result<bool, VMError> {
        let args = self.stack[(self.sp - num_args)..self.sp].to_vec();

        let result = builtin.apply(args).map_err(VMError::Eval)?;

        // Drop the arguments and the builtin itself before pushing the result.
        self.sp -= num_args + 1;
        self.push(result)?;

        Ok(false)
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("no current frame")
    }

    fn increment_ip(&mut self, diff: usize) {
        self.frames.last_mut().expect("no current frame").ip += diff;
    }

    fn set_ip(&mut self, to: usize) {
        self.frames.last_mut().expect("no current frame").ip = to;
    }

    fn execute_array_index(&mut self, elements: &[Object], index: i64) -> Result<(), VMError> {
        // bounds check
        let max = (elements.len() as i64) - 1;

        if index < 0 || index > max {
            self.push(Object::Null)
        } else {
            self.push(elements[index as usize].clone())
        }
    }

    fn execute_bang_operator(&mut self) -> Result<(), VMError> {
        let operand = self.pop()?;

        self.push(Object::Boolean(!operand.is_truthy()))
    }

    fn execute_binary_operation(&mut self, op: Op) -> Result<(), VMError> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                self.execute_binary_integer_operation(*l, *r, op)
            }
            (Object::String(l), Object::String(r)) => {
                self.execute_binary_string_operation(l, r, op)
            }
            _ => Err(VMError::UnsupportedBinaryTypes(left, right)),
        }
    }

    fn execute_binary_integer_operation(
        &mut self,
        l: i64,
        r: i64,
        op: Op,
    ) -> Result<(), VMError> {
        match op {
            Op::Add => self.push(Object::Integer(l.wrapping_add(r))),
            Op::Sub => self.push(Object::Integer(l.wrapping_sub(r))),
            Op::Mul => self.push(Object::Integer(l.wrapping_mul(r))),
            Op::Div => self.push(Object::Integer(l.wrapping_div(r))),
            _ => Err(VMError::UnknownOperation(op)),
        }
    }

    fn execute_binary_string_operation(&mut self, l: &str, r: &str, op: Op) -> Result<(), VMError> {
        match op {
            Op::Add => self.push(Object::String(format!("{}{}", l, r))),
            _ => Err(VMError::UnsupportedBinaryTypes(
                Object::String(l.to_owned()),
                Object::String(r.to_owned()),
            )),
        }
    }

    fn execute_comparison_operation(&mut self, op: Op) -> Result<(), VMError> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                self.execute_integer_comparison(op, *l, *r)
            }
            _ => match op {
                Op::Equal => self.push(Object::Boolean(left.eq(&right))),
                Op::NotEqual => self.push(Object::Boolean(!left.eq(&right))),
                _ => Err(VMError::UnsupportedBinaryTypes(left, right)),
            },
        }
    }

    fn execute_index_expression(&mut self, left: Object, index: Object) -> Result<(), VMError> {
        match (&left, &index) {
            (Object::Array(elements), Object::Integer(i)) => self.execute_array_index(elements, *i),
            (Object::Hash(map), key) => self.execute_hash_index(map, key),
            _ => Err(VMError::IndexNotSupported(left)),
        }
    }

    fn execute_hash_index(
        &mut self,
        map: &IndexMap<HashKey, Object>,
        key: &Object,
    ) -> Result<(), VMError> {
        let hash_key = HashKey::from_object(key.clone()).map_err(VMError::Eval)?;
        match map.get(&hash_key) {
            Some(v) => self.push(v.clone()),
            None => self.push(Object::Null),
        }
    }

    fn execute_integer_comparison(&mut self, op: Op, left: i64, right: i64) -> Result<(), VMError> {
        match op {
            Op::Equal => self.push(Object::Boolean(left == right)),
            Op::NotEqual => self.push(Object::Boolean(left != right)),
            Op::GreaterThan => self.push(Object::Boolean(left > right)),
            _ => Err(VMError::UnknownOperation(op)),
        }
    }

    fn execute_minus_operator(&mut self) -> Result<(), VMError> {
        let operand = self.pop()?;

        match operand {
            Object::Integer(v) => self.push(Object::Integer(v.wrapping_neg())),
            _ => Err(VMError::UnsupportedNegationType(operand)),
        }
    }

    fn last_popped_stack_elem(&self) -> Object {
        self.stack[self.sp].clone()
    }

    fn push(&mut self, obj: Object) -> Result<(), VMError> {
        if self.sp >= STACK_SIZE {
            return Err(VMError::StackOverflow());
        }

        self.stack[self.sp] = obj;
        self.sp += 1;

        Ok(())
    }

    fn pop(&mut self) -> Result<Object, VMError> {
        if self.sp == 0 {
            Err(VMError::StackEmpty())
        } else {
            self.sp -= 1;
            Ok(self.stack[self.sp].clone())
        }
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), VMError> {
        let constant = self.constants[const_index].clone();

        match constant {
            Object::CompiledFunction(func) => {
                let mut free = Vec::with_capacity(num_free);

                for i in 0..num_free {
                    free.push(self.stack[self.sp - num_free + i].clone());
                }

                self.sp -= num_free;

                self.push(Object::Closure(Rc::new(Closure { func, free })))
            }
            other => Err(VMError::NonFunction(other)),
        }
    }

    fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("no frame to pop")
    }

    fn read_u16(&self, index: usize) -> usize {
        code::read_u16(self.current_frame().instructions(), index)
    }

    fn read_u8(&self, index: usize) -> usize {
        code::read_u8(self.current_frame().instructions(), index)
    }
}
