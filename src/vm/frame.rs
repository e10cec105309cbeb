use crate::code::Instructions;
use crate::object::Closure;
use std::rc::Rc;

/// Frame represents call-relevant information – the closure under execution,
/// the instruction pointer into it, and where its locals begin on the stack.
/// It is short for "call frame" or "stack frame", and is sometimes called an
/// "activation record" in the literature
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }
}
