//! The per-call entry point into the interpreter.

use super::error::{InterpreterFault, VmError};
use super::object::ObjRef;
use super::runtime::Runtime;
use super::stack::Stack;
use super::value::Value;
use super::vm::Interpreter;

/// One exception-handler range of a virtualized method, in instruction
/// indices. `catch_type` of `None` catches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatch {
    pub start_pc: usize,
    pub end_pc: usize,
    pub handler_pc: usize,
    pub catch_type: Option<String>,
}

impl TryCatch {
    pub fn new(start_pc: usize, end_pc: usize, handler_pc: usize, catch_type: Option<&str>) -> Self {
        Self {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: catch_type.map(str::to_string),
        }
    }

    pub fn covers(&self, pc: usize) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}

/// Local variable slots. Every slot starts as null; a wide value occupies
/// its slot and a `Continuation` in the next.
#[derive(Debug)]
pub struct RegisterFile {
    slots: Vec<Value>,
}

impl RegisterFile {
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![Value::null(); count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn out_of_range(&self, index: usize) -> InterpreterFault {
        InterpreterFault::RegisterOutOfRange {
            index,
            count: self.slots.len(),
        }
    }

    pub fn load(&self, index: usize) -> Result<Value, InterpreterFault> {
        match self.slots.get(index) {
            None => Err(self.out_of_range(index)),
            Some(Value::Continuation) => Err(InterpreterFault::BrokenContinuation),
            Some(value) => Ok(value.clone()),
        }
    }

    pub fn store(&mut self, index: usize, value: Value) -> Result<(), InterpreterFault> {
        if value.is_continuation() {
            return Err(InterpreterFault::BrokenContinuation);
        }
        let needed = if value.is_wide() { index + 2 } else { index + 1 };
        if needed > self.slots.len() {
            return Err(self.out_of_range(needed - 1));
        }
        if value.is_wide() {
            self.slots[index + 1] = Value::Continuation;
        }
        self.slots[index] = value;
        Ok(())
    }

    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    pub(crate) fn replace_object(&mut self, marker: &ObjRef, replacement: &ObjRef) {
        replace_in(&mut self.slots, marker, replacement);
    }
}

pub(crate) fn replace_in(slots: &mut [Value], marker: &ObjRef, replacement: &ObjRef) {
    for slot in slots {
        if let Value::Object(Some(obj)) = slot {
            if ObjRef::ptr_eq(obj, marker) {
                *slot = Value::object(replacement.clone());
            }
        }
    }
}

/// Everything one virtualized call needs: operand stack, registers, handler
/// ranges and the offset of its instruction list.
#[derive(Debug)]
pub struct VmContext {
    pub(crate) stack: Stack,
    pub(crate) registers: RegisterFile,
    pub(crate) try_catches: Vec<TryCatch>,
    pub(crate) stub_offset: usize,
}

impl VmContext {
    pub fn new(
        stack_size: usize,
        register_count: usize,
        try_catches: Vec<TryCatch>,
        stub_offset: usize,
    ) -> Self {
        Self {
            stack: Stack::new(stack_size),
            registers: RegisterFile::new(register_count),
            try_catches,
            stub_offset,
        }
    }

    pub fn set_register(&mut self, index: usize, value: Value) -> Result<(), InterpreterFault> {
        self.registers.store(index, value)
    }

    pub fn register(&self, index: usize) -> Result<Value, InterpreterFault> {
        self.registers.load(index)
    }

    pub fn stub_offset(&self) -> usize {
        self.stub_offset
    }

    /// Run the stub selected by this context to completion.
    pub fn execute(self, runtime: &Runtime) -> Result<Value, VmError> {
        let _depth = runtime.enter()?;
        let code = runtime.stub(self.stub_offset)?;
        Interpreter::new(runtime, code, self).run()
    }
}
