use super::error::InterpreterFault;
use super::object::ObjRef;
use super::value::Value;

/// Fixed-capacity operand stack.
///
/// `push` follows every wide value with a `Continuation`; `pop` consumes
/// it again, so callers working with values never see the placeholder.
/// Slot-level access (`push_slot`/`pop_slot`) is for the shuffle opcodes,
/// which move raw slots.
#[derive(Debug)]
pub struct Stack {
    slots: Vec<Value>,
    capacity: usize,
}

impl Stack {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn push_slot(&mut self, value: Value) -> Result<(), InterpreterFault> {
        if self.slots.len() >= self.capacity {
            return Err(InterpreterFault::StackOverflow {
                capacity: self.capacity,
            });
        }
        self.slots.push(value);
        Ok(())
    }

    pub fn pop_slot(&mut self) -> Result<Value, InterpreterFault> {
        self.slots.pop().ok_or(InterpreterFault::StackUnderflow)
    }

    /// Push a value, adding the continuation slot for wide values.
    pub fn push(&mut self, value: Value) -> Result<(), InterpreterFault> {
        let wide = value.is_wide();
        self.push_slot(value)?;
        if wide {
            self.push_slot(Value::Continuation)?;
        }
        Ok(())
    }

    /// Pop a value, consuming its continuation slot if it is wide.
    pub fn pop(&mut self) -> Result<Value, InterpreterFault> {
        match self.pop_slot()? {
            Value::Continuation => {
                let value = self.pop_slot()?;
                if value.is_wide() {
                    Ok(value)
                } else {
                    Err(InterpreterFault::BrokenContinuation)
                }
            }
            value if value.is_wide() => Err(InterpreterFault::BrokenContinuation),
            value => Ok(value),
        }
    }

    pub fn pop_int(&mut self) -> Result<i32, InterpreterFault> {
        self.pop()?.as_int()
    }

    pub fn pop_object(&mut self) -> Result<Option<ObjRef>, InterpreterFault> {
        Ok(self.pop()?.as_object()?.cloned())
    }

    /// The value on top without removing it (wide-aware).
    pub fn peek(&self) -> Result<&Value, InterpreterFault> {
        let len = self.slots.len();
        match self.slots.last() {
            None => Err(InterpreterFault::StackUnderflow),
            Some(Value::Continuation) if len >= 2 => Ok(&self.slots[len - 2]),
            Some(Value::Continuation) => Err(InterpreterFault::BrokenContinuation),
            Some(value) => Ok(value),
        }
    }

    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [Value] {
        &mut self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_push_adds_continuation() {
        let mut stack = Stack::new(4);
        stack.push(Value::Long(5)).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.slots()[1], Value::Continuation);
        stack.push(Value::Int(1)).unwrap();
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn test_mixed_width_pop_order() {
        let mut stack = Stack::new(8);
        stack.push(Value::Long(0x1234_5678_9abc)).unwrap();
        stack.push(Value::Int(42)).unwrap();
        assert_eq!(stack.pop().unwrap(), Value::Int(42));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop().unwrap(), Value::Long(0x1234_5678_9abc));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_overflow_and_underflow() {
        let mut stack = Stack::new(1);
        assert!(matches!(
            stack.push(Value::Double(1.0)),
            Err(InterpreterFault::StackOverflow { capacity: 1 })
        ));
        let mut stack = Stack::new(1);
        assert!(matches!(stack.pop(), Err(InterpreterFault::StackUnderflow)));
    }

    #[test]
    fn test_orphan_continuation_is_fault() {
        let mut stack = Stack::new(4);
        stack.push(Value::Int(1)).unwrap();
        stack.push_slot(Value::Continuation).unwrap();
        assert!(matches!(stack.pop(), Err(InterpreterFault::BrokenContinuation)));
    }

    #[test]
    fn test_peek_wide() {
        let mut stack = Stack::new(4);
        stack.push(Value::Double(2.5)).unwrap();
        assert_eq!(stack.peek().unwrap(), &Value::Double(2.5));
        assert_eq!(stack.len(), 2);
    }
}
