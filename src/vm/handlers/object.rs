//! Arrays and type checks.

use crate::vm::error::{InterpreterFault, VmError};
use crate::vm::object::ArrayData;
use crate::vm::vm::Interpreter;
use crate::vm::{Instruction, JavaType, ObjRef, Object, Value};

fn array_data<'o>(obj: &'o ObjRef) -> Result<&'o ArrayData, VmError> {
    obj.as_array().ok_or_else(|| {
        InterpreterFault::TypeMismatch {
            expected: "array",
            found: "object",
        }
        .into()
    })
}

fn checked_index(vm: &Interpreter<'_>, index: i32, len: usize) -> Result<usize, VmError> {
    match usize::try_from(index) {
        Ok(i) if i < len => Ok(i),
        _ => {
            let msg = format!("Index {} out of bounds for length {}", index, len);
            Err(vm.throw("java.lang.ArrayIndexOutOfBoundsException", Some(&msg)))
        }
    }
}

#[inline(never)]
pub(crate) fn new_array(vm: &mut Interpreter<'_>, insn: &Instruction) -> Result<(), VmError> {
    let element = JavaType::from_name(insn.class_operand(0)?);
    let count = vm.stack.pop_int()?;
    let Ok(len) = usize::try_from(count) else {
        return Err(vm.throw("java.lang.NegativeArraySizeException", Some(&count.to_string())));
    };
    let Some(array) = Object::array(element, len) else {
        return Err(vm.throw("java.lang.OutOfMemoryError", Some("Java heap space")));
    };
    vm.stack.push(Value::object(array))?;
    Ok(())
}

#[inline(never)]
pub(crate) fn array_length(vm: &mut Interpreter<'_>) -> Result<(), VmError> {
    let array = vm.pop_non_null()?;
    let len = array_data(&array)?.elements.lock().len();
    vm.stack.push(Value::Int(len as i32))?;
    Ok(())
}

#[inline(never)]
pub(crate) fn array_load(vm: &mut Interpreter<'_>) -> Result<(), VmError> {
    let index = vm.stack.pop_int()?;
    let array = vm.pop_non_null()?;
    let data = array_data(&array)?;
    let value = {
        let elements = data.elements.lock();
        let i = checked_index(vm, index, elements.len())?;
        elements[i].clone()
    };
    vm.stack.push(Value::from_host(value))?;
    Ok(())
}

#[inline(never)]
pub(crate) fn array_store(vm: &mut Interpreter<'_>) -> Result<(), VmError> {
    let value = vm.stack.pop()?;
    let index = vm.stack.pop_int()?;
    let array = vm.pop_non_null()?;
    let data = array_data(&array)?;
    let host = value.to_host(&data.element)?;

    if let (JavaType::Reference(element), Some(stored)) = (&data.element, host.as_ref()) {
        if !vm.runtime.classes().is_assignable(stored.class_name(), element) {
            return Err(vm.throw("java.lang.ArrayStoreException", Some(stored.class_name())));
        }
    }

    let mut elements = data.elements.lock();
    let i = checked_index(vm, index, elements.len())?;
    elements[i] = host;
    Ok(())
}

/// Leaves the reference on the stack; null always passes.
#[inline(never)]
pub(crate) fn check_cast(vm: &mut Interpreter<'_>, insn: &Instruction) -> Result<(), VmError> {
    let target = insn.class_operand(0)?;
    let Some(obj) = vm.stack.peek()?.as_object()?.cloned() else {
        return Ok(());
    };
    if !vm.runtime.classes().is_assignable(obj.class_name(), target) {
        let msg = format!("class {} cannot be cast to class {}", obj.class_name(), target);
        return Err(vm.throw("java.lang.ClassCastException", Some(&msg)));
    }
    Ok(())
}

#[inline(never)]
pub(crate) fn instance_of(vm: &mut Interpreter<'_>, insn: &Instruction) -> Result<(), VmError> {
    let target = insn.class_operand(0)?;
    let result = match vm.stack.pop_object()? {
        Some(obj) => vm.runtime.classes().is_assignable(obj.class_name(), target),
        None => false,
    };
    vm.stack.push(Value::Int(result as i32))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::vm::{
        Instruction, Opcode, Operand, Runtime, StackShape, StubLoader, StubTable, Value, VmContext, VmError,
    };

    fn run(code: Vec<Instruction>) -> Result<Value, VmError> {
        let runtime = Runtime::new(StubLoader::from_table(StubTable::from_stubs(vec![code])));
        VmContext::new(16, 2, vec![], 0).execute(&runtime)
    }

    fn new_array(element: &str, len: i32) -> Vec<Instruction> {
        vec![
            Instruction::with_int(Opcode::PushInt, len),
            Instruction::new(Opcode::NewArray, vec![Operand::Class(element.to_string())]),
        ]
    }

    fn thrown_class(result: Result<Value, VmError>) -> String {
        result.unwrap_err().throwable().unwrap().class_name().to_string()
    }

    #[test]
    fn test_byte_array_store_truncates() {
        let mut code = new_array("byte", 2);
        code.extend([
            Instruction::with_int(Opcode::Stack, StackShape::Dup as i32),
            Instruction::with_int(Opcode::PushInt, 1),
            Instruction::with_int(Opcode::PushInt, 0x1ff),
            Instruction::simple(Opcode::ArrayStore),
            Instruction::with_int(Opcode::PushInt, 1),
            Instruction::simple(Opcode::ArrayLoad),
            Instruction::simple(Opcode::Return),
        ]);
        assert_eq!(run(code).unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_array_length_and_bounds() {
        let mut code = new_array("long", 3);
        code.extend([Instruction::simple(Opcode::ArrayLength), Instruction::simple(Opcode::Return)]);
        assert_eq!(run(code).unwrap(), Value::Int(3));

        let mut code = new_array("int", 3);
        code.extend([
            Instruction::with_int(Opcode::PushInt, 3),
            Instruction::simple(Opcode::ArrayLoad),
            Instruction::simple(Opcode::Return),
        ]);
        assert_eq!(thrown_class(run(code)), "java.lang.ArrayIndexOutOfBoundsException");
    }

    #[test]
    fn test_negative_size() {
        let mut code = new_array("int", -1);
        code.push(Instruction::simple(Opcode::Return));
        assert_eq!(thrown_class(run(code)), "java.lang.NegativeArraySizeException");
    }

    #[test]
    fn test_huge_array_throws_out_of_memory_error() {
        let mut code = new_array("int", i32::MAX);
        code.push(Instruction::simple(Opcode::Return));
        let err = run(code).unwrap_err();
        assert_eq!(err.to_string(), "uncaught exception java.lang.OutOfMemoryError: Java heap space");
    }

    #[test]
    fn test_array_store_type_check() {
        let mut code = new_array("java.lang.Integer", 1);
        code.extend([
            Instruction::with_int(Opcode::PushInt, 0),
            Instruction::new(Opcode::PushString, vec![Operand::Str("x".to_string())]),
            Instruction::simple(Opcode::ArrayStore),
            Instruction::simple(Opcode::PushNull),
            Instruction::simple(Opcode::Return),
        ]);
        assert_eq!(thrown_class(run(code)), "java.lang.ArrayStoreException");
    }

    #[test]
    fn test_checkcast_and_instanceof() {
        let code = vec![
            Instruction::new(Opcode::PushString, vec![Operand::Str("x".to_string())]),
            Instruction::new(Opcode::CheckCast, vec![Operand::Class("java.lang.CharSequence".to_string())]),
            Instruction::new(Opcode::InstanceOf, vec![Operand::Class("java.lang.Comparable".to_string())]),
            Instruction::simple(Opcode::Return),
        ];
        assert_eq!(run(code).unwrap(), Value::Int(1));

        let code = vec![
            Instruction::new(Opcode::PushString, vec![Operand::Str("x".to_string())]),
            Instruction::new(Opcode::CheckCast, vec![Operand::Class("java.lang.Integer".to_string())]),
            Instruction::simple(Opcode::Return),
        ];
        assert_eq!(thrown_class(run(code)), "java.lang.ClassCastException");

        let code = vec![
            Instruction::simple(Opcode::PushNull),
            Instruction::new(Opcode::InstanceOf, vec![Operand::Class("java.lang.Object".to_string())]),
            Instruction::simple(Opcode::Return),
        ];
        assert_eq!(run(code).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_monitor_on_null_throws() {
        let code = vec![Instruction::simple(Opcode::PushNull), Instruction::simple(Opcode::MonitorEnter)];
        assert_eq!(thrown_class(run(code)), "java.lang.NullPointerException");
    }
}
