//! Field access, calls and construction, all through the reflective cache.

use crate::vm::context::replace_in;
use crate::vm::error::{InterpreterFault, VmError};
use crate::vm::reflect::ReflectError;
use crate::vm::vm::Interpreter;
use crate::vm::{Instruction, JValue, JavaType, ObjRef, Object, Value, split_params};

/// Pop one argument per declared parameter (last parameter on top) and
/// unbox each to its declared type.
fn pop_args(vm: &mut Interpreter<'_>, params: &[JavaType]) -> Result<Vec<JValue>, VmError> {
    let mut args = Vec::with_capacity(params.len());
    for ty in params.iter().rev() {
        let value = vm.stack.pop()?;
        args.push(value.to_host(ty)?);
    }
    args.reverse();
    Ok(args)
}

fn push_result(vm: &mut Interpreter<'_>, ret: &JavaType, value: JValue) -> Result<(), VmError> {
    if *ret != JavaType::Void {
        vm.stack.push(Value::from_host(value))?;
    }
    Ok(())
}

#[inline(never)]
pub(crate) fn get_field(vm: &mut Interpreter<'_>, insn: &Instruction, is_static: bool) -> Result<(), VmError> {
    let rt = vm.runtime;
    let field = rt
        .reflect()
        .field(rt.classes(), insn.class_operand(0)?, insn.str_operand(1)?, insn.str_operand(2)?)?;
    let value = if is_static {
        field.get(None)?
    } else {
        let obj = vm.pop_non_null()?;
        field.get(Some(&obj))?
    };
    vm.stack.push(Value::from_host(value))?;
    Ok(())
}

#[inline(never)]
pub(crate) fn set_field(vm: &mut Interpreter<'_>, insn: &Instruction, is_static: bool) -> Result<(), VmError> {
    let rt = vm.runtime;
    let field = rt
        .reflect()
        .field(rt.classes(), insn.class_operand(0)?, insn.str_operand(1)?, insn.str_operand(2)?)?;
    let value = vm.stack.pop()?.to_host(&field.field.ty)?;
    if is_static {
        field.set(None, value)?;
    } else {
        let obj = vm.pop_non_null()?;
        field.set(Some(&obj), value)?;
    }
    Ok(())
}

#[inline(never)]
pub(crate) fn invoke(vm: &mut Interpreter<'_>, insn: &Instruction, is_static: bool) -> Result<(), VmError> {
    let rt = vm.runtime;
    let owner = insn.class_operand(0)?;
    let name = insn.str_operand(1)?;
    let descriptor = insn.str_operand(2)?;
    let exact = insn.flag_operand(3)?;

    let args = pop_args(vm, &split_params(descriptor))?;
    let receiver = if is_static {
        None
    } else {
        Some(vm.pop_non_null()?)
    };

    // Abstract interface methods have no host body on the owner; resolve
    // them on the receiver's class instead.
    let method = match (rt.reflect().method(rt.classes(), owner, name, descriptor), &receiver) {
        (Err(ReflectError::NoSuchMethod { .. }), Some(obj)) if !exact => {
            rt.reflect()
                .method(rt.classes(), obj.class_name(), name, descriptor)?
        }
        (result, _) => result?,
    };
    if method.is_static() != is_static {
        return Err(InterpreterFault::Resolution(format!(
            "{}.{} is {}static",
            owner,
            name,
            if method.is_static() { "" } else { "not " }
        ))
        .into());
    }

    let result = method.invoke(rt, receiver, args, exact)?;
    push_result(vm, method.return_type(), result)
}

/// `NEW`: push a placeholder that `INIT` later swaps for the constructed
/// object.
#[inline(never)]
pub(crate) fn allocate(vm: &mut Interpreter<'_>, insn: &Instruction) -> Result<(), VmError> {
    let owner = insn.class_operand(0)?;
    if vm.runtime.classes().get(owner).is_none() {
        return Err(InterpreterFault::Resolution(format!("class not found: {}", owner)).into());
    }
    vm.stack.push(Value::object(Object::uninitialized(owner)))?;
    Ok(())
}

/// `INIT`: run the constructor and replace every copy of the placeholder
/// (the JVM idiom `new; dup; <init>` leaves one beneath the arguments).
#[inline(never)]
pub(crate) fn construct(vm: &mut Interpreter<'_>, insn: &Instruction) -> Result<(), VmError> {
    let rt = vm.runtime;
    let ctor = rt
        .reflect()
        .constructor(rt.classes(), insn.class_operand(0)?, insn.str_operand(1)?)?;
    let args = pop_args(vm, ctor.params())?;
    let marker: ObjRef = match vm.stack.pop_object()? {
        Some(obj) if obj.is_uninitialized() => obj,
        _ => {
            return Err(InterpreterFault::BadOperand {
                opcode: "INIT",
                index: 0,
                reason: "receiver is not an uninitialized object",
            }
            .into());
        }
    };
    let obj = ctor.new_instance(rt, args)?;
    replace_in(vm.stack.slots_mut(), &marker, &obj);
    vm.registers.replace_object(&marker, &obj);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::vm::classes::ClassDef;
    use crate::vm::{
        Instruction, JValue, JavaType, Opcode, Operand, Runtime, StackShape, StubLoader, StubTable, Value,
        VmContext, VmError, join_params,
    };

    fn class(name: &str) -> Operand {
        Operand::Class(name.to_string())
    }

    fn s(text: &str) -> Operand {
        Operand::Str(text.to_string())
    }

    fn run_with(runtime_setup: impl FnOnce(&Runtime), code: Vec<Instruction>) -> Result<Value, VmError> {
        let runtime = Runtime::new(StubLoader::from_table(StubTable::from_stubs(vec![code])));
        runtime_setup(&runtime);
        VmContext::new(16, 4, vec![], 0).execute(&runtime)
    }

    #[test]
    fn test_static_call_math_max() {
        let params = join_params(&[JavaType::Int, JavaType::Int]);
        let code = vec![
            Instruction::with_int(Opcode::PushInt, 2),
            Instruction::with_int(Opcode::PushInt, 5),
            Instruction::new(Opcode::StaticCall, vec![class("java.lang.Math"), s("max"), s(&params)]),
            Instruction::simple(Opcode::Return),
        ];
        assert_eq!(run_with(|_| {}, code).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_new_dup_init_and_virtual_call() {
        // new StringBuilder().append("a").append(1).toString()
        let sb = "java.lang.StringBuilder";
        let code = vec![
            Instruction::new(Opcode::New, vec![class(sb)]),
            Instruction::with_int(Opcode::Stack, StackShape::Dup as i32),
            Instruction::new(Opcode::Init, vec![class(sb), s("")]),
            Instruction::new(Opcode::PushString, vec![s("a")]),
            Instruction::new(Opcode::VirtCall, vec![class(sb), s("append"), s("java.lang.String")]),
            Instruction::with_int(Opcode::PushInt, 1),
            Instruction::new(Opcode::VirtCall, vec![class(sb), s("append"), s("int")]),
            Instruction::new(Opcode::VirtCall, vec![class(sb), s("toString"), s("")]),
            Instruction::simple(Opcode::Return),
        ];
        let result = run_with(|_| {}, code).unwrap();
        let obj = result.as_object().unwrap().unwrap().clone();
        assert_eq!(obj.as_str(), Some("a1"));
    }

    #[test]
    fn test_init_replaces_marker_in_registers() {
        let code = vec![
            Instruction::new(Opcode::New, vec![class("java.lang.Object")]),
            Instruction::with_int(Opcode::Stack, StackShape::Dup as i32),
            Instruction::with_int(Opcode::Store, 0),
            Instruction::new(Opcode::Init, vec![class("java.lang.Object"), s("")]),
            Instruction::with_int(Opcode::Load, 0),
            Instruction::simple(Opcode::Return),
        ];
        let result = run_with(|_| {}, code).unwrap();
        let obj = result.as_object().unwrap().unwrap().clone();
        assert!(!obj.is_uninitialized());
    }

    #[test]
    fn test_instance_field_roundtrip() {
        let setup = |rt: &Runtime| {
            rt.classes().define(ClassDef::new("com.example.Point").field("x", "int"));
        };
        let point = "com.example.Point";
        let code = vec![
            Instruction::new(Opcode::New, vec![class(point)]),
            Instruction::with_int(Opcode::Stack, StackShape::Dup as i32),
            Instruction::new(Opcode::Init, vec![class(point), s("")]),
            Instruction::with_int(Opcode::Store, 0),
            Instruction::with_int(Opcode::Load, 0),
            Instruction::with_int(Opcode::PushInt, 11),
            Instruction::new(Opcode::VirtSet, vec![class(point), s("x"), s("int")]),
            Instruction::with_int(Opcode::Load, 0),
            Instruction::new(Opcode::VirtGet, vec![class(point), s("x"), s("int")]),
            Instruction::simple(Opcode::Return),
        ];
        assert_eq!(run_with(setup, code).unwrap(), Value::Int(11));
    }

    #[test]
    fn test_hidden_field_keeps_own_value() {
        let setup = |rt: &Runtime| {
            rt.classes().define(ClassDef::new("com.example.A").field("x", "int"));
            rt.classes()
                .define(ClassDef::new("com.example.B").extends("com.example.A").field("x", "int"));
        };
        let (a, b) = ("com.example.A", "com.example.B");
        let code = vec![
            Instruction::new(Opcode::New, vec![class(b)]),
            Instruction::with_int(Opcode::Stack, StackShape::Dup as i32),
            Instruction::new(Opcode::Init, vec![class(b), s("")]),
            Instruction::with_int(Opcode::Store, 0),
            Instruction::with_int(Opcode::Load, 0),
            Instruction::with_int(Opcode::PushInt, 1),
            Instruction::new(Opcode::VirtSet, vec![class(a), s("x"), s("int")]),
            Instruction::with_int(Opcode::Load, 0),
            Instruction::with_int(Opcode::PushInt, 2),
            Instruction::new(Opcode::VirtSet, vec![class(b), s("x"), s("int")]),
            Instruction::with_int(Opcode::Load, 0),
            Instruction::new(Opcode::VirtGet, vec![class(a), s("x"), s("int")]),
            Instruction::with_int(Opcode::Load, 0),
            Instruction::new(Opcode::VirtGet, vec![class(b), s("x"), s("int")]),
            Instruction::with_int(Opcode::PushInt, 10),
            Instruction::simple(Opcode::Mul),
            Instruction::simple(Opcode::Add),
            Instruction::simple(Opcode::Return),
        ];
        // A.x + 10 * B.x
        assert_eq!(run_with(setup, code).unwrap(), Value::Int(21));
    }

    #[test]
    fn test_static_field_roundtrip() {
        let setup = |rt: &Runtime| {
            rt.classes().define(
                ClassDef::new("com.example.Counter").static_field("count", "long", JValue::Long(7)),
            );
        };
        let counter = "com.example.Counter";
        let code = vec![
            Instruction::new(Opcode::StaticGet, vec![class(counter), s("count"), s("long")]),
            Instruction::new(Opcode::PushLong, vec![Operand::Long(1)]),
            Instruction::simple(Opcode::Add),
            Instruction::new(Opcode::StaticSet, vec![class(counter), s("count"), s("long")]),
            Instruction::new(Opcode::StaticGet, vec![class(counter), s("count"), s("long")]),
            Instruction::simple(Opcode::Return),
        ];
        assert_eq!(run_with(setup, code).unwrap(), Value::Long(8));
    }

    #[test]
    fn test_null_receiver_throws_npe() {
        let code = vec![
            Instruction::simple(Opcode::PushNull),
            Instruction::new(Opcode::VirtCall, vec![class("java.lang.String"), s("length"), s("")]),
            Instruction::simple(Opcode::Return),
        ];
        let err = run_with(|_| {}, code).unwrap_err();
        assert_eq!(err.throwable().unwrap().class_name(), "java.lang.NullPointerException");
    }

    #[test]
    fn test_unresolvable_member_is_fault() {
        let code = vec![
            Instruction::new(Opcode::StaticCall, vec![class("java.lang.Math"), s("nope"), s("")]),
            Instruction::simple(Opcode::Return),
        ];
        assert!(matches!(run_with(|_| {}, code), Err(VmError::Fault(_))));
    }
}
