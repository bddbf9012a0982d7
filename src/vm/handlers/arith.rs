//! Untyped arithmetic: the operand tags pick the operation.

use crate::vm::error::{InterpreterFault, VmError};
use crate::vm::vm::Interpreter;
use crate::vm::{Instruction, Opcode, Value};

fn mismatch(expected: &'static str, found: &Value) -> VmError {
    InterpreterFault::TypeMismatch {
        expected,
        found: found.type_name(),
    }
    .into()
}

fn unsupported(op: Opcode, operand: &'static str) -> VmError {
    InterpreterFault::BadOperand {
        opcode: op.mnemonic(),
        index: 0,
        reason: operand,
    }
    .into()
}

#[inline(never)]
pub(crate) fn binary(vm: &mut Interpreter<'_>, op: Opcode) -> Result<(), VmError> {
    let b = vm.stack.pop()?;
    let a = vm.stack.pop()?;
    let result = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(int_op(vm, op, x, y)?),
        (Value::Long(x), Value::Long(y)) => Value::Long(long_op(vm, op, x, y)?),
        (Value::Float(x), Value::Float(y)) => Value::Float(match op {
            Opcode::Add => x + y,
            Opcode::Sub => x - y,
            Opcode::Mul => x * y,
            Opcode::Div => x / y,
            Opcode::Rem => x % y,
            _ => return Err(unsupported(op, "float operands")),
        }),
        (Value::Double(x), Value::Double(y)) => Value::Double(match op {
            Opcode::Add => x + y,
            Opcode::Sub => x - y,
            Opcode::Mul => x * y,
            Opcode::Div => x / y,
            Opcode::Rem => x % y,
            _ => return Err(unsupported(op, "double operands")),
        }),
        (a, b) if a.type_name() != b.type_name() => return Err(mismatch(a.type_name(), &b)),
        (a, _) => return Err(mismatch("number", &a)),
    };
    vm.stack.push(result)?;
    Ok(())
}

fn int_op(vm: &Interpreter<'_>, op: Opcode, x: i32, y: i32) -> Result<i32, VmError> {
    Ok(match op {
        Opcode::Add => x.wrapping_add(y),
        Opcode::Sub => x.wrapping_sub(y),
        Opcode::Mul => x.wrapping_mul(y),
        Opcode::Div | Opcode::Rem if y == 0 => {
            return Err(vm.throw("java.lang.ArithmeticException", Some("/ by zero")));
        }
        Opcode::Div => x.wrapping_div(y),
        Opcode::Rem => x.wrapping_rem(y),
        Opcode::And => x & y,
        Opcode::Or => x | y,
        Opcode::Xor => x ^ y,
        _ => return Err(unsupported(op, "int operands")),
    })
}

fn long_op(vm: &Interpreter<'_>, op: Opcode, x: i64, y: i64) -> Result<i64, VmError> {
    Ok(match op {
        Opcode::Add => x.wrapping_add(y),
        Opcode::Sub => x.wrapping_sub(y),
        Opcode::Mul => x.wrapping_mul(y),
        Opcode::Div | Opcode::Rem if y == 0 => {
            return Err(vm.throw("java.lang.ArithmeticException", Some("/ by zero")));
        }
        Opcode::Div => x.wrapping_div(y),
        Opcode::Rem => x.wrapping_rem(y),
        Opcode::And => x & y,
        Opcode::Or => x | y,
        Opcode::Xor => x ^ y,
        _ => return Err(unsupported(op, "long operands")),
    })
}

/// `SUB [Int(1)]`: the sign of `a - b` computed without overflow.
#[inline(never)]
pub(crate) fn compare_ints(vm: &mut Interpreter<'_>) -> Result<(), VmError> {
    let b = vm.stack.pop_int()? as i64;
    let a = vm.stack.pop_int()? as i64;
    vm.stack.push(Value::Int((a - b).signum() as i32))?;
    Ok(())
}

#[inline(never)]
pub(crate) fn negate(vm: &mut Interpreter<'_>) -> Result<(), VmError> {
    let result = match vm.stack.pop()? {
        Value::Int(x) => Value::Int(x.wrapping_neg()),
        Value::Long(x) => Value::Long(x.wrapping_neg()),
        Value::Float(x) => Value::Float(-x),
        Value::Double(x) => Value::Double(-x),
        other => return Err(mismatch("number", &other)),
    };
    vm.stack.push(result)?;
    Ok(())
}

/// Shift distances are masked to the operand width.
#[inline(never)]
pub(crate) fn shift(vm: &mut Interpreter<'_>, op: Opcode) -> Result<(), VmError> {
    let count = vm.stack.pop_int()? as u32;
    let result = match vm.stack.pop()? {
        Value::Int(x) => Value::Int(match op {
            Opcode::Shl => x.wrapping_shl(count & 0x1f),
            Opcode::Shr => x.wrapping_shr(count & 0x1f),
            _ => (x as u32).wrapping_shr(count & 0x1f) as i32,
        }),
        Value::Long(x) => Value::Long(match op {
            Opcode::Shl => x.wrapping_shl(count & 0x3f),
            Opcode::Shr => x.wrapping_shr(count & 0x3f),
            _ => (x as u64).wrapping_shr(count & 0x3f) as i64,
        }),
        other => return Err(mismatch("int or long", &other)),
    };
    vm.stack.push(result)?;
    Ok(())
}

#[inline(never)]
pub(crate) fn compare_long(vm: &mut Interpreter<'_>) -> Result<(), VmError> {
    let b = vm.stack.pop()?;
    let a = vm.stack.pop()?;
    let ordering = match (&a, &b) {
        (Value::Long(x), Value::Long(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        _ => return Err(mismatch("long", &a)),
    };
    vm.stack.push(Value::Int(ordering as i32))?;
    Ok(())
}

/// Floating comparison; `nan_result` is pushed when either side is NaN.
#[inline(never)]
pub(crate) fn compare_float(vm: &mut Interpreter<'_>, nan_result: i32) -> Result<(), VmError> {
    let b = vm.stack.pop()?;
    let a = vm.stack.pop()?;
    let ordering = match (&a, &b) {
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y),
        _ => return Err(mismatch("float or double", &a)),
    };
    let result = ordering.map_or(nan_result, |o| o as i32);
    vm.stack.push(Value::Int(result))?;
    Ok(())
}

/// `PRIM_CAST [Int(target)]`, where the target is a descriptor character.
/// Float-to-integral conversions saturate and map NaN to zero.
#[inline(never)]
pub(crate) fn prim_cast(vm: &mut Interpreter<'_>, insn: &Instruction) -> Result<(), VmError> {
    let target = u8::try_from(insn.int_operand(0)?).map(char::from).unwrap_or('?');
    let value = vm.stack.pop()?;
    let result = match (value, target) {
        (Value::Int(x), 'I') => Value::Int(x),
        (Value::Int(x), 'J') => Value::Long(x as i64),
        (Value::Int(x), 'F') => Value::Float(x as f32),
        (Value::Int(x), 'D') => Value::Double(x as f64),
        (Value::Int(x), 'B') => Value::Int(x as i8 as i32),
        (Value::Int(x), 'C') => Value::Int(x as u16 as i32),
        (Value::Int(x), 'S') => Value::Int(x as i16 as i32),
        (Value::Long(x), 'I') => Value::Int(x as i32),
        (Value::Long(x), 'F') => Value::Float(x as f32),
        (Value::Long(x), 'D') => Value::Double(x as f64),
        (Value::Float(x), 'I') => Value::Int(x as i32),
        (Value::Float(x), 'J') => Value::Long(x as i64),
        (Value::Float(x), 'D') => Value::Double(x as f64),
        (Value::Double(x), 'I') => Value::Int(x as i32),
        (Value::Double(x), 'J') => Value::Long(x as i64),
        (Value::Double(x), 'F') => Value::Float(x as f32),
        (other, _) => return Err(mismatch("castable primitive", &other)),
    };
    vm.stack.push(result)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::vm::{
        Instruction, Opcode, Operand, Runtime, StubLoader, StubTable, Value, VmContext, VmError,
    };

    fn eval(pushes: Vec<Instruction>, op: Instruction) -> Result<Value, VmError> {
        let mut code = pushes;
        code.push(op);
        code.push(Instruction::simple(Opcode::Return));
        let runtime = Runtime::new(StubLoader::from_table(StubTable::from_stubs(vec![code])));
        VmContext::new(8, 0, vec![], 0).execute(&runtime)
    }

    fn ints(a: i32, b: i32) -> Vec<Instruction> {
        vec![
            Instruction::with_int(Opcode::PushInt, a),
            Instruction::with_int(Opcode::PushInt, b),
        ]
    }

    fn doubles(a: f64, b: f64) -> Vec<Instruction> {
        vec![
            Instruction::new(Opcode::PushDouble, vec![Operand::Double(a)]),
            Instruction::new(Opcode::PushDouble, vec![Operand::Double(b)]),
        ]
    }

    #[test]
    fn test_int_wrapping() {
        let r = eval(ints(i32::MAX, 1), Instruction::simple(Opcode::Add)).unwrap();
        assert_eq!(r, Value::Int(i32::MIN));
        let r = eval(ints(i32::MIN, -1), Instruction::simple(Opcode::Div)).unwrap();
        assert_eq!(r, Value::Int(i32::MIN));
        let r = eval(ints(-7, 2), Instruction::simple(Opcode::Rem)).unwrap();
        assert_eq!(r, Value::Int(-1));
    }

    #[test]
    fn test_long_division_by_zero_throws() {
        let pushes = vec![
            Instruction::new(Opcode::PushLong, vec![Operand::Long(5)]),
            Instruction::new(Opcode::PushLong, vec![Operand::Long(0)]),
        ];
        let err = eval(pushes, Instruction::simple(Opcode::Rem)).unwrap_err();
        assert_eq!(err.throwable().unwrap().class_name(), "java.lang.ArithmeticException");
    }

    #[test]
    fn test_float_division_by_zero_is_infinite() {
        let r = eval(doubles(1.0, 0.0), Instruction::simple(Opcode::Div)).unwrap();
        assert_eq!(r, Value::Double(f64::INFINITY));
    }

    #[test]
    fn test_shift_masking() {
        let r = eval(ints(1, 33), Instruction::simple(Opcode::Shl)).unwrap();
        assert_eq!(r, Value::Int(2));
        let r = eval(ints(-8, 1), Instruction::simple(Opcode::Ushr)).unwrap();
        assert_eq!(r, Value::Int(0x7fff_fffc));
        let r = eval(ints(-8, 1), Instruction::simple(Opcode::Shr)).unwrap();
        assert_eq!(r, Value::Int(-4));
    }

    #[test]
    fn test_nan_comparisons() {
        let r = eval(doubles(f64::NAN, 1.0), Instruction::simple(Opcode::Cmpl)).unwrap();
        assert_eq!(r, Value::Int(-1));
        let r = eval(doubles(f64::NAN, 1.0), Instruction::simple(Opcode::Cmpg)).unwrap();
        assert_eq!(r, Value::Int(1));
        let r = eval(doubles(2.0, 1.0), Instruction::simple(Opcode::Cmpl)).unwrap();
        assert_eq!(r, Value::Int(1));
    }

    #[test]
    fn test_long_compare() {
        let pushes = vec![
            Instruction::new(Opcode::PushLong, vec![Operand::Long(-1)]),
            Instruction::new(Opcode::PushLong, vec![Operand::Long(i64::MAX)]),
        ];
        assert_eq!(eval(pushes, Instruction::simple(Opcode::Cmp)).unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_prim_casts() {
        let cast = |c: char| Instruction::with_int(Opcode::PrimCast, c as i32);
        let push_int = |v| vec![Instruction::with_int(Opcode::PushInt, v)];
        assert_eq!(eval(push_int(300), cast('B')).unwrap(), Value::Int(44));
        assert_eq!(eval(push_int(-1), cast('C')).unwrap(), Value::Int(0xffff));
        assert_eq!(eval(push_int(-1), cast('J')).unwrap(), Value::Long(-1));
        let push_double = |v| vec![Instruction::new(Opcode::PushDouble, vec![Operand::Double(v)])];
        assert_eq!(eval(push_double(f64::NAN), cast('I')).unwrap(), Value::Int(0));
        assert_eq!(eval(push_double(1e20), cast('I')).unwrap(), Value::Int(i32::MAX));
        assert_eq!(eval(push_double(-1e30), cast('J')).unwrap(), Value::Long(i64::MIN));
    }

    #[test]
    fn test_mixed_tags_fault() {
        let pushes = vec![
            Instruction::with_int(Opcode::PushInt, 1),
            Instruction::new(Opcode::PushLong, vec![Operand::Long(1)]),
        ];
        assert!(matches!(
            eval(pushes, Instruction::simple(Opcode::Add)),
            Err(VmError::Fault(_))
        ));
    }
}
