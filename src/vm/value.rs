use std::fmt;
use std::sync::Arc;

use super::error::InterpreterFault;
use super::object::{JValue, ObjRef};
use super::types::JavaType;

/// A tagged runtime value.
///
/// Sub-int primitives (boolean, byte, char, short) are carried as `Int`.
/// `Continuation` only ever appears directly above a wide (`Long`/`Double`)
/// value, on the stack or in the register file.
#[derive(Clone)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(Option<ObjRef>),
    Continuation,
}

impl Value {
    pub fn null() -> Self {
        Value::Object(None)
    }

    pub fn object(obj: ObjRef) -> Self {
        Value::Object(Some(obj))
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn is_continuation(&self) -> bool {
        matches!(self, Value::Continuation)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Object(_) => "object",
            Value::Continuation => "continuation",
        }
    }

    fn mismatch(&self, expected: &'static str) -> InterpreterFault {
        InterpreterFault::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }

    pub fn as_int(&self) -> Result<i32, InterpreterFault> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(other.mismatch("int")),
        }
    }

    pub fn as_long(&self) -> Result<i64, InterpreterFault> {
        match self {
            Value::Long(v) => Ok(*v),
            other => Err(other.mismatch("long")),
        }
    }

    pub fn as_float(&self) -> Result<f32, InterpreterFault> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(other.mismatch("float")),
        }
    }

    pub fn as_double(&self) -> Result<f64, InterpreterFault> {
        match self {
            Value::Double(v) => Ok(*v),
            other => Err(other.mismatch("double")),
        }
    }

    /// Reference payload; `Ok(None)` is the null reference.
    pub fn as_object(&self) -> Result<Option<&ObjRef>, InterpreterFault> {
        match self {
            Value::Object(r) => Ok(r.as_ref()),
            other => Err(other.mismatch("object")),
        }
    }

    /// Box a host value into its runtime tag.
    pub fn from_host(value: JValue) -> Self {
        match value {
            JValue::Void => Value::Object(None),
            JValue::Boolean(b) => Value::Int(b as i32),
            JValue::Byte(v) => Value::Int(v as i32),
            JValue::Char(v) => Value::Int(v as i32),
            JValue::Short(v) => Value::Int(v as i32),
            JValue::Int(v) => Value::Int(v),
            JValue::Long(v) => Value::Long(v),
            JValue::Float(v) => Value::Float(v),
            JValue::Double(v) => Value::Double(v),
            JValue::Ref(r) => Value::Object(r),
        }
    }

    /// Unbox into the host representation of the declared type `ty`.
    pub fn to_host(&self, ty: &JavaType) -> Result<JValue, InterpreterFault> {
        Ok(match ty {
            JavaType::Void => JValue::Void,
            JavaType::Boolean => JValue::Boolean(self.as_int()? & 1 != 0),
            JavaType::Byte => JValue::Byte(self.as_int()? as i8),
            JavaType::Char => JValue::Char(self.as_int()? as u16),
            JavaType::Short => JValue::Short(self.as_int()? as i16),
            JavaType::Int => JValue::Int(self.as_int()?),
            JavaType::Long => JValue::Long(self.as_long()?),
            JavaType::Float => JValue::Float(self.as_float()?),
            JavaType::Double => JValue::Double(self.as_double()?),
            JavaType::Reference(_) => JValue::Ref(self.as_object()?.cloned()),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Object(None), Value::Object(None)) => true,
            (Value::Object(Some(a)), Value::Object(Some(b))) => Arc::ptr_eq(a, b),
            (Value::Continuation, Value::Continuation) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Long(n) => write!(f, "Long({})", n),
            Value::Float(n) => write!(f, "Float({})", n),
            Value::Double(n) => write!(f, "Double({})", n),
            Value::Object(None) => write!(f, "null"),
            Value::Object(Some(r)) => write!(f, "Object({:?})", r),
            Value::Continuation => write!(f, "Continuation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_tags() {
        assert!(Value::Long(1).is_wide());
        assert!(Value::Double(1.0).is_wide());
        assert!(!Value::Int(1).is_wide());
        assert!(!Value::Float(1.0).is_wide());
        assert!(!Value::null().is_wide());
    }

    #[test]
    fn test_tag_mismatch_is_fault() {
        let err = Value::Float(1.0).as_int().unwrap_err();
        assert!(matches!(
            err,
            InterpreterFault::TypeMismatch {
                expected: "int",
                found: "float"
            }
        ));
    }

    #[test]
    fn test_unbox_per_declared_type() {
        let v = Value::Int(0x1_41);
        assert_eq!(v.to_host(&JavaType::Byte).unwrap(), JValue::Byte(0x41));
        assert_eq!(v.to_host(&JavaType::Char).unwrap(), JValue::Char(0x141));
        assert_eq!(v.to_host(&JavaType::Boolean).unwrap(), JValue::Boolean(true));
        assert!(Value::Int(1).to_host(&JavaType::Long).is_err());
    }

    #[test]
    fn test_box_sub_int_primitives() {
        assert_eq!(Value::from_host(JValue::Boolean(true)), Value::Int(1));
        assert_eq!(Value::from_host(JValue::Char(65)), Value::Int(65));
        assert_eq!(Value::from_host(JValue::Byte(-1)), Value::Int(-1));
    }
}
