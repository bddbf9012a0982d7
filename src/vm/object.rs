//! Heap objects and host-side boxed values.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::types::JavaType;

/// Upper bound on the element storage of one array.
pub const MAX_ARRAY_BYTES: usize = 1 << 30;

/// A shared reference to a heap object. Identity is pointer identity.
pub type ObjRef = Arc<Object>;

/// A boxed value as it crosses the reflection boundary.
///
/// Unlike [`super::Value`], sub-int primitives keep their declared type here,
/// since reflective calls unbox per parameter type.
#[derive(Clone)]
pub enum JValue {
    Void,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Option<ObjRef>),
}

impl JValue {
    pub fn string(s: impl Into<String>) -> Self {
        JValue::Ref(Some(Object::string(s)))
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            JValue::Boolean(b) => Some(*b as i32),
            JValue::Byte(v) => Some(*v as i32),
            JValue::Char(v) => Some(*v as i32),
            JValue::Short(v) => Some(*v as i32),
            JValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            JValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            JValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Option<&ObjRef> {
        match self {
            JValue::Ref(Some(r)) => Some(r),
            _ => None,
        }
    }

    /// String contents when this is a non-null `java.lang.String`.
    pub fn as_str(&self) -> Option<&str> {
        self.as_ref().and_then(|r| r.as_str())
    }
}

impl PartialEq for JValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JValue::Void, JValue::Void) => true,
            (JValue::Boolean(a), JValue::Boolean(b)) => a == b,
            (JValue::Byte(a), JValue::Byte(b)) => a == b,
            (JValue::Char(a), JValue::Char(b)) => a == b,
            (JValue::Short(a), JValue::Short(b)) => a == b,
            (JValue::Int(a), JValue::Int(b)) => a == b,
            (JValue::Long(a), JValue::Long(b)) => a == b,
            (JValue::Float(a), JValue::Float(b)) => a == b,
            (JValue::Double(a), JValue::Double(b)) => a == b,
            (JValue::Ref(None), JValue::Ref(None)) => true,
            (JValue::Ref(Some(a)), JValue::Ref(Some(b))) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for JValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JValue::Void => write!(f, "Void"),
            JValue::Boolean(v) => write!(f, "Boolean({})", v),
            JValue::Byte(v) => write!(f, "Byte({})", v),
            JValue::Char(v) => write!(f, "Char({})", v),
            JValue::Short(v) => write!(f, "Short({})", v),
            JValue::Int(v) => write!(f, "Int({})", v),
            JValue::Long(v) => write!(f, "Long({})", v),
            JValue::Float(v) => write!(f, "Float({})", v),
            JValue::Double(v) => write!(f, "Double({})", v),
            JValue::Ref(None) => write!(f, "null"),
            JValue::Ref(Some(r)) => write!(f, "{:?}", r),
        }
    }
}

/// Array storage; the element type drives store-time conversion.
pub struct ArrayData {
    pub element: JavaType,
    pub elements: Mutex<Vec<JValue>>,
}

/// Instance field values by declaring class, then field name. A subclass
/// field that hides an inherited one gets its own slot.
pub type InstanceFields = HashMap<String, HashMap<String, JValue>>;

pub enum ObjectBody {
    /// Ordinary instance; fields are created lazily with their default value.
    Instance(Mutex<InstanceFields>),
    Str(String),
    Array(ArrayData),
    /// A `java.lang.Class` literal naming the given class.
    Class(String),
    /// Result of `NEW` before its constructor has run.
    Uninitialized,
}

pub struct Object {
    class_name: String,
    body: ObjectBody,
}

impl Object {
    pub fn new(class_name: impl Into<String>, body: ObjectBody) -> ObjRef {
        Arc::new(Object {
            class_name: class_name.into(),
            body,
        })
    }

    pub fn instance(class_name: impl Into<String>) -> ObjRef {
        Object::new(class_name, ObjectBody::Instance(Mutex::new(HashMap::new())))
    }

    pub fn string(s: impl Into<String>) -> ObjRef {
        Object::new("java.lang.String", ObjectBody::Str(s.into()))
    }

    /// A default-filled array, or `None` when its storage would exceed
    /// [`MAX_ARRAY_BYTES`] or cannot be reserved.
    pub fn array(element: JavaType, length: usize) -> Option<ObjRef> {
        let bytes = length.checked_mul(std::mem::size_of::<JValue>())?;
        if bytes > MAX_ARRAY_BYTES {
            return None;
        }
        let mut elements = Vec::new();
        elements.try_reserve_exact(length).ok()?;
        elements.resize(length, element.default_value());
        Some(Object::array_of(element, elements))
    }

    pub fn array_of(element: JavaType, elements: Vec<JValue>) -> ObjRef {
        Object::new(
            element.array_name(),
            ObjectBody::Array(ArrayData {
                element,
                elements: Mutex::new(elements),
            }),
        )
    }

    pub fn class_literal(name: impl Into<String>) -> ObjRef {
        Object::new("java.lang.Class", ObjectBody::Class(name.into()))
    }

    pub fn uninitialized(class_name: impl Into<String>) -> ObjRef {
        Object::new(class_name, ObjectBody::Uninitialized)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn body(&self) -> &ObjectBody {
        &self.body
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.body {
            ObjectBody::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayData> {
        match &self.body {
            ObjectBody::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self.body, ObjectBody::Uninitialized)
    }

    /// Read the field `name` declared by `declaring`, falling back to
    /// `default` when never written.
    pub fn get_field(&self, declaring: &str, name: &str, default: JValue) -> Option<JValue> {
        match &self.body {
            ObjectBody::Instance(fields) => {
                let value = fields
                    .lock()
                    .get(declaring)
                    .and_then(|slots| slots.get(name))
                    .cloned();
                Some(value.unwrap_or(default))
            }
            _ => None,
        }
    }

    /// Write an instance field. Returns `false` when this object has no fields.
    pub fn set_field(&self, declaring: &str, name: &str, value: JValue) -> bool {
        match &self.body {
            ObjectBody::Instance(fields) => {
                fields
                    .lock()
                    .entry(declaring.to_string())
                    .or_default()
                    .insert(name.to_string(), value);
                true
            }
            _ => false,
        }
    }

    /// Identity hash, stable for the object's lifetime.
    pub fn identity_hash(this: &ObjRef) -> i32 {
        let addr = Arc::as_ptr(this) as usize as u64;
        (addr ^ (addr >> 32)) as i32
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            ObjectBody::Str(s) => write!(f, "{:?}", s),
            ObjectBody::Class(name) => write!(f, "class {}", name),
            ObjectBody::Array(a) => write!(f, "{}[{}]", a.element, a.elements.lock().len()),
            ObjectBody::Uninitialized => write!(f, "<uninitialized {}>", self.class_name),
            ObjectBody::Instance(_) => write!(f, "<{}>", self.class_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_default_until_written() {
        let obj = Object::instance("com.example.Point");
        assert_eq!(obj.get_field("com.example.Point", "x", JValue::Int(0)), Some(JValue::Int(0)));
        assert!(obj.set_field("com.example.Point", "x", JValue::Int(7)));
        assert_eq!(obj.get_field("com.example.Point", "x", JValue::Int(0)), Some(JValue::Int(7)));
        assert!(!Object::string("s").set_field("java.lang.String", "x", JValue::Int(1)));
    }

    #[test]
    fn test_hidden_fields_keep_separate_slots() {
        let obj = Object::instance("com.example.B");
        assert!(obj.set_field("com.example.A", "x", JValue::Int(1)));
        assert!(obj.set_field("com.example.B", "x", JValue::Int(2)));
        assert_eq!(obj.get_field("com.example.A", "x", JValue::Int(0)), Some(JValue::Int(1)));
        assert_eq!(obj.get_field("com.example.B", "x", JValue::Int(0)), Some(JValue::Int(2)));
    }

    #[test]
    fn test_array_defaults_by_element_type() {
        let arr = Object::array(JavaType::Long, 3).unwrap();
        assert_eq!(arr.class_name(), "[J");
        let data = arr.as_array().unwrap();
        assert_eq!(*data.elements.lock(), vec![JValue::Long(0); 3]);

        assert!(Object::array(JavaType::Int, i32::MAX as usize).is_none());
        assert!(Object::array(JavaType::Int, usize::MAX).is_none());
    }

    #[test]
    fn test_ref_equality_is_identity() {
        let a = Object::string("x");
        let b = Object::string("x");
        assert_eq!(JValue::Ref(Some(a.clone())), JValue::Ref(Some(a)));
        assert_ne!(
            JValue::Ref(Some(b)),
            JValue::Ref(Some(Object::string("x")))
        );
    }
}
