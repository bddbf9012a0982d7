//! Java type names as the runtime sees them.
//!
//! Names follow `Class.getName()`: primitives are spelled out (`int`),
//! classes are dotted (`java.lang.String`) and arrays use descriptor form
//! (`[I`, `[Ljava.lang.String;`).

use std::fmt;

use super::object::JValue;

/// Separator between parameter type names in an encoded member descriptor.
pub const PARAM_DELIMITER: &str = "\u{1}\u{2}";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JavaType {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Class or array type, by binary name.
    Reference(String),
}

impl JavaType {
    /// Parse a `Class.getName()` style name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "void" => JavaType::Void,
            "boolean" => JavaType::Boolean,
            "byte" => JavaType::Byte,
            "char" => JavaType::Char,
            "short" => JavaType::Short,
            "int" => JavaType::Int,
            "long" => JavaType::Long,
            "float" => JavaType::Float,
            "double" => JavaType::Double,
            other => JavaType::Reference(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            JavaType::Void => "void",
            JavaType::Boolean => "boolean",
            JavaType::Byte => "byte",
            JavaType::Char => "char",
            JavaType::Short => "short",
            JavaType::Int => "int",
            JavaType::Long => "long",
            JavaType::Float => "float",
            JavaType::Double => "double",
            JavaType::Reference(name) => name,
        }
    }

    /// Number of local/stack slots a value of this type occupies.
    pub fn slot_size(&self) -> usize {
        match self {
            JavaType::Void => 0,
            JavaType::Long | JavaType::Double => 2,
            _ => 1,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.slot_size() == 2
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JavaType::Reference(_))
    }

    /// Descriptor character of a primitive type, used for array names.
    fn descriptor_char(&self) -> Option<char> {
        Some(match self {
            JavaType::Boolean => 'Z',
            JavaType::Byte => 'B',
            JavaType::Char => 'C',
            JavaType::Short => 'S',
            JavaType::Int => 'I',
            JavaType::Long => 'J',
            JavaType::Float => 'F',
            JavaType::Double => 'D',
            JavaType::Void | JavaType::Reference(_) => return None,
        })
    }

    /// The name of the one-dimensional array type with this element type.
    pub fn array_name(&self) -> String {
        if let Some(c) = self.descriptor_char() {
            return format!("[{}", c);
        }
        match self {
            JavaType::Reference(name) if name.starts_with('[') => format!("[{}", name),
            JavaType::Reference(name) => format!("[L{};", name),
            _ => "[V".to_string(),
        }
    }

    /// Element type of an array name (`[I` -> `int`), or `None` for non-arrays.
    pub fn component_of(array_name: &str) -> Option<JavaType> {
        let rest = array_name.strip_prefix('[')?;
        let ty = match rest {
            "Z" => JavaType::Boolean,
            "B" => JavaType::Byte,
            "C" => JavaType::Char,
            "S" => JavaType::Short,
            "I" => JavaType::Int,
            "J" => JavaType::Long,
            "F" => JavaType::Float,
            "D" => JavaType::Double,
            _ if rest.starts_with('[') => JavaType::Reference(rest.to_string()),
            _ => {
                let class = rest.strip_prefix('L')?.strip_suffix(';')?;
                JavaType::Reference(class.to_string())
            }
        };
        Some(ty)
    }

    /// The zero value fields and array elements of this type start with.
    pub fn default_value(&self) -> JValue {
        match self {
            JavaType::Void => JValue::Void,
            JavaType::Boolean => JValue::Boolean(false),
            JavaType::Byte => JValue::Byte(0),
            JavaType::Char => JValue::Char(0),
            JavaType::Short => JValue::Short(0),
            JavaType::Int => JValue::Int(0),
            JavaType::Long => JValue::Long(0),
            JavaType::Float => JValue::Float(0.0),
            JavaType::Double => JValue::Double(0.0),
            JavaType::Reference(_) => JValue::Ref(None),
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Join parameter types into the encoded descriptor form.
pub fn join_params(params: &[JavaType]) -> String {
    params
        .iter()
        .map(JavaType::name)
        .collect::<Vec<_>>()
        .join(PARAM_DELIMITER)
}

/// Split an encoded descriptor back into parameter types.
pub fn split_params(encoded: &str) -> Vec<JavaType> {
    if encoded.is_empty() {
        return Vec::new();
    }
    encoded.split(PARAM_DELIMITER).map(JavaType::from_name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_roundtrip() {
        let params = vec![
            JavaType::Int,
            JavaType::Reference("java.lang.String".to_string()),
            JavaType::Reference("[J".to_string()),
        ];
        let encoded = join_params(&params);
        assert_eq!(encoded, "int\u{1}\u{2}java.lang.String\u{1}\u{2}[J");
        assert_eq!(split_params(&encoded), params);
        assert!(split_params("").is_empty());
    }

    #[test]
    fn test_array_names() {
        assert_eq!(JavaType::Int.array_name(), "[I");
        assert_eq!(
            JavaType::Reference("java.lang.String".to_string()).array_name(),
            "[Ljava.lang.String;"
        );
        assert_eq!(JavaType::Reference("[I".to_string()).array_name(), "[[I");
        assert_eq!(JavaType::component_of("[D"), Some(JavaType::Double));
        assert_eq!(
            JavaType::component_of("[Ljava.lang.Object;"),
            Some(JavaType::Reference("java.lang.Object".to_string()))
        );
        assert_eq!(JavaType::component_of("java.lang.Object"), None);
    }

    #[test]
    fn test_slot_sizes() {
        assert_eq!(JavaType::Long.slot_size(), 2);
        assert_eq!(JavaType::Double.slot_size(), 2);
        assert_eq!(JavaType::Int.slot_size(), 1);
        assert_eq!(JavaType::Void.slot_size(), 0);
    }
}
