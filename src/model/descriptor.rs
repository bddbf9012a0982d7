//! JVM type descriptors and internal names.
//!
//! The class model speaks internal form (`java/lang/String`,
//! `(ILjava/lang/String;)V`); the runtime speaks `Class.getName()` form.
//! Everything crossing between the two goes through here.

use crate::vm::JavaType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed descriptor {0:?}")]
pub struct DescriptorError(pub String);

/// `java/lang/String` -> `java.lang.String`; array names keep their
/// descriptor shape (`[Ljava/lang/String;` -> `[Ljava.lang.String;`).
pub fn binary_name(internal: &str) -> String {
    internal.replace('/', ".")
}

/// `java.lang.String` -> `java/lang/String`.
pub fn internal_name(binary: &str) -> String {
    binary.replace('.', "/")
}

/// Parse one field descriptor starting at `pos`, returning the type and the
/// position after it.
fn parse_at(desc: &str, pos: usize) -> Result<(JavaType, usize), DescriptorError> {
    let bytes = desc.as_bytes();
    let malformed = || DescriptorError(desc.to_string());
    let ty = match bytes.get(pos).ok_or_else(malformed)? {
        b'V' => JavaType::Void,
        b'Z' => JavaType::Boolean,
        b'B' => JavaType::Byte,
        b'C' => JavaType::Char,
        b'S' => JavaType::Short,
        b'I' => JavaType::Int,
        b'J' => JavaType::Long,
        b'F' => JavaType::Float,
        b'D' => JavaType::Double,
        b'L' => {
            let end = desc[pos..].find(';').ok_or_else(malformed)? + pos;
            if end == pos + 1 {
                return Err(malformed());
            }
            let name = binary_name(&desc[pos + 1..end]);
            return Ok((JavaType::Reference(name), end + 1));
        }
        b'[' => {
            let mut dims = pos;
            while bytes.get(dims) == Some(&b'[') {
                dims += 1;
            }
            let (element, end) = parse_at(desc, dims)?;
            if element == JavaType::Void {
                return Err(malformed());
            }
            let name = binary_name(&desc[pos..end]);
            return Ok((JavaType::Reference(name), end));
        }
        _ => return Err(malformed()),
    };
    Ok((ty, pos + 1))
}

pub fn parse_field(desc: &str) -> Result<JavaType, DescriptorError> {
    let (ty, end) = parse_at(desc, 0)?;
    if end != desc.len() || ty == JavaType::Void {
        return Err(DescriptorError(desc.to_string()));
    }
    Ok(ty)
}

/// Parse `(params)ret` into parameter types and the return type.
pub fn parse_method(desc: &str) -> Result<(Vec<JavaType>, JavaType), DescriptorError> {
    let malformed = || DescriptorError(desc.to_string());
    if !desc.starts_with('(') {
        return Err(malformed());
    }
    let mut params = Vec::new();
    let mut pos = 1;
    while desc.as_bytes().get(pos) != Some(&b')') {
        let (ty, next) = parse_at(desc, pos)?;
        if ty == JavaType::Void {
            return Err(malformed());
        }
        params.push(ty);
        pos = next;
    }
    let (ret, end) = parse_at(desc, pos + 1)?;
    if end != desc.len() {
        return Err(malformed());
    }
    Ok((params, ret))
}

/// Descriptor of a runtime type name (`int` -> `I`, `java.lang.String` ->
/// `Ljava/lang/String;`).
pub fn descriptor_of(ty: &JavaType) -> String {
    match ty {
        JavaType::Void => "V".to_string(),
        JavaType::Boolean => "Z".to_string(),
        JavaType::Byte => "B".to_string(),
        JavaType::Char => "C".to_string(),
        JavaType::Short => "S".to_string(),
        JavaType::Int => "I".to_string(),
        JavaType::Long => "J".to_string(),
        JavaType::Float => "F".to_string(),
        JavaType::Double => "D".to_string(),
        JavaType::Reference(name) if name.starts_with('[') => internal_name(name),
        JavaType::Reference(name) => format!("L{};", internal_name(name)),
    }
}

/// Internal name usable as a `checkcast` operand for a reference type.
pub fn cast_target(ty: &JavaType) -> Option<String> {
    match ty {
        JavaType::Reference(name) => Some(internal_name(name)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str) -> JavaType {
        JavaType::Reference(name.to_string())
    }

    #[test]
    fn test_method_descriptor() {
        let (params, ret) = parse_method("(IJLjava/lang/String;[[DZ)V").unwrap();
        assert_eq!(
            params,
            vec![
                JavaType::Int,
                JavaType::Long,
                reference("java.lang.String"),
                reference("[[D"),
                JavaType::Boolean,
            ]
        );
        assert_eq!(ret, JavaType::Void);

        let (params, ret) = parse_method("()[Ljava/lang/Object;").unwrap();
        assert!(params.is_empty());
        assert_eq!(ret, reference("[Ljava.lang.Object;"));
    }

    #[test]
    fn test_malformed_descriptors() {
        for bad in ["", "I", "(I", "(V)V", "(I)", "(Ljava/lang/String)V", "(L;)V", "(I)VV", "([V)V"] {
            assert!(parse_method(bad).is_err(), "{:?} should be rejected", bad);
        }
        assert!(parse_field("V").is_err());
        assert!(parse_field("II").is_err());
    }

    #[test]
    fn test_descriptor_roundtrip() {
        for desc in ["I", "J", "Ljava/lang/String;", "[I", "[[Ljava/lang/Object;"] {
            assert_eq!(descriptor_of(&parse_field(desc).unwrap()), desc);
        }
    }
}
