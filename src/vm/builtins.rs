//! The `java.lang` classes every runtime starts with.
//!
//! Only the members virtualized code commonly reaches are provided; anything
//! else resolves to a reflective miss.

use super::classes::{ClassDef, ClassRegistry, Invocation};
use super::error::{THROWABLE, VmError, describe_throwable};
use super::object::{JValue, ObjRef, Object};

const SB: &str = "java.lang.StringBuilder";

const THROWABLES: &[(&str, &str)] = &[
    ("java.lang.Throwable", "java.lang.Object"),
    ("java.lang.Exception", "java.lang.Throwable"),
    ("java.lang.Error", "java.lang.Throwable"),
    ("java.lang.VirtualMachineError", "java.lang.Error"),
    ("java.lang.StackOverflowError", "java.lang.VirtualMachineError"),
    ("java.lang.OutOfMemoryError", "java.lang.VirtualMachineError"),
    ("java.lang.RuntimeException", "java.lang.Exception"),
    ("java.lang.ArithmeticException", "java.lang.RuntimeException"),
    ("java.lang.NullPointerException", "java.lang.RuntimeException"),
    ("java.lang.ClassCastException", "java.lang.RuntimeException"),
    ("java.lang.IllegalArgumentException", "java.lang.RuntimeException"),
    ("java.lang.NumberFormatException", "java.lang.IllegalArgumentException"),
    ("java.lang.IllegalStateException", "java.lang.RuntimeException"),
    ("java.lang.UnsupportedOperationException", "java.lang.RuntimeException"),
    ("java.lang.NegativeArraySizeException", "java.lang.RuntimeException"),
    ("java.lang.ArrayStoreException", "java.lang.RuntimeException"),
    ("java.lang.IndexOutOfBoundsException", "java.lang.RuntimeException"),
    ("java.lang.ArrayIndexOutOfBoundsException", "java.lang.IndexOutOfBoundsException"),
    ("java.lang.StringIndexOutOfBoundsException", "java.lang.IndexOutOfBoundsException"),
];

pub(super) fn install(registry: &ClassRegistry) {
    for iface in ["java.io.Serializable", "java.lang.CharSequence", "java.lang.Comparable"] {
        registry.define(ClassDef::new(iface).abstract_class());
    }
    registry.define(object_class());
    registry.define(string_class());
    registry.define(string_builder_class());
    registry.define(math_class());
    registry.define(integer_class());
    for (name, parent) in THROWABLES {
        registry.define(throwable_class(name, parent));
    }
}

fn object_class() -> ClassDef {
    let mut class = ClassDef::new("java.lang.Object")
        .constructor(&[], |_| Ok(JValue::Void))
        .method("hashCode", &[], "int", |inv| {
            Ok(JValue::Int(Object::identity_hash(inv.this()?)))
        })
        .method("equals", &["java.lang.Object"], "boolean", |inv| {
            let this = inv.this()?;
            let same = inv.arg(0).as_ref().is_some_and(|o| ObjRef::ptr_eq(o, this));
            Ok(JValue::Boolean(same))
        })
        .method("toString", &[], "java.lang.String", |inv| {
            let this = inv.this()?;
            let text = format!("{}@{:x}", this.class_name(), Object::identity_hash(this));
            Ok(JValue::string(text))
        });
    class.super_name = None;
    class
}

fn this_str<'a>(inv: &'a Invocation<'_>) -> Result<&'a str, VmError> {
    let this = inv.this()?;
    this.as_str()
        .ok_or_else(|| inv.throw("java.lang.ClassCastException", Some(this.class_name())))
}

fn utf16_len(s: &str) -> i32 {
    s.encode_utf16().count() as i32
}

fn string_class() -> ClassDef {
    ClassDef::new("java.lang.String")
        .implements("java.io.Serializable")
        .implements("java.lang.CharSequence")
        .implements("java.lang.Comparable")
        .method("length", &[], "int", |inv| Ok(JValue::Int(utf16_len(this_str(inv)?))))
        .method("isEmpty", &[], "boolean", |inv| {
            Ok(JValue::Boolean(this_str(inv)?.is_empty()))
        })
        .method("charAt", &["int"], "char", |inv| {
            let s = this_str(inv)?;
            let index = inv.int(0);
            let unit = usize::try_from(index)
                .ok()
                .and_then(|i| s.encode_utf16().nth(i));
            match unit {
                Some(c) => Ok(JValue::Char(c)),
                None => {
                    let msg = format!("Index {} out of bounds for length {}", index, utf16_len(s));
                    Err(inv.throw("java.lang.StringIndexOutOfBoundsException", Some(&msg)))
                }
            }
        })
        .method("concat", &["java.lang.String"], "java.lang.String", |inv| {
            let s = this_str(inv)?;
            let Some(other) = inv.arg(0).as_str() else {
                return Err(inv.throw("java.lang.NullPointerException", None));
            };
            Ok(JValue::string(format!("{}{}", s, other)))
        })
        .method("equals", &["java.lang.Object"], "boolean", |inv| {
            let s = this_str(inv)?;
            Ok(JValue::Boolean(inv.arg(0).as_str() == Some(s)))
        })
        .method("hashCode", &[], "int", |inv| {
            let hash = this_str(inv)?
                .encode_utf16()
                .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32));
            Ok(JValue::Int(hash))
        })
        .method("toString", &[], "java.lang.String", |inv| {
            Ok(JValue::Ref(Some(inv.this()?.clone())))
        })
        .static_method("valueOf", &["int"], "java.lang.String", |inv| {
            Ok(JValue::string(inv.int(0).to_string()))
        })
}

fn builder_contents(inv: &Invocation<'_>) -> Result<String, VmError> {
    let this = inv.this()?;
    let value = this.get_field(SB, "value", JValue::Ref(None)).unwrap_or(JValue::Void);
    Ok(value.as_str().unwrap_or_default().to_string())
}

fn builder_append(inv: &Invocation<'_>, text: &str) -> Result<JValue, VmError> {
    let mut contents = builder_contents(inv)?;
    contents.push_str(text);
    let this = inv.this()?;
    this.set_field(SB, "value", JValue::string(contents));
    Ok(JValue::Ref(Some(this.clone())))
}

fn string_builder_class() -> ClassDef {
    ClassDef::new(SB)
        .implements("java.lang.CharSequence")
        .field("value", "java.lang.String")
        .constructor(&[], |inv| {
            inv.this()?.set_field(SB, "value", JValue::string(""));
            Ok(JValue::Void)
        })
        .constructor(&["java.lang.String"], |inv| {
            let Some(initial) = inv.arg(0).as_str() else {
                return Err(inv.throw("java.lang.NullPointerException", None));
            };
            inv.this()?.set_field(SB, "value", JValue::string(initial));
            Ok(JValue::Void)
        })
        .method("append", &["java.lang.String"], SB, |inv| {
            let text = inv.arg(0).as_str().unwrap_or("null").to_string();
            builder_append(inv, &text)
        })
        .method("append", &["int"], SB, |inv| {
            builder_append(inv, &inv.int(0).to_string())
        })
        .method("append", &["long"], SB, |inv| {
            builder_append(inv, &inv.long(0).to_string())
        })
        .method("append", &["char"], SB, |inv| {
            let unit = inv.int(0) as u16;
            let text = char::decode_utf16([unit])
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect::<String>();
            builder_append(inv, &text)
        })
        .method("append", &["boolean"], SB, |inv| {
            builder_append(inv, if inv.int(0) != 0 { "true" } else { "false" })
        })
        .method("length", &[], "int", |inv| Ok(JValue::Int(utf16_len(&builder_contents(inv)?))))
        .method("toString", &[], "java.lang.String", |inv| {
            Ok(JValue::string(builder_contents(inv)?))
        })
}

fn java_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == 0.0 && b == 0.0 {
        if a.is_sign_negative() { b } else { a }
    } else {
        a.max(b)
    }
}

fn java_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == 0.0 && b == 0.0 {
        if a.is_sign_negative() { a } else { b }
    } else {
        a.min(b)
    }
}

fn math_class() -> ClassDef {
    ClassDef::new("java.lang.Math")
        .static_method("max", &["int", "int"], "int", |inv| Ok(JValue::Int(inv.int(0).max(inv.int(1)))))
        .static_method("min", &["int", "int"], "int", |inv| Ok(JValue::Int(inv.int(0).min(inv.int(1)))))
        .static_method("max", &["long", "long"], "long", |inv| {
            Ok(JValue::Long(inv.long(0).max(inv.long(1))))
        })
        .static_method("min", &["long", "long"], "long", |inv| {
            Ok(JValue::Long(inv.long(0).min(inv.long(1))))
        })
        .static_method("max", &["double", "double"], "double", |inv| {
            Ok(JValue::Double(java_max(inv.double(0), inv.double(1))))
        })
        .static_method("min", &["double", "double"], "double", |inv| {
            Ok(JValue::Double(java_min(inv.double(0), inv.double(1))))
        })
        .static_method("abs", &["int"], "int", |inv| Ok(JValue::Int(inv.int(0).wrapping_abs())))
        .static_method("abs", &["long"], "long", |inv| Ok(JValue::Long(inv.long(0).wrapping_abs())))
        .static_method("abs", &["double"], "double", |inv| Ok(JValue::Double(inv.double(0).abs())))
        .static_method("sqrt", &["double"], "double", |inv| Ok(JValue::Double(inv.double(0).sqrt())))
        .static_method("pow", &["double", "double"], "double", |inv| {
            Ok(JValue::Double(inv.double(0).powf(inv.double(1))))
        })
}

fn integer_class() -> ClassDef {
    ClassDef::new("java.lang.Integer")
        .static_field("MAX_VALUE", "int", JValue::Int(i32::MAX))
        .static_field("MIN_VALUE", "int", JValue::Int(i32::MIN))
        .static_method("parseInt", &["java.lang.String"], "int", |inv| {
            let Some(s) = inv.arg(0).as_str() else {
                let msg = "Cannot parse null string: null";
                return Err(inv.throw("java.lang.NumberFormatException", Some(msg)));
            };
            s.parse::<i32>().map(JValue::Int).map_err(|_| {
                let msg = format!("For input string: \"{}\"", s);
                inv.throw("java.lang.NumberFormatException", Some(&msg))
            })
        })
        .static_method("toString", &["int"], "java.lang.String", |inv| {
            Ok(JValue::string(inv.int(0).to_string()))
        })
}

fn throwable_class(name: &str, parent: &str) -> ClassDef {
    let class = ClassDef::new(name)
        .extends(parent)
        .constructor(&[], |inv| {
            inv.this()?.set_field(THROWABLE, "detailMessage", JValue::Ref(None));
            Ok(JValue::Void)
        })
        .constructor(&["java.lang.String"], |inv| {
            inv.this()?.set_field(THROWABLE, "detailMessage", inv.arg(0).clone());
            Ok(JValue::Void)
        });
    if name != THROWABLE {
        return class;
    }
    class
        .implements("java.io.Serializable")
        .field("detailMessage", "java.lang.String")
        .method("getMessage", &[], "java.lang.String", |inv| {
            let message = inv.this()?.get_field(THROWABLE, "detailMessage", JValue::Ref(None));
            Ok(message.unwrap_or(JValue::Ref(None)))
        })
        .method("toString", &[], "java.lang.String", |inv| {
            Ok(JValue::string(describe_throwable(inv.this()?)))
        })
}
