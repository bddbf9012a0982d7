//! Host class definitions and the registry the reflective layer resolves
//! against.
//!
//! Classes are described once, up front, with native closures for their
//! methods and constructors. The registry also owns the interned string and
//! class-literal pools.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::error::{THROWABLE, VmError};
use super::object::{JValue, ObjRef, Object};
use super::runtime::Runtime;
use super::types::JavaType;

/// Native body of a method or constructor.
pub type NativeFn = Arc<dyn Fn(&Invocation<'_>) -> Result<JValue, VmError> + Send + Sync>;

/// Arguments of one native call.
pub struct Invocation<'a> {
    pub runtime: &'a Runtime,
    pub this: Option<ObjRef>,
    pub args: Vec<JValue>,
}

impl Invocation<'_> {
    pub fn arg(&self, index: usize) -> &JValue {
        self.args.get(index).unwrap_or(&JValue::Void)
    }

    pub fn int(&self, index: usize) -> i32 {
        self.arg(index).as_int().unwrap_or_default()
    }

    pub fn long(&self, index: usize) -> i64 {
        self.arg(index).as_long().unwrap_or_default()
    }

    pub fn double(&self, index: usize) -> f64 {
        self.arg(index).as_double().unwrap_or_default()
    }

    /// The receiver. Reflective dispatch never calls an instance method
    /// without one, so a missing receiver is reported as a null dereference.
    pub fn this(&self) -> Result<&ObjRef, VmError> {
        self.this
            .as_ref()
            .ok_or_else(|| self.throw("java.lang.NullPointerException", None))
    }

    pub fn throw(&self, class: &str, message: Option<&str>) -> VmError {
        VmError::Thrown(self.runtime.classes().new_throwable(class, message))
    }
}

pub struct MethodDef {
    pub name: String,
    pub params: Vec<JavaType>,
    pub ret: JavaType,
    pub is_static: bool,
    pub body: NativeFn,
}

pub struct FieldDef {
    pub name: String,
    pub ty: JavaType,
    pub is_static: bool,
}

pub struct ConstructorDef {
    pub params: Vec<JavaType>,
    /// Runs with `this` bound to the freshly allocated instance.
    pub body: NativeFn,
}

pub struct ClassDef {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub is_abstract: bool,
    pub fields: Vec<Arc<FieldDef>>,
    pub methods: Vec<Arc<MethodDef>>,
    pub constructors: Vec<Arc<ConstructorDef>>,
    statics: Mutex<HashMap<String, JValue>>,
}

fn types(names: &[&str]) -> Vec<JavaType> {
    names.iter().map(|n| JavaType::from_name(n)).collect()
}

impl ClassDef {
    /// A new class extending `java.lang.Object`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: Some("java.lang.Object".to_string()),
            interfaces: Vec::new(),
            is_abstract: false,
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            statics: Mutex::new(HashMap::new()),
        }
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn field(mut self, name: &str, ty: &str) -> Self {
        self.fields.push(Arc::new(FieldDef {
            name: name.to_string(),
            ty: JavaType::from_name(ty),
            is_static: false,
        }));
        self
    }

    pub fn static_field(mut self, name: &str, ty: &str, initial: JValue) -> Self {
        self.fields.push(Arc::new(FieldDef {
            name: name.to_string(),
            ty: JavaType::from_name(ty),
            is_static: true,
        }));
        self.statics.lock().insert(name.to_string(), initial);
        self
    }

    pub fn method<F>(mut self, name: &str, params: &[&str], ret: &str, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<JValue, VmError> + Send + Sync + 'static,
    {
        self.methods.push(Arc::new(MethodDef {
            name: name.to_string(),
            params: types(params),
            ret: JavaType::from_name(ret),
            is_static: false,
            body: Arc::new(body),
        }));
        self
    }

    pub fn static_method<F>(mut self, name: &str, params: &[&str], ret: &str, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<JValue, VmError> + Send + Sync + 'static,
    {
        self.methods.push(Arc::new(MethodDef {
            name: name.to_string(),
            params: types(params),
            ret: JavaType::from_name(ret),
            is_static: true,
            body: Arc::new(body),
        }));
        self
    }

    pub fn constructor<F>(mut self, params: &[&str], body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<JValue, VmError> + Send + Sync + 'static,
    {
        self.constructors.push(Arc::new(ConstructorDef {
            params: types(params),
            body: Arc::new(body),
        }));
        self
    }

    pub fn get_static(&self, field: &FieldDef) -> JValue {
        self.statics
            .lock()
            .get(&field.name)
            .cloned()
            .unwrap_or_else(|| field.ty.default_value())
    }

    pub fn set_static(&self, field: &FieldDef, value: JValue) {
        self.statics.lock().insert(field.name.clone(), value);
    }
}

/// All classes visible to virtualized code.
#[derive(Default)]
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, Arc<ClassDef>>>,
    strings: RwLock<HashMap<String, ObjRef>>,
    class_literals: RwLock<HashMap<String, ObjRef>>,
}

impl ClassRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the `java.lang` classes the runtime needs.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        super::builtins::install(&registry);
        registry
    }

    pub fn define(&self, class: ClassDef) -> Arc<ClassDef> {
        let class = Arc::new(class);
        self.classes
            .write()
            .insert(class.name.clone(), class.clone());
        class
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes.read().get(name).cloned()
    }

    /// Whether a value of class `from` can be stored where `to` is expected.
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to || to == "java.lang.Object" {
            return true;
        }
        if let Some(from_component) = JavaType::component_of(from) {
            if matches!(to, "java.lang.Cloneable" | "java.io.Serializable") {
                return true;
            }
            return match (from_component, JavaType::component_of(to)) {
                (JavaType::Reference(f), Some(JavaType::Reference(t))) => self.is_assignable(&f, &t),
                _ => false,
            };
        }
        let Some(class) = self.get(from) else {
            return false;
        };
        if class.interfaces.iter().any(|i| self.is_assignable(i, to)) {
            return true;
        }
        match &class.super_name {
            Some(parent) => self.is_assignable(parent, to),
            None => false,
        }
    }

    /// Allocate a throwable without running a constructor.
    pub fn new_throwable(&self, class: &str, message: Option<&str>) -> ObjRef {
        let obj = Object::instance(class);
        let message = message.map(|m| JValue::Ref(Some(self.intern(m))));
        obj.set_field(THROWABLE, "detailMessage", message.unwrap_or(JValue::Ref(None)));
        obj
    }

    /// The canonical string object for a literal.
    pub fn intern(&self, s: &str) -> ObjRef {
        if let Some(hit) = self.strings.read().get(s) {
            return hit.clone();
        }
        self.strings
            .write()
            .entry(s.to_string())
            .or_insert_with(|| Object::string(s))
            .clone()
    }

    /// The canonical `java.lang.Class` object for a class name.
    pub fn class_literal(&self, name: &str) -> ObjRef {
        if let Some(hit) = self.class_literals.read().get(name) {
            return hit.clone();
        }
        self.class_literals
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Object::class_literal(name))
            .clone()
    }
}
