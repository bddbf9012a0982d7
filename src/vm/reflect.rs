//! Reflective member resolution with a shared cache.
//!
//! Lookups are keyed by (owner, name, descriptor). A miss resolves against
//! the [`ClassRegistry`] and inserts the handle; two threads racing on the
//! same key may both resolve, and whichever insert lands first wins. Both
//! results are equivalent, so nothing else is needed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::classes::{ClassDef, ClassRegistry, ConstructorDef, FieldDef, Invocation, MethodDef};
use super::error::{InterpreterFault, VmError, describe_throwable};
use super::object::{JValue, ObjRef, Object};
use super::runtime::Runtime;
use super::types::{JavaType, PARAM_DELIMITER, join_params};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReflectError {
    #[error("class not found: {0}")]
    NoSuchClass(String),

    #[error("no method {owner}.{name}({})", .params.replace(PARAM_DELIMITER, ", "))]
    NoSuchMethod {
        owner: String,
        name: String,
        params: String,
    },

    #[error("no field {owner}.{name}")]
    NoSuchField { owner: String, name: String },

    #[error("no constructor {owner}({})", .params.replace(PARAM_DELIMITER, ", "))]
    NoSuchConstructor { owner: String, params: String },

    #[error("cannot instantiate abstract class {0}")]
    Instantiation(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// The target itself threw; the throwable propagates unchanged.
    #[error("invocation target threw {}", describe_throwable(.0))]
    InvocationTarget(ObjRef),

    #[error(transparent)]
    Fault(InterpreterFault),
}

impl From<ReflectError> for VmError {
    fn from(err: ReflectError) -> Self {
        match err {
            ReflectError::InvocationTarget(obj) => VmError::Thrown(obj),
            ReflectError::Fault(fault) => VmError::Fault(fault),
            other => VmError::Fault(InterpreterFault::Resolution(other.to_string())),
        }
    }
}

impl From<VmError> for ReflectError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::Thrown(obj) => ReflectError::InvocationTarget(obj),
            VmError::Fault(fault) => ReflectError::Fault(fault),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberKey {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

pub struct MethodHandle {
    pub declaring: Arc<ClassDef>,
    pub method: Arc<MethodDef>,
}

pub struct FieldHandle {
    pub declaring: Arc<ClassDef>,
    pub field: Arc<FieldDef>,
}

pub struct ConstructorHandle {
    pub class: Arc<ClassDef>,
    /// `None` for the implicit no-argument constructor.
    pub constructor: Option<Arc<ConstructorDef>>,
}

fn check_arity(expected: &[JavaType], args: &[JValue]) -> Result<(), ReflectError> {
    if expected.len() != args.len() {
        return Err(ReflectError::IllegalArgument(format!(
            "wrong number of arguments: expected {}, got {}",
            expected.len(),
            args.len()
        )));
    }
    Ok(())
}

impl MethodHandle {
    pub fn params(&self) -> &[JavaType] {
        &self.method.params
    }

    pub fn return_type(&self) -> &JavaType {
        &self.method.ret
    }

    pub fn is_static(&self) -> bool {
        self.method.is_static
    }

    /// Invoke the method. Instance calls dispatch on the receiver's runtime
    /// class unless `exact` is set.
    pub fn invoke(
        &self,
        runtime: &Runtime,
        receiver: Option<ObjRef>,
        args: Vec<JValue>,
        exact: bool,
    ) -> Result<JValue, ReflectError> {
        check_arity(&self.method.params, &args)?;
        let target = match &receiver {
            Some(obj) if !self.method.is_static && !exact => self.dispatch(runtime, obj),
            None if !self.method.is_static => {
                return Err(ReflectError::IllegalArgument(format!(
                    "instance method {} invoked without a receiver",
                    self.method.name
                )));
            }
            _ => self.method.clone(),
        };
        let invocation = Invocation {
            runtime,
            this: if target.is_static { None } else { receiver },
            args,
        };
        Ok((target.body)(&invocation)?)
    }

    /// The most specific override for the receiver's class.
    fn dispatch(&self, runtime: &Runtime, receiver: &ObjRef) -> Arc<MethodDef> {
        let class = receiver.class_name();
        if class == self.declaring.name {
            return self.method.clone();
        }
        let params = join_params(&self.method.params);
        match runtime
            .reflect()
            .method(runtime.classes(), class, &self.method.name, &params)
        {
            Ok(handle) if !handle.method.is_static => handle.method.clone(),
            _ => self.method.clone(),
        }
    }
}

impl FieldHandle {
    pub fn get(&self, receiver: Option<&ObjRef>) -> Result<JValue, ReflectError> {
        if self.field.is_static {
            return Ok(self.declaring.get_static(&self.field));
        }
        let obj = self.receiver(receiver)?;
        obj.get_field(&self.declaring.name, &self.field.name, self.field.ty.default_value())
            .ok_or_else(|| self.not_an_instance(obj))
    }

    pub fn set(&self, receiver: Option<&ObjRef>, value: JValue) -> Result<(), ReflectError> {
        if self.field.is_static {
            self.declaring.set_static(&self.field, value);
            return Ok(());
        }
        let obj = self.receiver(receiver)?;
        if obj.set_field(&self.declaring.name, &self.field.name, value) {
            Ok(())
        } else {
            Err(self.not_an_instance(obj))
        }
    }

    fn receiver<'a>(&self, receiver: Option<&'a ObjRef>) -> Result<&'a ObjRef, ReflectError> {
        receiver.ok_or_else(|| {
            ReflectError::IllegalArgument(format!(
                "instance field {} accessed without a receiver",
                self.field.name
            ))
        })
    }

    fn not_an_instance(&self, obj: &ObjRef) -> ReflectError {
        ReflectError::IllegalArgument(format!(
            "{} has no field {}",
            obj.class_name(),
            self.field.name
        ))
    }
}

impl ConstructorHandle {
    pub fn params(&self) -> &[JavaType] {
        self.constructor.as_ref().map_or(&[], |c| &c.params)
    }

    /// Allocate an instance and run the constructor on it.
    pub fn new_instance(&self, runtime: &Runtime, args: Vec<JValue>) -> Result<ObjRef, ReflectError> {
        if self.class.is_abstract {
            return Err(ReflectError::Instantiation(self.class.name.clone()));
        }
        check_arity(self.params(), &args)?;
        let obj = Object::instance(self.class.name.as_str());
        if let Some(ctor) = &self.constructor {
            let invocation = Invocation {
                runtime,
                this: Some(obj.clone()),
                args,
            };
            (ctor.body)(&invocation)?;
        }
        Ok(obj)
    }
}

type Memo<V> = RwLock<HashMap<MemberKey, Arc<V>>>;

fn memoize<V>(
    map: &Memo<V>,
    key: MemberKey,
    resolve: impl FnOnce(&MemberKey) -> Result<V, ReflectError>,
) -> Result<Arc<V>, ReflectError> {
    if let Some(hit) = map.read().get(&key) {
        return Ok(hit.clone());
    }
    let value = Arc::new(resolve(&key)?);
    trace!(owner = %key.owner, name = %key.name, "reflective lookup cached");
    Ok(map.write().entry(key).or_insert(value).clone())
}

/// Memoized member handles, shared by every interpreter on a runtime.
#[derive(Default)]
pub struct ReflectCache {
    methods: Memo<MethodHandle>,
    fields: Memo<FieldHandle>,
    constructors: Memo<ConstructorHandle>,
}

impl ReflectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `owner.name(params)`, searching superclasses and then
    /// interfaces.
    pub fn method(
        &self,
        classes: &ClassRegistry,
        owner: &str,
        name: &str,
        params: &str,
    ) -> Result<Arc<MethodHandle>, ReflectError> {
        memoize(&self.methods, MemberKey::new(owner, name, params), |key| {
            let class = class(classes, &key.owner)?;
            find_method(classes, &class, name, params).ok_or_else(|| ReflectError::NoSuchMethod {
                owner: key.owner.clone(),
                name: key.name.clone(),
                params: key.descriptor.clone(),
            })
        })
    }

    /// Resolve the field `name` of type `ty` on `owner` or its superclasses.
    /// An empty `ty` matches any type.
    pub fn field(
        &self,
        classes: &ClassRegistry,
        owner: &str,
        name: &str,
        ty: &str,
    ) -> Result<Arc<FieldHandle>, ReflectError> {
        memoize(&self.fields, MemberKey::new(owner, name, ty), |key| {
            let matches = |f: &&Arc<FieldDef>| {
                f.name == key.name && (key.descriptor.is_empty() || f.ty.name() == key.descriptor)
            };
            let mut current = Some(class(classes, &key.owner)?);
            while let Some(class) = current {
                if let Some(field) = class.fields.iter().find(matches) {
                    return Ok(FieldHandle {
                        declaring: class.clone(),
                        field: field.clone(),
                    });
                }
                current = class.super_name.as_deref().and_then(|s| classes.get(s));
            }
            Err(ReflectError::NoSuchField {
                owner: key.owner.clone(),
                name: key.name.clone(),
            })
        })
    }

    pub fn constructor(
        &self,
        classes: &ClassRegistry,
        owner: &str,
        params: &str,
    ) -> Result<Arc<ConstructorHandle>, ReflectError> {
        memoize(&self.constructors, MemberKey::new(owner, "<init>", params), |key| {
            let class = class(classes, &key.owner)?;
            let found = class
                .constructors
                .iter()
                .find(|c| join_params(&c.params) == key.descriptor)
                .cloned();
            match found {
                Some(ctor) => Ok(ConstructorHandle {
                    class,
                    constructor: Some(ctor),
                }),
                None if key.descriptor.is_empty() && class.constructors.is_empty() => {
                    Ok(ConstructorHandle {
                        class,
                        constructor: None,
                    })
                }
                None => Err(ReflectError::NoSuchConstructor {
                    owner: key.owner.clone(),
                    params: key.descriptor.clone(),
                }),
            }
        })
    }

    /// Number of cached method handles.
    pub fn method_count(&self) -> usize {
        self.methods.read().len()
    }

    /// Number of cached field handles.
    pub fn field_count(&self) -> usize {
        self.fields.read().len()
    }
}

fn class(classes: &ClassRegistry, name: &str) -> Result<Arc<ClassDef>, ReflectError> {
    classes
        .get(name)
        .ok_or_else(|| ReflectError::NoSuchClass(name.to_string()))
}

fn find_method(
    classes: &ClassRegistry,
    start: &Arc<ClassDef>,
    name: &str,
    params: &str,
) -> Option<MethodHandle> {
    let matches = |m: &&Arc<MethodDef>| m.name == name && join_params(&m.params) == params;

    let mut current = Some(start.clone());
    let mut interfaces = Vec::new();
    while let Some(class) = current {
        if let Some(method) = class.methods.iter().find(matches) {
            return Some(MethodHandle {
                declaring: class.clone(),
                method: method.clone(),
            });
        }
        interfaces.extend(class.interfaces.iter().cloned());
        current = class.super_name.as_deref().and_then(|s| classes.get(s));
    }

    while let Some(iface) = interfaces.pop() {
        let Some(class) = classes.get(&iface) else {
            continue;
        };
        if let Some(method) = class.methods.iter().find(matches) {
            return Some(MethodHandle {
                declaring: class.clone(),
                method: method.clone(),
            });
        }
        interfaces.extend(class.interfaces.iter().cloned());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::loader::StubLoader;
    use crate::vm::types::join_params;

    fn runtime() -> Runtime {
        let runtime = Runtime::new(StubLoader::empty());
        runtime.classes().define(
            ClassDef::new("com.example.Animal")
                .method("sound", &[], "java.lang.String", |_| Ok(JValue::string("...")))
                .method("legs", &[], "int", |_| Ok(JValue::Int(4))),
        );
        runtime.classes().define(
            ClassDef::new("com.example.Bird")
                .extends("com.example.Animal")
                .method("sound", &[], "java.lang.String", |_| Ok(JValue::string("tweet")))
                .method("legs", &[], "int", |_| Ok(JValue::Int(2))),
        );
        runtime
    }

    #[test]
    fn test_cache_hit_returns_same_handle() {
        let rt = runtime();
        let params = join_params(&[JavaType::Int, JavaType::Int]);
        let a = rt.reflect().method(rt.classes(), "java.lang.Math", "max", &params).unwrap();
        let b = rt.reflect().method(rt.classes(), "java.lang.Math", "max", &params).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(rt.reflect().method_count(), 1);
    }

    #[test]
    fn test_overloads_resolve_by_params() {
        let rt = runtime();
        let long = join_params(&[JavaType::Long, JavaType::Long]);
        let handle = rt.reflect().method(rt.classes(), "java.lang.Math", "max", &long).unwrap();
        let result = handle
            .invoke(&rt, None, vec![JValue::Long(-3), JValue::Long(9)], false)
            .unwrap();
        assert_eq!(result, JValue::Long(9));
    }

    #[test]
    fn test_virtual_dispatch_and_exact() {
        let rt = runtime();
        let handle = rt.reflect().method(rt.classes(), "com.example.Animal", "legs", "").unwrap();
        let bird = Object::instance("com.example.Bird");
        let virtual_call = handle.invoke(&rt, Some(bird.clone()), vec![], false).unwrap();
        assert_eq!(virtual_call, JValue::Int(2));
        let exact_call = handle.invoke(&rt, Some(bird), vec![], true).unwrap();
        assert_eq!(exact_call, JValue::Int(4));
    }

    #[test]
    fn test_inherited_method_lookup() {
        let rt = runtime();
        let handle = rt
            .reflect()
            .method(rt.classes(), "com.example.Bird", "hashCode", "")
            .unwrap();
        assert_eq!(handle.declaring.name, "java.lang.Object");
    }

    #[test]
    fn test_misses() {
        let rt = runtime();
        assert!(matches!(
            rt.reflect().method(rt.classes(), "com.example.Nope", "x", ""),
            Err(ReflectError::NoSuchClass(_))
        ));
        assert!(matches!(
            rt.reflect().method(rt.classes(), "com.example.Bird", "fly", ""),
            Err(ReflectError::NoSuchMethod { .. })
        ));
        assert!(matches!(
            rt.reflect().field(rt.classes(), "com.example.Bird", "wings", "int"),
            Err(ReflectError::NoSuchField { .. })
        ));
        assert!(matches!(
            rt.reflect().constructor(rt.classes(), "java.lang.Exception", "int"),
            Err(ReflectError::NoSuchConstructor { .. })
        ));
    }

    #[test]
    fn test_field_lookup_keyed_by_type() {
        let rt = runtime();
        rt.classes().define(ClassDef::new("com.example.Base").field("x", "long"));
        rt.classes().define(
            ClassDef::new("com.example.Shadow")
                .extends("com.example.Base")
                .field("x", "int"),
        );
        let int = rt.reflect().field(rt.classes(), "com.example.Shadow", "x", "int").unwrap();
        let long = rt.reflect().field(rt.classes(), "com.example.Shadow", "x", "long").unwrap();
        assert_eq!(int.declaring.name, "com.example.Shadow");
        assert_eq!(long.declaring.name, "com.example.Base");
        assert_eq!(rt.reflect().field_count(), 2);

        let again = rt.reflect().field(rt.classes(), "com.example.Shadow", "x", "int").unwrap();
        assert!(Arc::ptr_eq(&int, &again));
        assert_eq!(rt.reflect().field_count(), 2);
        assert!(matches!(
            rt.reflect().field(rt.classes(), "com.example.Shadow", "x", "double"),
            Err(ReflectError::NoSuchField { .. })
        ));
    }

    #[test]
    fn test_target_exception_unwraps_to_thrown() {
        let rt = runtime();
        let handle = rt
            .reflect()
            .method(rt.classes(), "java.lang.Integer", "parseInt", "java.lang.String")
            .unwrap();
        let err = handle
            .invoke(&rt, None, vec![JValue::string("x1")], false)
            .unwrap_err();
        let thrown = VmError::from(err);
        let obj = thrown.throwable().unwrap();
        assert_eq!(obj.class_name(), "java.lang.NumberFormatException");
    }

    #[test]
    fn test_implicit_default_constructor() {
        let rt = runtime();
        let ctor = rt.reflect().constructor(rt.classes(), "com.example.Bird", "").unwrap();
        let obj = ctor.new_instance(&rt, vec![]).unwrap();
        assert_eq!(obj.class_name(), "com.example.Bird");
    }

    #[test]
    fn test_wrong_arity_is_illegal_argument() {
        let rt = runtime();
        let handle = rt.reflect().method(rt.classes(), "java.lang.Math", "abs", "int").unwrap();
        assert!(matches!(
            handle.invoke(&rt, None, vec![], false),
            Err(ReflectError::IllegalArgument(_))
        ));
    }
}
