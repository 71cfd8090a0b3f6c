//! The contract between the container and whatever supplies type metadata,
//! plus the caching adapter the container talks to.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::helpers::normalize_name;
use crate::value::{ArcAny, Arguments, Instance, Value};

/// Name of the method that makes an object invocable on its own.
pub const INVOKE_METHOD: &str = "invoke";

pub type FactoryFn = Arc<dyn Fn(Arguments) -> anyhow::Result<ArcAny> + Send + Sync>;
pub type MethodFn = Arc<dyn Fn(Option<&Instance>, Arguments) -> anyhow::Result<Value> + Send + Sync>;
pub type FunctionFn = Arc<dyn Fn(Arguments) -> anyhow::Result<Value> + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
  #[error("type {0} does not exist")]
  TypeNotFound(String),
  #[error("function {0} does not exist")]
  FunctionNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
  Class,
  AbstractClass,
  Interface,
}

impl TypeKind {
  pub fn is_concrete(self) -> bool {
    self == TypeKind::Class
  }
}

impl fmt::Display for TypeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      TypeKind::Class => "class",
      TypeKind::AbstractClass => "abstract class",
      TypeKind::Interface => "interface",
    })
  }
}

/// One formal parameter of a constructor, method or function.
#[derive(Debug, Clone)]
pub struct Parameter {
  pub name: String,
  pub position: usize,
  /// Declared class or interface. Scalar and list types are not recorded.
  pub type_hint: Option<String>,
  pub default: Option<Value>,
  pub variadic: bool,
}

impl Parameter {
  pub fn new(name: impl Into<String>) -> Self {
    Parameter {
      name: name.into(),
      position: 0,
      type_hint: None,
      default: None,
      variadic: false,
    }
  }

  pub fn typed(mut self, type_name: impl Into<String>) -> Self {
    self.type_hint = Some(type_name.into());
    self
  }

  pub fn with_default(mut self, value: impl Into<Value>) -> Self {
    self.default = Some(value.into());
    self
  }

  pub fn variadic(mut self) -> Self {
    self.variadic = true;
    self
  }
}

pub(crate) fn positioned(params: impl IntoIterator<Item = Parameter>) -> Vec<Parameter> {
  params
    .into_iter()
    .enumerate()
    .map(|(position, param)| Parameter { position, ..param })
    .collect()
}

#[derive(Debug, Clone)]
pub struct Constructor {
  pub public: bool,
  pub params: Vec<Parameter>,
  /// The type whose source declares the constructor. Differs from the
  /// described type when the constructor is inherited.
  pub declared_in: String,
}

#[derive(Clone)]
pub struct Method {
  pub name: String,
  pub declared_in: String,
  pub is_static: bool,
  pub params: Vec<Parameter>,
  pub body: MethodFn,
}

impl Method {
  pub fn instance<F>(name: impl Into<String>, params: impl IntoIterator<Item = Parameter>, body: F) -> Self
    where F: Fn(&Instance, Arguments) -> anyhow::Result<Value> + Send + Sync + 'static
  {
    let name = name.into();
    let label = name.clone();
    Method {
      name,
      declared_in: String::new(),
      is_static: false,
      params: positioned(params),
      body: Arc::new(move |receiver: Option<&Instance>, args: Arguments| match receiver {
        Some(receiver) => body(receiver, args),
        None => anyhow::bail!("method {} requires a receiver", label),
      }),
    }
  }

  pub fn static_fn<F>(name: impl Into<String>, params: impl IntoIterator<Item = Parameter>, body: F) -> Self
    where F: Fn(Arguments) -> anyhow::Result<Value> + Send + Sync + 'static
  {
    Method {
      name: name.into(),
      declared_in: String::new(),
      is_static: true,
      params: positioned(params),
      body: Arc::new(move |_: Option<&Instance>, args: Arguments| body(args)),
    }
  }
}

impl fmt::Debug for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Method")
      .field("name", &self.name)
      .field("declared_in", &self.declared_in)
      .field("is_static", &self.is_static)
      .field("params", &self.params)
      .finish()
  }
}

/// A free function or an anonymous closure.
#[derive(Clone)]
pub struct Function {
  pub name: String,
  pub params: Vec<Parameter>,
  pub body: FunctionFn,
}

impl Function {
  pub fn new<F>(name: impl Into<String>, params: impl IntoIterator<Item = Parameter>, body: F) -> Self
    where F: Fn(Arguments) -> anyhow::Result<Value> + Send + Sync + 'static
  {
    Function {
      name: name.into(),
      params: positioned(params),
      body: Arc::new(body),
    }
  }

  pub fn closure<F>(params: impl IntoIterator<Item = Parameter>, body: F) -> Self
    where F: Fn(Arguments) -> anyhow::Result<Value> + Send + Sync + 'static
  {
    Self::new("{closure}", params, body)
  }
}

impl fmt::Debug for Function {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Function")
      .field("name", &self.name)
      .field("params", &self.params)
      .finish()
  }
}

/// Everything the container needs to know about one type.
#[derive(Clone)]
pub struct TypeInfo {
  pub name: String,
  pub kind: TypeKind,
  /// Direct parent class, used for `parent::method` lookups.
  pub parent: Option<String>,
  /// Every parent class and interface, nearest first.
  pub ancestors: Vec<String>,
  /// `None` when neither the type nor its ancestors declare a constructor.
  pub constructor: Option<Constructor>,
  /// How to instantiate the type. `None` for non-concrete types.
  pub factory: Option<FactoryFn>,
  /// Keyed by normalized method name, inherited methods included.
  pub methods: BTreeMap<String, Arc<Method>>,
}

impl TypeInfo {
  pub fn method(&self, name: &str) -> Option<&Arc<Method>> {
    self.methods.get(&name.to_lowercase())
  }

  pub fn is_subtype_of(&self, normalized: &str) -> bool {
    normalize_name(&self.name) == normalized
      || self.ancestors.iter().any(|a| normalize_name(a) == normalized)
  }
}

impl fmt::Debug for TypeInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TypeInfo")
      .field("name", &self.name)
      .field("kind", &self.kind)
      .field("parent", &self.parent)
      .field("ancestors", &self.ancestors)
      .field("constructor", &self.constructor)
      .field("methods", &self.methods.keys().collect::<Vec<_>>())
      .finish()
  }
}

/// Source of type metadata. Implementations may use static registration,
/// generated code or anything else, as long as lookups are case-insensitive.
pub trait TypeIntrospector: Send + Sync + 'static {
  fn describe(&self, type_name: &str) -> Result<TypeInfo, LoadError>;
  fn function(&self, name: &str) -> Result<Function, LoadError>;
}

/// Caches introspector answers by normalized name. Failed lookups are not
/// cached.
pub(crate) struct Reflector {
  introspector: Arc<dyn TypeIntrospector>,
  types: RwLock<HashMap<String, Arc<TypeInfo>>>,
  functions: RwLock<HashMap<String, Arc<Function>>>,
}

impl Reflector {
  pub fn new(introspector: Arc<dyn TypeIntrospector>) -> Self {
    Reflector {
      introspector,
      types: RwLock::new(HashMap::new()),
      functions: RwLock::new(HashMap::new()),
    }
  }

  pub fn describe(&self, type_name: &str) -> Result<Arc<TypeInfo>, LoadError> {
    let key = normalize_name(type_name);
    if let Some(info) = self.types.read().get(&key) {
      tracing::trace!("reflection cache hit: {}", key);
      return Ok(info.clone());
    }
    let info = Arc::new(self.introspector.describe(type_name)?);
    self.types.write().insert(key, info.clone());
    Ok(info)
  }

  pub fn function(&self, name: &str) -> Result<Arc<Function>, LoadError> {
    let key = normalize_name(name);
    if let Some(function) = self.functions.read().get(&key) {
      return Ok(function.clone());
    }
    let function = Arc::new(self.introspector.function(name)?);
    self.functions.write().insert(key, function.clone());
    Ok(function)
  }

  /// Whether `instance` is of type `normalized`, by name or ancestry. Classes
  /// the introspector cannot describe only match their own name.
  pub fn is_instance_of(&self, instance: &Instance, normalized: &str) -> bool {
    match self.describe(instance.class_name()) {
      Ok(info) => info.is_subtype_of(normalized),
      Err(_) => normalize_name(instance.class_name()) == normalized,
    }
  }
}

impl fmt::Debug for Reflector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Reflector")
      .field("types", &self.types.read().len())
      .field("functions", &self.functions.read().len())
      .finish()
  }
}
