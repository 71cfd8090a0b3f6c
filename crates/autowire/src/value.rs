use std::any::Any;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, bail};

pub type ArcAny = Arc<dyn Any + Send + Sync>;

/// A constructed object together with the name of the class that built it.
///
/// Cloning an `Instance` clones the handle, not the object: two clones are the
/// same instance as far as [`Instance::ptr_eq`] and shared caching are
/// concerned.
#[derive(Clone)]
pub struct Instance {
  class: Arc<str>,
  object: ArcAny,
}

impl Instance {
  pub fn new<T>(class: impl Into<Arc<str>>, object: T) -> Self
    where T: Any + Send + Sync
  {
    Self::from_arc(class, Arc::new(object))
  }

  pub fn from_arc(class: impl Into<Arc<str>>, object: ArcAny) -> Self {
    Instance {
      class: class.into(),
      object,
    }
  }

  /// Name of the concrete class, in its declared casing.
  pub fn class_name(&self) -> &str {
    &self.class
  }

  pub fn object(&self) -> &ArcAny {
    &self.object
  }

  pub fn downcast<T>(&self) -> Option<Arc<T>>
    where T: Any + Send + Sync
  {
    self.object.clone().downcast::<T>().ok()
  }

  pub fn downcast_ref<T>(&self) -> Option<&T>
    where T: Any + Send + Sync
  {
    self.object.downcast_ref::<T>()
  }

  pub fn ptr_eq(a: &Instance, b: &Instance) -> bool {
    Arc::ptr_eq(&a.object, &b.object)
  }
}

impl fmt::Debug for Instance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Instance")
      .field("class", &self.class)
      .finish()
  }
}

/// Any value that can flow through a parameter list or out of a callable.
#[derive(Clone, Debug)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
  List(Vec<Value>),
  Object(Instance),
}

impl Value {
  /// Short name of the value's kind, as used in error messages.
  pub fn kind(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Float(_) => "float",
      Value::Str(_) => "string",
      Value::List(_) => "list",
      Value::Object(_) => "object",
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn as_instance(&self) -> Option<&Instance> {
    match self {
      Value::Object(instance) => Some(instance),
      _ => None,
    }
  }

  pub fn into_instance(self) -> Option<Instance> {
    match self {
      Value::Object(instance) => Some(instance),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match *self {
      Value::Int(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_float(&self) -> Option<f64> {
    match *self {
      Value::Float(v) => Some(v),
      Value::Int(v) => Some(v as f64),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match *self {
      Value::Bool(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    match self {
      Value::List(items) => Some(items),
      _ => None,
    }
  }
}

impl From<()> for Value {
  fn from(_: ()) -> Self {
    Value::Null
  }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self {
    Value::Bool(v)
  }
}

impl From<i32> for Value {
  fn from(v: i32) -> Self {
    Value::Int(v.into())
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self {
    Value::Int(v)
  }
}

impl From<f64> for Value {
  fn from(v: f64) -> Self {
    Value::Float(v)
  }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self {
    Value::Str(v.to_string())
  }
}

impl From<String> for Value {
  fn from(v: String) -> Self {
    Value::Str(v)
  }
}

impl From<Instance> for Value {
  fn from(v: Instance) -> Self {
    Value::Object(v)
  }
}

impl<T> From<Option<T>> for Value
  where T: Into<Value>
{
  fn from(v: Option<T>) -> Self {
    v.map(Into::into).unwrap_or(Value::Null)
  }
}

impl<T> From<Vec<T>> for Value
  where T: Into<Value>
{
  fn from(v: Vec<T>) -> Self {
    Value::List(v.into_iter().map(Into::into).collect())
  }
}

/// Positional arguments handed to a factory, method or function body.
#[derive(Clone, Debug, Default)]
pub struct Arguments(Vec<Value>);

impl Arguments {
  pub fn new(values: Vec<Value>) -> Self {
    Arguments(values)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Value> {
    self.0.get(index)
  }

  pub fn value(&self, index: usize) -> anyhow::Result<&Value> {
    self.0.get(index).ok_or_else(|| anyhow!("missing argument at position {}", index))
  }

  /// Downcasts the object at `index`.
  pub fn instance<T>(&self, index: usize) -> anyhow::Result<Arc<T>>
    where T: Any + Send + Sync
  {
    match self.value(index)? {
      Value::Object(instance) => instance.downcast::<T>().ok_or_else(|| {
        anyhow!(
          "argument at position {} is a {}, not a {}",
          index,
          instance.class_name(),
          std::any::type_name::<T>()
        )
      }),
      other => bail!("argument at position {} is {}, expected an object", index, other.kind()),
    }
  }

  /// Like [`Arguments::instance`], but a `null` argument yields `None`.
  pub fn optional<T>(&self, index: usize) -> anyhow::Result<Option<Arc<T>>>
    where T: Any + Send + Sync
  {
    match self.get(index) {
      None | Some(Value::Null) => Ok(None),
      Some(_) => self.instance(index).map(Some),
    }
  }

  pub fn object(&self, index: usize) -> anyhow::Result<&Instance> {
    let value = self.value(index)?;
    value
      .as_instance()
      .ok_or_else(|| anyhow!("argument at position {} is {}, expected an object", index, value.kind()))
  }

  pub fn str(&self, index: usize) -> anyhow::Result<&str> {
    let value = self.value(index)?;
    value
      .as_str()
      .ok_or_else(|| anyhow!("argument at position {} is {}, expected a string", index, value.kind()))
  }

  pub fn int(&self, index: usize) -> anyhow::Result<i64> {
    let value = self.value(index)?;
    value
      .as_int()
      .ok_or_else(|| anyhow!("argument at position {} is {}, expected an int", index, value.kind()))
  }

  pub fn list(&self, index: usize) -> anyhow::Result<&[Value]> {
    let value = self.value(index)?;
    value
      .as_list()
      .ok_or_else(|| anyhow!("argument at position {} is {}, expected a list", index, value.kind()))
  }

  pub fn into_vec(self) -> Vec<Value> {
    self.0
  }
}

impl From<Vec<Value>> for Arguments {
  fn from(values: Vec<Value>) -> Self {
    Arguments(values)
  }
}
