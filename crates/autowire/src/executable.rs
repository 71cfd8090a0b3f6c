//! Turning invocable references into callables whose arguments the container
//! provisions.

use std::fmt;
use std::sync::Arc;

use crate::definition::Definition;
use crate::error::{Error, InjectionErrorKind};
use crate::injector::Injector;
use crate::reflection::{Function, FunctionFn, Method, MethodFn, Parameter, TypeInfo, INVOKE_METHOD};
use crate::value::{Arguments, Instance, Value};

const PARENT_PREFIX: &str = "parent::";

/// Receiver of a `(target, method)` pair.
#[derive(Debug, Clone)]
pub enum Target {
  Type(String),
  Instance(Instance),
}

/// Anything the container can call.
#[derive(Clone)]
pub enum Invocable {
  /// A free function, `"Type::method"`, `"Type::parent::method"`, or the
  /// name of a type with an `invoke` method.
  Name(String),
  /// A method on a type or instance. The method may carry a `parent::`
  /// prefix to select the parent class implementation.
  Method(Target, String),
  Closure(Function),
  /// An instance whose type has an `invoke` method.
  Object(Instance),
}

impl Invocable {
  pub fn method(target: impl Into<String>, method: impl Into<String>) -> Self {
    Invocable::Method(Target::Type(target.into()), method.into())
  }

  /// Human-readable form, used in error messages.
  pub fn describe(&self) -> String {
    match self {
      Invocable::Name(name) => name.clone(),
      Invocable::Method(Target::Type(name), method) => format!("{}::{}", name, method),
      Invocable::Method(Target::Instance(instance), method) => {
        format!("{}::{}", instance.class_name(), method)
      }
      Invocable::Closure(function) => function.name.clone(),
      Invocable::Object(instance) => instance.class_name().to_string(),
    }
  }
}

impl fmt::Debug for Invocable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Invocable").field(&self.describe()).finish()
  }
}

impl From<&str> for Invocable {
  fn from(name: &str) -> Self {
    Invocable::Name(name.to_string())
  }
}

impl From<String> for Invocable {
  fn from(name: String) -> Self {
    Invocable::Name(name)
  }
}

impl From<(&str, &str)> for Invocable {
  fn from((target, method): (&str, &str)) -> Self {
    Invocable::method(target, method)
  }
}

impl From<(Instance, &str)> for Invocable {
  fn from((instance, method): (Instance, &str)) -> Self {
    Invocable::Method(Target::Instance(instance), method.to_string())
  }
}

impl From<Function> for Invocable {
  fn from(function: Function) -> Self {
    Invocable::Closure(function)
  }
}

impl From<Instance> for Invocable {
  fn from(instance: Instance) -> Self {
    Invocable::Object(instance)
  }
}

/// A string reference split into its parts: `"Type::method"` yields a
/// target, a bare name does not. Whether the method is static is only known
/// once the target has been described.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableRef {
  pub target: Option<String>,
  pub method: String,
}

impl CallableRef {
  pub fn parse(reference: &str) -> Self {
    match reference.split_once("::") {
      Some((target, method)) if !target.is_empty() && !method.is_empty() => CallableRef {
        target: Some(target.to_string()),
        method: method.to_string(),
      },
      _ => CallableRef {
        target: None,
        method: reference.to_string(),
      },
    }
  }
}

fn split_parent(method: &str) -> (bool, &str) {
  match method.get(..PARENT_PREFIX.len()) {
    Some(prefix) if prefix.eq_ignore_ascii_case(PARENT_PREFIX) => (true, &method[PARENT_PREFIX.len()..]),
    _ => (false, method),
  }
}

#[derive(Clone)]
enum Callee {
  Function(FunctionFn),
  Method {
    body: MethodFn,
    receiver: Option<Instance>,
  },
}

/// A located callable, not yet bound to arguments.
#[derive(Clone)]
pub struct Executable {
  label: String,
  declared_in: String,
  params: Vec<Parameter>,
  callee: Callee,
}

impl Executable {
  fn function(function: &Function) -> Self {
    Executable {
      label: function.name.clone(),
      declared_in: function.name.clone(),
      params: function.params.clone(),
      callee: Callee::Function(function.body.clone()),
    }
  }

  fn method(owner: &str, method: &Method, receiver: Option<Instance>) -> Self {
    Executable {
      label: format!("{}::{}", owner, method.name),
      declared_in: method.declared_in.clone(),
      params: method.params.clone(),
      callee: Callee::Method {
        body: method.body.clone(),
        receiver,
      },
    }
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn declared_in(&self) -> &str {
    &self.declared_in
  }

  pub fn params(&self) -> &[Parameter] {
    &self.params
  }

  pub fn receiver(&self) -> Option<&Instance> {
    match &self.callee {
      Callee::Method { receiver, .. } => receiver.as_ref(),
      Callee::Function(_) => None,
    }
  }

  /// Calls with explicit arguments, bypassing provisioning.
  pub fn call(&self, args: Vec<Value>) -> Result<Value, Error> {
    let args = Arguments::new(args);
    let result = match &self.callee {
      Callee::Function(body) => body(args),
      Callee::Method { body, receiver } => body(receiver.as_ref(), args),
    };
    result.map_err(Error::from_service)
  }
}

impl fmt::Debug for Executable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Executable")
      .field("label", &self.label)
      .field("declared_in", &self.declared_in)
      .field("params", &self.params)
      .field("receiver", &self.receiver())
      .finish()
  }
}

/// An executable with its arguments already provisioned.
#[derive(Debug, Clone)]
pub struct BoundExecutable {
  executable: Executable,
  args: Vec<Value>,
}

impl BoundExecutable {
  pub fn invoke(&self) -> Result<Value, Error> {
    self.executable.call(self.args.clone())
  }

  pub fn executable(&self) -> &Executable {
    &self.executable
  }

  pub fn args(&self) -> &[Value] {
    &self.args
  }
}

impl Injector {
  /// Locates the callable behind `invocable`. Instance methods addressed by
  /// type name get their receiver from [`Injector::make`].
  pub fn resolve_executable(&self, invocable: impl Into<Invocable>) -> Result<Executable, Error> {
    let invocable = invocable.into();
    let received = invocable.describe();
    match invocable {
      Invocable::Closure(function) => Ok(Executable::function(&function)),
      Invocable::Object(instance) => {
        self.resolve_method(Target::Instance(instance), INVOKE_METHOD, &received)
      }
      Invocable::Method(target, method) => self.resolve_method(target, &method, &received),
      Invocable::Name(reference) => {
        let parsed = CallableRef::parse(&reference);
        match parsed.target {
          Some(target) => self.resolve_method(Target::Type(target), &parsed.method, &received),
          None => match self.reflector.function(&parsed.method) {
            Ok(function) => Ok(Executable::function(&function)),
            Err(_) => self.resolve_method(Target::Type(reference), INVOKE_METHOD, &received),
          },
        }
      }
    }
  }

  /// Locates `invocable` and provisions every parameter.
  pub fn build_executable(&self, invocable: impl Into<Invocable>) -> Result<BoundExecutable, Error> {
    self.build_executable_with(invocable, &Definition::new())
  }

  pub fn build_executable_with(
    &self,
    invocable: impl Into<Invocable>,
    definition: &Definition,
  ) -> Result<BoundExecutable, Error> {
    let _serial = self.serialize();
    let executable = self.resolve_executable(invocable)?;
    let args = self.provision_args(
      &executable.params,
      &executable.label,
      &executable.declared_in,
      definition,
    )?;
    Ok(BoundExecutable { executable, args })
  }

  pub fn execute(&self, invocable: impl Into<Invocable>) -> Result<Value, Error> {
    self.execute_with(invocable, &Definition::new())
  }

  pub fn execute_with(
    &self,
    invocable: impl Into<Invocable>,
    definition: &Definition,
  ) -> Result<Value, Error> {
    let _serial = self.serialize();
    self.build_executable_with(invocable, definition)?.invoke()
  }

  fn resolve_method(&self, target: Target, method: &str, received: &str) -> Result<Executable, Error> {
    let invalid = || self.fail(InjectionErrorKind::Invokable { received: received.to_string() });
    let (parent_relative, method_name) = split_parent(method);

    let declared = match &target {
      Target::Type(name) => self.with_state(|state| state.registry.resolve_alias(name).name),
      Target::Instance(instance) => instance.class_name().to_string(),
    };
    let owner = self.method_owner(&declared, parent_relative).ok_or_else(invalid)?;
    let found = owner.method(method_name).cloned().ok_or_else(invalid)?;

    if found.is_static {
      return Ok(Executable::method(&owner.name, &found, None));
    }

    let receiver = match target {
      Target::Instance(instance) => instance,
      Target::Type(name) => self.make(&name)?,
    };
    // Virtual dispatch, unless the caller asked for the parent implementation.
    let found = if parent_relative {
      found
    } else {
      self
        .reflector
        .describe(receiver.class_name())
        .ok()
        .and_then(|info| info.method(method_name).cloned())
        .unwrap_or(found)
    };
    let owner = receiver.class_name().to_string();
    Ok(Executable::method(&owner, &found, Some(receiver)))
  }

  fn method_owner(&self, class: &str, parent_relative: bool) -> Option<Arc<TypeInfo>> {
    let info = self.reflector.describe(class).ok()?;
    if !parent_relative {
      return Some(info);
    }
    let parent = info.parent.as_ref()?;
    self.reflector.describe(parent).ok()
  }

  /// Whether `invocable` can be located without constructing anything.
  pub(crate) fn is_invocable(&self, invocable: &Invocable) -> bool {
    let has_method = |class: &str, method: &str| {
      let (parent_relative, method_name) = split_parent(method);
      let class = self.with_state(|state| state.registry.resolve_alias(class).name);
      self
        .method_owner(&class, parent_relative)
        .map_or(false, |owner| owner.method(method_name).is_some())
    };
    match invocable {
      Invocable::Closure(_) => true,
      Invocable::Object(instance) => has_method(instance.class_name(), INVOKE_METHOD),
      Invocable::Method(Target::Type(name), method) => has_method(name, method),
      Invocable::Method(Target::Instance(instance), method) => has_method(instance.class_name(), method),
      Invocable::Name(reference) => {
        let parsed = CallableRef::parse(reference);
        match parsed.target {
          Some(target) => has_method(&target, &parsed.method),
          None => {
            self.reflector.function(reference).is_ok() || has_method(reference, INVOKE_METHOD)
          }
        }
      }
    }
  }
}
