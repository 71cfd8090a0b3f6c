use std::sync::Arc;
use thiserror::Error;

use crate::reflection::{LoadError, TypeKind};

#[derive(Error, Debug, Clone)]
pub enum Error {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Injection(#[from] InjectionError),
  /// Raised by user code: a factory, method, delegate or preparer.
  #[error("{0}")]
  Service(Arc<anyhow::Error>),
}

impl Error {
  /// Recovers a container error that user code propagated with `?`, or wraps
  /// the user's own error untouched.
  pub(crate) fn from_service(err: anyhow::Error) -> Self {
    match err.downcast::<Error>() {
      Ok(err) => err,
      Err(err) => match err.downcast::<InjectionError>() {
        Ok(err) => Error::Injection(err),
        Err(err) => Error::Service(Arc::new(err))
      }
    }
  }

  pub fn as_injection(&self) -> Option<&InjectionError> {
    match self {
      Error::Injection(err) => Some(err),
      _ => None,
    }
  }

  pub fn as_config(&self) -> Option<&ConfigError> {
    match self {
      Error::Config(err) => Some(err),
      _ => None,
    }
  }
}

/// Misuse of a registry call, reported by the call itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  #[error("invalid alias: non-empty type names required for both the alias and its target")]
  EmptyAlias,
  #[error("invalid type name: non-empty type name required")]
  EmptyTypeName,
  #[error("invalid parameter name: non-empty parameter name required")]
  EmptyParamName,
  #[error("cannot alias {name} to {target} because it is currently shared")]
  SharedCannotAlias { name: String, target: String },
  #[error("cannot share {name} because it is currently aliased to {target}")]
  AliasedCannotShare { name: String, target: String },
  #[error("delegate expects a valid callable or executable Type::method string but received '{received}'")]
  InvalidDelegate { received: String },
  #[error("could not parse configuration: {0}")]
  Parse(String),
  #[error("unsupported value for {name}: {reason}")]
  UnsupportedValue { name: String, reason: String },
}

/// A failure while making a type or executing a callable.
#[derive(Error, Debug, Clone)]
#[error("{kind}")]
pub struct InjectionError {
  pub kind: InjectionErrorKind,
  /// Types under construction when the failure happened, outermost first.
  pub chain: Vec<String>,
}

impl InjectionError {
  pub(crate) fn new(kind: InjectionErrorKind, chain: Vec<String>) -> Self {
    InjectionError { kind, chain }
  }

  pub fn kind(&self) -> &InjectionErrorKind {
    &self.kind
  }

  pub fn dependency_chain(&self) -> &[String] {
    &self.chain
  }
}

#[derive(Error, Debug, Clone)]
pub enum InjectionErrorKind {
  #[error("detected a cyclic dependency while provisioning {type_name}: {}", .stack.join(" -> "))]
  CyclicDependency { type_name: String, stack: Vec<String> },
  #[error("injection definition required for {type_kind} {type_name}")]
  NeedsDefinition { type_kind: TypeKind, type_name: String },
  #[error(
    "no definition available to provision typeless parameter `{param}` at position {position} in {function} declared in {declared_in}"
  )]
  UndefinedParam {
    param: String,
    position: usize,
    function: String,
    declared_in: String,
  },
  #[error("class {type_name} has no factory to construct it with")]
  MissingFactory { type_name: String },
  #[error("cannot instantiate non-public constructor in class {type_name}")]
  NonPublicConstructor { type_name: String },
  #[error("invalid invokable: callable or provisional string required, received '{received}'")]
  Invokable { received: String },
  #[error("making {type_name} did not result in an object, instead result is of type '{actual}'")]
  MakingFailed { type_name: String, actual: &'static str },
  #[error("could not make {type_name}: {source}")]
  Unloadable { type_name: String, source: LoadError },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_service_error_round_trips_through_anyhow() {
    let inner = Error::Config(ConfigError::EmptyAlias);
    let recovered = Error::from_service(anyhow::Error::new(inner));
    assert!(matches!(recovered, Error::Config(ConfigError::EmptyAlias)));

    let user = Error::from_service(anyhow::anyhow!("Exception in constructor"));
    assert_eq!(user.to_string(), "Exception in constructor");
  }

  #[test]
  fn test_cyclic_message_lists_stack() {
    let err = InjectionError::new(
      InjectionErrorKind::CyclicDependency {
        type_name: "x".to_string(),
        stack: vec!["x".to_string(), "y".to_string()],
      },
      vec!["x".to_string(), "y".to_string()],
    );
    assert_eq!(
      err.to_string(),
      "detected a cyclic dependency while provisioning x: x -> y"
    );
  }
}
