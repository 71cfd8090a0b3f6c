mod catalog;
pub use catalog::{Catalog, TypeDef};
mod config;
pub use config::{ArgConfig, InjectorConfig};
mod definition;
pub use definition::{Arg, Definition, ParamKey};
mod error;
pub use error::{ConfigError, Error, InjectionError, InjectionErrorKind};
mod executable;
pub use executable::{BoundExecutable, CallableRef, Executable, Invocable, Target};
mod helpers;
pub use helpers::normalize_name;
mod injector;
pub use injector::{Injector, Share};
mod reflection;
pub use reflection::{
  Constructor, FactoryFn, Function, FunctionFn, LoadError, Method, MethodFn, Parameter, TypeInfo,
  TypeIntrospector, TypeKind, INVOKE_METHOD,
};
mod registry;
pub use registry::{InspectFilter, Inspection, Preparer};
mod resolver;
mod store;
mod value;
pub use value::{ArcAny, Arguments, Instance, Value};

impl Injector {
  /// Creates an injector and hands it to `config` for registration.
  pub fn configure<I, F>(introspector: I, config: F) -> Result<Self, ConfigError>
    where
      I: TypeIntrospector,
      F: FnOnce(&Injector) -> Result<(), ConfigError>,
  {
    let injector = Injector::new(introspector);
    config(&injector)?;
    Ok(injector)
  }

  pub fn build<I>(introspector: I) -> InjectorBuilder
    where I: TypeIntrospector
  {
    InjectorBuilder {
      injector: Injector::new(introspector),
      error: None,
    }
  }
}

/// Collects registrations and reports the first failure from `finalize`.
#[derive(Debug)]
pub struct InjectorBuilder {
  injector: Injector,
  error: Option<ConfigError>,
}

impl InjectorBuilder {
  fn record<F>(&mut self, register: F) -> &mut Self
    where F: FnOnce(&Injector) -> Result<(), ConfigError>
  {
    if self.error.is_none() {
      if let Err(err) = register(&self.injector) {
        self.error = Some(err);
      }
    }
    self
  }

  pub fn alias(&mut self, name: &str, target: &str) -> &mut Self {
    self.record(|injector| injector.alias(name, target).map(drop))
  }

  pub fn share(&mut self, target: impl Into<Share>) -> &mut Self {
    self.record(|injector| injector.share(target).map(drop))
  }

  pub fn define(&mut self, name: &str, definition: Definition) -> &mut Self {
    self.record(|injector| injector.define(name, definition).map(drop))
  }

  pub fn define_param(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
    self.record(|injector| injector.define_param(name, value).map(drop))
  }

  pub fn delegate(&mut self, name: &str, invocable: impl Into<Invocable>) -> &mut Self {
    self.record(|injector| injector.delegate(name, invocable).map(drop))
  }

  pub fn prepare<F>(&mut self, name: &str, preparer: F) -> &mut Self
    where F: Fn(&Instance, &Injector) -> anyhow::Result<Option<Instance>> + Send + Sync + 'static
  {
    self.record(|injector| injector.prepare(name, preparer).map(drop))
  }

  pub fn config(&mut self, config: &InjectorConfig) -> &mut Self {
    self.record(|injector| config.apply(injector))
  }

  pub fn finalize(self) -> Result<Injector, ConfigError> {
    match self.error {
      Some(err) => Err(err),
      None => Ok(self.injector),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Engine;

  #[test]
  fn test_builder_reports_first_error() {
    let mut builder = Injector::build(Catalog::new());
    builder.alias("", "Engine").share("");
    let err = builder.finalize().unwrap_err();
    assert_eq!(err, ConfigError::EmptyAlias);
  }

  #[test]
  fn test_configure() {
    let injector = Injector::configure(
      Catalog::new().with_type(TypeDef::class("Engine").factory(|_| Ok(Engine))),
      |injector| {
        injector.share("Engine")?;
        Ok(())
      },
    )
    .unwrap();
    let a = injector.make("Engine").unwrap();
    assert!(Instance::ptr_eq(&a, &injector.make("engine").unwrap()));
  }
}
