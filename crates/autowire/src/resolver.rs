use crate::definition::{Arg, Definition};
use crate::error::{Error, InjectionError, InjectionErrorKind};
use crate::helpers::normalize_name;
use crate::injector::Injector;
use crate::reflection::Parameter;
use crate::value::{Arguments, Instance, Value};

/// Pops the resolution stack when a `make` call returns or unwinds.
struct StackEntry<'a> {
  injector: &'a Injector,
}

impl Drop for StackEntry<'_> {
  fn drop(&mut self) {
    self.injector.with_state(|state| {
      state.stack.pop();
    });
  }
}

impl Injector {
  /// Builds (or returns the shared instance of) `name`.
  pub fn make(&self, name: &str) -> Result<Instance, Error> {
    self.make_with(name, Definition::new())
  }

  /// Like [`Injector::make`], with argument choices that apply to this
  /// construction only. They do not reach nested dependencies.
  pub fn make_with(&self, name: &str, args: Definition) -> Result<Instance, Error> {
    let _serial = self.serialize();
    let (resolved, looped) = self.with_state(|state| {
      let resolved = state.registry.resolve_alias(name);
      // A finished alias chain ends on a name that is not itself aliased.
      let looped = state.registry.is_aliased(&resolved.value);
      (resolved, looped)
    });
    let (class, key) = (resolved.name, resolved.value);
    let _entry = self.enter(&key)?;
    if looped {
      let stack = self.with_state(|state| state.stack.clone());
      return Err(self.fail(InjectionErrorKind::CyclicDependency { type_name: key, stack }));
    }

    if let Some(instance) = self.with_state(|state| state.singletons.resolved(&key)) {
      tracing::trace!("shared instance hit: {}", key);
      return Ok(instance);
    }

    let delegate = self.with_state(|state| state.registry.delegate_of(&key));
    let instance = match delegate {
      Some(delegate) => {
        tracing::debug!("making {} through delegate {}", key, delegate.describe());
        match self.execute_with(delegate, &args)? {
          Value::Object(instance) => instance,
          other => {
            return Err(self.fail(InjectionErrorKind::MakingFailed {
              type_name: key,
              actual: other.kind(),
            }))
          }
        }
      }
      None => {
        tracing::debug!("making {}", key);
        self.construct(&class, &key, &args)?
      }
    };

    let instance = self.prepare_instance(instance, &key)?;
    if self.with_state(|state| state.singletons.promote(&key, &instance)) {
      tracing::trace!("shared {} promoted", key);
    }
    Ok(instance)
  }

  /// An injection error carrying the current resolution stack.
  pub(crate) fn fail(&self, kind: InjectionErrorKind) -> Error {
    let chain = self.with_state(|state| state.stack.clone());
    InjectionError::new(kind, chain).into()
  }

  fn enter(&self, key: &str) -> Result<StackEntry<'_>, Error> {
    let cycle = self.with_state(|state| {
      if state.stack.iter().any(|each| each == key) {
        return Some(state.stack.clone());
      }
      state.stack.push(key.to_string());
      None
    });
    match cycle {
      Some(stack) => Err(
        InjectionError::new(
          InjectionErrorKind::CyclicDependency {
            type_name: key.to_string(),
            stack: stack.clone(),
          },
          stack,
        )
        .into(),
      ),
      None => Ok(StackEntry { injector: self }),
    }
  }

  fn construct(&self, class: &str, key: &str, args: &Definition) -> Result<Instance, Error> {
    let info = self.reflector.describe(class).map_err(|source| {
      self.fail(InjectionErrorKind::Unloadable {
        type_name: class.to_string(),
        source,
      })
    })?;

    if !info.kind.is_concrete() {
      return Err(self.fail(InjectionErrorKind::NeedsDefinition {
        type_kind: info.kind,
        type_name: info.name.clone(),
      }));
    }
    let factory = info.factory.clone().ok_or_else(|| {
      self.fail(InjectionErrorKind::MissingFactory {
        type_name: info.name.clone(),
      })
    })?;

    let values = match &info.constructor {
      None => Vec::new(),
      Some(ctor) if !ctor.public => {
        return Err(self.fail(InjectionErrorKind::NonPublicConstructor {
          type_name: info.name.clone(),
        }))
      }
      Some(ctor) => {
        let definition = match self.with_state(|state| state.registry.definition_of(key)) {
          Some(stored) => args.over(&stored),
          None => args.clone(),
        };
        let function = format!("{} constructor", info.name);
        self.provision_args(&ctor.params, &function, &ctor.declared_in, &definition)?
      }
    };

    let object = factory(Arguments::new(values)).map_err(Error::from_service)?;
    Ok(Instance::from_arc(info.name.as_str(), object))
  }

  /// Chooses a value for every parameter of a signature, in order.
  pub(crate) fn provision_args(
    &self,
    params: &[Parameter],
    function: &str,
    declared_in: &str,
    definition: &Definition,
  ) -> Result<Vec<Value>, Error> {
    let mut values = Vec::with_capacity(params.len());
    for param in params {
      let value = match definition.lookup(param) {
        Some(arg) => {
          tracing::trace!("{}: `{}` from definition", function, param.name);
          self.resolve_arg(arg)?
        }
        None => self.resolve_param(param, function, declared_in)?,
      };
      values.push(if param.variadic { spread(value) } else { value });
    }
    Ok(values)
  }

  fn resolve_arg(&self, arg: &Arg) -> Result<Value, Error> {
    match arg {
      Arg::Raw(value) => Ok(value.clone()),
      Arg::Class(type_name) => self.make(type_name).map(Value::Object),
      Arg::Delegate(invocable) => self.execute(invocable.clone()),
    }
  }

  fn resolve_param(&self, param: &Parameter, function: &str, declared_in: &str) -> Result<Value, Error> {
    if let (Some(hint), false) = (&param.type_hint, param.variadic) {
      let depth = self.with_state(|state| state.stack.len());
      return match self.make(hint) {
        Ok(instance) => Ok(Value::Object(instance)),
        Err(Error::Injection(err)) => match (&param.default, &err.kind) {
          // Only when the hinted type itself is unbound, not something below it.
          (Some(default), InjectionErrorKind::NeedsDefinition { .. }) if err.chain.len() == depth + 1 => {
            tracing::trace!("{}: `{}` falls back to its default", function, param.name);
            Ok(default.clone())
          }
          _ => Err(err.into()),
        },
        Err(err) => Err(err),
      };
    }
    if param.variadic {
      return Ok(Value::List(Vec::new()));
    }
    if let Some(value) = self.with_state(|state| state.registry.param(&param.name)) {
      tracing::trace!("{}: `{}` from global parameter", function, param.name);
      return Ok(value);
    }
    match &param.default {
      Some(default) => Ok(default.clone()),
      None => Err(self.fail(InjectionErrorKind::UndefinedParam {
        param: param.name.clone(),
        position: param.position,
        function: function.to_string(),
        declared_in: declared_in.to_string(),
      })),
    }
  }

  /// Runs the preparers registered for `key`, for the instance's own class
  /// and for each of its ancestors, in that order.
  fn prepare_instance(&self, mut instance: Instance, key: &str) -> Result<Instance, Error> {
    let mut keys = vec![key.to_string()];
    let own = normalize_name(instance.class_name());
    if own != key {
      keys.push(own);
    }
    match self.reflector.describe(instance.class_name()) {
      Ok(info) => {
        for ancestor in info.ancestors.iter().map(|a| normalize_name(a)) {
          if !keys.contains(&ancestor) {
            keys.push(ancestor);
          }
        }
      }
      Err(err) => tracing::trace!("skipping ancestor preparers of {}: {}", instance.class_name(), err),
    }

    for each in &keys {
      let preparers = self.with_state(|state| state.registry.preparers_of(each));
      for preparer in preparers {
        if let Some(replacement) = preparer(&instance, self).map_err(Error::from_service)? {
          if self.reflector.is_instance_of(&replacement, key) {
            instance = replacement;
          } else {
            tracing::warn!(
              "preparer for {} returned an incompatible {}, keeping the original",
              each,
              replacement.class_name()
            );
          }
        }
      }
    }
    Ok(instance)
  }
}

/// Wraps a single value given for a variadic parameter into a list.
fn spread(value: Value) -> Value {
  match value {
    Value::List(_) => value,
    other => Value::List(vec![other]),
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use parking_lot::Mutex;

  use super::*;
  use crate::catalog::{Catalog, TypeDef};
  use crate::error::ConfigError;
  use crate::reflection::Function;

  struct Holder(Value);
  struct Empty;

  fn holder(args: Arguments) -> anyhow::Result<Holder> {
    Ok(Holder(args.value(0)?.clone()))
  }

  #[test]
  fn test_untyped_default_is_used() {
    let injector = Injector::new(
      Catalog::new().with_type(
        TypeDef::class("A")
          .constructor([Parameter::new("b").with_default(5)])
          .factory(holder),
      ),
    );
    let a = injector.make("A").unwrap();
    assert_eq!(a.downcast_ref::<Holder>().unwrap().0.as_int(), Some(5));
  }

  #[test]
  fn test_alias_produces_target_class() {
    let injector = Injector::new(
      Catalog::new()
        .with_type(TypeDef::interface("I"))
        .with_type(TypeDef::class("C").implements("I").factory(|_| Ok(Empty))),
    );
    injector.alias("I", "C").unwrap();
    assert_eq!(injector.make("I").unwrap().class_name(), "C");
  }

  #[test]
  fn test_shared_type_is_built_once() {
    let injector = Injector::new(Catalog::new().with_type(TypeDef::class("S").factory(|_| Ok(Empty))));
    injector.share("S").unwrap();
    let x = injector.make("S").unwrap();
    let y = injector.make("s").unwrap();
    assert!(Instance::ptr_eq(&x, &y));
    let z = Injector::new(Catalog::new().with_type(TypeDef::class("S").factory(|_| Ok(Empty))));
    assert!(!Instance::ptr_eq(&z.make("S").unwrap(), &z.make("S").unwrap()));
  }

  #[test]
  fn test_cycle_lists_stack() {
    let injector = Injector::new(
      Catalog::new()
        .with_type(
          TypeDef::class("X")
            .constructor([Parameter::new("y").typed("Y")])
            .factory(holder),
        )
        .with_type(
          TypeDef::class("Y")
            .constructor([Parameter::new("x").typed("X")])
            .factory(holder),
        ),
    );
    let err = injector.make("X").unwrap_err();
    let err = err.as_injection().unwrap();
    match err.kind() {
      InjectionErrorKind::CyclicDependency { type_name, stack } => {
        assert_eq!(type_name, "x");
        assert_eq!(stack, &["x", "y"]);
      }
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(err.dependency_chain(), &["x", "y"]);
    // The stack unwound on failure.
    assert!(injector.with_state(|state| state.stack.is_empty()));
  }

  #[test]
  fn test_delegate_returning_null_fails() {
    let injector = Injector::new(Catalog::new().with_type(TypeDef::interface("D")));
    injector
      .delegate("D", Function::closure([], |_| Ok(Value::Null)))
      .unwrap();
    let err = injector.make("D").unwrap_err();
    match err.as_injection().map(|err| err.kind()) {
      Some(InjectionErrorKind::MakingFailed { type_name, actual }) => {
        assert_eq!(type_name, "d");
        assert_eq!(*actual, "null");
      }
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
      err.to_string(),
      "making d did not result in an object, instead result is of type 'null'"
    );
  }

  #[test]
  fn test_interface_default_fallback_only_at_immediate_level() {
    let catalog = Catalog::new()
      .with_type(TypeDef::interface("Logger"))
      .with_type(
        TypeDef::class("Service")
          .constructor([Parameter::new("logger").typed("Logger").with_default(())])
          .factory(holder),
      )
      .with_type(
        TypeDef::class("Wrapper")
          .constructor([Parameter::new("logger").typed("Mailer").with_default(())])
          .factory(holder),
      )
      .with_type(
        TypeDef::class("Mailer")
          .constructor([Parameter::new("logger").typed("Logger")])
          .factory(holder),
      );
    let injector = Injector::new(catalog);
    let service = injector.make("Service").unwrap();
    assert!(service.downcast_ref::<Holder>().unwrap().0.is_null());

    let err = injector.make("Wrapper").unwrap_err();
    let err = err.as_injection().unwrap();
    assert!(matches!(err.kind(), InjectionErrorKind::NeedsDefinition { .. }));
    assert_eq!(err.dependency_chain(), &["wrapper", "mailer", "logger"]);
  }

  #[test]
  fn test_call_definition_does_not_propagate() {
    let catalog = Catalog::new()
      .with_type(
        TypeDef::class("Outer")
          .constructor([Parameter::new("dep").typed("Inner")])
          .factory(holder),
      )
      .with_type(
        TypeDef::class("Inner")
          .constructor([Parameter::new("inner")])
          .factory(holder),
      );
    let injector = Injector::new(catalog);
    let err = injector
      .make_with("Outer", Definition::new().raw("inner", 1))
      .unwrap_err();
    assert!(matches!(
      err.as_injection().map(|err| err.kind()),
      Some(InjectionErrorKind::UndefinedParam { param, .. }) if param == "inner"
    ));
  }

  #[test]
  fn test_global_param_sits_between_definition_and_default() {
    let catalog = Catalog::new().with_type(
      TypeDef::class("Conn")
        .constructor([Parameter::new("dsn").with_default("default")])
        .factory(holder),
    );
    let injector = Injector::new(catalog);
    injector.define_param("dsn", "global").unwrap();
    let conn = injector.make("Conn").unwrap();
    assert_eq!(conn.downcast_ref::<Holder>().unwrap().0.as_str(), Some("global"));
    injector.define("Conn", Definition::new().raw("dsn", "defined")).unwrap();
    let conn = injector.make("Conn").unwrap();
    assert_eq!(conn.downcast_ref::<Holder>().unwrap().0.as_str(), Some("defined"));
  }

  #[test]
  fn test_variadic_gets_empty_list_or_wrapped_value() {
    let catalog = Catalog::new()
      .with_type(TypeDef::class("Dep").factory(|_| Ok(Empty)))
      .with_type(
        TypeDef::class("Many")
          .constructor([Parameter::new("deps").typed("Dep").variadic()])
          .factory(holder),
      );
    let injector = Injector::new(catalog);
    let many = injector.make("Many").unwrap();
    assert_eq!(many.downcast_ref::<Holder>().unwrap().0.as_list().map(|l| l.len()), Some(0));
    let many = injector
      .make_with("Many", Definition::new().class("deps", "Dep"))
      .unwrap();
    assert_eq!(many.downcast_ref::<Holder>().unwrap().0.as_list().map(|l| l.len()), Some(1));
  }

  #[test]
  fn test_preparer_replacement_must_be_compatible() {
    let catalog = Catalog::new()
      .with_type(TypeDef::interface("Port"))
      .with_type(TypeDef::class("Widget").implements("Port").factory(|_| Ok(Empty)))
      .with_type(TypeDef::class("Other").factory(|_| Ok(Empty)));
    let injector = Injector::new(catalog);
    let replacement = Instance::new("Widget", Empty);
    let expected = replacement.clone();
    injector
      .prepare("Port", move |_, _| Ok(Some(replacement.clone())))
      .unwrap()
      .prepare("Widget", |_, _| Ok(Some(Instance::new("Other", Empty))))
      .unwrap();
    let widget = injector.make("Widget").unwrap();
    assert!(Instance::ptr_eq(&widget, &expected));
  }

  #[test]
  fn test_preparers_run_in_registration_order() {
    let injector = Injector::new(Catalog::new().with_type(TypeDef::class("S").factory(|_| Ok(Empty))));
    let order = Arc::new(Mutex::new(Vec::new()));
    let replacement = Instance::new("S", Empty);

    let (log, swap) = (order.clone(), replacement.clone());
    injector
      .prepare("S", move |_, _| {
        log.lock().push(0);
        Ok(Some(swap.clone()))
      })
      .unwrap();
    let (log, expected) = (order.clone(), replacement.clone());
    injector
      .prepare("S", move |instance, _| {
        assert!(Instance::ptr_eq(instance, &expected));
        log.lock().push(1);
        Ok(None)
      })
      .unwrap();
    let log = order.clone();
    injector
      .prepare("s", move |_, _| {
        log.lock().push(2);
        Ok(None)
      })
      .unwrap();

    let s = injector.make("S").unwrap();
    assert!(Instance::ptr_eq(&s, &replacement));
    assert_eq!(*order.lock(), vec![0, 1, 2]);
  }

  #[test]
  fn test_preparers_run_for_undescribable_delegate_result() {
    let injector = Injector::new(Catalog::new().with_type(TypeDef::interface("Port")));
    let calls = Arc::new(Mutex::new(0));
    let seen = calls.clone();
    injector
      .delegate("Port", Function::closure([], |_| Ok(Instance::new("Ghost", Empty).into())))
      .unwrap()
      .prepare("Port", move |_, _| {
        *seen.lock() += 1;
        Ok(None)
      })
      .unwrap();
    assert_eq!(injector.make("Port").unwrap().class_name(), "Ghost");
    assert_eq!(*calls.lock(), 1);
  }

  #[test]
  fn test_class_without_factory_is_reported_as_such() {
    let injector = Injector::new(Catalog::new().with_type(TypeDef::class("Bare")));
    let err = injector.make("Bare").unwrap_err();
    assert!(matches!(
      err.as_injection().map(|err| err.kind()),
      Some(InjectionErrorKind::MissingFactory { type_name }) if type_name == "Bare"
    ));
    assert_eq!(err.to_string(), "class Bare has no factory to construct it with");
  }

  #[test]
  fn test_user_errors_pass_through() {
    let catalog = Catalog::new().with_type(
      TypeDef::class("Broken").factory(|_| -> anyhow::Result<Empty> { anyhow::bail!("Exception in constructor") }),
    );
    let injector = Injector::new(catalog);
    let err = injector.make("Broken").unwrap_err();
    assert!(matches!(err, Error::Service(_)));
    assert_eq!(err.to_string(), "Exception in constructor");
  }

  #[test]
  fn test_unknown_type_is_unloadable() {
    let injector = Injector::new(Catalog::new());
    let err = injector.make("Nope").unwrap_err();
    assert_eq!(err.to_string(), "could not make Nope: type Nope does not exist");
    assert!(matches!(injector.alias("A", ""), Err(ConfigError::EmptyAlias)));
  }

  #[test]
  fn test_alias_loop_is_a_cycle() {
    let injector = Injector::new(Catalog::new());
    injector.alias("A", "B").unwrap().alias("B", "A").unwrap();
    let err = injector.make("A").unwrap_err();
    assert!(matches!(
      err.as_injection().map(|err| err.kind()),
      Some(InjectionErrorKind::CyclicDependency { type_name, .. }) if type_name == "a"
    ));
  }
}
