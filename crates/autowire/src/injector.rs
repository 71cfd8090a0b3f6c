use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::definition::Definition;
use crate::error::ConfigError;
use crate::executable::Invocable;
use crate::helpers::normalize_name;
use crate::reflection::{Reflector, TypeIntrospector};
use crate::registry::{InspectFilter, Inspection, Preparer, Registry};
use crate::store::{InstanceSlot, SingletonStore};
use crate::value::{Instance, Value};

/// What [`Injector::share`] accepts.
#[derive(Debug, Clone)]
pub enum Share {
  /// Share whatever the container builds for this type.
  Type(String),
  /// Use this object for its own class from now on.
  Instance(Instance),
}

impl From<&str> for Share {
  fn from(name: &str) -> Self {
    Share::Type(name.to_string())
  }
}

impl From<String> for Share {
  fn from(name: String) -> Self {
    Share::Type(name)
  }
}

impl From<Instance> for Share {
  fn from(instance: Instance) -> Self {
    Share::Instance(instance)
  }
}

#[derive(Debug, Default)]
pub(crate) struct State {
  pub registry: Registry,
  pub singletons: SingletonStore,
  /// Normalized names of the types being made, outermost first.
  pub stack: Vec<String>,
}

/// The container. All operations take `&self`, so an `Injector` can be
/// shared across threads behind an `Arc`; calls from different threads are
/// serialized, while re-entrant calls from factories and preparers on the
/// same thread are allowed.
pub struct Injector {
  state: ReentrantMutex<RefCell<State>>,
  pub(crate) reflector: Reflector,
}

impl Injector {
  pub fn new<I>(introspector: I) -> Self
    where I: TypeIntrospector
  {
    Self::from_arc(Arc::new(introspector))
  }

  pub fn from_arc(introspector: Arc<dyn TypeIntrospector>) -> Self {
    Injector {
      state: ReentrantMutex::new(RefCell::new(State::default())),
      reflector: Reflector::new(introspector),
    }
  }

  /// Holds the container for the current thread until the guard drops.
  pub(crate) fn serialize(&self) -> ReentrantMutexGuard<'_, RefCell<State>> {
    self.state.lock()
  }

  /// Runs `f` against the container state. `f` must not call back into user
  /// code.
  pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
    let guard = self.state.lock();
    let mut state = guard.borrow_mut();
    f(&mut state)
  }

  /// Makes requests for `name` produce `target` instead.
  pub fn alias(&self, name: &str, target: &str) -> Result<&Self, ConfigError> {
    if name.trim().is_empty() || target.trim().is_empty() {
      return Err(ConfigError::EmptyAlias);
    }
    let key = normalize_name(name);
    let target_key = normalize_name(target);
    self.with_state(|state| {
      let destination = state.registry.resolve_alias(target).value;
      let conflicting = match state.singletons.get(&key) {
        Some(InstanceSlot::Resolved(instance)) => normalize_name(instance.class_name()) != target_key,
        _ => false,
      };
      if conflicting {
        return Err(ConfigError::SharedCannotAlias {
          name: key.clone(),
          target: target.to_string(),
        });
      }
      state.singletons.rebind(&key, destination);
      state.registry.alias(name, target);
      Ok(())
    })?;
    tracing::debug!("alias {} -> {}", name, target);
    Ok(self)
  }

  /// Marks a type shared, or stores an instance as the shared one for its
  /// class. Sharing a type twice keeps whatever was already built.
  pub fn share(&self, target: impl Into<Share>) -> Result<&Self, ConfigError> {
    match target.into() {
      Share::Type(name) => {
        if name.trim().is_empty() {
          return Err(ConfigError::EmptyTypeName);
        }
        self.with_state(|state| {
          let key = state.registry.resolve_alias(&name).value;
          tracing::debug!("share {}", key);
          state.singletons.mark(key);
        });
      }
      Share::Instance(instance) => {
        let key = normalize_name(instance.class_name());
        self.with_state(|state| {
          if let Some(target) = state.registry.alias_of(&key) {
            if normalize_name(target) != key {
              return Err(ConfigError::AliasedCannotShare {
                target: target.to_string(),
                name: key,
              });
            }
          }
          tracing::debug!("share instance of {}", key);
          state.singletons.insert(key, instance);
          Ok(())
        })?;
      }
    }
    Ok(self)
  }

  /// Stores the argument choices used whenever `name` is constructed.
  /// Replaces any previous definition for the same type.
  pub fn define(&self, name: &str, definition: Definition) -> Result<&Self, ConfigError> {
    if name.trim().is_empty() {
      return Err(ConfigError::EmptyTypeName);
    }
    self.with_state(|state| state.registry.define(name, definition));
    Ok(self)
  }

  /// Value for any untyped parameter called `name` that nothing else covers.
  pub fn define_param(&self, name: &str, value: impl Into<Value>) -> Result<&Self, ConfigError> {
    if name.is_empty() {
      return Err(ConfigError::EmptyParamName);
    }
    let value = value.into();
    self.with_state(|state| state.registry.define_param(name, value));
    Ok(self)
  }

  /// Builds `name` by executing `invocable`. The invocable must be
  /// locatable now, but nothing is constructed until `name` is made.
  pub fn delegate(&self, name: &str, invocable: impl Into<Invocable>) -> Result<&Self, ConfigError> {
    if name.trim().is_empty() {
      return Err(ConfigError::EmptyTypeName);
    }
    let invocable = invocable.into();
    if !self.is_invocable(&invocable) {
      return Err(ConfigError::InvalidDelegate {
        received: invocable.describe(),
      });
    }
    tracing::debug!("delegate {} -> {}", name, invocable.describe());
    self.with_state(|state| state.registry.delegate(name, invocable));
    Ok(self)
  }

  /// Registers a hook run on every instance of `name` or one of its subtypes
  /// after construction.
  pub fn prepare<F>(&self, name: &str, preparer: F) -> Result<&Self, ConfigError>
    where F: Fn(&Instance, &Injector) -> anyhow::Result<Option<Instance>> + Send + Sync + 'static
  {
    if name.trim().is_empty() {
      return Err(ConfigError::EmptyTypeName);
    }
    let preparer: Preparer = Arc::new(preparer);
    self.with_state(|state| state.registry.prepare(name, preparer));
    Ok(self)
  }

  /// Copies registry state, optionally scoped to one type name.
  pub fn inspect(&self, name: Option<&str>, filter: InspectFilter) -> Inspection {
    let key = name.map(normalize_name);
    self.with_state(|state| {
      let shares = state
        .singletons
        .iter()
        .map(|(key, slot)| (key, slot.instance().cloned()));
      state.registry.snapshot(shares, key.as_deref(), filter)
    })
  }
}

impl fmt::Debug for Injector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let guard = self.state.lock();
    let result = match guard.try_borrow() {
      Ok(state) => f
        .debug_struct("Injector")
        .field("registry", &state.registry)
        .field("singletons", &state.singletons)
        .field("reflector", &self.reflector)
        .finish(),
      Err(_) => f.debug_struct("Injector").finish_non_exhaustive(),
    };
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::{Catalog, TypeDef};

  struct Widget;

  fn injector() -> Injector {
    Injector::new(
      Catalog::new()
        .with_type(TypeDef::interface("Port"))
        .with_type(TypeDef::class("Widget").implements("Port").factory(|_| Ok(Widget)))
        .with_type(TypeDef::class("Gadget").factory(|_| Ok(Widget))),
    )
  }

  #[test]
  fn test_empty_names_are_rejected() {
    let injector = injector();
    assert_eq!(injector.alias("", "Widget").unwrap_err(), ConfigError::EmptyAlias);
    assert_eq!(injector.alias("Port", " ").unwrap_err(), ConfigError::EmptyAlias);
    assert_eq!(injector.share("").unwrap_err(), ConfigError::EmptyTypeName);
    assert_eq!(injector.define("", Definition::new()).unwrap_err(), ConfigError::EmptyTypeName);
    assert_eq!(injector.define_param("", 1).unwrap_err(), ConfigError::EmptyParamName);
  }

  #[test]
  fn test_share_then_alias_moves_pending_share() {
    let injector = injector();
    injector.share("Port").unwrap().alias("Port", "Widget").unwrap();
    let shares = injector.inspect(None, InspectFilter::SHARES).shares;
    assert_eq!(shares.keys().collect::<Vec<_>>(), vec!["widget"]);
  }

  #[test]
  fn test_alias_after_built_share_of_other_class_fails() {
    let injector = injector();
    injector.share(Instance::new("Widget", Widget)).unwrap();
    assert_eq!(
      injector.alias("Widget", "Gadget").unwrap_err(),
      ConfigError::SharedCannotAlias {
        name: "widget".to_string(),
        target: "Gadget".to_string()
      }
    );
  }

  #[test]
  fn test_sharing_instance_of_aliased_class_fails() {
    let injector = injector();
    injector.alias("Widget", "Gadget").unwrap();
    assert_eq!(
      injector.share(Instance::new("Widget", Widget)).unwrap_err(),
      ConfigError::AliasedCannotShare {
        name: "widget".to_string(),
        target: "Gadget".to_string()
      }
    );
  }

  #[test]
  fn test_invalid_delegate_is_rejected_at_registration() {
    let injector = injector();
    assert_eq!(
      injector.delegate("Port", "no_such_function").unwrap_err(),
      ConfigError::InvalidDelegate {
        received: "no_such_function".to_string()
      }
    );
    assert_eq!(
      injector.delegate("Port", ("Widget", "missing")).unwrap_err(),
      ConfigError::InvalidDelegate {
        received: "Widget::missing".to_string()
      }
    );
  }

  #[test]
  fn test_inspect_by_name() {
    let injector = injector();
    injector
      .define("Widget", Definition::new().raw("a", 1))
      .unwrap()
      .prepare("widget", |_, _| Ok(None))
      .unwrap()
      .alias("Port", "Widget")
      .unwrap();
    let widget = injector.inspect(Some("\\WIDGET"), InspectFilter::default());
    assert_eq!(widget.definitions.len(), 1);
    assert_eq!(widget.preparers.get("widget"), Some(&1));
    assert!(widget.aliases.is_empty());
    let port = injector.inspect(Some("Port"), InspectFilter::ALIASES);
    assert_eq!(port.aliases.get("port").map(String::as_str), Some("Widget"));
  }
}
