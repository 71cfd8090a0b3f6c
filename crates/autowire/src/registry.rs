//! User-declared bindings. Storage only: deciding what a binding means is the
//! resolver's job.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::definition::Definition;
use crate::executable::Invocable;
use crate::helpers::{normalize_name, Named};
use crate::injector::Injector;
use crate::value::{Instance, Value};

/// Post-construction hook. Returning `Some` replaces the instance, provided
/// the replacement is of a compatible type.
pub type Preparer =
  Arc<dyn Fn(&Instance, &Injector) -> anyhow::Result<Option<Instance>> + Send + Sync>;

#[derive(Default)]
pub(crate) struct Registry {
  /// Alias targets in the casing they were registered with.
  aliases: BTreeMap<String, String>,
  delegates: BTreeMap<String, Invocable>,
  definitions: BTreeMap<String, Definition>,
  params: BTreeMap<String, Value>,
  preparers: BTreeMap<String, Vec<Preparer>>,
}

impl Registry {
  pub fn alias(&mut self, name: &str, target: &str) {
    self.aliases.insert(normalize_name(name), target.to_string());
  }

  /// Alias target of `key`, in the casing it was registered with.
  pub fn alias_of(&self, key: &str) -> Option<&str> {
    self.aliases.get(key).map(String::as_str)
  }

  /// Follows the alias chain from `name`. A loop stops at the first repeated
  /// name, which the resolver then reports as a cycle.
  pub fn resolve_alias(&self, name: &str) -> Named<String> {
    let mut display = name.to_string();
    let mut key = normalize_name(name);
    let mut seen = HashSet::new();
    while let Some(target) = self.aliases.get(&key) {
      if !seen.insert(key.clone()) {
        break;
      }
      display = target.clone();
      key = normalize_name(target);
    }
    Named::new(display, key)
  }

  pub fn is_aliased(&self, key: &str) -> bool {
    self.aliases.contains_key(key)
  }

  pub fn delegate(&mut self, name: &str, invocable: Invocable) {
    self.delegates.insert(normalize_name(name), invocable);
  }

  pub fn delegate_of(&self, key: &str) -> Option<Invocable> {
    self.delegates.get(key).cloned()
  }

  pub fn define(&mut self, name: &str, definition: Definition) {
    self.definitions.insert(normalize_name(name), definition);
  }

  pub fn definition_of(&self, key: &str) -> Option<Definition> {
    self.definitions.get(key).cloned()
  }

  pub fn define_param(&mut self, name: &str, value: Value) {
    self.params.insert(name.to_string(), value);
  }

  pub fn param(&self, name: &str) -> Option<Value> {
    self.params.get(name).cloned()
  }

  pub fn prepare(&mut self, name: &str, preparer: Preparer) {
    self.preparers.entry(normalize_name(name)).or_default().push(preparer);
  }

  pub fn preparers_of(&self, key: &str) -> Vec<Preparer> {
    self.preparers.get(key).cloned().unwrap_or_default()
  }

  pub fn snapshot<'a>(
    &self,
    shares: impl Iterator<Item = (&'a String, Option<Instance>)>,
    key: Option<&str>,
    filter: InspectFilter,
  ) -> Inspection {
    let wanted = |k: &str| key.map_or(true, |key| key == k);
    let mut inspection = Inspection::default();
    if filter.contains(InspectFilter::DEFINITIONS) {
      inspection.definitions = self
        .definitions
        .iter()
        .filter(|(k, _)| wanted(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    }
    if filter.contains(InspectFilter::DELEGATES) {
      inspection.delegates = self
        .delegates
        .iter()
        .filter(|(k, _)| wanted(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    }
    if filter.contains(InspectFilter::PREPARERS) {
      inspection.preparers = self
        .preparers
        .iter()
        .filter(|(k, _)| wanted(k.as_str()))
        .map(|(k, v)| (k.clone(), v.len()))
        .collect();
    }
    if filter.contains(InspectFilter::ALIASES) {
      inspection.aliases = self
        .aliases
        .iter()
        .filter(|(k, _)| wanted(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    }
    if filter.contains(InspectFilter::SHARES) {
      inspection.shares = shares
        .filter(|(k, _)| wanted(k.as_str()))
        .map(|(k, v)| (k.clone(), v))
        .collect();
    }
    inspection
  }
}

bitflags! {
  /// Registry categories returned by [`Injector::inspect`].
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub struct InspectFilter: u8 {
    const DEFINITIONS = 1;
    const DELEGATES = 1 << 1;
    const PREPARERS = 1 << 2;
    const ALIASES = 1 << 3;
    const SHARES = 1 << 4;
  }
}

impl Default for InspectFilter {
  fn default() -> Self {
    InspectFilter::all()
  }
}

/// Read-only copy of registry state. Categories left out by the filter are
/// empty.
#[derive(Debug, Clone, Default)]
pub struct Inspection {
  pub definitions: BTreeMap<String, Definition>,
  pub delegates: BTreeMap<String, Invocable>,
  /// Number of preparers per type.
  pub preparers: BTreeMap<String, usize>,
  /// Alias targets in the casing they were registered with.
  pub aliases: BTreeMap<String, String>,
  /// `None` marks a shared type that has not been built yet.
  pub shares: BTreeMap<String, Option<Instance>>,
}

impl Inspection {
  /// How many categories hold at least one entry.
  pub fn populated(&self) -> usize {
    [
      !self.definitions.is_empty(),
      !self.delegates.is_empty(),
      !self.preparers.is_empty(),
      !self.aliases.is_empty(),
      !self.shares.is_empty(),
    ]
    .iter()
    .filter(|populated| **populated)
    .count()
  }
}

impl fmt::Debug for Registry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Registry")
      .field("aliases", &self.aliases)
      .field("delegates", &self.delegates)
      .field("definitions", &self.definitions)
      .field("params", &self.params)
      .field("preparers", &self.preparers.keys().collect::<Vec<_>>())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_alias_chain_is_followed() {
    let mut registry = Registry::default();
    registry.alias("A", "B");
    registry.alias("b", "App\\C");
    let resolved = registry.resolve_alias("a");
    assert_eq!(resolved.name, "App\\C");
    assert_eq!(resolved.value, "app\\c");
  }

  #[test]
  fn test_lookups_use_normalized_keys() {
    let mut registry = Registry::default();
    registry.alias("\\Port", "App\\Widget");
    registry.delegate("Port", Invocable::from("make_port"));
    assert_eq!(registry.alias_of("port"), Some("App\\Widget"));
    assert_eq!(registry.alias_of("Port"), None);
    assert_eq!(registry.delegate_of("port").map(|d| d.describe()).as_deref(), Some("make_port"));
  }

  #[test]
  fn test_alias_loop_terminates() {
    let mut registry = Registry::default();
    registry.alias("A", "B");
    registry.alias("B", "A");
    assert_eq!(registry.resolve_alias("A").value, "a");
  }

  #[test]
  fn test_define_replaces_previous_definition() {
    let mut registry = Registry::default();
    registry.define("Foo", Definition::new().raw("a", 1).raw("b", 2));
    registry.define("\\foo", Definition::new().raw("a", 3));
    assert_eq!(registry.definition_of("foo").unwrap().len(), 1);
  }

  #[test]
  fn test_snapshot_scoped_to_one_type() {
    let mut registry = Registry::default();
    registry.alias("I", "Impl");
    registry.define("Impl", Definition::new().raw("a", 1));
    registry.prepare(
      "Impl",
      Arc::new(|_: &Instance, _: &Injector| -> anyhow::Result<Option<Instance>> { Ok(None) }),
    );
    let all = registry.snapshot(std::iter::empty(), None, InspectFilter::all());
    assert_eq!(all.populated(), 3);
    let some = registry.snapshot(std::iter::empty(), Some("impl"), InspectFilter::all());
    assert_eq!(some.populated(), 2);
    let filtered = registry.snapshot(std::iter::empty(), None, InspectFilter::ALIASES);
    assert_eq!(filtered.populated(), 1);
  }
}
