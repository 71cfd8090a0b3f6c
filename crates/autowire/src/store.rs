use std::collections::BTreeMap;

use crate::value::Instance;

#[derive(Debug, Clone)]
pub(crate) enum InstanceSlot {
  /// Shared, but nothing has been built yet.
  Pending,
  Resolved(Instance),
}

impl InstanceSlot {
  pub fn instance(&self) -> Option<&Instance> {
    match self {
      InstanceSlot::Pending => None,
      InstanceSlot::Resolved(instance) => Some(instance),
    }
  }
}

/// Shared instances, keyed by normalized type name.
#[derive(Debug, Default)]
pub(crate) struct SingletonStore {
  slots: BTreeMap<String, InstanceSlot>,
}

impl SingletonStore {
  pub fn get(&self, key: &str) -> Option<&InstanceSlot> {
    self.slots.get(key)
  }

  pub fn resolved(&self, key: &str) -> Option<Instance> {
    self.slots.get(key).and_then(|slot| slot.instance().cloned())
  }

  /// Marks `key` shared. An existing slot, built or not, is kept.
  pub fn mark(&mut self, key: String) {
    self.slots.entry(key).or_insert(InstanceSlot::Pending);
  }

  pub fn insert(&mut self, key: String, instance: Instance) {
    self.slots.insert(key, InstanceSlot::Resolved(instance));
  }

  /// Stores `instance` only if `key` is shared.
  pub fn promote(&mut self, key: &str, instance: &Instance) -> bool {
    match self.slots.get_mut(key) {
      Some(slot) => {
        *slot = InstanceSlot::Resolved(instance.clone());
        true
      }
      None => false,
    }
  }

  /// Moves a slot to a new key, keeping whatever the new key already holds.
  pub fn rebind(&mut self, from: &str, to: String) {
    if let Some(slot) = self.slots.remove(from) {
      self.slots.entry(to).or_insert(slot);
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &InstanceSlot)> {
    self.slots.iter()
  }
}
