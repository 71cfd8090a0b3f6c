use std::collections::BTreeMap;

use crate::executable::Invocable;
use crate::reflection::Parameter;
use crate::value::Value;

/// Addresses one parameter of a signature.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParamKey {
  Position(usize),
  Name(String),
}

/// How to produce one argument.
#[derive(Debug, Clone)]
pub enum Arg {
  /// Injected verbatim, never interpreted as a type name.
  Raw(Value),
  /// Made through the container, subject to aliases, delegates and shares.
  Class(String),
  /// The result of executing the invocable.
  Delegate(Invocable),
}

/// Explicit argument choices for one signature. Positional keys take
/// precedence over names.
#[derive(Debug, Clone, Default)]
pub struct Definition {
  args: BTreeMap<ParamKey, Arg>,
}

impl Definition {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn raw(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.with(ParamKey::Name(name.into()), Arg::Raw(value.into()))
  }

  pub fn class(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
    self.with(ParamKey::Name(name.into()), Arg::Class(type_name.into()))
  }

  pub fn delegate(self, name: impl Into<String>, invocable: impl Into<Invocable>) -> Self {
    self.with(ParamKey::Name(name.into()), Arg::Delegate(invocable.into()))
  }

  pub fn at(self, position: usize, arg: Arg) -> Self {
    self.with(ParamKey::Position(position), arg)
  }

  pub fn with(mut self, key: ParamKey, arg: Arg) -> Self {
    self.args.insert(key, arg);
    self
  }

  pub fn len(&self) -> usize {
    self.args.len()
  }

  pub fn is_empty(&self) -> bool {
    self.args.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &Arg)> {
    self.args.iter()
  }

  pub(crate) fn lookup(&self, param: &Parameter) -> Option<&Arg> {
    self
      .args
      .get(&ParamKey::Position(param.position))
      .or_else(|| self.args.get(&ParamKey::Name(param.name.clone())))
  }

  /// `self` layered on top of `base`: keys present in `self` win.
  pub(crate) fn over(&self, base: &Definition) -> Definition {
    let mut args = base.args.clone();
    args.extend(self.args.iter().map(|(k, v)| (k.clone(), v.clone())));
    Definition { args }
  }
}
