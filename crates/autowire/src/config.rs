//! Declarative registry configuration.
//!
//! ```json
//! {
//!   "aliases": { "Logger": "FileLogger" },
//!   "shares": ["FileLogger"],
//!   "definitions": {
//!     "FileLogger": { "path": "/var/log/app.log", "clock": { "class": "SystemClock" } }
//!   },
//!   "params": { "timeout": 30 }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::definition::{Arg, Definition, ParamKey};
use crate::error::ConfigError;
use crate::injector::Injector;
use crate::value::Value;

/// One argument of a definition: `{"class": "Type"}` is made through the
/// container, anything else is injected as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgConfig {
  Class { class: String },
  Raw(serde_json::Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InjectorConfig {
  /// Requested type to the type that replaces it.
  pub aliases: BTreeMap<String, String>,
  pub shares: Vec<String>,
  /// Type name to parameter name (or position) to argument.
  pub definitions: BTreeMap<String, BTreeMap<String, ArgConfig>>,
  /// Global values for untyped parameters, by parameter name.
  pub params: BTreeMap<String, serde_json::Value>,
}

impl InjectorConfig {
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
  }

  /// Registers everything on `injector`. Aliases go first so shares and
  /// definitions land on the types that will actually be built.
  pub fn apply(&self, injector: &Injector) -> Result<(), ConfigError> {
    for (name, target) in &self.aliases {
      injector.alias(name, target)?;
    }
    for name in &self.shares {
      injector.share(name.as_str())?;
    }
    for (type_name, args) in &self.definitions {
      let mut definition = Definition::new();
      for (param, arg) in args {
        let key = match param.parse::<usize>() {
          Ok(position) => ParamKey::Position(position),
          Err(_) => ParamKey::Name(param.clone()),
        };
        let arg = match arg {
          ArgConfig::Class { class } => Arg::Class(class.clone()),
          ArgConfig::Raw(raw) => Arg::Raw(to_value(&format!("{}.{}", type_name, param), raw)?),
        };
        definition = definition.with(key, arg);
      }
      injector.define(type_name, definition)?;
    }
    for (name, raw) in &self.params {
      injector.define_param(name, to_value(name, raw)?)?;
    }
    tracing::debug!(
      "applied config: {} aliases, {} shares, {} definitions, {} params",
      self.aliases.len(),
      self.shares.len(),
      self.definitions.len(),
      self.params.len()
    );
    Ok(())
  }
}

fn to_value(name: &str, raw: &serde_json::Value) -> Result<Value, ConfigError> {
  Ok(match raw {
    serde_json::Value::Null => Value::Null,
    serde_json::Value::Bool(v) => Value::Bool(*v),
    serde_json::Value::Number(n) => match n.as_i64() {
      Some(v) => Value::Int(v),
      None => n.as_f64().map(Value::Float).ok_or_else(|| ConfigError::UnsupportedValue {
        name: name.to_string(),
        reason: format!("number {} is out of range", n),
      })?,
    },
    serde_json::Value::String(s) => Value::Str(s.clone()),
    serde_json::Value::Array(items) => Value::List(
      items
        .iter()
        .map(|item| to_value(name, item))
        .collect::<Result<_, _>>()?,
    ),
    serde_json::Value::Object(_) => {
      return Err(ConfigError::UnsupportedValue {
        name: name.to_string(),
        reason: "objects cannot be injected as raw values".to_string(),
      })
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::{Catalog, TypeDef};
  use crate::reflection::Parameter;
  use crate::registry::InspectFilter;

  #[test]
  fn test_parse_and_apply() {
    let config = InjectorConfig::from_json(
      r#"{
        "aliases": { "Logger": "FileLogger" },
        "shares": ["Logger"],
        "definitions": {
          "FileLogger": { "path": "/tmp/app.log", "1": { "class": "Clock" }, "levels": ["info", 2] }
        },
        "params": { "timeout": 1.5 }
      }"#,
    )
    .unwrap();
    assert_eq!(
      config.definitions["FileLogger"]["1"],
      ArgConfig::Class { class: "Clock".to_string() }
    );

    let injector = Injector::new(Catalog::new());
    config.apply(&injector).unwrap();
    let inspection = injector.inspect(None, InspectFilter::all());
    assert_eq!(inspection.aliases["logger"], "FileLogger");
    assert!(inspection.shares.contains_key("filelogger"));
    let definition = &inspection.definitions["filelogger"];
    assert_eq!(definition.len(), 3);
    assert!(matches!(
      definition.lookup(&Parameter { position: 1, ..Parameter::new("clock") }),
      Some(Arg::Class(class)) if class == "Clock"
    ));
  }

  #[test]
  fn test_unknown_fields_are_rejected() {
    let err = InjectorConfig::from_json(r#"{ "services": [] }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
  }

  #[test]
  fn test_object_raw_values_are_rejected() {
    let config = InjectorConfig::from_json(r#"{ "params": { "opts": { "a": 1 } } }"#).unwrap();
    let injector = Injector::new(Catalog::new().with_type(TypeDef::class("Unused")));
    assert!(matches!(
      config.apply(&injector),
      Err(ConfigError::UnsupportedValue { name, .. }) if name == "opts"
    ));
  }
}
