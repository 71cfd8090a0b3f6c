//! An in-memory [`TypeIntrospector`] populated by explicit registration.
//!
//! ```
//! use autowire::{Catalog, Parameter, TypeDef};
//!
//! struct Engine;
//! struct Car { engine: std::sync::Arc<Engine> }
//!
//! let catalog = Catalog::new()
//!   .with_type(TypeDef::class("Engine").factory(|_| Ok(Engine)))
//!   .with_type(
//!     TypeDef::class("Car")
//!       .constructor([Parameter::new("engine").typed("Engine")])
//!       .factory(|args| Ok(Car { engine: args.instance(0)? })),
//!   );
//! # let _ = catalog;
//! ```

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::helpers::normalize_name;
use crate::reflection::{
  positioned, Constructor, FactoryFn, Function, LoadError, Method, Parameter, TypeInfo,
  TypeIntrospector, TypeKind,
};
use crate::value::{ArcAny, Arguments};

/// Declaration of one type, as the catalog stores it.
#[derive(Clone)]
pub struct TypeDef {
  name: String,
  kind: TypeKind,
  parent: Option<String>,
  interfaces: Vec<String>,
  constructor: Option<(bool, Vec<Parameter>)>,
  factory: Option<FactoryFn>,
  methods: Vec<Method>,
}

impl TypeDef {
  fn new(name: impl Into<String>, kind: TypeKind) -> Self {
    TypeDef {
      name: name.into(),
      kind,
      parent: None,
      interfaces: Vec::new(),
      constructor: None,
      factory: None,
      methods: Vec::new(),
    }
  }

  pub fn class(name: impl Into<String>) -> Self {
    Self::new(name, TypeKind::Class)
  }

  pub fn abstract_class(name: impl Into<String>) -> Self {
    Self::new(name, TypeKind::AbstractClass)
  }

  pub fn interface(name: impl Into<String>) -> Self {
    Self::new(name, TypeKind::Interface)
  }

  pub fn extends(mut self, parent: impl Into<String>) -> Self {
    self.parent = Some(parent.into());
    self
  }

  pub fn implements(mut self, interface: impl Into<String>) -> Self {
    self.interfaces.push(interface.into());
    self
  }

  pub fn constructor(mut self, params: impl IntoIterator<Item = Parameter>) -> Self {
    self.constructor = Some((true, positioned(params)));
    self
  }

  /// Declares a constructor the container is not allowed to call.
  pub fn private_constructor(mut self, params: impl IntoIterator<Item = Parameter>) -> Self {
    self.constructor = Some((false, positioned(params)));
    self
  }

  pub fn factory<T, F>(mut self, factory: F) -> Self
    where
      T: Any + Send + Sync,
      F: Fn(Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
  {
    self.factory = Some(Arc::new(move |args: Arguments| factory(args).map(|v| Arc::new(v) as ArcAny)));
    self
  }

  pub fn method(mut self, method: Method) -> Self {
    self.methods.push(method);
    self
  }
}

#[derive(Clone, Default)]
pub struct Catalog {
  types: HashMap<String, TypeDef>,
  functions: HashMap<String, Function>,
}

impl Catalog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_type(mut self, def: TypeDef) -> Self {
    self.add_type(def);
    self
  }

  pub fn with_function(mut self, function: Function) -> Self {
    self.add_function(function);
    self
  }

  pub fn add_type(&mut self, mut def: TypeDef) -> &mut Self {
    for method in &mut def.methods {
      method.declared_in = def.name.clone();
    }
    self.types.insert(normalize_name(&def.name), def);
    self
  }

  pub fn add_function(&mut self, function: Function) -> &mut Self {
    self.functions.insert(normalize_name(&function.name), function);
    self
  }

  fn lookup(&self, name: &str) -> Result<&TypeDef, LoadError> {
    self
      .types
      .get(&normalize_name(name))
      .ok_or_else(|| LoadError::TypeNotFound(name.to_string()))
  }

  /// Parent chain starting at `def` itself. A parent that is not registered
  /// is a load failure, as is a loop in the chain.
  fn lineage<'a>(&'a self, def: &'a TypeDef) -> Result<Vec<&'a TypeDef>, LoadError> {
    let mut chain = vec![def];
    let mut seen = HashSet::new();
    seen.insert(normalize_name(&def.name));
    let mut current = def;
    while let Some(parent) = &current.parent {
      let parent_def = self.lookup(parent)?;
      if !seen.insert(normalize_name(&parent_def.name)) {
        return Err(LoadError::TypeNotFound(parent.clone()));
      }
      chain.push(parent_def);
      current = parent_def;
    }
    Ok(chain)
  }

  fn collect_interfaces(&self, def: &TypeDef, out: &mut Vec<String>, seen: &mut HashSet<String>) {
    for interface in &def.interfaces {
      if seen.insert(normalize_name(interface)) {
        out.push(interface.clone());
        if let Ok(interface_def) = self.lookup(interface) {
          self.collect_interfaces(interface_def, out, seen);
        }
      }
    }
  }
}

impl TypeIntrospector for Catalog {
  fn describe(&self, type_name: &str) -> Result<TypeInfo, LoadError> {
    let def = self.lookup(type_name)?;
    let lineage = self.lineage(def)?;

    let mut ancestors: Vec<String> = lineage[1..].iter().map(|d| d.name.clone()).collect();
    let mut seen: HashSet<String> = ancestors.iter().map(|a| normalize_name(a)).collect();
    for each in &lineage {
      self.collect_interfaces(each, &mut ancestors, &mut seen);
    }

    let constructor = lineage.iter().find_map(|each| {
      each.constructor.as_ref().map(|(public, params)| Constructor {
        public: *public,
        params: params.clone(),
        declared_in: each.name.clone(),
      })
    });

    let mut methods = BTreeMap::new();
    for each in lineage.iter().rev() {
      for method in &each.methods {
        methods.insert(method.name.to_lowercase(), Arc::new(method.clone()));
      }
    }

    Ok(TypeInfo {
      name: def.name.clone(),
      kind: def.kind,
      parent: def.parent.clone(),
      ancestors,
      constructor,
      factory: if def.kind.is_concrete() { def.factory.clone() } else { None },
      methods,
    })
  }

  fn function(&self, name: &str) -> Result<Function, LoadError> {
    self
      .functions
      .get(&normalize_name(name))
      .cloned()
      .ok_or_else(|| LoadError::FunctionNotFound(name.to_string()))
  }
}
