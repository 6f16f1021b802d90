//! Parameter declaration and resolution.
//!
//! Build authors declare parameters as [`ParameterDescriptor`]s in a
//! [`ParameterRegistry`]. A [`ParameterResolver`] then resolves each one lazily from
//! a fixed chain of sources:
//!
//! 1. an explicit value for this invocation (`-p Name=value`)
//! 2. an environment variable named after the parameter (`CargoPath` reads `CARGO_PATH`)
//! 3. the descriptor's computed default
//! 4. absence
//!
//! The first resolution of a parameter is cached for the rest of the invocation.

mod resolver;
mod types;

pub use resolver::{ParameterResolver, ResolverConfig, env_var_name, normalize_key};
pub use types::*;

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::consts::{BUILD_SERVER_PARAM, IS_SERVER_BUILD_PARAM};

/// Errors raised while resolving parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
  /// A required parameter has no value from any source.
  #[error("missing required parameter '{name}' (pass -p {name}=VALUE or set {env_var})")]
  MissingRequired { name: String, env_var: String },

  /// A raw value could not be converted to the declared type.
  #[error("invalid value '{raw}' for parameter '{name}' (from {origin}): expected {expected}")]
  Conversion {
    name: String,
    raw: String,
    expected: String,
    origin: ParamSource,
  },

  /// A parameter name that no descriptor declares.
  #[error("unknown parameter '{name}'")]
  UnknownParameter { name: String },
}

impl fmt::Display for ParamSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParamSource::Explicit => write!(f, "explicit value"),
      ParamSource::Environment => write!(f, "environment"),
      ParamSource::Default => write!(f, "default"),
    }
  }
}

/// Ordered set of parameter descriptors, unique by name.
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
  descriptors: Vec<ParameterDescriptor>,
  index: HashMap<String, usize>,
}

impl ParameterRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding the built-in build environment parameters.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    registry.register(
      ParameterDescriptor::new(IS_SERVER_BUILD_PARAM, ParamKind::Bool)
        .describe("Whether the build runs on a build server")
        .default_value("false"),
    );
    registry.register(
      ParameterDescriptor::new(BUILD_SERVER_PARAM, ParamKind::String).describe("Kind of build server running the build"),
    );
    registry
  }

  /// Add a descriptor. A descriptor with the same name is replaced in place.
  pub fn register(&mut self, descriptor: ParameterDescriptor) -> &mut Self {
    match self.index.get(&descriptor.name) {
      Some(&position) => self.descriptors[position] = descriptor,
      None => {
        self.index.insert(descriptor.name.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
      }
    }
    self
  }

  /// Fold another registry into this one. Later declarations win.
  pub fn merge(&mut self, other: ParameterRegistry) {
    for descriptor in other.descriptors {
      self.register(descriptor);
    }
  }

  pub fn get(&self, name: &str) -> Option<&ParameterDescriptor> {
    self.index.get(name).map(|&position| &self.descriptors[position])
  }

  pub fn contains(&self, name: &str) -> bool {
    self.index.contains_key(name)
  }

  /// Find a descriptor by a loosely spelled key (`cargo-path`, `CARGO_PATH`, `cargoPath`).
  pub fn find(&self, key: &str) -> Option<&ParameterDescriptor> {
    let key = normalize_key(key);
    self.descriptors.iter().find(|descriptor| normalize_key(&descriptor.name) == key)
  }

  /// Descriptors in registration order.
  pub fn descriptors(&self) -> &[ParameterDescriptor] {
    &self.descriptors
  }

  pub fn len(&self) -> usize {
    self.descriptors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.descriptors.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtins_are_registered() {
    let registry = ParameterRegistry::with_builtins();
    assert!(registry.contains("IsServerBuild"));
    assert!(registry.contains("BuildServer"));
    assert_eq!(registry.get("IsServerBuild").unwrap().kind, ParamKind::Bool);
  }

  #[test]
  fn register_replaces_in_place() {
    let mut registry = ParameterRegistry::new();
    registry
      .register(ParameterDescriptor::new("Configuration", ParamKind::String))
      .register(ParameterDescriptor::new("Verbosity", ParamKind::Integer))
      .register(ParameterDescriptor::new("Configuration", ParamKind::enumeration(&["Debug", "Release"])));

    let names: Vec<_> = registry.descriptors().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Configuration", "Verbosity"]);
    assert!(matches!(registry.get("Configuration").unwrap().kind, ParamKind::Enum { .. }));
  }

  #[test]
  fn find_accepts_loose_spelling() {
    let mut registry = ParameterRegistry::new();
    registry.register(ParameterDescriptor::new("CargoPath", ParamKind::Path));

    for key in ["CargoPath", "cargo-path", "CARGO_PATH", "cargopath"] {
      assert_eq!(registry.find(key).map(|d| d.name.as_str()), Some("CargoPath"), "{}", key);
    }
    assert!(registry.find("cargo").is_none());
  }

  #[test]
  fn error_messages() {
    let missing = ParamError::MissingRequired {
      name: "ApiKey".to_string(),
      env_var: "API_KEY".to_string(),
    };
    assert_eq!(
      missing.to_string(),
      "missing required parameter 'ApiKey' (pass -p ApiKey=VALUE or set API_KEY)"
    );

    let conversion = ParamError::Conversion {
      name: "Verbosity".to_string(),
      raw: "loud".to_string(),
      expected: "an integer".to_string(),
      origin: ParamSource::Environment,
    };
    assert_eq!(
      conversion.to_string(),
      "invalid value 'loud' for parameter 'Verbosity' (from environment): expected an integer"
    );
  }
}
