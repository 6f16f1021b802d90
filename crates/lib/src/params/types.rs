use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

/// Declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
  String,
  Bool,
  Integer,
  Path,
  /// One of a fixed set of values, matched case-insensitively.
  Enum { variants: Vec<String> },
  /// Comma-separated items of the inner kind.
  List { item: Box<ParamKind> },
}

impl ParamKind {
  pub fn enumeration(variants: &[&str]) -> Self {
    ParamKind::Enum {
      variants: variants.iter().map(|v| v.to_string()).collect(),
    }
  }

  pub fn list(item: ParamKind) -> Self {
    ParamKind::List { item: Box::new(item) }
  }

  /// Convert raw text to this kind. The error is a description of what was expected.
  pub fn convert(&self, raw: &str) -> Result<ParamValue, String> {
    match self {
      ParamKind::String => Ok(ParamValue::String(raw.to_string())),
      ParamKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(ParamValue::Bool(true)),
        "false" | "0" | "no" | "off" => Ok(ParamValue::Bool(false)),
        _ => Err("a boolean (true/false)".to_string()),
      },
      ParamKind::Integer => raw
        .trim()
        .parse::<i64>()
        .map(ParamValue::Integer)
        .map_err(|_| "an integer".to_string()),
      ParamKind::Path => {
        if raw.trim().is_empty() {
          Err("a non-empty path".to_string())
        } else {
          Ok(ParamValue::Path(PathBuf::from(raw.trim())))
        }
      }
      ParamKind::Enum { variants } => variants
        .iter()
        .find(|variant| variant.eq_ignore_ascii_case(raw.trim()))
        .map(|variant| ParamValue::String(variant.clone()))
        .ok_or_else(|| format!("one of: {}", variants.join(", "))),
      ParamKind::List { item } => raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| item.convert(part))
        .collect::<Result<Vec<_>, _>>()
        .map(ParamValue::List)
        .map_err(|expected| format!("a comma-separated list of {}", expected)),
    }
  }
}

impl fmt::Display for ParamKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParamKind::String => write!(f, "string"),
      ParamKind::Bool => write!(f, "bool"),
      ParamKind::Integer => write!(f, "integer"),
      ParamKind::Path => write!(f, "path"),
      ParamKind::Enum { variants } => write!(f, "{}", variants.join("|")),
      ParamKind::List { item } => write!(f, "list<{}>", item),
    }
  }
}

/// A resolved parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
  String(String),
  Bool(bool),
  Integer(i64),
  Path(PathBuf),
  List(Vec<ParamValue>),
}

impl ParamValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      ParamValue::String(value) => Some(value),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      ParamValue::Bool(value) => Some(*value),
      _ => None,
    }
  }

  pub fn as_integer(&self) -> Option<i64> {
    match self {
      ParamValue::Integer(value) => Some(*value),
      _ => None,
    }
  }

  pub fn as_path(&self) -> Option<&Path> {
    match self {
      ParamValue::Path(value) => Some(value),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[ParamValue]> {
    match self {
      ParamValue::List(values) => Some(values),
      _ => None,
    }
  }
}

impl fmt::Display for ParamValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParamValue::String(value) => write!(f, "{}", value),
      ParamValue::Bool(value) => write!(f, "{}", value),
      ParamValue::Integer(value) => write!(f, "{}", value),
      ParamValue::Path(value) => write!(f, "{}", value.display()),
      ParamValue::List(values) => {
        let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(","))
      }
    }
  }
}

/// Where a resolved value came from. Variants are listed in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSource {
  Explicit,
  Environment,
  Default,
}

/// What the invocation knows about the machine it runs on.
///
/// Both values arrive as already-resolved parameters; nothing here inspects CI
/// environment variables directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildEnvironment {
  pub server_build: bool,
  pub build_server: Option<String>,
}

impl BuildEnvironment {
  pub fn is_local_build(&self) -> bool {
    !self.server_build
  }
}

/// Computes a default from the build environment. Returns raw text, converted like any other source.
pub type DefaultFn = Arc<dyn Fn(&BuildEnvironment) -> Option<String> + Send + Sync>;

/// A declared, resolvable parameter.
#[derive(Clone)]
pub struct ParameterDescriptor {
  pub name: String,
  pub kind: ParamKind,
  pub description: Option<String>,
  pub required: bool,
  /// Overrides the conventional environment variable name.
  pub env_var: Option<String>,
  pub default: Option<DefaultFn>,
}

impl ParameterDescriptor {
  pub fn new(name: &str, kind: ParamKind) -> Self {
    Self {
      name: name.to_string(),
      kind,
      description: None,
      required: false,
      env_var: None,
      default: None,
    }
  }

  pub fn describe(mut self, description: &str) -> Self {
    self.description = Some(description.to_string());
    self
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn env_var(mut self, name: &str) -> Self {
    self.env_var = Some(name.to_string());
    self
  }

  pub fn default_value(self, raw: &str) -> Self {
    let raw = raw.to_string();
    self.default_with(move |_| Some(raw.clone()))
  }

  pub fn default_with<F>(mut self, default: F) -> Self
  where
    F: Fn(&BuildEnvironment) -> Option<String> + Send + Sync + 'static,
  {
    self.default = Some(Arc::new(default));
    self
  }

  pub fn summary(&self) -> ParameterSummary {
    ParameterSummary {
      name: self.name.clone(),
      kind: self.kind.to_string(),
      description: self.description.clone(),
      required: self.required,
      has_default: self.default.is_some(),
    }
  }
}

impl fmt::Debug for ParameterDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ParameterDescriptor")
      .field("name", &self.name)
      .field("kind", &self.kind)
      .field("required", &self.required)
      .field("env_var", &self.env_var)
      .field("has_default", &self.default.is_some())
      .finish()
  }
}

/// Serializable view of a descriptor for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSummary {
  pub name: String,
  pub kind: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub required: bool,
  pub has_default: bool,
}
