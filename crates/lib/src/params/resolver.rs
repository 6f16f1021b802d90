//! The per-invocation parameter resolver.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, trace};

use super::{BuildEnvironment, ParamError, ParamSource, ParamValue, ParameterDescriptor, ParameterRegistry};
use crate::consts::{BUILD_SERVER_PARAM, IS_SERVER_BUILD_PARAM};

/// Naming convention for environment variable lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverConfig {
  /// Prefix joined to every conventional variable name with `_`.
  pub env_prefix: Option<String>,
}

type Resolved = Option<(ParamValue, ParamSource)>;

/// Resolves parameters for one invocation.
///
/// Each parameter is resolved at most once; later calls return the cached result
/// even if the environment changed in between. Failed resolutions are not cached.
#[derive(Debug)]
pub struct ParameterResolver {
  registry: ParameterRegistry,
  /// Explicit values keyed by their normalized name.
  explicit: HashMap<String, (String, String)>,
  config: ResolverConfig,
  environment: BuildEnvironment,
  cache: Mutex<HashMap<String, Resolved>>,
}

impl ParameterResolver {
  /// Create a resolver and resolve the build environment parameters.
  ///
  /// `explicit` holds `(name, raw value)` pairs; names are matched loosely against
  /// the registry (see [`normalize_key`]).
  ///
  /// # Errors
  ///
  /// Returns `ParamError::Conversion` if a built-in environment parameter has an
  /// unparsable value.
  pub fn new<I, K, V>(registry: ParameterRegistry, explicit: I, config: ResolverConfig) -> Result<Self, ParamError>
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let explicit = explicit
      .into_iter()
      .map(|(name, value)| {
        let name = name.into();
        (normalize_key(&name), (name, value.into()))
      })
      .collect();

    let mut resolver = Self {
      registry,
      explicit,
      config,
      environment: BuildEnvironment::default(),
      cache: Mutex::new(HashMap::new()),
    };

    let mut server_build = false;
    if resolver.registry.contains(IS_SERVER_BUILD_PARAM) {
      server_build = resolver
        .resolve(IS_SERVER_BUILD_PARAM)?
        .and_then(|value| value.as_bool())
        .unwrap_or(false);
    }
    let mut build_server = None;
    if resolver.registry.contains(BUILD_SERVER_PARAM) {
      build_server = resolver.resolve(BUILD_SERVER_PARAM)?.map(|value| value.to_string());
    }
    resolver.environment = BuildEnvironment {
      server_build,
      build_server,
    };

    debug!(
      server_build = resolver.environment.server_build,
      build_server = ?resolver.environment.build_server,
      "build environment resolved"
    );

    Ok(resolver)
  }

  pub fn registry(&self) -> &ParameterRegistry {
    &self.registry
  }

  pub fn environment(&self) -> &BuildEnvironment {
    &self.environment
  }

  /// Resolve a registered parameter.
  ///
  /// Returns `Ok(None)` when an optional parameter has no value.
  ///
  /// # Errors
  ///
  /// - `UnknownParameter` when `name` is not registered
  /// - `MissingRequired` when a required parameter has no value
  /// - `Conversion` when the winning source's raw text does not convert
  pub fn resolve(&self, name: &str) -> Result<Option<ParamValue>, ParamError> {
    let descriptor = self
      .registry
      .get(name)
      .ok_or_else(|| ParamError::UnknownParameter { name: name.to_string() })?;
    self.resolve_descriptor(descriptor)
  }

  /// Resolve a descriptor, registered or not. The cache is keyed by descriptor name.
  pub fn resolve_descriptor(&self, descriptor: &ParameterDescriptor) -> Result<Option<ParamValue>, ParamError> {
    let cached = self
      .cache
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&descriptor.name)
      .cloned();

    let resolved = match cached {
      Some(resolved) => resolved,
      None => {
        let fresh = self.lookup(descriptor)?;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have resolved it meanwhile; the first result wins.
        cache.entry(descriptor.name.clone()).or_insert(fresh).clone()
      }
    };

    match resolved {
      Some((value, _)) => Ok(Some(value)),
      None if descriptor.required => Err(self.missing(descriptor)),
      None => Ok(None),
    }
  }

  /// Resolve a parameter that must have a value, whether or not it is declared required.
  pub fn require(&self, name: &str) -> Result<ParamValue, ParamError> {
    let descriptor = self
      .registry
      .get(name)
      .ok_or_else(|| ParamError::UnknownParameter { name: name.to_string() })?;
    self
      .resolve_descriptor(descriptor)?
      .ok_or_else(|| self.missing(descriptor))
  }

  /// Source of an already resolved parameter. `None` if it is unresolved or absent.
  pub fn source_of(&self, name: &str) -> Option<ParamSource> {
    self
      .cache
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(name)
      .and_then(|resolved| resolved.as_ref().map(|(_, source)| *source))
  }

  /// Environment variable consulted for a descriptor.
  pub fn env_var_name(&self, descriptor: &ParameterDescriptor) -> String {
    match &descriptor.env_var {
      Some(name) => name.clone(),
      None => env_var_name(&descriptor.name, self.config.env_prefix.as_deref()),
    }
  }

  /// Explicit value names that match no registered descriptor, in sorted order.
  pub fn unknown_explicit(&self) -> Vec<String> {
    let mut unknown: Vec<String> = self
      .explicit
      .values()
      .filter(|(name, _)| self.registry.find(name).is_none())
      .map(|(name, _)| name.clone())
      .collect();
    unknown.sort();
    unknown
  }

  fn lookup(&self, descriptor: &ParameterDescriptor) -> Result<Resolved, ParamError> {
    let name = &descriptor.name;

    let raw = if let Some((_, raw)) = self.explicit.get(&normalize_key(name)) {
      Some((raw.clone(), ParamSource::Explicit))
    } else if let Some(raw) = read_env(&self.env_var_name(descriptor)) {
      Some((raw, ParamSource::Environment))
    } else if let Some(default) = &descriptor.default
      && let Some(raw) = default(&self.environment)
    {
      Some((raw, ParamSource::Default))
    } else {
      None
    };

    let Some((raw, source)) = raw else {
      trace!(parameter = %name, "parameter has no value");
      return Ok(None);
    };

    let value = descriptor.kind.convert(&raw).map_err(|expected| ParamError::Conversion {
      name: name.clone(),
      raw: raw.clone(),
      expected,
      origin: source,
    })?;

    // The value itself is never logged; parameters may hold secrets.
    debug!(parameter = %name, source = %source, "parameter resolved");

    Ok(Some((value, source)))
  }

  fn missing(&self, descriptor: &ParameterDescriptor) -> ParamError {
    ParamError::MissingRequired {
      name: descriptor.name.clone(),
      env_var: self.env_var_name(descriptor),
    }
  }
}

fn read_env(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Conventional environment variable name for a parameter.
///
/// `CargoPath` becomes `CARGO_PATH`, `APIKey` becomes `API_KEY`; with prefix
/// `ANVIL` the first becomes `ANVIL_CARGO_PATH`.
pub fn env_var_name(name: &str, prefix: Option<&str>) -> String {
  let chars: Vec<char> = name.chars().collect();
  let mut snake = String::with_capacity(name.len() + 4);

  for (i, &c) in chars.iter().enumerate() {
    if c == '-' || c == '_' || c == ' ' {
      if !snake.is_empty() && !snake.ends_with('_') {
        snake.push('_');
      }
      continue;
    }
    if c.is_uppercase() && i > 0 && !snake.ends_with('_') {
      let prev = chars[i - 1];
      let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
      if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
        snake.push('_');
      }
    }
    snake.extend(c.to_uppercase());
  }

  match prefix {
    Some(prefix) if !prefix.is_empty() => format!("{}_{}", prefix.trim_end_matches('_').to_uppercase(), snake),
    _ => snake,
  }
}

/// Key used to match loosely spelled parameter names: lowercase, without `-` or `_`.
pub fn normalize_key(name: &str) -> String {
  name
    .chars()
    .filter(|c| *c != '-' && *c != '_')
    .flat_map(char::to_lowercase)
    .collect()
}
