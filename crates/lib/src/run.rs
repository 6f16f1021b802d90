//! Invocation entry point.
//!
//! A [`BuildDefinition`] is everything the build author declares: targets, parameters
//! and the default target. An [`Invocation`] is what one run asks for. [`prepare`]
//! validates both and computes the plan without running anything; [`run`] also
//! executes it.

use thiserror::Error;
use tracing::{debug, info};

use crate::execute::{BuildContext, BuildReport, ExecuteConfig, ExecuteError, execute};
use crate::graph::{GraphError, TargetGraph};
use crate::params::{ParamError, ParamKind, ParameterDescriptor, ParameterRegistry, ParameterResolver, ResolverConfig};
use crate::plan::{ExecutionPlan, plan};
use crate::target::TargetRegistry;

/// Errors raised before any target runs.
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Param(#[from] ParamError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),

  #[error("no targets requested and no default target declared")]
  NoTargets,
}

/// A complete build definition.
#[derive(Debug, Clone)]
pub struct BuildDefinition {
  pub targets: TargetRegistry,
  pub parameters: ParameterRegistry,
  /// Target run when an invocation requests none.
  pub default_target: Option<String>,
}

impl Default for BuildDefinition {
  fn default() -> Self {
    Self {
      targets: TargetRegistry::new(),
      parameters: ParameterRegistry::with_builtins(),
      default_target: None,
    }
  }
}

impl BuildDefinition {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_default_target(mut self, name: &str) -> Self {
    self.default_target = Some(name.to_string());
    self
  }

  /// Fold another partial definition into this one.
  ///
  /// The other definition's default target wins when it declares one.
  pub fn merge(&mut self, other: BuildDefinition) {
    self.targets.merge(other.targets);
    self.parameters.merge(other.parameters);
    if other.default_target.is_some() {
      self.default_target = other.default_target;
    }
  }
}

/// What one run asks for.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
  /// Requested target names; empty means the default target.
  pub targets: Vec<String>,
  /// Explicit parameter values as `(name, raw value)`.
  pub parameters: Vec<(String, String)>,
  pub config: ExecuteConfig,
  pub resolver: ResolverConfig,
}

/// A validated graph with its plan and invocation context, ready to execute.
#[derive(Debug)]
pub struct Prepared {
  pub graph: TargetGraph,
  pub plan: ExecutionPlan,
  pub context: BuildContext,
}

/// Validate a definition against an invocation and compute the plan.
///
/// Each partitioned target gets a `<Target>Partition` parameter unless the
/// definition already declares one.
///
/// # Errors
///
/// - `Graph` for an invalid definition, or an unknown requested or skipped target
/// - `Param` for an explicit value no parameter declares, or an unparsable built-in
/// - `NoTargets` when nothing is requested and there is no default target
pub fn prepare(definition: BuildDefinition, invocation: &Invocation) -> Result<Prepared, Error> {
  let BuildDefinition {
    targets,
    mut parameters,
    default_target,
  } = definition;

  for def in targets.targets() {
    if let Some(spec) = &def.partition
      && !parameters.contains(&spec.parameter)
    {
      debug!(target_name = %def.name, parameter = %spec.parameter, "registering partition parameter");
      parameters.register(
        ParameterDescriptor::new(&spec.parameter, ParamKind::String)
          .describe(&format!("Current shard of {} as index/total (of {})", def.name, spec.total)),
      );
    }
  }

  let graph = TargetGraph::build(targets)?;

  if let Some(name) = invocation.config.skip.iter().find(|name| graph.position(name).is_none()) {
    return Err(
      GraphError::UnknownTargetReference {
        name: name.clone(),
        referenced_by: None,
        relation: "skipped",
      }
      .into(),
    );
  }

  let requested = if invocation.targets.is_empty() {
    vec![default_target.ok_or(Error::NoTargets)?]
  } else {
    invocation.targets.clone()
  };

  let resolver = ParameterResolver::new(parameters, invocation.parameters.iter().cloned(), invocation.resolver.clone())?;
  if let Some(name) = resolver.unknown_explicit().into_iter().next() {
    return Err(ParamError::UnknownParameter { name }.into());
  }

  let plan = plan(&graph, requested.as_slice())?;
  info!(
    requested = %requested.join(", "),
    planned = %plan.names(&graph).join(", "),
    "plan ready"
  );

  Ok(Prepared {
    graph,
    plan,
    context: BuildContext::new(resolver),
  })
}

/// Prepare and execute an invocation.
///
/// Errors are returned only for problems found before any target runs; failures
/// while running are recorded in the report.
pub async fn run(definition: BuildDefinition, invocation: &Invocation) -> Result<BuildReport, Error> {
  let prepared = prepare(definition, invocation)?;
  Ok(execute(&prepared.graph, &prepared.plan, &prepared.context, &invocation.config).await)
}
