//! Contexts handed to target bodies and predicates.

use std::collections::HashSet;
use std::path::Path;

use crate::graph::TargetGraph;
use crate::params::{BuildEnvironment, ParamError, ParamKind, ParamValue, ParameterDescriptor, ParameterResolver};
use crate::partition::{Partition, PartitionError};
use crate::target::TargetDef;

use super::types::{ExecuteConfig, ExecuteError};

/// State shared by every target of one invocation.
#[derive(Debug)]
pub struct BuildContext {
  resolver: ParameterResolver,
}

impl BuildContext {
  pub fn new(resolver: ParameterResolver) -> Self {
    Self { resolver }
  }

  pub fn resolver(&self) -> &ParameterResolver {
    &self.resolver
  }

  pub fn environment(&self) -> &BuildEnvironment {
    self.resolver.environment()
  }
}

/// What a body or predicate sees while its target is being evaluated.
pub struct TargetContext<'a> {
  pub(crate) build: &'a BuildContext,
  pub(crate) graph: &'a TargetGraph,
  pub(crate) config: &'a ExecuteConfig,
  pub(crate) position: usize,
  pub(crate) invoked: &'a [usize],
  pub(crate) scheduled: &'a HashSet<usize>,
}

impl<'a> TargetContext<'a> {
  /// Name of the target being evaluated.
  pub fn name(&self) -> &'a str {
    self.graph.name(self.position)
  }

  pub fn target(&self) -> &'a TargetDef {
    self.graph.target(self.position)
  }

  /// Resolve a parameter. `Ok(None)` means an optional parameter has no value.
  pub fn param(&self, name: &str) -> Result<Option<ParamValue>, ParamError> {
    self.build.resolver.resolve(name)
  }

  /// Resolve a parameter that must have a value.
  ///
  /// A missing value aborts the whole invocation when returned from a body.
  pub fn require_param(&self, name: &str) -> Result<ParamValue, ParamError> {
    self.build.resolver.require(name)
  }

  /// Resolve a string parameter, falling back to `default` when absent.
  pub fn param_or(&self, name: &str, default: &str) -> Result<String, ParamError> {
    Ok(
      self
        .param(name)?
        .map(|value| value.to_string())
        .unwrap_or_else(|| default.to_string()),
    )
  }

  /// The current shard of a partitioned target.
  ///
  /// Targets without a partition, and partitioned targets whose parameter is
  /// absent, get a single shard covering every item.
  pub fn partition(&self) -> Result<Partition, ExecuteError> {
    let Some(spec) = &self.target().partition else {
      return Ok(Partition::single());
    };

    let registry = self.build.resolver.registry();
    let descriptor = registry
      .get(&spec.parameter)
      .cloned()
      .unwrap_or_else(|| ParameterDescriptor::new(&spec.parameter, ParamKind::String));

    let Some(value) = self.build.resolver.resolve_descriptor(&descriptor)? else {
      return Ok(Partition::single());
    };

    let raw = value.to_string();
    let partition: Partition = raw.parse()?;
    if partition.total() != spec.total {
      return Err(PartitionError::TotalMismatch {
        raw,
        expected: spec.total,
      }
      .into());
    }

    Ok(partition)
  }

  /// This shard's slice of `items`.
  pub fn current_items<'i, T>(&self, items: &'i [T]) -> Result<&'i [T], ExecuteError> {
    Ok(self.partition()?.current(items))
  }

  /// Base directory for artifact patterns.
  pub fn root_dir(&self) -> &'a Path {
    &self.config.root_dir
  }

  pub fn environment(&self) -> &'a BuildEnvironment {
    self.build.environment()
  }

  pub fn is_server_build(&self) -> bool {
    self.environment().server_build
  }

  pub fn is_local_build(&self) -> bool {
    self.environment().is_local_build()
  }

  /// Whether `name` was requested explicitly for this invocation.
  pub fn was_invoked(&self, name: &str) -> bool {
    self
      .graph
      .position(name)
      .is_some_and(|position| self.invoked.contains(&position))
  }

  /// Whether `name` is part of the plan and not skipped or aborted.
  pub fn is_scheduled(&self, name: &str) -> bool {
    self
      .graph
      .position(name)
      .is_some_and(|position| self.scheduled.contains(&position))
  }
}
