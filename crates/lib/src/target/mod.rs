//! Target declaration.
//!
//! Targets are authored through a [`TargetRegistry`]. Calling [`TargetRegistry::target`]
//! with a name that was already declared reopens the same target, so separate parts of
//! a build definition can contribute relationships to one target in any order:
//!
//! ```
//! use anvil_lib::target::TargetRegistry;
//!
//! let mut targets = TargetRegistry::new();
//! targets.target("Compile").depends_on(&["Restore"]);
//! targets.target("Restore").before(&["Compile"]);
//! targets.target("Compile").produces("target/*.rlib");
//!
//! assert_eq!(targets.len(), 2);
//! ```
//!
//! Nothing is validated here. Unknown references, cycles and conflicting bodies are
//! reported by [`crate::graph::TargetGraph::build`].

mod types;

pub use types::*;

use std::collections::HashMap;
use std::sync::Arc;

use crate::consts::PARTITION_PARAM_SUFFIX;
use crate::execute::TargetContext;

/// Ordered collection of target declarations.
#[derive(Debug, Default, Clone)]
pub struct TargetRegistry {
  targets: Vec<TargetDef>,
  index: HashMap<String, usize>,
  /// Targets whose body was declared more than once.
  conflicts: Vec<String>,
}

impl TargetRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declare a target, or reopen it if it already exists.
  ///
  /// The first call for a name fixes the target's declaration position.
  pub fn target(&mut self, name: &str) -> TargetBuilder<'_> {
    let position = match self.index.get(name) {
      Some(&position) => position,
      None => {
        self.targets.push(TargetDef::new(name));
        self.index.insert(name.to_string(), self.targets.len() - 1);
        self.targets.len() - 1
      }
    };

    TargetBuilder {
      def: &mut self.targets[position],
      conflicts: &mut self.conflicts,
    }
  }

  /// Fold another registry into this one.
  ///
  /// Targets new to this registry are appended in the other registry's order;
  /// targets present in both have their relationship lists unioned.
  pub fn merge(&mut self, other: TargetRegistry) {
    for name in other.conflicts {
      push_unique(&mut self.conflicts, &name);
    }

    for def in other.targets {
      let mut builder = self.target(&def.name);
      builder.absorb(def);
    }
  }

  pub fn get(&self, name: &str) -> Option<&TargetDef> {
    self.index.get(name).map(|&position| &self.targets[position])
  }

  pub fn contains(&self, name: &str) -> bool {
    self.index.contains_key(name)
  }

  /// Targets in declaration order.
  pub fn targets(&self) -> &[TargetDef] {
    &self.targets
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  pub(crate) fn into_parts(self) -> (Vec<TargetDef>, Vec<String>) {
    (self.targets, self.conflicts)
  }
}

/// Chainable handle onto one target declaration.
pub struct TargetBuilder<'a> {
  def: &'a mut TargetDef,
  conflicts: &'a mut Vec<String>,
}

impl TargetBuilder<'_> {
  pub fn name(&self) -> &str {
    &self.def.name
  }

  pub fn description(self, description: &str) -> Self {
    self.def.description = Some(description.to_string());
    self
  }

  /// Strict dependencies: these must complete before this target starts.
  pub fn depends_on(self, names: &[&str]) -> Self {
    for name in names {
      push_unique(&mut self.def.dependencies, name);
    }
    self
  }

  /// Run before the named targets when both are selected.
  pub fn before(self, names: &[&str]) -> Self {
    for name in names {
      push_unique(&mut self.def.before, name);
    }
    self
  }

  /// Run after the named targets when both are selected.
  pub fn after(self, names: &[&str]) -> Self {
    for name in names {
      push_unique(&mut self.def.after, name);
    }
    self
  }

  /// Join the plan whenever one of the named targets runs.
  pub fn triggered_by(self, names: &[&str]) -> Self {
    for name in names {
      push_unique(&mut self.def.triggered_by, name);
    }
    self
  }

  /// Add the named targets to the plan whenever this target runs.
  pub fn triggers(self, names: &[&str]) -> Self {
    for name in names {
      push_unique(&mut self.def.triggers, name);
    }
    self
  }

  /// Run even when a gating dependency or trigger failed.
  pub fn assured_after_failure(self) -> Self {
    self.def.assured_after_failure = true;
    self
  }

  /// Skip this target when `predicate` is false at its turn.
  pub fn only_when<F>(self, description: &str, predicate: F) -> Self
  where
    F: Fn(&TargetContext<'_>) -> bool + Send + Sync + 'static,
  {
    self.def.conditions.push(Condition::OnlyWhen {
      description: description.to_string(),
      timing: Timing::Dynamic,
      predicate: Arc::new(predicate),
    });
    self
  }

  /// Skip this target when `predicate` is false before the invocation starts.
  pub fn only_when_static<F>(self, description: &str, predicate: F) -> Self
  where
    F: Fn(&TargetContext<'_>) -> bool + Send + Sync + 'static,
  {
    self.def.conditions.push(Condition::OnlyWhen {
      description: description.to_string(),
      timing: Timing::Static,
      predicate: Arc::new(predicate),
    });
    self
  }

  /// Abort the invocation when `predicate` is false.
  pub fn requires<F>(self, description: &str, predicate: F) -> Self
  where
    F: Fn(&TargetContext<'_>) -> bool + Send + Sync + 'static,
  {
    self.def.conditions.push(Condition::Requires {
      description: description.to_string(),
      predicate: Arc::new(predicate),
    });
    self
  }

  /// Abort the invocation when the named parameter has no value.
  pub fn requires_param(self, name: &str) -> Self {
    self
      .def
      .conditions
      .push(Condition::RequiresParameter { name: name.to_string() });
    self
  }

  pub fn produces(self, pattern: &str) -> Self {
    push_unique(&mut self.def.produces, pattern);
    self
  }

  pub fn consumes_pattern(self, pattern: &str) -> Self {
    let consumes = Consumes::Pattern(pattern.to_string());
    if !self.def.consumes.contains(&consumes) {
      self.def.consumes.push(consumes);
    }
    self
  }

  /// Require every artifact the named target produces.
  pub fn consumes(self, target: &str) -> Self {
    let consumes = Consumes::Target(target.to_string());
    if !self.def.consumes.contains(&consumes) {
      self.def.consumes.push(consumes);
    }
    self
  }

  /// Split this target's work into `total` shards, selected by the
  /// `<Target>Partition` parameter.
  pub fn partition(self, total: usize) -> Self {
    let parameter = format!("{}{}", self.def.name, PARTITION_PARAM_SUFFIX);
    self.def.partition = Some(PartitionSpec { total, parameter });
    self
  }

  pub fn executes<F>(self, action: F) -> Self
  where
    F: Fn(&TargetContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
  {
    if self.def.action.is_some() {
      push_unique(self.conflicts, &self.def.name);
    }
    self.def.action = Some(Arc::new(action));
    self
  }

  /// Attach a bounded fan-out, run after the action (if any).
  pub fn fan_out(self, fan_out: FanOut) -> Self {
    if self.def.fan_out.is_some() {
      push_unique(self.conflicts, &self.def.name);
    }
    self.def.fan_out = Some(fan_out);
    self
  }

  fn absorb(&mut self, other: TargetDef) {
    let def = &mut *self.def;
    if def.description.is_none() {
      def.description = other.description;
    }
    for name in &other.dependencies {
      push_unique(&mut def.dependencies, name);
    }
    for name in &other.before {
      push_unique(&mut def.before, name);
    }
    for name in &other.after {
      push_unique(&mut def.after, name);
    }
    for name in &other.triggered_by {
      push_unique(&mut def.triggered_by, name);
    }
    for name in &other.triggers {
      push_unique(&mut def.triggers, name);
    }
    for pattern in &other.produces {
      push_unique(&mut def.produces, pattern);
    }
    for consumes in other.consumes {
      if !def.consumes.contains(&consumes) {
        def.consumes.push(consumes);
      }
    }
    def.assured_after_failure |= other.assured_after_failure;
    def.conditions.extend(other.conditions);
    if other.partition.is_some() {
      def.partition = other.partition;
    }
    if let Some(action) = other.action {
      if def.action.is_some() {
        push_unique(self.conflicts, &def.name);
      }
      def.action = Some(action);
    }
    if let Some(fan_out) = other.fan_out {
      if def.fan_out.is_some() {
        push_unique(self.conflicts, &def.name);
      }
      def.fan_out = Some(fan_out);
    }
  }
}
