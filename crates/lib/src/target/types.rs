//! Target types for anvil.
//!
//! A target is a named unit of build work. Its declaration is split in two tiers:
//!
//! - The relationship data ([`TargetDef`] fields such as dependencies, ordering
//!   edges, triggers and artifact patterns), which the graph builder validates and
//!   the planner reads.
//! - The author-supplied closures ([`Action`], [`Predicate`], [`FanOut`]), which are
//!   opaque to everything except the scheduler.
//!
//! [`TargetSummary`] is the serializable projection used for listings and JSON output.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::execute::TargetContext;

/// The main body of a target.
pub type Action = Arc<dyn Fn(&TargetContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// A boolean gate evaluated against the invocation.
pub type Predicate = Arc<dyn Fn(&TargetContext<'_>) -> bool + Send + Sync>;

/// Produces the sub-invocations of a fan-out once the target's turn comes.
pub type FanOutGenerator = Arc<dyn Fn(&TargetContext<'_>) -> anyhow::Result<Vec<SubInvocation>> + Send + Sync>;

/// When an `OnlyWhen` predicate is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
  /// Evaluated once, before any target of the invocation runs.
  Static,
  /// Evaluated immediately before the target's own turn.
  Dynamic,
}

/// A precondition attached to a target.
///
/// Conditions keep their declaration order; the scheduler evaluates them in that order.
#[derive(Clone)]
pub enum Condition {
  /// Skip the target (not an error) when the predicate is false.
  OnlyWhen {
    description: String,
    timing: Timing,
    predicate: Predicate,
  },
  /// Abort the whole invocation when the predicate is false.
  Requires { description: String, predicate: Predicate },
  /// Abort the whole invocation when the named parameter resolves to no value.
  RequiresParameter { name: String },
}

impl Condition {
  /// Human-readable label used in logs and errors.
  pub fn description(&self) -> String {
    match self {
      Condition::OnlyWhen { description, .. } | Condition::Requires { description, .. } => description.clone(),
      Condition::RequiresParameter { name } => format!("parameter '{}' is set", name),
    }
  }

  /// Whether a false result is fatal to the invocation.
  pub fn is_requirement(&self) -> bool {
    matches!(self, Condition::Requires { .. } | Condition::RequiresParameter { .. })
  }
}

impl fmt::Debug for Condition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Condition::OnlyWhen { description, timing, .. } => f
        .debug_struct("OnlyWhen")
        .field("description", description)
        .field("timing", timing)
        .finish_non_exhaustive(),
      Condition::Requires { description, .. } => f
        .debug_struct("Requires")
        .field("description", description)
        .finish_non_exhaustive(),
      Condition::RequiresParameter { name } => f.debug_struct("RequiresParameter").field("name", name).finish(),
    }
  }
}

/// An artifact expectation checked before the body runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Consumes {
  /// A glob pattern, relative to the invocation root.
  Pattern(String),
  /// Every pattern the named target produces.
  Target(String),
}

/// How a partitioned target finds its current shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSpec {
  /// Number of shards the work is split into.
  pub total: usize,
  /// Parameter holding the current shard as `index/total`.
  pub parameter: String,
}

/// One unit of parallel work inside a fan-out.
#[derive(Clone)]
pub struct SubInvocation {
  pub name: String,
  pub run: Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>,
}

impl SubInvocation {
  pub fn new<F>(name: impl Into<String>, run: F) -> Self
  where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
  {
    Self {
      name: name.into(),
      run: Arc::new(run),
    }
  }
}

impl fmt::Debug for SubInvocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SubInvocation").field("name", &self.name).finish_non_exhaustive()
  }
}

/// Bounded-parallelism fan-out attached to a target body.
#[derive(Clone)]
pub struct FanOut {
  /// Maximum number of sub-invocations running at once. Zero means the configured default.
  pub max_concurrency: usize,
  /// Run every sub-invocation even after one fails, then report all failures together.
  pub complete_on_failure: bool,
  pub generate: FanOutGenerator,
}

impl FanOut {
  pub fn new<F>(max_concurrency: usize, generate: F) -> Self
  where
    F: Fn(&TargetContext<'_>) -> anyhow::Result<Vec<SubInvocation>> + Send + Sync + 'static,
  {
    Self {
      max_concurrency,
      complete_on_failure: false,
      generate: Arc::new(generate),
    }
  }

  /// Fan out over a fixed list of sub-invocations.
  pub fn fixed(max_concurrency: usize, invocations: Vec<SubInvocation>) -> Self {
    Self::new(max_concurrency, move |_| Ok(invocations.clone()))
  }

  pub fn complete_on_failure(mut self) -> Self {
    self.complete_on_failure = true;
    self
  }
}

impl fmt::Debug for FanOut {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FanOut")
      .field("max_concurrency", &self.max_concurrency)
      .field("complete_on_failure", &self.complete_on_failure)
      .finish_non_exhaustive()
  }
}

/// A fully or partially declared target.
///
/// Every relationship list keeps declaration order and holds no duplicates.
#[derive(Clone, Default)]
pub struct TargetDef {
  pub name: String,
  pub description: Option<String>,
  /// Targets that must complete before this one starts.
  pub dependencies: Vec<String>,
  /// Selected targets this one must run before.
  pub before: Vec<String>,
  /// Selected targets this one must run after.
  pub after: Vec<String>,
  /// Targets whose completion adds this one to the plan.
  pub triggered_by: Vec<String>,
  /// Targets added to the plan when this one completes.
  pub triggers: Vec<String>,
  pub assured_after_failure: bool,
  pub conditions: Vec<Condition>,
  pub produces: Vec<String>,
  pub consumes: Vec<Consumes>,
  pub partition: Option<PartitionSpec>,
  pub action: Option<Action>,
  pub fan_out: Option<FanOut>,
}

impl TargetDef {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  /// Whether the target has anything to run.
  pub fn has_body(&self) -> bool {
    self.action.is_some() || self.fan_out.is_some()
  }

  pub fn summary(&self) -> TargetSummary {
    TargetSummary {
      name: self.name.clone(),
      description: self.description.clone(),
      dependencies: self.dependencies.clone(),
      before: self.before.clone(),
      after: self.after.clone(),
      triggered_by: self.triggered_by.clone(),
      triggers: self.triggers.clone(),
      assured_after_failure: self.assured_after_failure,
      conditions: self.conditions.iter().map(Condition::description).collect(),
      produces: self.produces.clone(),
      consumes: self.consumes.clone(),
      partition: self.partition.clone(),
    }
  }
}

impl fmt::Debug for TargetDef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TargetDef")
      .field("name", &self.name)
      .field("dependencies", &self.dependencies)
      .field("before", &self.before)
      .field("after", &self.after)
      .field("triggered_by", &self.triggered_by)
      .field("triggers", &self.triggers)
      .field("assured_after_failure", &self.assured_after_failure)
      .field("conditions", &self.conditions)
      .field("produces", &self.produces)
      .field("consumes", &self.consumes)
      .field("partition", &self.partition)
      .field("has_action", &self.action.is_some())
      .field("fan_out", &self.fan_out)
      .finish()
  }
}

/// Serializable view of a target's declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub dependencies: Vec<String>,
  pub before: Vec<String>,
  pub after: Vec<String>,
  pub triggered_by: Vec<String>,
  pub triggers: Vec<String>,
  pub assured_after_failure: bool,
  pub conditions: Vec<String>,
  pub produces: Vec<String>,
  pub consumes: Vec<Consumes>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub partition: Option<PartitionSpec>,
}

/// Push `value` unless it is already present.
pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) {
  if !list.iter().any(|existing| existing == value) {
    list.push(value.to_string());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn push_unique_keeps_first_position() {
    let mut list = vec!["a".to_string(), "b".to_string()];
    push_unique(&mut list, "a");
    push_unique(&mut list, "c");
    assert_eq!(list, vec!["a", "b", "c"]);
  }

  #[test]
  fn condition_descriptions() {
    let only_when = Condition::OnlyWhen {
      description: "on main branch".to_string(),
      timing: Timing::Dynamic,
      predicate: Arc::new(|_| true),
    };
    let param = Condition::RequiresParameter {
      name: "ApiKey".to_string(),
    };

    assert_eq!(only_when.description(), "on main branch");
    assert!(!only_when.is_requirement());
    assert_eq!(param.description(), "parameter 'ApiKey' is set");
    assert!(param.is_requirement());
  }

  #[test]
  fn summary_omits_closures() {
    let mut def = TargetDef::new("Pack");
    def.dependencies.push("Compile".to_string());
    def.produces.push("output/*.crate".to_string());
    def.action = Some(Arc::new(|_| Ok(())));

    let json = serde_json::to_value(def.summary()).unwrap();
    assert_eq!(json["name"], "Pack");
    assert_eq!(json["dependencies"][0], "Compile");
    assert!(json.get("action").is_none());
    assert!(json.get("description").is_none());
  }

  #[test]
  fn fixed_fan_out_defaults_to_fail_fast() {
    let fan_out = FanOut::fixed(2, vec![SubInvocation::new("one", || Ok(()))]);
    assert!(!fan_out.complete_on_failure);
    assert!(fan_out.complete_on_failure().complete_on_failure);
  }
}
