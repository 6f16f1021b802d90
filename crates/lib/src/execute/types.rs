//! Types for target execution.
//!
//! This module defines the error type, the per-target and per-invocation reports,
//! and the configuration for walking an execution plan.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::graph::GraphError;
use crate::params::ParamError;
use crate::partition::PartitionError;

/// Lifecycle of a target within one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
  /// Planned but not yet reached (or never reached after a fatal error).
  Pending,
  /// Not run, by an `OnlyWhen` condition or the skip list. Not a failure.
  Skipped,
  Executing,
  Executed,
  /// The body or one of its artifact checks failed.
  Failed,
  /// Never started because a gating predecessor failed or a precondition aborted the run.
  Aborted,
}

impl TargetStatus {
  /// Whether dependents of a target in this status are gated.
  pub fn is_failure(self) -> bool {
    matches!(self, TargetStatus::Failed | TargetStatus::Aborted)
  }
}

impl fmt::Display for TargetStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      TargetStatus::Pending => "pending",
      TargetStatus::Skipped => "skipped",
      TargetStatus::Executing => "executing",
      TargetStatus::Executed => "executed",
      TargetStatus::Failed => "failed",
      TargetStatus::Aborted => "aborted",
    };
    write!(f, "{}", label)
  }
}

/// One failing sub-invocation of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubFailure {
  pub name: String,
  pub message: String,
}

/// Errors that can occur while executing targets.
#[derive(Debug, Clone, Error)]
pub enum ExecuteError {
  /// A `Requires` condition was false. Fatal to the invocation.
  #[error("precondition failed for '{target}': {condition}")]
  PreconditionFailed { target: String, condition: String },

  /// An expected artifact pattern matched nothing.
  #[error("artifact '{pattern}' not found for '{target}'{}", describe_producer(.producer))]
  ArtifactNotProduced {
    target: String,
    pattern: String,
    /// The target that should have produced it, when one is declared.
    producer: Option<String>,
  },

  /// The target body returned an error. `message` holds the full error chain.
  #[error("target '{target}' failed: {message}")]
  ExecutionFailure { target: String, message: String },

  /// One or more sub-invocations of a complete-on-failure fan-out failed.
  #[error("target '{target}': {} of {total} sub-invocation(s) failed: {}", .failures.len(), describe_failures(.failures))]
  AggregateFanOutFailure {
    target: String,
    total: usize,
    failures: Vec<SubFailure>,
  },

  /// An artifact pattern could not be expanded.
  #[error("invalid pattern '{pattern}' for '{target}': {message}")]
  InvalidPattern {
    target: String,
    pattern: String,
    message: String,
  },

  #[error(transparent)]
  Param(#[from] ParamError),

  #[error(transparent)]
  Partition(#[from] PartitionError),

  /// A triggered target could not be placed into the remaining plan.
  #[error(transparent)]
  Plan(#[from] GraphError),
}

impl ExecuteError {
  /// Whether this error stops the whole invocation rather than gating dependents.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      ExecuteError::PreconditionFailed { .. }
        | ExecuteError::Param(ParamError::MissingRequired { .. })
        | ExecuteError::Plan(_)
    )
  }
}

fn describe_producer(producer: &Option<String>) -> String {
  match producer {
    Some(producer) => format!(" (expected from '{}')", producer),
    None => String::new(),
  }
}

fn describe_failures(failures: &[SubFailure]) -> String {
  failures
    .iter()
    .map(|failure| format!("{} ({})", failure.name, failure.message))
    .collect::<Vec<_>>()
    .join("; ")
}

/// Outcome of one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
  pub name: String,
  pub status: TargetStatus,
  #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
  pub duration: Duration,
  #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_error")]
  pub error: Option<ExecuteError>,
  /// Why the target was skipped or aborted.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
  /// The target whose completion added this one to the plan.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub triggered_by: Option<String>,
}

impl TargetReport {
  pub fn new(name: impl Into<String>, status: TargetStatus) -> Self {
    Self {
      name: name.into(),
      status,
      duration: Duration::ZERO,
      error: None,
      reason: None,
      triggered_by: None,
    }
  }

  pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
    self.reason = Some(reason.into());
    self
  }

  pub fn with_error(mut self, error: ExecuteError) -> Self {
    self.error = Some(error);
    self
  }
}

/// Result of walking an execution plan.
///
/// Every target that was ever part of the plan appears exactly once, in the order it
/// was processed; targets never reached stay `Pending` at the end.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
  pub targets: Vec<TargetReport>,
  /// The error that aborted the invocation, if any.
  #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_error")]
  pub fatal: Option<ExecuteError>,
  #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
  pub duration: Duration,
}

impl BuildReport {
  /// True unless a target failed or was aborted, or the run was aborted.
  pub fn is_success(&self) -> bool {
    self.fatal.is_none() && !self.targets.iter().any(|report| report.status.is_failure())
  }

  pub fn get(&self, name: &str) -> Option<&TargetReport> {
    self.targets.iter().find(|report| report.name == name)
  }

  pub fn status_of(&self, name: &str) -> Option<TargetStatus> {
    self.get(name).map(|report| report.status)
  }

  pub fn count(&self, status: TargetStatus) -> usize {
    self.targets.iter().filter(|report| report.status == status).count()
  }

  /// Reports carrying an error.
  pub fn failures(&self) -> impl Iterator<Item = &TargetReport> {
    self.targets.iter().filter(|report| report.error.is_some())
  }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
}

fn serialize_error<S: Serializer>(error: &Option<ExecuteError>, serializer: S) -> Result<S::Ok, S::Error> {
  match error {
    Some(error) => serializer.serialize_some(&error.to_string()),
    None => serializer.serialize_none(),
  }
}

/// Configuration for walking a plan.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Base directory for relative `produces`/`consumes` patterns.
  pub root_dir: PathBuf,

  /// Concurrency cap for fan-outs declaring a maximum of zero.
  pub default_parallelism: usize,

  /// Targets to skip without evaluating their conditions.
  pub skip: Vec<String>,

  /// Report the plan without running anything.
  pub plan_only: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      root_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
      default_parallelism: num_cpus(),
      skip: Vec::new(),
      plan_only: false,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn build_report_success_when_empty() {
    let report = BuildReport::default();
    assert!(report.is_success());
    assert_eq!(report.count(TargetStatus::Executed), 0);
  }

  #[test]
  fn skipped_targets_do_not_fail_the_build() {
    let report = BuildReport {
      targets: vec![
        TargetReport::new("Restore", TargetStatus::Executed),
        TargetReport::new("Announce", TargetStatus::Skipped).with_reason("not a server build"),
      ],
      ..Default::default()
    };
    assert!(report.is_success());
    assert_eq!(report.status_of("Announce"), Some(TargetStatus::Skipped));
    assert_eq!(report.status_of("Publish"), None);
  }

  #[test]
  fn failed_or_aborted_target_fails_the_build() {
    let failed = ExecuteError::ExecutionFailure {
      target: "Restore".to_string(),
      message: "network unreachable".to_string(),
    };
    let report = BuildReport {
      targets: vec![
        TargetReport::new("Restore", TargetStatus::Failed).with_error(failed),
        TargetReport::new("Compile", TargetStatus::Aborted).with_reason("dependency 'Restore' failed"),
      ],
      ..Default::default()
    };
    assert!(!report.is_success());
    assert_eq!(report.failures().count(), 1);
    assert_eq!(report.count(TargetStatus::Aborted), 1);
  }

  #[test]
  fn fatal_error_fails_the_build() {
    let report = BuildReport {
      fatal: Some(ExecuteError::PreconditionFailed {
        target: "Publish".to_string(),
        condition: "configuration is Release".to_string(),
      }),
      ..Default::default()
    };
    assert!(!report.is_success());
  }

  #[test]
  fn fatal_classification() {
    let missing = ExecuteError::Param(ParamError::MissingRequired {
      name: "ApiKey".to_string(),
      env_var: "API_KEY".to_string(),
    });
    let unknown = ExecuteError::Param(ParamError::UnknownParameter {
      name: "Verbosty".to_string(),
    });
    let body = ExecuteError::ExecutionFailure {
      target: "Compile".to_string(),
      message: "exit code 101".to_string(),
    };

    assert!(missing.is_fatal());
    assert!(!unknown.is_fatal());
    assert!(!body.is_fatal());
  }

  #[test]
  fn error_messages() {
    let artifact = ExecuteError::ArtifactNotProduced {
      target: "Publish".to_string(),
      pattern: "output/*.crate".to_string(),
      producer: Some("Pack".to_string()),
    };
    assert_eq!(
      artifact.to_string(),
      "artifact 'output/*.crate' not found for 'Publish' (expected from 'Pack')"
    );

    let aggregate = ExecuteError::AggregateFanOutFailure {
      target: "Publish".to_string(),
      total: 3,
      failures: vec![
        SubFailure {
          name: "a".to_string(),
          message: "boom".to_string(),
        },
        SubFailure {
          name: "c".to_string(),
          message: "bang".to_string(),
        },
      ],
    };
    assert_eq!(
      aggregate.to_string(),
      "target 'Publish': 2 of 3 sub-invocation(s) failed: a (boom); c (bang)"
    );
  }

  #[test]
  fn report_serializes_status_and_millis() {
    let mut report = TargetReport::new("Compile", TargetStatus::Executed);
    report.duration = Duration::from_millis(1500);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "executed");
    assert_eq!(json["duration_ms"], 1500);
    assert!(json.get("error").is_none());
  }

  #[test]
  fn execute_config_defaults() {
    let config = ExecuteConfig::default();
    assert!(config.default_parallelism >= 1);
    assert!(config.skip.is_empty());
    assert!(!config.plan_only);
  }
}
