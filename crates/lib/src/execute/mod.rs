//! Target execution.
//!
//! [`execute`] walks an [`ExecutionPlan`] one target at a time. It handles:
//! - a preflight pass over the plan (skip list, static conditions, requirements)
//! - failure gating along strict dependencies and trigger edges
//! - dynamic conditions, artifact checks and the target body
//! - bounded fan-out inside a single target
//! - triggered targets joining the remaining plan
//!
//! A false requirement or a missing required parameter stops the walk at once; the
//! targets not reached yet are reported as `Pending`. Any other failure only gates
//! the failing target's dependents and triggered targets.

mod artifacts;
mod context;
mod fanout;
mod types;

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::graph::TargetGraph;
use crate::params::ParamError;
use crate::plan::{ExecutionPlan, extend_plan};
use crate::target::{Condition, Timing};

pub use context::{BuildContext, TargetContext};
pub use types::{BuildReport, ExecuteConfig, ExecuteError, SubFailure, TargetReport, TargetStatus};

/// Execute a plan.
///
/// Never fails as a whole: every outcome, including a fatal precondition failure,
/// is recorded in the returned [`BuildReport`].
///
/// # Arguments
///
/// * `graph` - The graph the plan was computed from
/// * `plan` - The targets to run, in order
/// * `ctx` - Parameters and build environment for this invocation
/// * `config` - Execution configuration
pub async fn execute(graph: &TargetGraph, plan: &ExecutionPlan, ctx: &BuildContext, config: &ExecuteConfig) -> BuildReport {
  let started = Instant::now();
  info!(planned = plan.len(), "starting execution");

  let mut walk = Walk::new(graph, plan, ctx, config);

  if config.plan_only {
    for &position in plan.order() {
      info!(target_name = %graph.name(position), "would execute target");
    }
  } else {
    walk.run().await;
  }

  let report = walk.finish(started.elapsed());

  info!(
    executed = report.count(TargetStatus::Executed),
    failed = report.count(TargetStatus::Failed),
    skipped = report.count(TargetStatus::Skipped),
    aborted = report.count(TargetStatus::Aborted),
    success = report.is_success(),
    "execution complete"
  );

  report
}

/// Mutable state of one walk over a plan.
struct Walk<'a> {
  graph: &'a TargetGraph,
  ctx: &'a BuildContext,
  config: &'a ExecuteConfig,
  invoked: Vec<usize>,
  /// Targets not processed yet, in order.
  remaining: Vec<usize>,
  done: HashSet<usize>,
  /// Planned targets not skipped or aborted.
  scheduled: HashSet<usize>,
  /// Outcomes settled before the target's turn (skip list, static conditions, preflight abort).
  decided: HashMap<usize, TargetReport>,
  /// Triggered target -> the target whose completion added it.
  triggered_by: HashMap<usize, usize>,
  status: HashMap<usize, TargetStatus>,
  reports: Vec<TargetReport>,
  fatal: Option<ExecuteError>,
}

impl<'a> Walk<'a> {
  fn new(graph: &'a TargetGraph, plan: &ExecutionPlan, ctx: &'a BuildContext, config: &'a ExecuteConfig) -> Self {
    Self {
      graph,
      ctx,
      config,
      invoked: plan.requested().to_vec(),
      remaining: plan.order().to_vec(),
      done: HashSet::new(),
      scheduled: plan.order().iter().copied().collect(),
      decided: HashMap::new(),
      triggered_by: HashMap::new(),
      status: HashMap::new(),
      reports: Vec::new(),
      fatal: None,
    }
  }

  fn context(&self, position: usize) -> TargetContext<'_> {
    TargetContext {
      build: self.ctx,
      graph: self.graph,
      config: self.config,
      position,
      invoked: &self.invoked,
      scheduled: &self.scheduled,
    }
  }

  async fn run(&mut self) {
    let planned = self.remaining.clone();
    if !self.preflight(&planned) {
      return;
    }

    while !self.remaining.is_empty() {
      let position = self.remaining.remove(0);
      self.process(position).await;
      if self.fatal.is_some() {
        break;
      }
    }
  }

  /// Settle skip-list entries and static conditions, and check requirements.
  ///
  /// Returns false if a requirement failed; the run must stop.
  fn preflight(&mut self, positions: &[usize]) -> bool {
    let graph = self.graph;
    for &position in positions {
      let name = graph.name(position);

      if self.config.skip.iter().any(|skipped| skipped == name) {
        info!(target_name = %name, "skipping target on request");
        self.decide_skip(position, "skipped on request".to_string());
        continue;
      }

      match self.check_static(position) {
        Ok(None) => {}
        Ok(Some(reason)) => {
          info!(target_name = %name, reason = %reason, "skipping target");
          self.decide_skip(position, reason);
        }
        Err(e) => {
          error!(target_name = %name, error = %e, "precondition failed, aborting invocation");
          self.scheduled.remove(&position);
          self.decided.insert(
            position,
            TargetReport::new(name, TargetStatus::Aborted)
              .with_reason("precondition failed")
              .with_error(e.clone()),
          );
          self.fatal = Some(e);
          return false;
        }
      }
    }

    true
  }

  fn decide_skip(&mut self, position: usize, reason: String) {
    self.scheduled.remove(&position);
    self.decided.insert(
      position,
      TargetReport::new(self.graph.name(position), TargetStatus::Skipped).with_reason(reason),
    );
  }

  /// Evaluate static `OnlyWhen` and requirement conditions in declaration order.
  ///
  /// `Ok(Some(reason))` means the target is skipped.
  fn check_static(&self, position: usize) -> Result<Option<String>, ExecuteError> {
    let ctx = self.context(position);

    for condition in &self.graph.target(position).conditions {
      match condition {
        Condition::OnlyWhen {
          description,
          timing: Timing::Static,
          predicate,
        } => {
          if !predicate(&ctx) {
            return Ok(Some(format!("condition '{}' is false", description)));
          }
        }
        Condition::OnlyWhen { .. } => {}
        Condition::Requires { description, predicate } => {
          if !predicate(&ctx) {
            return Err(ExecuteError::PreconditionFailed {
              target: ctx.name().to_string(),
              condition: description.clone(),
            });
          }
        }
        Condition::RequiresParameter { name } => {
          ctx.require_param(name)?;
        }
      }
    }

    Ok(None)
  }

  /// First false dynamic `OnlyWhen`, as a skip reason.
  fn check_dynamic(&self, position: usize) -> Option<String> {
    let ctx = self.context(position);

    self
      .graph
      .target(position)
      .conditions
      .iter()
      .find_map(|condition| match condition {
        Condition::OnlyWhen {
          description,
          timing: Timing::Dynamic,
          predicate,
        } if !predicate(&ctx) => Some(format!("condition '{}' is false", description)),
        _ => None,
      })
  }

  /// A strict dependency or triggering target that failed or was aborted.
  fn failed_gate(&self, position: usize) -> Option<usize> {
    let is_failed = |gate: &usize| self.status.get(gate).is_some_and(|status| status.is_failure());

    self
      .graph
      .dependencies(position)
      .into_iter()
      .chain(self.triggered_by.get(&position).copied())
      .find(is_failed)
  }

  async fn process(&mut self, position: usize) {
    let graph = self.graph;
    self.done.insert(position);
    let name = graph.name(position);

    if let Some(report) = self.decided.remove(&position) {
      self.record(position, report);
      return;
    }

    if !graph.target(position).assured_after_failure
      && let Some(gate) = self.failed_gate(position)
    {
      let gate = graph.name(gate);
      warn!(target_name = %name, failed = %gate, "aborting target after failed predecessor");
      self.scheduled.remove(&position);
      self.record(
        position,
        TargetReport::new(name, TargetStatus::Aborted).with_reason(format!("'{}' failed", gate)),
      );
      return;
    }

    if let Some(reason) = self.check_dynamic(position) {
      info!(target_name = %name, reason = %reason, "skipping target");
      self.scheduled.remove(&position);
      self.record(
        position,
        TargetReport::new(name, TargetStatus::Skipped).with_reason(reason),
      );
      return;
    }

    self.status.insert(position, TargetStatus::Executing);
    info!(target_name = %name, "executing target");

    let started = Instant::now();
    let result = self.run_body(position).await;
    let duration = started.elapsed();

    let mut report = match result {
      Ok(()) => {
        info!(target_name = %name, duration_ms = millis(duration), "target executed");
        TargetReport::new(name, TargetStatus::Executed)
      }
      Err(e) => {
        error!(target_name = %name, duration_ms = millis(duration), error = %e, "target failed");
        if e.is_fatal() {
          error!(target_name = %name, "aborting invocation");
          self.fatal = Some(e.clone());
        }
        TargetReport::new(name, TargetStatus::Failed).with_error(e)
      }
    };
    report.duration = duration;
    self.record(position, report);

    if self.fatal.is_none() {
      self.fire_triggers(position);
    }
  }

  async fn run_body(&self, position: usize) -> Result<(), ExecuteError> {
    let def = self.graph.target(position);
    let ctx = self.context(position);
    let root = self.config.root_dir.as_path();

    artifacts::check_consumes(self.graph, position, root)?;

    if let Some(action) = &def.action {
      action(&ctx).map_err(|e| body_error(&def.name, e))?;
    }

    if let Some(fan_out) = &def.fan_out {
      let invocations = (fan_out.generate)(&ctx).map_err(|e| body_error(&def.name, e))?;
      let max_concurrency = match fan_out.max_concurrency {
        0 => self.config.default_parallelism,
        max => max,
      };
      fanout::run_fan_out(&def.name, invocations, max_concurrency, fan_out.complete_on_failure).await?;
    }

    artifacts::check_produces(self.graph, position, root)?;

    Ok(())
  }

  /// Add the targets fired by `position` to the remaining plan.
  fn fire_triggers(&mut self, position: usize) {
    let graph = self.graph;
    let name = graph.name(position);

    for &fired in graph.fires(position) {
      let fired_name = graph.name(fired);
      if self.done.contains(&fired) || self.remaining.contains(&fired) {
        debug!(target_name = %name, triggered = %fired_name, "triggered target already planned");
        continue;
      }

      info!(target_name = %name, triggered = %fired_name, "trigger fired");
      self.triggered_by.insert(fired, position);

      let before: HashSet<usize> = self.remaining.iter().copied().collect();
      let next = match extend_plan(graph, &self.remaining, &self.done, fired) {
        Ok(next) => next,
        Err(e) => {
          error!(target_name = %name, triggered = %fired_name, error = %e, "cannot schedule triggered target");
          self.fatal = Some(e.into());
          return;
        }
      };

      let joined: Vec<usize> = next.iter().copied().filter(|p| !before.contains(p)).collect();
      self.remaining = next;
      self.scheduled.extend(joined.iter().copied());

      if !self.preflight(&joined) {
        return;
      }
    }
  }

  fn record(&mut self, position: usize, mut report: TargetReport) {
    if let Some(&trigger) = self.triggered_by.get(&position) {
      report.triggered_by = Some(self.graph.name(trigger).to_string());
    }
    debug!(target_name = %report.name, status = %report.status, "target finished");
    self.status.insert(position, report.status);
    self.reports.push(report);
  }

  fn finish(mut self, duration: Duration) -> BuildReport {
    for position in std::mem::take(&mut self.remaining) {
      let report = self
        .decided
        .remove(&position)
        .unwrap_or_else(|| TargetReport::new(self.graph.name(position), TargetStatus::Pending));
      self.reports.push(report);
    }

    BuildReport {
      targets: self.reports,
      fatal: self.fatal,
      duration,
    }
  }
}

/// Map a body error onto the execution taxonomy.
///
/// Parameter and execution errors keep their kind so a missing required parameter
/// stays fatal; anything else is an `ExecutionFailure` carrying the whole chain.
fn body_error(target: &str, error: anyhow::Error) -> ExecuteError {
  let error = match error.downcast::<ParamError>() {
    Ok(param) => return ExecuteError::Param(param),
    Err(error) => error,
  };
  match error.downcast::<ExecuteError>() {
    Ok(execute) => execute,
    Err(error) => ExecuteError::ExecutionFailure {
      target: target.to_string(),
      message: format!("{:#}", error),
    },
  }
}

fn millis(duration: Duration) -> u64 {
  duration.as_millis().min(u64::MAX as u128) as u64
}
