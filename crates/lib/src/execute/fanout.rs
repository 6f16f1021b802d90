//! Bounded-parallelism fan-out of sub-invocations.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::target::SubInvocation;

use super::types::{ExecuteError, SubFailure};

enum Outcome {
  Succeeded,
  Failed(String),
  Cancelled,
}

/// Run `invocations` with at most `max_concurrency` in flight.
///
/// Without `complete_on_failure`, the first failure cancels every sub-invocation that
/// has not started yet and is reported as an `ExecutionFailure`. With it, every
/// sub-invocation runs and all failures are reported together. Either way this returns
/// only once every started sub-invocation has finished.
pub(crate) async fn run_fan_out(
  target: &str,
  invocations: Vec<SubInvocation>,
  max_concurrency: usize,
  complete_on_failure: bool,
) -> Result<(), ExecuteError> {
  let total = invocations.len();
  let max_concurrency = max_concurrency.max(1);

  debug!(
    target_name = %target,
    sub_invocations = total,
    max_concurrency,
    complete_on_failure,
    "dispatching fan-out"
  );

  let semaphore = Arc::new(Semaphore::new(max_concurrency));
  let cancel = CancellationToken::new();
  let mut tasks = JoinSet::new();

  for (index, invocation) in invocations.into_iter().enumerate() {
    let semaphore = semaphore.clone();
    let cancel = cancel.clone();

    tasks.spawn(async move {
      let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = semaphore.acquire_owned() => permit.ok(),
      };
      let Some(permit) = permit else {
        return (index, invocation.name, Outcome::Cancelled);
      };
      if cancel.is_cancelled() {
        return (index, invocation.name, Outcome::Cancelled);
      }

      let run = invocation.run.clone();
      let outcome = match tokio::task::spawn_blocking(move || run()).await {
        Ok(Ok(())) => Outcome::Succeeded,
        Ok(Err(e)) => Outcome::Failed(format!("{:#}", e)),
        Err(e) => Outcome::Failed(format!("panicked: {}", e)),
      };

      // Cancel before releasing the permit so no waiter can start in between.
      if matches!(outcome, Outcome::Failed(_)) && !complete_on_failure {
        cancel.cancel();
      }
      drop(permit);
      (index, invocation.name, outcome)
    });
  }

  let mut failures: Vec<(usize, SubFailure)> = Vec::new();
  let mut first_failure: Option<SubFailure> = None;
  let mut cancelled = 0usize;

  while let Some(joined) = tasks.join_next().await {
    let (index, name, outcome) = match joined {
      Ok(result) => result,
      Err(e) => (usize::MAX, "<unknown>".to_string(), Outcome::Failed(format!("task failed: {}", e))),
    };

    match outcome {
      Outcome::Succeeded => debug!(target_name = %target, sub_invocation = %name, "sub-invocation succeeded"),
      Outcome::Cancelled => cancelled += 1,
      Outcome::Failed(message) => {
        warn!(target_name = %target, sub_invocation = %name, error = %message, "sub-invocation failed");
        let failure = SubFailure { name, message };
        if first_failure.is_none() {
          first_failure = Some(failure.clone());
          if !complete_on_failure {
            warn!(target_name = %target, "cancelled pending sub-invocations");
          }
        }
        failures.push((index, failure));
      }
    }
  }

  debug!(
    target_name = %target,
    failed = failures.len(),
    cancelled,
    "fan-out finished"
  );

  match first_failure {
    None => Ok(()),
    Some(first) if !complete_on_failure => Err(ExecuteError::ExecutionFailure {
      target: target.to_string(),
      message: format!("sub-invocation '{}' failed: {}", first.name, first.message),
    }),
    Some(_) => {
      failures.sort_by_key(|(index, _)| *index);
      Err(ExecuteError::AggregateFanOutFailure {
        target: target.to_string(),
        total,
        failures: failures.into_iter().map(|(_, failure)| failure).collect(),
      })
    }
  }
}
