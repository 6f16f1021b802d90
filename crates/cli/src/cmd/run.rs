//! Implementation of the `anvil run` command.

use std::time::Instant;

use anyhow::{Context, Result};

use anvil_lib::execute::{BuildReport, TargetStatus};
use anvil_lib::run;

use crate::definition::build_definition;
use crate::output::{
  OutputFormat, format_duration, print_error, print_json, print_stat, print_success, print_target, print_warning,
};

use super::InvocationArgs;

/// Run the invocation. Returns whether every target succeeded.
pub fn cmd_run(args: &InvocationArgs, output: OutputFormat) -> Result<bool> {
  let start = Instant::now();
  let invocation = args.invocation(false);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(run(build_definition(), &invocation))
    .context("Failed to prepare build")?;

  if output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(report.is_success())
}

fn print_report(report: &BuildReport) {
  println!("Targets:");
  for target in &report.targets {
    print_target(target);
  }
  println!();

  for target in report.failures() {
    if let Some(error) = &target.error {
      print_error(&error.to_string());
    }
  }

  let pending = report.count(TargetStatus::Pending);
  if let Some(fatal) = &report.fatal {
    print_warning(&format!("Build aborted: {}", fatal));
    if pending > 0 {
      print_warning(&format!("{} target(s) never ran", pending));
    }
  }

  if report.is_success() {
    print_success(&format!(
      "Build succeeded: {} executed, {} skipped",
      report.count(TargetStatus::Executed),
      report.count(TargetStatus::Skipped)
    ));
  } else {
    print_error(&format!(
      "Build failed: {} failed, {} aborted",
      report.count(TargetStatus::Failed),
      report.count(TargetStatus::Aborted)
    ));
  }
}
