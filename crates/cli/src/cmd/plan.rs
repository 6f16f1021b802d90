//! Implementation of the `anvil plan` command.
//!
//! Validates the build definition against the invocation and prints the order
//! targets would run in, without running any of them.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use anvil_lib::prepare;

use crate::definition::build_definition;
use crate::output::{OutputFormat, print_info, print_json, symbols};

use super::InvocationArgs;

pub fn cmd_plan(args: &InvocationArgs, output: OutputFormat) -> Result<()> {
  let invocation = args.invocation(true);
  let prepared = prepare(build_definition(), &invocation).context("Failed to compute plan")?;
  let summary = prepared.plan.summary(&prepared.graph);

  if output.is_json() {
    return print_json(&summary);
  }

  print_info(&format!("Plan for {}", summary.requested.join(", ")));
  for (index, name) in summary.order.iter().enumerate() {
    let description = prepared
      .graph
      .get(name)
      .and_then(|def| def.description.as_deref())
      .unwrap_or("");
    println!(
      "  {:>2}. {} {}",
      index + 1,
      name,
      description.if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }

  if !summary.potential_triggers.is_empty() {
    println!();
    println!("May trigger:");
    for trigger in &summary.potential_triggers {
      println!("  {} {} {}", trigger.target, symbols::ARROW, trigger.fires.join(", "));
    }
  }

  Ok(())
}
