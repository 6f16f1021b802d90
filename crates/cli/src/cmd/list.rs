//! Implementation of the `anvil list` command.

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use anvil_lib::params::ParameterSummary;
use anvil_lib::target::TargetSummary;

use crate::definition::build_definition;
use crate::output::{OutputFormat, print_json, symbols};

pub fn cmd_list(output: OutputFormat) -> Result<()> {
  let definition = build_definition();
  let targets: Vec<TargetSummary> = definition.targets.targets().iter().map(|def| def.summary()).collect();
  let parameters: Vec<ParameterSummary> = definition
    .parameters
    .descriptors()
    .iter()
    .map(|descriptor| descriptor.summary())
    .collect();

  if output.is_json() {
    return print_json(&serde_json::json!({
      "default_target": definition.default_target,
      "targets": targets,
      "parameters": parameters,
    }));
  }

  println!("Targets:");
  for target in &targets {
    let marker = if definition.default_target.as_deref() == Some(target.name.as_str()) {
      " (default)"
    } else {
      ""
    };
    println!(
      "  {} {}{} {}",
      symbols::INFO,
      target.name,
      marker,
      target
        .description
        .as_deref()
        .unwrap_or("")
        .if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
    if !target.dependencies.is_empty() {
      println!("      depends on: {}", target.dependencies.join(", "));
    }
    if !target.triggered_by.is_empty() {
      println!("      triggered by: {}", target.triggered_by.join(", "));
    }
    if let Some(partition) = &target.partition {
      println!("      partitioned: {} shards via {}", partition.total, partition.parameter);
    }
  }

  println!();
  println!("Parameters:");
  for parameter in &parameters {
    let required = if parameter.required { ", required" } else { "" };
    println!(
      "  {} {} [{}{}] {}",
      symbols::INFO,
      parameter.name,
      parameter.kind,
      required,
      parameter
        .description
        .as_deref()
        .unwrap_or("")
        .if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }

  Ok(())
}
