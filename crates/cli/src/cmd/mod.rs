mod list;
mod plan;
mod run;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;

use anvil_lib::Invocation;
use anvil_lib::execute::ExecuteConfig;
use anvil_lib::params::ResolverConfig;

pub use list::cmd_list;
pub use plan::cmd_plan;
pub use run::cmd_run;

/// Arguments shared by `run` and `plan`.
#[derive(Debug, Args)]
pub struct InvocationArgs {
  /// Targets to run (default: the default target)
  pub targets: Vec<String>,

  /// Set a parameter; a bare NAME means NAME=true
  #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
  pub params: Vec<(String, String)>,

  /// Skip a target without evaluating its conditions
  #[arg(long, value_name = "TARGET")]
  pub skip: Vec<String>,

  /// Base directory for artifact patterns (default: current directory)
  #[arg(long)]
  pub root: Option<PathBuf>,

  /// Prefix for parameter environment variables
  #[arg(long, value_name = "PREFIX")]
  pub env_prefix: Option<String>,
}

impl InvocationArgs {
  pub fn invocation(&self, plan_only: bool) -> Invocation {
    let mut config = ExecuteConfig {
      skip: self.skip.clone(),
      plan_only,
      ..Default::default()
    };
    if let Some(root) = &self.root {
      config.root_dir = root.clone();
    }

    Invocation {
      targets: self.targets.clone(),
      parameters: self.params.clone(),
      config,
      resolver: ResolverConfig {
        env_prefix: self.env_prefix.clone(),
      },
    }
  }
}

fn parse_param(raw: &str) -> Result<(String, String)> {
  let (name, value) = raw.split_once('=').unwrap_or((raw, "true"));
  let name = name.trim();
  if name.is_empty() {
    bail!("parameter name is empty in '{}'", raw);
  }
  Ok((name.to_string(), value.to_string()))
}
