mod cmd;
mod definition;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::InvocationArgs;
use output::OutputFormat;

/// anvil - target-based build automation
#[derive(Parser)]
#[command(name = "anvil")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the requested targets (default: the default target)
  Run {
    #[command(flatten)]
    invocation: InvocationArgs,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show the execution plan without running anything
  Plan {
    #[command(flatten)]
    invocation: InvocationArgs,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// List declared targets and parameters
  List {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("warn,anvil=debug,anvil_lib=debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Run { invocation, output } => {
      if !cmd::cmd_run(&invocation, output)? {
        std::process::exit(1);
      }
      Ok(())
    }
    Commands::Plan { invocation, output } => cmd::cmd_plan(&invocation, output),
    Commands::List { output } => cmd::cmd_list(output),
  }
}
