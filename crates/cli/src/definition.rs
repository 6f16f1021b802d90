//! The build definition for this repository.
//!
//! Bodies shell out to cargo. The cargo executable comes from the `CargoPath`
//! parameter so CI can point at a pinned toolchain.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use anvil_lib::BuildDefinition;
use anvil_lib::execute::TargetContext;
use anvil_lib::params::{ParamKind, ParameterDescriptor};
use anvil_lib::target::{FanOut, SubInvocation};

const CONFIGURATION: &str = "Configuration";
const CARGO_PATH: &str = "CargoPath";
const REGISTRY_TOKEN: &str = "RegistryToken";

const OUTPUT_DIR: &str = "output";
const PACKAGE_PATTERN: &str = "output/*.crate";

/// Workspace members, in publish order.
const CRATES: &[&str] = &["anvil-lib", "anvil-cli"];

pub fn build_definition() -> BuildDefinition {
  let mut definition = BuildDefinition::new().with_default_target("Pack");

  definition
    .parameters
    .register(
      ParameterDescriptor::new(CONFIGURATION, ParamKind::enumeration(&["Debug", "Release"]))
        .describe("Cargo profile to build with (default: Release on the build server)")
        .default_with(|env| Some(if env.server_build { "Release" } else { "Debug" }.to_string())),
    )
    .register(
      ParameterDescriptor::new(CARGO_PATH, ParamKind::Path)
        .describe("Cargo executable")
        .default_value("cargo"),
    )
    .register(ParameterDescriptor::new(REGISTRY_TOKEN, ParamKind::String).describe("crates.io API token"));

  let targets = &mut definition.targets;

  targets
    .target("Clean")
    .description("Remove packaged artifacts")
    .before(&["Restore"])
    .executes(|ctx| {
      let output = ctx.root_dir().join(OUTPUT_DIR);
      if output.exists() {
        fs::remove_dir_all(&output).with_context(|| format!("Failed to remove {}", output.display()))?;
      }
      Ok(())
    });

  targets
    .target("Restore")
    .description("Fetch dependencies")
    .executes(|ctx| cargo(ctx, &["fetch"]));

  targets
    .target("Compile")
    .description("Build every workspace member")
    .depends_on(&["Restore"])
    .executes(|ctx| {
      let mut args = vec!["build", "--workspace"];
      if is_release(ctx)? {
        args.push("--release");
      }
      if ctx.is_scheduled("Restore") {
        args.push("--offline");
      }
      cargo(ctx, &args)
    });

  targets
    .target("Test")
    .description("Run the test suites, one sub-invocation per crate")
    .depends_on(&["Compile"])
    .partition(2)
    .fan_out(FanOut::new(0, |ctx| {
      let cargo = cargo_path(ctx)?;
      let root = ctx.root_dir().to_path_buf();
      let release = is_release(ctx)?;

      Ok(
        ctx
          .current_items(CRATES)?
          .iter()
          .map(|krate| {
            let mut args = vec!["test".to_string(), "-p".to_string(), krate.to_string()];
            if release {
              args.push("--release".to_string());
            }
            let (cargo, root) = (cargo.clone(), root.clone());
            SubInvocation::new(*krate, move || run_tool(&cargo, &args, &root))
          })
          .collect(),
      )
    }));

  targets
    .target("Pack")
    .description("Package every crate into output/")
    .depends_on(&["Compile"])
    .produces(PACKAGE_PATTERN)
    .executes(|ctx| {
      cargo(ctx, &["package", "--workspace", "--no-verify", "--allow-dirty"])?;
      collect_packages(ctx.root_dir())
    });

  targets
    .target("Publish")
    .description("Upload packaged crates to crates.io")
    .depends_on(&["Clean", "Test", "Pack"])
    .consumes("Pack")
    .requires_param(REGISTRY_TOKEN)
    .requires("configuration is Release", |ctx| is_release(ctx).unwrap_or(false))
    .fan_out(
      FanOut::new(5, |ctx| {
        let cargo = cargo_path(ctx)?;
        let root = ctx.root_dir().to_path_buf();
        let token = ctx.require_param(REGISTRY_TOKEN)?.to_string();

        Ok(
          CRATES
            .iter()
            .map(|krate| {
              let args = vec![
                "publish".to_string(),
                "-p".to_string(),
                krate.to_string(),
                "--token".to_string(),
                token.clone(),
              ];
              let (cargo, root) = (cargo.clone(), root.clone());
              SubInvocation::new(*krate, move || run_tool(&cargo, &args, &root))
            })
            .collect(),
        )
      })
      .complete_on_failure(),
    );

  targets
    .target("Announce")
    .description("Report the publish outcome on the build server")
    .triggered_by(&["Publish"])
    .assured_after_failure()
    .only_when_static("running on the build server", |ctx| ctx.is_server_build())
    .executes(|ctx| {
      let server = ctx.environment().build_server.as_deref().unwrap_or("unknown");
      info!(build_server = %server, "publish finished");
      println!("Publish finished on {}", server);
      Ok(())
    });

  targets
    .target("Install")
    .description("Install the anvil binary with cargo install")
    .depends_on(&["Compile"])
    .only_when("not on the build server", |ctx| ctx.is_local_build())
    .executes(|ctx| cargo(ctx, &["install", "--path", "crates/cli", "--locked"]));

  definition
}

fn is_release(ctx: &TargetContext<'_>) -> Result<bool> {
  Ok(ctx.param_or(CONFIGURATION, "Debug")? == "Release")
}

fn cargo_path(ctx: &TargetContext<'_>) -> Result<String> {
  Ok(ctx.param_or(CARGO_PATH, "cargo")?)
}

fn cargo(ctx: &TargetContext<'_>, args: &[&str]) -> Result<()> {
  let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
  run_tool(&cargo_path(ctx)?, &args, ctx.root_dir())
}

fn run_tool(program: &str, args: &[String], dir: &Path) -> Result<()> {
  debug!(program, args = %redact(args).join(" "), dir = %dir.display(), "running tool");

  let status = Command::new(program)
    .args(args)
    .current_dir(dir)
    .status()
    .with_context(|| format!("Failed to start {}", program))?;

  if !status.success() {
    bail!("{} {} exited with {}", program, redact(args).join(" "), status);
  }
  Ok(())
}

/// Hide the value following `--token`.
fn redact(args: &[String]) -> Vec<&str> {
  let mut redacted = Vec::with_capacity(args.len());
  let mut hide_next = false;
  for arg in args {
    if hide_next {
      redacted.push("***");
    } else {
      redacted.push(arg.as_str());
    }
    hide_next = arg == "--token";
  }
  redacted
}

/// Copy `.crate` files from cargo's package directory into the output directory.
fn collect_packages(root: &Path) -> Result<()> {
  let package_dir = root.join("target").join("package");
  let output = root.join(OUTPUT_DIR);
  fs::create_dir_all(&output).with_context(|| format!("Failed to create {}", output.display()))?;

  let entries =
    fs::read_dir(&package_dir).with_context(|| format!("Failed to read {}", package_dir.display()))?;
  let packages: Vec<PathBuf> = entries
    .flatten()
    .map(|entry| entry.path())
    .filter(|path| path.extension().is_some_and(|ext| ext == "crate"))
    .collect();

  for package in &packages {
    if let Some(file_name) = package.file_name() {
      fs::copy(package, output.join(file_name))
        .with_context(|| format!("Failed to copy {}", package.display()))?;
    }
  }

  debug!(count = packages.len(), output = %output.display(), "collected packages");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use anvil_lib::graph::TargetGraph;
  use anvil_lib::plan::plan;
  use tempfile::TempDir;

  #[test]
  fn definition_builds_a_valid_graph() {
    let definition = build_definition();
    let graph = TargetGraph::build(definition.targets).unwrap();

    let plan = plan(&graph, &["Publish"]).unwrap();
    assert_eq!(
      plan.names(&graph),
      vec!["Clean", "Restore", "Compile", "Test", "Pack", "Publish"]
    );
    let summary = plan.summary(&graph);
    assert_eq!(summary.potential_triggers.len(), 1);
    assert_eq!(summary.potential_triggers[0].fires, vec!["Announce"]);
  }

  #[test]
  fn clean_orders_before_restore_without_being_pulled_in() {
    let graph = TargetGraph::build(build_definition().targets).unwrap();

    let pack = plan(&graph, &["Pack"]).unwrap();
    assert_eq!(pack.names(&graph), vec!["Restore", "Compile", "Pack"]);

    let both = plan(&graph, &["Restore", "Clean"]).unwrap();
    assert_eq!(both.names(&graph), vec!["Clean", "Restore"]);
  }

  #[test]
  fn default_target_is_pack() {
    assert_eq!(build_definition().default_target.as_deref(), Some("Pack"));
  }

  #[test]
  fn token_is_redacted() {
    let args: Vec<String> = ["publish", "--token", "secret", "-p", "anvil-lib"]
      .iter()
      .map(|s| s.to_string())
      .collect();
    assert_eq!(redact(&args), vec!["publish", "--token", "***", "-p", "anvil-lib"]);
  }

  #[test]
  fn packages_are_collected_into_output() {
    let temp = TempDir::new().unwrap();
    let package_dir = temp.path().join("target/package");
    fs::create_dir_all(package_dir.join("anvil-lib-0.1.0")).unwrap();
    fs::write(package_dir.join("anvil-lib-0.1.0.crate"), b"crate").unwrap();

    collect_packages(temp.path()).unwrap();

    assert!(temp.path().join("output/anvil-lib-0.1.0.crate").exists());
    assert!(!temp.path().join("output/anvil-lib-0.1.0").exists());
  }
}
