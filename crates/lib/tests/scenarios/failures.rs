//! Failure gating, preconditions and artifact checks.

use anvil_lib::BuildDefinition;
use anvil_lib::execute::{ExecuteError, TargetStatus};
use anvil_lib::params::{ParamKind, ParameterDescriptor};
use tempfile::TempDir;

use super::common::{Journal, execute, invocation};

#[test]
fn failed_dependency_aborts_dependent() {
  let temp = TempDir::new().unwrap();
  let journal = Journal::default();

  let mut definition = BuildDefinition::new();
  definition
    .targets
    .target("Restore")
    .executes(|_| anyhow::bail!("package feed unreachable"));
  definition
    .targets
    .target("Compile")
    .depends_on(&["Restore"])
    .executes(journal.body("Compile"));

  let report = execute(definition, &invocation(temp.path(), &["Compile"], &[])).unwrap();

  assert_eq!(report.status_of("Restore"), Some(TargetStatus::Failed));
  assert_eq!(report.status_of("Compile"), Some(TargetStatus::Aborted));
  assert!(journal.entries().is_empty());
  assert!(!report.is_success());

  let restore = report.get("Restore").unwrap();
  assert_eq!(
    restore.error.as_ref().unwrap().to_string(),
    "target 'Restore' failed: package feed unreachable"
  );
}

#[test]
fn assured_trigger_executes_after_failure() {
  let temp = TempDir::new().unwrap();
  let journal = Journal::default();

  let mut definition = BuildDefinition::new();
  definition
    .targets
    .target("Publish")
    .executes(|_| anyhow::bail!("upload rejected"));
  definition
    .targets
    .target("Announce")
    .triggered_by(&["Publish"])
    .assured_after_failure()
    .executes(journal.body("Announce"));

  let report = execute(definition, &invocation(temp.path(), &["Publish"], &[])).unwrap();

  assert_eq!(report.status_of("Publish"), Some(TargetStatus::Failed));
  assert_eq!(report.status_of("Announce"), Some(TargetStatus::Executed));
  assert_eq!(journal.entries(), vec!["Announce"]);
}

#[test]
fn false_requirement_aborts_before_any_target_executes() {
  let temp = TempDir::new().unwrap();
  let journal = Journal::default();

  let mut definition = BuildDefinition::new();
  definition.parameters.register(
    ParameterDescriptor::new("Configuration", ParamKind::enumeration(&["Debug", "Release"])).default_value("Debug"),
  );
  definition.targets.target("Compile").executes(journal.body("Compile"));
  definition
    .targets
    .target("Publish")
    .depends_on(&["Compile"])
    .requires("configuration is Release", |ctx| {
      ctx
        .param("Configuration")
        .ok()
        .flatten()
        .is_some_and(|value| value.as_str() == Some("Release"))
    })
    .executes(journal.body("Publish"));

  let report = execute(
    definition,
    &invocation(temp.path(), &["Publish"], &[("Configuration", "Debug")]),
  )
  .unwrap();

  assert!(journal.entries().is_empty());
  assert_eq!(report.count(TargetStatus::Executed), 0);
  let preconditions = report
    .failures()
    .filter(|t| matches!(t.error, Some(ExecuteError::PreconditionFailed { .. })))
    .count();
  assert_eq!(preconditions, 1);
  assert!(!report.is_success());
}

#[test]
fn missing_product_fails_even_though_body_succeeded() {
  let temp = TempDir::new().unwrap();

  let mut definition = BuildDefinition::new();
  definition.targets.target("Pack").produces("*.pkg").executes(|_| Ok(()));

  let report = execute(definition, &invocation(temp.path(), &["Pack"], &[])).unwrap();

  let pack = report.get("Pack").unwrap();
  assert_eq!(pack.status, TargetStatus::Failed);
  assert!(matches!(
    pack.error,
    Some(ExecuteError::ArtifactNotProduced { ref pattern, .. }) if pattern == "*.pkg"
  ));
}

#[test]
fn unknown_requested_target_fails_before_execution() {
  let temp = TempDir::new().unwrap();
  let journal = Journal::default();

  let mut definition = BuildDefinition::new();
  definition.targets.target("Compile").executes(journal.body("Compile"));

  let err = execute(definition, &invocation(temp.path(), &["Compile", "Deploy"], &[])).unwrap_err();

  assert_eq!(err.to_string(), "unknown target 'Deploy' (requested)");
  assert!(journal.entries().is_empty());
}
