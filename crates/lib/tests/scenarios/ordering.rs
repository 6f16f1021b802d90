//! Plan order across dependency, ordering and trigger edges.

use anvil_lib::BuildDefinition;
use anvil_lib::execute::TargetStatus;
use anvil_lib::graph::{GraphError, TargetGraph};
use anvil_lib::plan::plan;
use tempfile::TempDir;

use super::common::{Journal, execute, invocation};

#[test]
fn ordering_only_target_is_not_pulled_in() {
  let temp = TempDir::new().unwrap();
  let journal = Journal::default();

  let mut definition = BuildDefinition::new();
  definition.targets.target("Clean").executes(journal.body("Clean"));
  definition
    .targets
    .target("Restore")
    .before(&["Compile"])
    .executes(journal.body("Restore"));
  definition
    .targets
    .target("Compile")
    .depends_on(&["Restore"])
    .executes(journal.body("Compile"));
  definition
    .targets
    .target("Pack")
    .depends_on(&["Compile"])
    .executes(journal.body("Pack"));

  let report = execute(definition, &invocation(temp.path(), &["Pack"], &[])).unwrap();

  assert_eq!(journal.entries(), vec!["Restore", "Compile", "Pack"]);
  assert_eq!(report.status_of("Clean"), None);
  assert!(report.is_success());
}

#[test]
fn shared_dependencies_run_once_in_declaration_order() {
  let temp = TempDir::new().unwrap();
  let journal = Journal::default();

  let mut definition = BuildDefinition::new();
  definition.targets.target("Restore").executes(journal.body("Restore"));
  definition
    .targets
    .target("Compile")
    .depends_on(&["Restore"])
    .executes(journal.body("Compile"));
  definition.targets.target("Clean").executes(journal.body("Clean"));
  definition
    .targets
    .target("Test")
    .depends_on(&["Compile"])
    .executes(journal.body("Test"));
  definition
    .targets
    .target("Pack")
    .depends_on(&["Compile"])
    .executes(journal.body("Pack"));
  definition
    .targets
    .target("Publish")
    .depends_on(&["Clean", "Test", "Pack"])
    .executes(journal.body("Publish"));

  let report = execute(definition, &invocation(temp.path(), &["Publish"], &[])).unwrap();

  assert_eq!(
    journal.entries(),
    vec!["Restore", "Compile", "Clean", "Test", "Pack", "Publish"]
  );
  let order: Vec<_> = report.targets.iter().map(|t| t.name.as_str()).collect();
  assert_eq!(order, vec!["Restore", "Compile", "Clean", "Test", "Pack", "Publish"]);
}

#[test]
fn plan_respects_every_strict_dependency() {
  let mut definition = BuildDefinition::new();
  let edges: &[(&str, &[&str])] = &[
    ("Lint", &[]),
    ("Restore", &[]),
    ("Generate", &["Restore"]),
    ("Compile", &["Generate", "Restore"]),
    ("Docs", &["Compile"]),
    ("Test", &["Compile", "Lint"]),
    ("Pack", &["Docs", "Compile"]),
    ("Publish", &["Pack", "Test"]),
  ];
  for (name, deps) in edges {
    definition.targets.target(name).depends_on(deps);
  }

  let graph = TargetGraph::build(definition.targets).unwrap();
  let plan = plan(&graph, &["Publish"]).unwrap();
  let names = plan.names(&graph);

  for (name, deps) in edges {
    let index = names.iter().position(|n| n == name).unwrap();
    for dep in deps.iter() {
      let dep_index = names.iter().position(|n| n == dep).unwrap();
      assert!(dep_index < index, "{} must run before {}", dep, name);
    }
  }
  assert_eq!(names.len(), edges.len());
}

#[test]
fn dependency_cycle_is_reported_and_nothing_runs() {
  let temp = TempDir::new().unwrap();
  let journal = Journal::default();

  let mut definition = BuildDefinition::new();
  definition
    .targets
    .target("A")
    .depends_on(&["B"])
    .executes(journal.body("A"));
  definition
    .targets
    .target("B")
    .depends_on(&["A"])
    .executes(journal.body("B"));

  let err = execute(definition, &invocation(temp.path(), &["A"], &[])).unwrap_err();

  match err {
    anvil_lib::Error::Graph(GraphError::CyclicDependency { cycle }) => {
      assert!(cycle.contains(&"A".to_string()));
      assert!(cycle.contains(&"B".to_string()));
    }
    other => panic!("unexpected error: {:?}", other),
  }
  assert!(journal.entries().is_empty());
}

#[test]
fn triggered_target_joins_after_its_trigger() {
  let temp = TempDir::new().unwrap();
  let journal = Journal::default();

  let mut definition = BuildDefinition::new();
  definition.targets.target("Compile").executes(journal.body("Compile"));
  definition
    .targets
    .target("Publish")
    .depends_on(&["Compile"])
    .executes(journal.body("Publish"));
  definition
    .targets
    .target("Announce")
    .triggered_by(&["Publish"])
    .executes(journal.body("Announce"));

  let report = execute(definition, &invocation(temp.path(), &["Publish"], &[])).unwrap();

  assert_eq!(journal.entries(), vec!["Compile", "Publish", "Announce"]);
  assert_eq!(report.status_of("Announce"), Some(TargetStatus::Executed));
}
