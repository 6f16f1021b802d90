//! Target graph construction and validation.
//!
//! [`TargetGraph::build`] turns a [`TargetRegistry`] into an immutable graph:
//! - every relationship must name a declared target
//! - strict dependencies must be acyclic
//! - artifact patterns must be valid globs
//! - a target may declare at most one action and one fan-out
//!
//! Ordering and trigger edges are not checked for cycles here. Ordering cycles only
//! matter among selected targets and are reported by the planner.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::debug;

use crate::target::{Consumes, TargetDef, TargetRegistry};

/// Errors raised while building or planning over the target graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  /// The targets form a cycle, listed in traversal order and closed on the first name.
  #[error("cyclic dependency: {}", .cycle.join(" -> "))]
  CyclicDependency { cycle: Vec<String> },

  /// A relationship or request names a target that was never declared.
  #[error("unknown target '{name}' {}", describe_reference(.referenced_by, .relation))]
  UnknownTargetReference {
    name: String,
    referenced_by: Option<String>,
    relation: &'static str,
  },

  /// A target declared its action or fan-out twice.
  #[error("target '{target}' declares more than one body")]
  ConflictingBody { target: String },

  /// An artifact pattern is not a valid glob.
  #[error("target '{target}' has invalid pattern '{pattern}': {message}")]
  InvalidPattern {
    target: String,
    pattern: String,
    message: String,
  },
}

fn describe_reference(referenced_by: &Option<String>, relation: &str) -> String {
  match referenced_by {
    Some(target) => format!("referenced by '{}' ({})", target, relation),
    None => format!("({})", relation),
  }
}

/// Immutable, validated target graph.
///
/// Edges point from a dependency to its dependent. Targets are addressed by their
/// declaration position, which is also the tie-breaker for every ordering decision.
#[derive(Debug)]
pub struct TargetGraph {
  targets: Vec<TargetDef>,
  index: HashMap<String, usize>,
  graph: DiGraph<usize, ()>,
  nodes: Vec<NodeIndex>,
  /// For each target, the targets it adds to the plan when it runs.
  fires: Vec<Vec<usize>>,
}

impl TargetGraph {
  /// Validate a registry and build the graph.
  ///
  /// # Errors
  ///
  /// - `UnknownTargetReference` when any relationship names an undeclared target
  /// - `ConflictingBody` when a target declared two actions or two fan-outs
  /// - `InvalidPattern` when a produces/consumes pattern does not parse
  /// - `CyclicDependency` when strict dependencies form a cycle
  pub fn build(registry: TargetRegistry) -> Result<Self, GraphError> {
    let (targets, conflicts) = registry.into_parts();

    if let Some(target) = conflicts.into_iter().next() {
      return Err(GraphError::ConflictingBody { target });
    }

    let index: HashMap<String, usize> = targets
      .iter()
      .enumerate()
      .map(|(position, def)| (def.name.clone(), position))
      .collect();

    for def in &targets {
      verify_references(def, &index)?;
      verify_patterns(def)?;
    }

    let mut graph = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..targets.len()).map(|position| graph.add_node(position)).collect();

    for (position, def) in targets.iter().enumerate() {
      for dependency in &def.dependencies {
        graph.add_edge(nodes[index[dependency]], nodes[position], ());
      }
    }

    let mut fires: Vec<Vec<usize>> = vec![Vec::new(); targets.len()];
    for (position, def) in targets.iter().enumerate() {
      for name in &def.triggers {
        push_position(&mut fires[position], index[name]);
      }
      for name in &def.triggered_by {
        push_position(&mut fires[index[name]], position);
      }
    }
    for list in &mut fires {
      list.sort_unstable();
    }

    let dag = Self {
      targets,
      index,
      graph,
      nodes,
      fires,
    };

    dag.verify_acyclic()?;

    debug!(targets = dag.len(), "target graph built");

    Ok(dag)
  }

  /// Verify strict dependencies are acyclic, walking targets in declaration order.
  fn verify_acyclic(&self) -> Result<(), GraphError> {
    let cycle = find_cycle(0..self.len(), |position| self.dependencies(position));

    match cycle {
      Some(cycle) => Err(GraphError::CyclicDependency {
        cycle: cycle.into_iter().map(|position| self.name(position).to_string()).collect(),
      }),
      None => Ok(()),
    }
  }

  /// Declaration position of a target.
  pub fn position(&self, name: &str) -> Option<usize> {
    self.index.get(name).copied()
  }

  pub fn get(&self, name: &str) -> Option<&TargetDef> {
    self.position(name).map(|position| &self.targets[position])
  }

  pub fn target(&self, position: usize) -> &TargetDef {
    &self.targets[position]
  }

  pub fn name(&self, position: usize) -> &str {
    &self.targets[position].name
  }

  /// Targets in declaration order.
  pub fn targets(&self) -> &[TargetDef] {
    &self.targets
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  /// Direct strict dependencies, in declaration order.
  pub fn dependencies(&self, position: usize) -> Vec<usize> {
    let mut deps: Vec<usize> = self
      .graph
      .neighbors_directed(self.nodes[position], Direction::Incoming)
      .map(|node| self.graph[node])
      .collect();
    deps.sort_unstable();
    deps.dedup();
    deps
  }

  /// Direct dependents, in declaration order.
  pub fn dependents(&self, position: usize) -> Vec<usize> {
    let mut dependents: Vec<usize> = self
      .graph
      .neighbors_directed(self.nodes[position], Direction::Outgoing)
      .map(|node| self.graph[node])
      .collect();
    dependents.sort_unstable();
    dependents.dedup();
    dependents
  }

  /// Targets added to the plan when the given target runs.
  pub fn fires(&self, position: usize) -> &[usize] {
    &self.fires[position]
  }

  /// The target declaring `pattern` as a produced artifact, if any.
  pub fn producer_of(&self, pattern: &str) -> Option<usize> {
    self
      .targets
      .iter()
      .position(|def| def.produces.iter().any(|produced| produced == pattern))
  }
}

fn push_position(list: &mut Vec<usize>, position: usize) {
  if !list.contains(&position) {
    list.push(position);
  }
}

fn verify_references(def: &TargetDef, index: &HashMap<String, usize>) -> Result<(), GraphError> {
  let relations: [(&[String], &'static str); 5] = [
    (&def.dependencies, "dependency"),
    (&def.before, "ordering before"),
    (&def.after, "ordering after"),
    (&def.triggered_by, "triggered by"),
    (&def.triggers, "triggers"),
  ];

  for (names, relation) in relations {
    if let Some(name) = names.iter().find(|name| !index.contains_key(name.as_str())) {
      return Err(GraphError::UnknownTargetReference {
        name: name.clone(),
        referenced_by: Some(def.name.clone()),
        relation,
      });
    }
  }

  for consumes in &def.consumes {
    if let Consumes::Target(name) = consumes
      && !index.contains_key(name)
    {
      return Err(GraphError::UnknownTargetReference {
        name: name.clone(),
        referenced_by: Some(def.name.clone()),
        relation: "consumes",
      });
    }
  }

  Ok(())
}

fn verify_patterns(def: &TargetDef) -> Result<(), GraphError> {
  let consumed = def.consumes.iter().filter_map(|consumes| match consumes {
    Consumes::Pattern(pattern) => Some(pattern),
    Consumes::Target(_) => None,
  });

  for pattern in def.produces.iter().chain(consumed) {
    glob::Pattern::new(pattern).map_err(|e| GraphError::InvalidPattern {
      target: def.name.clone(),
      pattern: pattern.clone(),
      message: e.to_string(),
    })?;
  }

  Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
  White,
  Gray,
  Black,
}

/// Three-color depth-first search for the first cycle.
///
/// Roots are visited in the order given and successors in the order `successors`
/// returns them, so the same input always reports the same cycle. The returned path
/// starts and ends on the same node.
pub(crate) fn find_cycle<I, F>(roots: I, successors: F) -> Option<Vec<usize>>
where
  I: IntoIterator<Item = usize>,
  F: Fn(usize) -> Vec<usize>,
{
  let mut marks: HashMap<usize, Mark> = HashMap::new();

  for root in roots {
    if marks.get(&root).copied().unwrap_or(Mark::White) != Mark::White {
      continue;
    }

    // Explicit stack of (node, successors, next successor) to avoid recursion depth limits.
    let mut path: Vec<usize> = vec![root];
    let mut stack: Vec<(usize, Vec<usize>, usize)> = vec![(root, successors(root), 0)];
    marks.insert(root, Mark::Gray);

    while let Some((node, next, cursor)) = stack.last_mut() {
      if *cursor >= next.len() {
        marks.insert(*node, Mark::Black);
        stack.pop();
        path.pop();
        continue;
      }

      let successor = next[*cursor];
      *cursor += 1;

      match marks.get(&successor).copied().unwrap_or(Mark::White) {
        Mark::White => {
          marks.insert(successor, Mark::Gray);
          path.push(successor);
          let successor_next = successors(successor);
          stack.push((successor, successor_next, 0));
        }
        Mark::Gray => {
          let start = path.iter().position(|&p| p == successor).unwrap_or(0);
          let mut cycle = path[start..].to_vec();
          cycle.push(successor);
          return Some(cycle);
        }
        Mark::Black => {}
      }
    }
  }

  None
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry(edges: &[(&str, &[&str])]) -> TargetRegistry {
    let mut registry = TargetRegistry::new();
    for (name, deps) in edges {
      registry.target(name).depends_on(deps);
    }
    registry
  }

  #[test]
  fn empty_registry() {
    let graph = TargetGraph::build(TargetRegistry::new()).unwrap();
    assert!(graph.is_empty());
  }

  #[test]
  fn dependencies_and_dependents() {
    let graph = TargetGraph::build(registry(&[
      ("Restore", &[]),
      ("Compile", &["Restore"]),
      ("Test", &["Compile"]),
      ("Pack", &["Compile"]),
    ]))
    .unwrap();

    let compile = graph.position("Compile").unwrap();
    assert_eq!(graph.dependencies(compile), vec![graph.position("Restore").unwrap()]);
    assert_eq!(
      graph.dependents(compile),
      vec![graph.position("Test").unwrap(), graph.position("Pack").unwrap()]
    );
  }

  #[test]
  fn two_target_cycle_names_both() {
    let err = TargetGraph::build(registry(&[("A", &["B"]), ("B", &["A"])])).unwrap_err();
    assert_eq!(
      err,
      GraphError::CyclicDependency {
        cycle: vec!["A".to_string(), "B".to_string(), "A".to_string()]
      }
    );
    assert_eq!(err.to_string(), "cyclic dependency: A -> B -> A");
  }

  #[test]
  fn self_dependency_is_a_cycle() {
    let err = TargetGraph::build(registry(&[("A", &["A"])])).unwrap_err();
    assert_eq!(
      err,
      GraphError::CyclicDependency {
        cycle: vec!["A".to_string(), "A".to_string()]
      }
    );
  }

  #[test]
  fn cycle_report_is_deterministic() {
    // Two disjoint cycles; the one reachable from the first declared target wins.
    let edges: &[(&str, &[&str])] = &[
      ("Lint", &[]),
      ("X", &["Y"]),
      ("Y", &["Z"]),
      ("Z", &["X"]),
      ("P", &["Q"]),
      ("Q", &["P"]),
    ];

    for _ in 0..5 {
      let err = TargetGraph::build(registry(edges)).unwrap_err();
      assert_eq!(err.to_string(), "cyclic dependency: X -> Y -> Z -> X");
    }
  }

  #[test]
  fn ordering_cycles_are_allowed_at_build_time() {
    let mut registry = TargetRegistry::new();
    registry.target("A").before(&["B"]);
    registry.target("B").before(&["A"]);

    assert!(TargetGraph::build(registry).is_ok());
  }

  #[test]
  fn unknown_dependency_is_reported() {
    let err = TargetGraph::build(registry(&[("Compile", &["Restore"])])).unwrap_err();
    assert_eq!(
      err,
      GraphError::UnknownTargetReference {
        name: "Restore".to_string(),
        referenced_by: Some("Compile".to_string()),
        relation: "dependency",
      }
    );
    assert_eq!(
      err.to_string(),
      "unknown target 'Restore' referenced by 'Compile' (dependency)"
    );
  }

  #[test]
  fn unknown_ordering_and_trigger_references_are_reported() {
    let mut ordering = TargetRegistry::new();
    ordering.target("Clean").before(&["Restore"]);
    assert!(matches!(
      TargetGraph::build(ordering),
      Err(GraphError::UnknownTargetReference { relation: "ordering before", .. })
    ));

    let mut trigger = TargetRegistry::new();
    trigger.target("Announce").triggered_by(&["Publish"]);
    assert!(matches!(
      TargetGraph::build(trigger),
      Err(GraphError::UnknownTargetReference { relation: "triggered by", .. })
    ));

    let mut consumes = TargetRegistry::new();
    consumes.target("Publish").consumes("Pack");
    assert!(matches!(
      TargetGraph::build(consumes),
      Err(GraphError::UnknownTargetReference { relation: "consumes", .. })
    ));
  }

  #[test]
  fn triggers_are_merged_from_both_directions() {
    let mut registry = TargetRegistry::new();
    registry.target("Publish");
    registry.target("Announce").triggered_by(&["Publish"]);
    registry.target("Tag");
    registry.target("Publish").triggers(&["Tag", "Announce"]);

    let graph = TargetGraph::build(registry).unwrap();
    let publish = graph.position("Publish").unwrap();
    let fired: Vec<_> = graph.fires(publish).iter().map(|&p| graph.name(p)).collect();
    assert_eq!(fired, vec!["Announce", "Tag"]);
  }

  #[test]
  fn conflicting_body_is_rejected() {
    let mut registry = TargetRegistry::new();
    registry.target("Pack").executes(|_| Ok(()));
    registry.target("Pack").executes(|_| Ok(()));

    assert_eq!(
      TargetGraph::build(registry).unwrap_err(),
      GraphError::ConflictingBody {
        target: "Pack".to_string()
      }
    );
  }

  #[test]
  fn invalid_pattern_is_rejected() {
    let mut registry = TargetRegistry::new();
    registry.target("Pack").produces("out/[*.pkg");

    assert!(matches!(
      TargetGraph::build(registry),
      Err(GraphError::InvalidPattern { .. })
    ));
  }

  #[test]
  fn producer_lookup() {
    let mut registry = TargetRegistry::new();
    registry.target("Pack").produces("out/*.pkg");
    registry.target("Publish").consumes_pattern("out/*.pkg");

    let graph = TargetGraph::build(registry).unwrap();
    assert_eq!(graph.producer_of("out/*.pkg"), graph.position("Pack"));
    assert_eq!(graph.producer_of("out/*.zip"), None);
  }

  #[test]
  fn find_cycle_on_acyclic_input() {
    let edges = [vec![1, 2], vec![2], vec![]];
    assert_eq!(find_cycle(0..3, |n| edges[n].clone()), None);
  }
}
