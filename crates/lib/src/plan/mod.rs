//! Execution planning.
//!
//! [`plan`] selects the requested targets plus everything they strictly depend on,
//! then orders the selection topologically. Strict dependencies are hard edges;
//! `before`/`after` declarations add soft edges between targets that are both
//! selected, but never pull a target in. Among targets that are ready at the same
//! time, the one declared first goes first.
//!
//! Trigger edges are not followed here. The plan records which targets each planned
//! target could add, and the scheduler calls [`extend_plan`] when one actually does.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::graph::{GraphError, TargetGraph, find_cycle};

/// Ordered, duplicate-free list of targets to run.
///
/// Targets are identified by their declaration position in the graph the plan was
/// computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
  requested: Vec<usize>,
  order: Vec<usize>,
  /// Planned targets with trigger edges, paired with what they could add.
  potential_triggers: Vec<(usize, Vec<usize>)>,
}

impl ExecutionPlan {
  pub fn requested(&self) -> &[usize] {
    &self.requested
  }

  pub fn order(&self) -> &[usize] {
    &self.order
  }

  pub fn potential_triggers(&self) -> &[(usize, Vec<usize>)] {
    &self.potential_triggers
  }

  pub fn contains(&self, position: usize) -> bool {
    self.order.contains(&position)
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  /// Target names in execution order.
  pub fn names<'g>(&self, graph: &'g TargetGraph) -> Vec<&'g str> {
    self.order.iter().map(|&position| graph.name(position)).collect()
  }

  pub fn summary(&self, graph: &TargetGraph) -> PlanSummary {
    let names = |positions: &[usize]| -> Vec<String> { positions.iter().map(|&p| graph.name(p).to_string()).collect() };

    PlanSummary {
      requested: names(&self.requested),
      order: names(&self.order),
      potential_triggers: self
        .potential_triggers
        .iter()
        .map(|(position, fires)| PotentialTrigger {
          target: graph.name(*position).to_string(),
          fires: names(fires),
        })
        .collect(),
    }
  }
}

/// Serializable view of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
  pub requested: Vec<String>,
  pub order: Vec<String>,
  pub potential_triggers: Vec<PotentialTrigger>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PotentialTrigger {
  pub target: String,
  pub fires: Vec<String>,
}

/// Compute the execution plan for the requested target names.
///
/// # Errors
///
/// - `UnknownTargetReference` when a requested name is not declared
/// - `CyclicDependency` when ordering edges close a cycle among selected targets
pub fn plan<S: AsRef<str>>(graph: &TargetGraph, requested: &[S]) -> Result<ExecutionPlan, GraphError> {
  let mut seeds = Vec::new();
  for name in requested {
    let name = name.as_ref();
    let position = graph.position(name).ok_or_else(|| GraphError::UnknownTargetReference {
      name: name.to_string(),
      referenced_by: None,
      relation: "requested",
    })?;
    if !seeds.contains(&position) {
      seeds.push(position);
    }
  }

  let selected = dependency_closure(graph, &seeds, &HashSet::new());
  let order = topological_order(graph, &selected)?;

  let potential_triggers = order
    .iter()
    .filter(|&&position| !graph.fires(position).is_empty())
    .map(|&position| (position, graph.fires(position).to_vec()))
    .collect();

  debug!(
    requested = seeds.len(),
    planned = order.len(),
    "execution plan computed"
  );

  Ok(ExecutionPlan {
    requested: seeds,
    order,
    potential_triggers,
  })
}

/// Re-plan the rest of a run after a trigger fired.
///
/// `remaining` holds the targets not yet processed and `done` the ones already
/// processed. The result orders `remaining` together with `added` and whatever
/// `added` strictly depends on that has not run yet. If `added` is already done
/// or pending, `remaining` comes back unchanged.
pub fn extend_plan(
  graph: &TargetGraph,
  remaining: &[usize],
  done: &HashSet<usize>,
  added: usize,
) -> Result<Vec<usize>, GraphError> {
  if done.contains(&added) || remaining.contains(&added) {
    return Ok(remaining.to_vec());
  }

  let mut selected = dependency_closure(graph, &[added], done);
  selected.extend(remaining.iter().copied());

  topological_order(graph, &selected)
}

/// `seeds` plus everything they transitively depend on, excluding `done`.
fn dependency_closure(graph: &TargetGraph, seeds: &[usize], done: &HashSet<usize>) -> BTreeSet<usize> {
  let mut selected = BTreeSet::new();
  let mut stack: Vec<usize> = seeds.to_vec();

  while let Some(position) = stack.pop() {
    if done.contains(&position) || !selected.insert(position) {
      continue;
    }
    stack.extend(graph.dependencies(position));
  }

  selected
}

/// Kahn's algorithm over hard and soft edges, preferring the lowest declaration position.
fn topological_order(graph: &TargetGraph, selected: &BTreeSet<usize>) -> Result<Vec<usize>, GraphError> {
  let successors = edges_within(graph, selected);

  let mut in_degree: HashMap<usize, usize> = selected.iter().map(|&position| (position, 0)).collect();
  for next in successors.values() {
    for position in next {
      if let Some(degree) = in_degree.get_mut(position) {
        *degree += 1;
      }
    }
  }

  let mut ready: BinaryHeap<Reverse<usize>> = in_degree
    .iter()
    .filter(|&(_, &degree)| degree == 0)
    .map(|(&position, _)| Reverse(position))
    .collect();

  let mut order = Vec::with_capacity(selected.len());
  while let Some(Reverse(position)) = ready.pop() {
    order.push(position);
    for next in successors.get(&position).into_iter().flatten() {
      if let Some(degree) = in_degree.get_mut(next) {
        *degree -= 1;
        if *degree == 0 {
          ready.push(Reverse(*next));
        }
      }
    }
  }

  if order.len() < selected.len() {
    let placed: HashSet<usize> = order.iter().copied().collect();
    let leftover = selected.iter().copied().filter(|position| !placed.contains(position));
    let cycle = find_cycle(leftover, |position| {
      successors
        .get(&position)
        .map(|next| next.iter().copied().filter(|n| !placed.contains(n)).collect())
        .unwrap_or_default()
    })
    .unwrap_or_default();

    return Err(GraphError::CyclicDependency {
      cycle: cycle.into_iter().map(|position| graph.name(position).to_string()).collect(),
    });
  }

  Ok(order)
}

/// Successor lists (predecessor runs first) restricted to `selected`, each sorted.
fn edges_within(graph: &TargetGraph, selected: &BTreeSet<usize>) -> HashMap<usize, Vec<usize>> {
  let mut successors: HashMap<usize, Vec<usize>> = HashMap::new();
  let mut add = |from: usize, to: usize| {
    let next = successors.entry(from).or_default();
    if !next.contains(&to) {
      next.push(to);
    }
  };

  for &position in selected {
    for dependency in graph.dependencies(position) {
      if selected.contains(&dependency) {
        add(dependency, position);
      }
    }

    let def = graph.target(position);
    for name in &def.before {
      if let Some(other) = graph.position(name)
        && selected.contains(&other)
      {
        add(position, other);
      }
    }
    for name in &def.after {
      if let Some(other) = graph.position(name)
        && selected.contains(&other)
      {
        add(other, position);
      }
    }
  }

  for next in successors.values_mut() {
    next.sort_unstable();
  }

  successors
}
