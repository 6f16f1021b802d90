//! Artifact pattern checks for `produces` and `consumes`.

use std::path::Path;

use crate::graph::TargetGraph;
use crate::target::Consumes;

use super::types::ExecuteError;

/// Whether `pattern` matches at least one existing path.
///
/// Relative patterns are anchored at `root`.
pub(crate) fn matches_any(root: &Path, target: &str, pattern: &str) -> Result<bool, ExecuteError> {
  let full = if Path::new(pattern).is_absolute() {
    pattern.to_string()
  } else {
    let root = glob::Pattern::escape(&root.to_string_lossy());
    format!("{}/{}", root.trim_end_matches('/'), pattern)
  };

  let mut paths = glob::glob(&full).map_err(|e| ExecuteError::InvalidPattern {
    target: target.to_string(),
    pattern: pattern.to_string(),
    message: e.to_string(),
  })?;

  Ok(paths.any(|entry| entry.is_ok()))
}

/// Check every consumed artifact of the target at `position`.
pub(crate) fn check_consumes(graph: &TargetGraph, position: usize, root: &Path) -> Result<(), ExecuteError> {
  let def = graph.target(position);

  for consumes in &def.consumes {
    let (patterns, producer): (Vec<&str>, Option<&str>) = match consumes {
      Consumes::Pattern(pattern) => (
        vec![pattern.as_str()],
        graph.producer_of(pattern).map(|p| graph.name(p)),
      ),
      Consumes::Target(name) => match graph.get(name) {
        Some(producer) => (
          producer.produces.iter().map(String::as_str).collect(),
          Some(producer.name.as_str()),
        ),
        None => (Vec::new(), None),
      },
    };

    for pattern in patterns {
      if !matches_any(root, &def.name, pattern)? {
        return Err(ExecuteError::ArtifactNotProduced {
          target: def.name.clone(),
          pattern: pattern.to_string(),
          producer: producer.map(str::to_string),
        });
      }
    }
  }

  Ok(())
}

/// Check every produced artifact of the target at `position`.
pub(crate) fn check_produces(graph: &TargetGraph, position: usize, root: &Path) -> Result<(), ExecuteError> {
  let def = graph.target(position);

  for pattern in &def.produces {
    if !matches_any(root, &def.name, pattern)? {
      return Err(ExecuteError::ArtifactNotProduced {
        target: def.name.clone(),
        pattern: pattern.clone(),
        producer: Some(def.name.clone()),
      });
    }
  }

  Ok(())
}
