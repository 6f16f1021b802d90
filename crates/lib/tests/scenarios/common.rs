use std::path::Path;
use std::sync::{Arc, Mutex};

use anvil_lib::execute::{BuildReport, ExecuteConfig, TargetContext};
use anvil_lib::{BuildDefinition, Invocation, run};

/// Names of the bodies that ran, in order.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
  pub fn body(&self, name: &str) -> impl Fn(&TargetContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static {
    let journal = self.clone();
    let name = name.to_string();
    move |_: &TargetContext<'_>| {
      journal.push(&name);
      Ok(())
    }
  }

  pub fn push(&self, entry: &str) {
    self.0.lock().unwrap().push(entry.to_string());
  }

  pub fn entries(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }
}

pub fn invocation(root: &Path, targets: &[&str], parameters: &[(&str, &str)]) -> Invocation {
  Invocation {
    targets: targets.iter().map(|t| t.to_string()).collect(),
    parameters: parameters
      .iter()
      .map(|(name, value)| (name.to_string(), value.to_string()))
      .collect(),
    config: ExecuteConfig {
      root_dir: root.to_path_buf(),
      default_parallelism: 2,
      ..Default::default()
    },
    ..Default::default()
  }
}

pub fn execute(definition: BuildDefinition, invocation: &Invocation) -> Result<BuildReport, anvil_lib::Error> {
  tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap()
    .block_on(run(definition, invocation))
}
