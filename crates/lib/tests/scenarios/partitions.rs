//! Sharded targets across separate invocations.

use anvil_lib::BuildDefinition;
use anvil_lib::partition::{Partition, PartitionError};
use serial_test::serial;
use tempfile::TempDir;

use super::common::{Journal, execute, invocation};

fn sharded_definition(journal: &Journal) -> BuildDefinition {
  let mut definition = BuildDefinition::new();
  let seen = journal.clone();
  definition.targets.target("Test").partition(2).executes(move |ctx| {
    let items: Vec<String> = (0..10).map(|i| format!("suite-{}", i)).collect();
    for item in ctx.current_items(&items)? {
      seen.push(item);
    }
    Ok(())
  });
  definition
}

#[test]
fn two_shards_cover_every_item_exactly_once() {
  let temp = TempDir::new().unwrap();
  let mut covered = Vec::new();

  for shard in ["0/2", "1/2"] {
    let journal = Journal::default();
    let report = execute(
      sharded_definition(&journal),
      &invocation(temp.path(), &["Test"], &[("TestPartition", shard)]),
    )
    .unwrap();
    assert!(report.is_success());
    assert_eq!(journal.entries().len(), 5);
    covered.extend(journal.entries());
  }

  let expected: Vec<String> = (0..10).map(|i| format!("suite-{}", i)).collect();
  assert_eq!(covered, expected);
}

#[test]
#[serial]
fn absent_partition_runs_every_item() {
  let temp = TempDir::new().unwrap();
  let journal = Journal::default();

  temp_env::with_var_unset("TEST_PARTITION", || {
    execute(sharded_definition(&journal), &invocation(temp.path(), &["Test"], &[])).unwrap();
  });

  assert_eq!(journal.entries().len(), 10);
}

#[test]
fn shard_index_equal_to_total_is_rejected() {
  assert_eq!(
    Partition::new(2, 2),
    Err(PartitionError::ShardOutOfRange { index: 2, total: 2 })
  );

  let temp = TempDir::new().unwrap();
  let journal = Journal::default();
  let report = execute(
    sharded_definition(&journal),
    &invocation(temp.path(), &["Test"], &[("TestPartition", "2/2")]),
  )
  .unwrap();

  assert!(!report.is_success());
  assert!(journal.entries().is_empty());
}
