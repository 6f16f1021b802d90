//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! lines, human-readable durations, and Unicode symbols.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use anvil_lib::execute::{TargetReport, TargetStatus};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const SKIP: &str = "-";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// One line per target: symbol, name, status, and duration or reason.
pub fn print_target(report: &TargetReport) {
  let name = report.name.as_str();
  let detail = match (&report.reason, report.status) {
    (Some(reason), _) => format!("({})", reason),
    (None, TargetStatus::Executed | TargetStatus::Failed) => format!("({})", format_duration(report.duration)),
    (None, _) => String::new(),
  };
  let triggered = report
    .triggered_by
    .as_ref()
    .map(|by| format!(" [triggered by {}]", by))
    .unwrap_or_default();

  match report.status {
    TargetStatus::Executed => println!(
      "  {} {} {}{}",
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
      name,
      detail.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      triggered
    ),
    TargetStatus::Failed | TargetStatus::Aborted => println!(
      "  {} {} {} {}{}",
      symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
      name,
      report.status.if_supports_color(Stream::Stdout, |s| s.red()),
      detail.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      triggered
    ),
    TargetStatus::Skipped => println!(
      "  {} {} {}{}",
      symbols::SKIP.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      name.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      detail.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      triggered
    ),
    TargetStatus::Pending | TargetStatus::Executing => println!(
      "  {} {} {}{}",
      symbols::INFO.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      name,
      report.status.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      triggered
    ),
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
  }
}
