//! Terminal output.
//!
//! Color is dropped when the stream is not a terminal.

use std::fmt::Display;
use std::time::Duration;

use owo_colors::{OwoColorize, Stream};

use brick_lib::rules::BuildRuleStatus;

#[derive(Debug, Clone, Copy)]
enum Tone {
  Good,
  Bad,
  Caution,
  Plain,
}

impl Tone {
  fn marker(self) -> &'static str {
    match self {
      Tone::Good => "✓",
      Tone::Bad => "✗",
      Tone::Caution => "⚠",
      Tone::Plain => "•",
    }
  }

  fn paint(self, text: &str, stream: Stream) -> String {
    match self {
      Tone::Good => text.if_supports_color(stream, |s| s.green()).to_string(),
      Tone::Bad => text.if_supports_color(stream, |s| s.red()).to_string(),
      Tone::Caution => text.if_supports_color(stream, |s| s.yellow()).to_string(),
      Tone::Plain => text.if_supports_color(stream, |s| s.blue()).to_string(),
    }
  }
}

/// Diagnostics go to stderr, everything else to stdout.
fn emit(tone: Tone, message: &str) {
  match tone {
    Tone::Bad | Tone::Caution => {
      let stream = Stream::Stderr;
      eprintln!("{} {}", tone.paint(tone.marker(), stream), tone.paint(message, stream));
    }
    Tone::Good | Tone::Plain => {
      println!("{} {}", tone.paint(tone.marker(), Stream::Stdout), message);
    }
  }
}

/// Wall-clock time as seconds with two decimals, minutes once past one.
pub fn format_duration(duration: Duration) -> String {
  let hundredths = duration.as_millis() / 10;
  let (mins, secs, frac) = (hundredths / 6000, (hundredths / 100) % 60, hundredths % 100);
  if mins > 0 {
    format!("{mins}m {secs}s")
  } else {
    format!("{secs}.{frac:02}s")
  }
}

/// Status column for a rule, padded so targets line up.
pub fn status_label(status: BuildRuleStatus) -> String {
  format!("{:<9}", status.to_string())
}

pub fn print_rule_status(status: BuildRuleStatus, target: &str) {
  let label = status_label(status);
  let label = match status {
    BuildRuleStatus::BuiltLocally => Tone::Good.paint(&label, Stream::Stdout),
    BuildRuleStatus::FetchedFromCache => label.if_supports_color(Stream::Stdout, |s| s.cyan()).to_string(),
    BuildRuleStatus::Failed => Tone::Bad.paint(&label, Stream::Stdout),
    BuildRuleStatus::Skipped | BuildRuleStatus::Cancelled => {
      label.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string()
    }
  };
  println!("{label} {target}");
}

pub fn print_success(message: &str) {
  emit(Tone::Good, message);
}

pub fn print_error(message: &str) {
  emit(Tone::Bad, message);
}

pub fn print_warning(message: &str) {
  emit(Tone::Caution, message);
}

pub fn print_info(message: &str) {
  emit(Tone::Plain, message);
}

/// An indented `label: value` summary line.
pub fn print_stat(label: &str, value: impl Display) {
  println!("  {}: {value}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()));
}
