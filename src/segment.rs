//! Re-segmentation of raw caption cues into display lines.
//!
//! Caption tracks emit one cue every few words. Consecutive cues whose start times are
//! closer than the merge threshold are joined into one line anchored at the first cue's
//! start; a gap at or above the threshold starts a new line.

use serde::Serialize;

use crate::constants::constants;
use crate::fetcher::RawCue;

/// One display line of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptLine {
  pub start_secs: f64,
  pub timestamp: String,
  pub text: String,
}

impl TranscriptLine {
  pub fn new(start_secs: f64, text: String) -> Self {
    Self { start_secs, timestamp: format_timestamp(start_secs), text }
  }
}

/// Merge policy for [`segment`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPolicy {
  /// Cues starting less than this many seconds after the previous cue join its line.
  pub merge_threshold_secs: f64,
  /// A first cue starting before this is anchored at 0:00.
  pub preroll_secs: f64,
}

impl Default for SegmentPolicy {
  fn default() -> Self {
    let c = constants();
    Self { merge_threshold_secs: c.merge_threshold_secs, preroll_secs: c.preroll_secs }
  }
}

/// Format `secs` as `H:MM:SS` (one hour or more) or `M:SS`, truncating to whole seconds.
pub fn format_timestamp(secs: f64) -> String {
  let total = if secs.is_finite() && secs > 0.0 { secs.floor() as u64 } else { 0 };
  let hours = total / 3600;
  let minutes = (total % 3600) / 60;
  let seconds = total % 60;
  if hours > 0 { format!("{}:{:02}:{:02}", hours, minutes, seconds) } else { format!("{}:{:02}", minutes, seconds) }
}

struct LineBuffer {
  anchor_secs: f64,
  last_secs: f64,
  text: String,
}

impl LineBuffer {
  fn start(anchor_secs: f64, cue: &RawCue) -> Self {
    Self { anchor_secs, last_secs: cue.start_secs, text: cue.text.trim().to_string() }
  }

  fn push(&mut self, cue: &RawCue) {
    self.text.push(' ');
    self.text.push_str(cue.text.trim());
    self.last_secs = cue.start_secs;
  }

  fn flush(self) -> TranscriptLine {
    TranscriptLine::new(self.anchor_secs, self.text)
  }
}

/// Turn cues (sorted by start time) into transcript lines.
///
/// Cues with empty or whitespace-only text are dropped first. The last buffered line is
/// always emitted.
pub fn segment(cues: &[RawCue], policy: &SegmentPolicy) -> Vec<TranscriptLine> {
  let mut lines = Vec::new();
  let mut current: Option<LineBuffer> = None;

  for cue in cues.iter().filter(|c| !c.text.trim().is_empty()) {
    current = Some(match current.take() {
      None => {
        let anchor = if cue.start_secs < policy.preroll_secs { 0.0 } else { cue.start_secs };
        LineBuffer::start(anchor, cue)
      }
      Some(mut buf) if cue.start_secs - buf.last_secs < policy.merge_threshold_secs => {
        buf.push(cue);
        buf
      }
      Some(buf) => {
        lines.push(buf.flush());
        LineBuffer::start(cue.start_secs, cue)
      }
    });
  }

  if let Some(buf) = current {
    lines.push(buf.flush());
  }
  lines
}
