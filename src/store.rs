use tracing::{debug, info};

use crate::segment::TranscriptLine;

/// The segmented transcript of one video.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
  pub video_id: String,
  pub title: String,
  pub lines: Vec<TranscriptLine>,
}

impl Transcript {
  /// `[timestamp] text` per line, newline separated. Used for export and as chat context.
  pub fn as_plain_text(&self) -> String {
    self.lines.iter().map(|l| format!("[{}] {}", l.timestamp, l.text)).collect::<Vec<_>>().join("\n")
  }
}

/// Owns the transcript of the video currently on screen.
///
/// Navigation calls [`TranscriptStore::begin`] with the new video id; fetch results are
/// applied through [`TranscriptStore::replace`], which drops results for any other video.
/// Consumers only ever see the previous transcript or a complete new one.
#[derive(Debug, Default)]
pub struct TranscriptStore {
  video_id: Option<String>,
  transcript: Option<Transcript>,
}

impl TranscriptStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Switch to `video_id`, discarding the transcript of any other video.
  pub fn begin(&mut self, video_id: &str) {
    if self.video_id.as_deref() == Some(video_id) {
      return;
    }
    debug!(video_id = %video_id, "store: now tracking video");
    self.video_id = Some(video_id.to_string());
    self.transcript = None;
  }

  /// Id of the video whose transcript this store accepts.
  pub fn video_id(&self) -> Option<&str> {
    self.video_id.as_deref()
  }

  /// Install a complete transcript. Returns `false` (and keeps the current state) when
  /// `video_id` is no longer the video being tracked.
  pub fn replace(&mut self, video_id: &str, title: &str, lines: Vec<TranscriptLine>) -> bool {
    if self.video_id.as_deref() != Some(video_id) {
      info!(video_id = %video_id, current = ?self.video_id, "store: discarding stale transcript");
      return false;
    }
    self.transcript = Some(Transcript { video_id: video_id.to_string(), title: title.to_string(), lines });
    true
  }

  pub fn current(&self) -> Option<&Transcript> {
    self.transcript.as_ref()
  }

  pub fn lines(&self) -> &[TranscriptLine] {
    self.transcript.as_ref().map(|t| t.lines.as_slice()).unwrap_or(&[])
  }

  pub fn has_transcript(&self) -> bool {
    !self.lines().is_empty()
  }

  /// Plain-text export of the current transcript, empty when none is loaded.
  pub fn as_plain_text(&self) -> String {
    self.transcript.as_ref().map(Transcript::as_plain_text).unwrap_or_default()
  }
}

/// File name for a downloaded transcript: `transcript_<title>_<video id>.txt`.
///
/// The title keeps ASCII letters and digits; every other run of characters becomes a single `_`.
pub fn download_file_name(title: &str, video_id: &str) -> String {
  let mut safe = String::new();
  for c in title.chars() {
    if c.is_ascii_alphanumeric() {
      safe.push(c);
    } else if !safe.ends_with('_') {
      safe.push('_');
    }
  }
  let safe: String = safe.trim_matches('_').chars().take(80).collect();
  let safe = safe.trim_end_matches('_');
  let safe = if safe.is_empty() { "video" } else { safe };
  format!("transcript_{}_{}.txt", safe, video_id)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn download_names() {
    assert_eq!(download_file_name("Rust in 100 Seconds!", "abc"), "transcript_Rust_in_100_Seconds_abc.txt");
    assert_eq!(download_file_name("  ***  ", "abc"), "transcript_video_abc.txt");
    assert_eq!(download_file_name("Ça va? / Oui", "x"), "transcript_a_va_Oui_x.txt");
    let long = "a".repeat(200);
    assert_eq!(download_file_name(&long, "x").len(), "transcript__x.txt".len() + 80);
  }

  fn lines() -> Vec<TranscriptLine> {
    vec![TranscriptLine::new(0.0, "Hello world".to_string()), TranscriptLine::new(3661.0, "Later".to_string())]
  }

  #[test]
  fn plain_text_format() {
    let mut store = TranscriptStore::new();
    store.begin("abcdefghijk");
    assert!(store.replace("abcdefghijk", "Title", lines()));
    assert_eq!(store.as_plain_text(), "[0:00] Hello world\n[1:01:01] Later");
  }

  #[test]
  fn empty_store_exports_nothing() {
    let store = TranscriptStore::new();
    assert_eq!(store.as_plain_text(), "");
    assert!(store.current().is_none());
    assert!(!store.has_transcript());
  }

  #[test]
  fn stale_results_are_discarded() {
    let mut store = TranscriptStore::new();
    store.begin("aaaaaaaaaaa");
    store.begin("bbbbbbbbbbb");
    assert!(!store.replace("aaaaaaaaaaa", "Old", lines()));
    assert!(store.current().is_none());
    assert!(store.replace("bbbbbbbbbbb", "New", lines()));
    assert_eq!(store.current().unwrap().title, "New");
  }

  #[test]
  fn navigation_drops_previous_transcript() {
    let mut store = TranscriptStore::new();
    store.begin("aaaaaaaaaaa");
    store.replace("aaaaaaaaaaa", "Old", lines());
    store.begin("aaaaaaaaaaa");
    assert!(store.has_transcript(), "same video keeps its transcript");
    store.begin("bbbbbbbbbbb");
    assert!(!store.has_transcript());
    assert_eq!(store.video_id(), Some("bbbbbbbbbbb"));
  }

  #[test]
  fn replace_without_begin_is_rejected() {
    let mut store = TranscriptStore::new();
    assert!(!store.replace("aaaaaaaaaaa", "t", lines()));
  }
}
