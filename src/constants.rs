//! Application constants loaded from `constants.ron` at compile time.
//!
//! The file is embedded with `include_str!` and parsed once, on first access.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Endpoints
  pub youtube_base_url: String,
  pub chat_completions_url: String,

  // Network
  pub request_timeout_secs: u64,
  pub host_ready_timeout_secs: u64,
  pub user_agent: String,

  // Segmentation
  pub merge_threshold_secs: f64,
  pub preroll_secs: f64,

  // Chat relay
  pub chars_per_token: usize,
  pub prompt_overhead_tokens: usize,
  pub temperature: f32,
  pub max_output_tokens: u32,
  /// Models to try, most capable first.
  pub models: Vec<String>,
  /// Context window per model, in tokens.
  pub model_limits: BTreeMap<String, usize>,
  pub system_prompt: String,

  // Panel
  pub search_debounce_ms: u64,
}

impl Constants {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  pub fn host_ready_timeout(&self) -> Duration {
    Duration::from_secs(self.host_ready_timeout_secs)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
