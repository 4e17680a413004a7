use thiserror::Error;

/// Failures of the transcript pipeline and the chat relay.
///
/// Application glue (terminal, files, CLI) uses `anyhow`; these variants are what the
/// panel and the command surface report back to the user.
#[derive(Debug, Error)]
pub enum Error {
  #[error("not a video URL: {0}")]
  InvalidVideoUrl(String),

  #[error("watch page did not become ready within {0}s")]
  HostNotReady(u64),

  #[error("no captions are available for this video")]
  NoCaptionsAvailable,

  #[error("caption index embedded in the page is malformed: {0}")]
  MalformedCaptionIndex(String),

  #[error("failed to fetch transcript: {0}")]
  TranscriptFetchFailed(String),

  #[error("failed to parse transcript: {0}")]
  TranscriptParseFailed(String),

  #[error("add your API key in Settings first")]
  MissingCredential,

  #[error(
    "transcript is too large (about {estimated} tokens) for any configured model (largest limit {limit} tokens); ask about a specific part of the video instead"
  )]
  TokenBudgetExceeded { estimated: usize, limit: usize },

  #[error("all available models failed to process the request; the transcript may be too long for them")]
  AllModelsFailed,

  #[error("chat API error: {0}")]
  ChatApi(String),

  #[error("invalid response format from chat API")]
  InvalidResponseShape,
}

impl Error {
  /// Whether the panel should offer a retry for this failure.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Error::HostNotReady(_) | Error::TranscriptFetchFailed(_) | Error::TranscriptParseFailed(_))
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    Error::TranscriptFetchFailed(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
