use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::constants::constants;
use crate::error::{Error, Result};
use crate::fetcher::fetch_cues;
use crate::locator::CaptionLocator;
use crate::segment::{SegmentPolicy, TranscriptLine, segment};
use crate::youtube::{VideoInfo, YouTube};

// --- Transcript pipeline ---

/// A transcript ready to hand to the store.
#[derive(Debug, Clone)]
pub struct LoadedTranscript {
  pub info: VideoInfo,
  pub language: String,
  pub lines: Vec<TranscriptLine>,
}

/// Progress of one transcript job. Every event carries the video id it belongs to.
#[derive(Debug)]
pub enum TranscriptEvent {
  /// Watch page downloaded and parsed.
  PageLoaded(VideoInfo),
  /// Caption track chosen, now downloading cues.
  TrackLocated { language: String },
  /// Pipeline complete.
  Loaded(LoadedTranscript),
  /// Pipeline failed.
  Failed(Error),
}

/// Transcript job state as seen by the panel.
#[derive(Default)]
pub enum TranscriptState {
  /// Nothing requested yet.
  #[default]
  Idle,
  /// A job is running for `video_id`.
  Loading { video_id: String, stage: &'static str, handle: JoinHandle<()> },
  /// The store holds the transcript.
  Ready,
  /// Last job failed. `retryable` decides whether the panel offers a retry.
  Failed { message: String, retryable: bool },
}

impl TranscriptState {
  /// Abort a running job, if any.
  pub fn cancel(&mut self) {
    if let TranscriptState::Loading { handle, video_id, .. } = self {
      info!(video_id = %video_id, "transcript: aborting superseded job");
      handle.abort();
    }
    *self = TranscriptState::Idle;
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, TranscriptState::Loading { .. })
  }

  /// Video id of the running job.
  pub fn loading_video(&self) -> Option<&str> {
    match self {
      TranscriptState::Loading { video_id, .. } => Some(video_id),
      _ => None,
    }
  }
}

/// Page → caption track → cues → lines, reporting each stage through `notify`.
async fn run_pipeline(
  youtube: &YouTube,
  video_id: &str,
  policy: &SegmentPolicy,
  ready_timeout: Duration,
  notify: impl Fn(TranscriptEvent),
) -> Result<LoadedTranscript> {
  let page = tokio::time::timeout(ready_timeout, youtube.load_page(video_id))
    .await
    .map_err(|_| Error::HostNotReady(ready_timeout.as_secs()))??;
  let info = page.info();
  notify(TranscriptEvent::PageLoaded(info.clone()));

  let track = CaptionLocator::new(youtube).locate(&page).await?;
  notify(TranscriptEvent::TrackLocated { language: track.language_code.clone() });

  let cues = fetch_cues(youtube.http(), &track.base_url).await?;
  let lines = segment(&cues, policy);
  if lines.is_empty() {
    return Err(Error::NoCaptionsAvailable);
  }
  info!(video_id = %video_id, cues = cues.len(), lines = lines.len(), "transcript: segmented");
  Ok(LoadedTranscript { info, language: track.language_code, lines })
}

/// Load the transcript for `video_id`, waiting at most `host_ready_timeout_secs` for the page.
pub async fn load_transcript(youtube: &YouTube, video_id: &str, policy: &SegmentPolicy) -> Result<LoadedTranscript> {
  load_transcript_within(youtube, video_id, policy, constants().host_ready_timeout()).await
}

pub async fn load_transcript_within(
  youtube: &YouTube,
  video_id: &str,
  policy: &SegmentPolicy,
  ready_timeout: Duration,
) -> Result<LoadedTranscript> {
  run_pipeline(youtube, video_id, policy, ready_timeout, |_| {}).await
}

/// Run the pipeline as a task. Events go out tagged with `video_id` so the receiver
/// can drop anything for a video that is no longer on screen.
pub fn spawn_transcript_job(
  tx: mpsc::UnboundedSender<(String, TranscriptEvent)>,
  youtube: YouTube,
  video_id: String,
  policy: SegmentPolicy,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let ready_timeout = constants().host_ready_timeout();
    let notify = |event| {
      let _ = tx.send((video_id.clone(), event));
    };
    let event = match run_pipeline(&youtube, &video_id, &policy, ready_timeout, notify).await {
      Ok(loaded) => TranscriptEvent::Loaded(loaded),
      Err(e) => {
        error!(video_id = %video_id, err = %e, "transcript: pipeline failed");
        TranscriptEvent::Failed(e)
      }
    };
    let _ = tx.send((video_id.clone(), event));
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Client;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn watch_html(server: &MockServer) -> String {
    format!(
      r#"<html><head><title>Ignored - YouTube</title></head><script>var ytInitialPlayerResponse = {{"videoDetails":{{"title":"Rust in 100 Seconds"}},"captions":{{"playerCaptionsTracklistRenderer":{{"captionTracks":[{{"baseUrl":"{}/api/timedtext?v=abcdefghijk&lang=en","languageCode":"en"}}]}}}}}};</script></html>"#,
      server.uri()
    )
  }

  const JSON3: &str = r#"{"events":[
    {"tStartMs":200,"dDurationMs":2000,"segs":[{"utf8":"Hello"}]},
    {"tStartMs":3000,"dDurationMs":2000,"segs":[{"utf8":"world"}]},
    {"tStartMs":15000,"dDurationMs":2000,"segs":[{"utf8":"Next &amp; last"}]}
  ]}"#;

  async fn mount_page(server: &MockServer, body: String) {
    Mock::given(method("GET"))
      .and(path("/watch"))
      .and(query_param("v", "abcdefghijk"))
      .respond_with(ResponseTemplate::new(200).set_body_string(body))
      .mount(server)
      .await;
  }

  #[tokio::test]
  async fn loads_segmented_transcript() {
    let server = MockServer::start().await;
    mount_page(&server, watch_html(&server)).await;
    Mock::given(method("GET"))
      .and(path("/api/timedtext"))
      .and(query_param("fmt", "json3"))
      .respond_with(ResponseTemplate::new(200).set_body_string(JSON3))
      .mount(&server)
      .await;

    let yt = YouTube::with_base_url(Client::new(), &server.uri());
    let loaded = load_transcript(&yt, "abcdefghijk", &SegmentPolicy::default()).await.unwrap();
    assert_eq!(loaded.info.title, "Rust in 100 Seconds");
    assert_eq!(loaded.language, "en");
    assert_eq!(loaded.lines.len(), 2);
    assert_eq!(loaded.lines[0].timestamp, "0:00");
    assert_eq!(loaded.lines[0].text, "Hello world");
    assert_eq!(loaded.lines[1].text, "Next & last");
  }

  #[tokio::test]
  async fn slow_page_is_host_not_ready() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/watch"))
      .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>").set_delay(Duration::from_secs(2)))
      .mount(&server)
      .await;

    let yt = YouTube::with_base_url(Client::new(), &server.uri());
    let err = load_transcript_within(&yt, "abcdefghijk", &SegmentPolicy::default(), Duration::from_millis(50))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::HostNotReady(_)));
    assert!(err.is_retryable());
  }

  #[tokio::test]
  async fn caption_endpoint_failure_is_fetch_failed() {
    let server = MockServer::start().await;
    mount_page(&server, watch_html(&server)).await;
    Mock::given(method("GET"))
      .and(path("/api/timedtext"))
      .respond_with(ResponseTemplate::new(403))
      .mount(&server)
      .await;

    let yt = YouTube::with_base_url(Client::new(), &server.uri());
    let err = load_transcript(&yt, "abcdefghijk", &SegmentPolicy::default()).await.unwrap_err();
    assert!(matches!(err, Error::TranscriptFetchFailed(_)));
  }

  #[tokio::test]
  async fn job_reports_stages_tagged_with_video_id() {
    let server = MockServer::start().await;
    mount_page(&server, watch_html(&server)).await;
    Mock::given(method("GET"))
      .and(path("/api/timedtext"))
      .respond_with(ResponseTemplate::new(200).set_body_string(JSON3))
      .mount(&server)
      .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let yt = YouTube::with_base_url(Client::new(), &server.uri());
    spawn_transcript_job(tx, yt, "abcdefghijk".to_string(), SegmentPolicy::default()).await.unwrap();

    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
      events.push(ev);
    }
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|(id, _)| id == "abcdefghijk"));
    assert!(matches!(events[0].1, TranscriptEvent::PageLoaded(_)));
    assert!(matches!(events[1].1, TranscriptEvent::TrackLocated { .. }));
    assert!(matches!(&events[2].1, TranscriptEvent::Loaded(t) if t.lines.len() == 2));
  }

  #[tokio::test]
  async fn cancel_aborts_running_job() {
    let handle = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(60)).await });
    let mut state = TranscriptState::Loading { video_id: "abcdefghijk".to_string(), stage: "page", handle };
    assert_eq!(state.loading_video(), Some("abcdefghijk"));
    state.cancel();
    assert!(matches!(state, TranscriptState::Idle));
  }
}
