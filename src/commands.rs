//! Inbound command surface: JSON messages tagged by `"action"`, dispatched against the app.
//!
//! `ytx serve` reads one command per line on stdin and answers with one JSON line on stdout.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{App, Tab};
use crate::search::Direction;
use crate::segment::TranscriptLine;
use crate::transcript::TranscriptState;
use crate::youtube::VideoInfo;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
  /// The host moved to another watch page.
  Navigate { url: String },
  ToggleSidebar,
  FetchTranscript,
  RefreshTranscript,
  GetStatus,
  GetVideoInfo,
  GetTranscript,
  CopyTranscriptToClipboard,
  DownloadTranscript,
  ShowSettings,
  Search { query: String },
  SearchNext,
  SearchPrev,
  Ask { question: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
  Ack {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
  },
  #[serde(rename_all = "camelCase")]
  Status { transcript_available: bool, ai_enabled: bool },
  VideoInfo(VideoInfo),
  Transcript { transcript: String },
  #[serde(rename_all = "camelCase")]
  Search {
    query: String,
    matches: usize,
    /// 1-based position of the current match.
    current: Option<usize>,
    line: Option<TranscriptLine>,
  },
  Answer { success: bool, answer: String },
  Saved { success: bool, path: String },
}

impl Response {
  pub fn ok() -> Self {
    Response::Ack { success: true, error: None }
  }

  pub fn failed(error: impl ToString) -> Self {
    Response::Ack { success: false, error: Some(error.to_string()) }
  }
}

/// Parse one JSON command line into a response, reporting malformed input as a failure.
pub async fn handle_line(app: &mut App, line: &str) -> Response {
  match serde_json::from_str::<Command>(line) {
    Ok(command) => app.handle_command(command).await,
    Err(e) => Response::failed(format!("invalid command: {}", e)),
  }
}

impl App {
  pub async fn handle_command(&mut self, command: Command) -> Response {
    debug!(command = ?command, "commands: dispatch");
    match command {
      Command::Navigate { url } => match self.navigate(&url) {
        Ok(()) => {
          self.settle_transcript().await;
          Response::ok()
        }
        Err(e) => Response::failed(e),
      },
      Command::ToggleSidebar => {
        self.toggle_sidebar();
        Response::ok()
      }
      Command::FetchTranscript => {
        let started = self.fetch_transcript();
        self.transcript_outcome(started).await
      }
      Command::RefreshTranscript => {
        let started = self.refresh_transcript();
        self.transcript_outcome(started).await
      }
      Command::GetStatus => {
        let status = self.status();
        Response::Status { transcript_available: status.transcript_available, ai_enabled: status.ai_enabled }
      }
      Command::GetVideoInfo => match (&self.video_info, self.store.video_id()) {
        (Some(info), _) => Response::VideoInfo(info.clone()),
        (None, Some(id)) => Response::VideoInfo(VideoInfo { title: String::new(), video_id: id.to_string() }),
        (None, None) => Response::failed("no video is open"),
      },
      Command::GetTranscript => Response::Transcript { transcript: self.store.as_plain_text() },
      Command::CopyTranscriptToClipboard => match self.copy_transcript() {
        Ok(_) => Response::ok(),
        Err(e) => Response::failed(format!("{:#}", e)),
      },
      Command::DownloadTranscript => match self.download_transcript() {
        Ok(path) => Response::Saved { success: true, path: path.display().to_string() },
        Err(e) => Response::failed(format!("{:#}", e)),
      },
      Command::ShowSettings => {
        self.show_tab(Tab::Settings);
        Response::ok()
      }
      Command::Search { query } => {
        self.set_search_query(&query);
        self.search_response()
      }
      Command::SearchNext => {
        self.search_step(Direction::Next);
        self.search_response()
      }
      Command::SearchPrev => {
        self.search_step(Direction::Prev);
        self.search_response()
      }
      Command::Ask { question } => match self.ask_now(&question).await {
        Ok(answer) => Response::Answer { success: true, answer },
        Err(e) => Response::failed(e),
      },
    }
  }

  async fn transcript_outcome(&mut self, started: bool) -> Response {
    if !started {
      return Response::failed(self.last_error.clone().unwrap_or_else(|| "no video is open".to_string()));
    }
    self.settle_transcript().await;
    match &self.transcript_state {
      TranscriptState::Failed { message, .. } => Response::failed(message),
      _ if self.store.has_transcript() => {
        info!(lines = self.store.lines().len(), "commands: transcript available");
        Response::ok()
      }
      _ => Response::failed("transcript not loaded"),
    }
  }

  fn search_response(&self) -> Response {
    let line = self.search.current_line().and_then(|i| self.store.lines().get(i)).cloned();
    Response::Search {
      query: self.search.query.clone(),
      matches: self.search.match_lines.len(),
      current: self.search.current.map(|i| i + 1),
      line,
    }
  }
}
