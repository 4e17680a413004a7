use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use ratatui::widgets::ListState;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::chat::{ChatRelay, endpoint_for_base};
use crate::config::Settings;
use crate::constants::constants;
use crate::error;
use crate::input::TextInput;
use crate::search::{self, Direction, SearchState};
use crate::segment::SegmentPolicy;
use crate::store::{TranscriptStore, download_file_name};
use crate::theme::{THEMES, Theme, theme_index};
use crate::transcript::{self, TranscriptEvent, TranscriptState};
use crate::youtube::{VideoInfo, YouTube, timestamp_url, video_id_from_url};

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
  Transcript,
  Chat,
  Settings,
}

impl Tab {
  pub const ALL: [Tab; 3] = [Tab::Transcript, Tab::Chat, Tab::Settings];

  pub fn label(self) -> &'static str {
    match self {
      Tab::Transcript => "Transcript",
      Tab::Chat => "AI Chat",
      Tab::Settings => "Settings",
    }
  }

  fn next(self) -> Self {
    let idx = Tab::ALL.iter().position(|t| *t == self).unwrap_or(0);
    Tab::ALL[(idx + 1) % Tab::ALL.len()]
  }
}

/// Which widget receives typed characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
  List,
  Search,
  Chat,
  Url,
  ApiKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
  User,
  Assistant,
  System,
}

/// One message in the chat log.
#[derive(Debug, Clone)]
pub struct ChatEntry {
  pub kind: EntryKind,
  pub text: String,
  pub at: DateTime<Local>,
}

/// What `getStatus` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
  pub transcript_available: bool,
  pub ai_enabled: bool,
}

/// In-flight async task receivers.
#[derive(Default)]
pub(crate) struct AsyncTasks {
  pub(crate) chat_rx: Option<oneshot::Receiver<error::Result<String>>>,
  pub(crate) transcript_rx: Option<mpsc::UnboundedReceiver<(String, TranscriptEvent)>>,
}

pub struct App {
  pub youtube: YouTube,
  pub settings: Settings,
  /// Key given on the command line; used instead of the saved one and never written back.
  pub api_key_override: Option<String>,
  settings_path: Option<PathBuf>,
  pub download_dir: PathBuf,
  pub theme_index: usize,
  pub policy: SegmentPolicy,
  pub tab: Tab,
  pub focus: Focus,
  pub sidebar_visible: bool,
  pub store: TranscriptStore,
  pub video_info: Option<VideoInfo>,
  pub transcript_state: TranscriptState,
  pub search: SearchState,
  pub search_input: TextInput,
  /// When the search box last changed; the query is applied once the debounce passes.
  search_edited_at: Option<Instant>,
  pub list_state: ListState,
  pub chat: Vec<ChatEntry>,
  pub chat_input: TextInput,
  pub chat_scroll: u16,
  pub url_input: TextInput,
  pub key_input: TextInput,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  /// Informational message, lower priority than status/error.
  pub info_message: Option<String>,
  pub should_quit: bool,
  pub(crate) tasks: AsyncTasks,
  pub started_at: Instant,
  error_time: Option<Instant>,
}

impl App {
  pub fn new(settings: Settings, settings_path: Option<PathBuf>, youtube: YouTube) -> Self {
    let theme_index = theme_index(&settings.theme);
    let download_dir = directories::UserDirs::new()
      .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
      .unwrap_or_else(|| PathBuf::from("."));

    Self {
      youtube,
      settings,
      api_key_override: None,
      settings_path,
      download_dir,
      theme_index,
      policy: SegmentPolicy::default(),
      tab: Tab::Transcript,
      focus: Focus::List,
      sidebar_visible: true,
      store: TranscriptStore::new(),
      video_info: None,
      transcript_state: TranscriptState::default(),
      search: SearchState::default(),
      search_input: TextInput::default(),
      search_edited_at: None,
      list_state: ListState::default(),
      chat: vec![ChatEntry {
        kind: EntryKind::System,
        text: "Ask anything about the video. Load a transcript first for answers grounded in its content.".to_string(),
        at: Local::now(),
      }],
      chat_input: TextInput::default(),
      chat_scroll: 0,
      url_input: TextInput::default(),
      key_input: TextInput::default(),
      last_error: None,
      status_message: None,
      info_message: None,
      should_quit: false,
      tasks: AsyncTasks::default(),
      started_at: Instant::now(),
      error_time: None,
    }
  }

  pub fn theme(&self) -> &'static Theme {
    // Safety: theme_index comes from theme_index() or modular arithmetic in next_theme().
    &THEMES[self.theme_index]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.settings.theme = self.theme().name.to_string();
    self.save_settings();
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages after 5 seconds.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(5)
    {
      self.last_error = None;
      self.error_time = None;
    }
  }

  pub fn save_settings(&mut self) {
    let Some(path) = self.settings_path.clone() else { return };
    if let Err(e) = self.settings.save_to(&path) {
      warn!(err = %e, "config: failed to save settings");
      self.set_error(format!("Failed to save settings: {:#}", e));
    }
  }

  pub fn toggle_auto_fetch(&mut self) {
    self.settings.auto_fetch = !self.settings.auto_fetch;
    self.save_settings();
  }

  pub fn set_api_key(&mut self, key: &str) {
    let key = key.trim();
    self.settings.api_key = (!key.is_empty()).then(|| key.to_string());
    info!(ai_enabled = self.settings.ai_enabled(), "config: API key updated");
    self.save_settings();
  }

  pub fn toggle_sidebar(&mut self) {
    self.sidebar_visible = !self.sidebar_visible;
    debug!(visible = self.sidebar_visible, "panel: toggle sidebar");
  }

  pub fn next_tab(&mut self) {
    self.show_tab(self.tab.next());
  }

  pub fn show_tab(&mut self, tab: Tab) {
    self.tab = tab;
    self.sidebar_visible = true;
    self.focus = Focus::List;
  }

  pub fn api_key(&self) -> Option<&str> {
    self.api_key_override.as_deref().or_else(|| self.settings.api_key())
  }

  pub fn status(&self) -> Status {
    Status { transcript_available: self.store.has_transcript(), ai_enabled: self.api_key().is_some() }
  }

  // --- Navigation ---

  /// Switch to the video at `url`. Clears the previous transcript and, with auto-fetch on,
  /// starts loading the new one.
  pub fn navigate(&mut self, url: &str) -> error::Result<()> {
    let video_id = video_id_from_url(url)?;
    if self.store.video_id() == Some(video_id.as_str())
      && (self.store.has_transcript() || self.transcript_state.loading_video() == Some(video_id.as_str()))
    {
      debug!(video_id = %video_id, "navigate: already on this video");
      return Ok(());
    }

    info!(video_id = %video_id, "navigate: new video");
    self.transcript_state.cancel();
    self.tasks.transcript_rx = None;
    self.store.begin(&video_id);
    self.video_info = None;
    self.search = SearchState::default();
    self.list_state.select(None);
    self.clear_error();
    self.info_message = None;

    if self.settings.auto_fetch {
      self.refresh_transcript();
    } else {
      self.transcript_state = TranscriptState::Idle;
      self.info_message = Some("Press r to fetch the transcript.".to_string());
    }
    Ok(())
  }

  // --- Transcript ---

  /// Load the transcript unless it is already loaded or loading.
  pub fn fetch_transcript(&mut self) -> bool {
    if self.store.has_transcript() || self.transcript_state.is_loading() {
      return self.store.video_id().is_some();
    }
    self.refresh_transcript()
  }

  /// (Re)load the transcript of the current video, aborting any job in flight.
  pub fn refresh_transcript(&mut self) -> bool {
    let Some(video_id) = self.store.video_id().map(str::to_string) else {
      self.set_error("Open a video first (press o).".to_string());
      return false;
    };
    self.transcript_state.cancel();

    let (tx, rx) = mpsc::unbounded_channel();
    self.tasks.transcript_rx = Some(rx);
    info!(video_id = %video_id, "transcript: starting job");
    let handle = transcript::spawn_transcript_job(tx, self.youtube.clone(), video_id.clone(), self.policy);
    self.transcript_state = TranscriptState::Loading { video_id, stage: "Loading watch page", handle };
    self.clear_error();
    true
  }

  pub(crate) fn apply_transcript_event(&mut self, video_id: String, event: TranscriptEvent) {
    if self.store.video_id() != Some(video_id.as_str()) {
      debug!(video_id = %video_id, "transcript: dropping event for a video no longer on screen");
      return;
    }
    match event {
      TranscriptEvent::PageLoaded(info) => {
        self.video_info = Some(info);
        self.set_stage("Locating captions");
      }
      TranscriptEvent::TrackLocated { language } => {
        debug!(video_id = %video_id, lang = %language, "transcript: track located");
        self.set_stage("Downloading captions");
      }
      TranscriptEvent::Loaded(loaded) => {
        let count = loaded.lines.len();
        let title = loaded.info.title.clone();
        self.video_info = Some(loaded.info);
        if self.store.replace(&video_id, &title, loaded.lines) {
          self.transcript_state = TranscriptState::Ready;
          self.info_message = Some(format!("Loaded {} lines ({})", count, loaded.language));
          self.list_state.select(Some(0));
          self.apply_search();
        }
        self.tasks.transcript_rx = None;
      }
      TranscriptEvent::Failed(e) => {
        let retryable = e.is_retryable();
        let message = e.to_string();
        error!(video_id = %video_id, err = %message, "transcript: failed");
        self.transcript_state = TranscriptState::Failed { message: message.clone(), retryable };
        self.set_error(if retryable { format!("{} (press r to retry)", message) } else { message });
        self.tasks.transcript_rx = None;
      }
    }
  }

  fn set_stage(&mut self, label: &'static str) {
    if let TranscriptState::Loading { stage, .. } = &mut self.transcript_state {
      *stage = label;
    }
  }

  fn transcript_task_lost(&mut self) {
    if self.transcript_state.is_loading() {
      self.transcript_state =
        TranscriptState::Failed { message: "Transcript task stopped unexpectedly.".to_string(), retryable: true };
      self.set_error("Transcript task stopped unexpectedly (press r to retry)".to_string());
    }
    self.tasks.transcript_rx = None;
  }

  /// Wait until the running transcript job (if any) has finished.
  pub async fn settle_transcript(&mut self) {
    while self.transcript_state.is_loading() {
      let Some(rx) = self.tasks.transcript_rx.as_mut() else {
        self.transcript_task_lost();
        break;
      };
      match rx.recv().await {
        Some((video_id, event)) => self.apply_transcript_event(video_id, event),
        None => self.transcript_task_lost(),
      }
    }
  }

  // --- Search ---

  /// Mark the search box as edited; the query is applied after the debounce.
  pub fn search_edited(&mut self) {
    self.search_edited_at = Some(Instant::now());
  }

  pub fn set_search_query(&mut self, query: &str) {
    self.search_input.set(query);
    self.apply_search();
  }

  pub fn apply_search(&mut self) {
    self.search_edited_at = None;
    self.search = search::set_query(self.store.lines(), &self.search_input.text);
    if let Some(line) = self.search.current_line() {
      self.list_state.select(Some(line));
    }
  }

  pub fn search_step(&mut self, direction: Direction) {
    self.search = search::navigate(&self.search, direction);
    if let Some(line) = self.search.current_line() {
      self.list_state.select(Some(line));
    }
  }

  // --- Export ---

  pub fn copy_transcript(&mut self) -> Result<usize> {
    let text = self.store.as_plain_text();
    if text.is_empty() {
      anyhow::bail!("No transcript loaded");
    }
    let mut clipboard = arboard::Clipboard::new().context("Clipboard unavailable")?;
    clipboard.set_text(text.clone()).context("Failed to copy to clipboard")?;
    info!(chars = text.len(), "export: transcript copied");
    Ok(self.store.lines().len())
  }

  pub fn download_transcript(&mut self) -> Result<PathBuf> {
    let transcript = self.store.current().filter(|t| !t.lines.is_empty()).context("No transcript loaded")?;
    std::fs::create_dir_all(&self.download_dir)
      .with_context(|| format!("Failed to create {}", self.download_dir.display()))?;
    let path = self.download_dir.join(download_file_name(&transcript.title, &transcript.video_id));
    std::fs::write(&path, transcript.as_plain_text()).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "export: transcript saved");
    Ok(path)
  }

  /// Open the selected transcript line at its timestamp in the browser.
  pub fn open_selected_line(&mut self) {
    let Some(idx) = self.list_state.selected() else { return };
    let (Some(video_id), Some(line)) = (self.store.video_id(), self.store.lines().get(idx)) else { return };
    let url = timestamp_url(video_id, line.start_secs);
    let timestamp = line.timestamp.clone();
    match open_in_browser(&url) {
      Ok(()) => self.info_message = Some(format!("Opened video at {}", timestamp)),
      Err(e) => self.set_error(format!("Failed to open browser: {}", e)),
    }
  }

  // --- Chat ---

  pub fn push_chat(&mut self, kind: EntryKind, text: String) {
    self.chat.push(ChatEntry { kind, text, at: Local::now() });
    self.chat_scroll = u16::MAX;
  }

  fn relay(&self) -> ChatRelay {
    let mut relay = ChatRelay::new(self.youtube.http().clone())
      .with_models(self.settings.models.clone().unwrap_or_default());
    if let Some(base) = self.settings.api_base.as_deref().filter(|b| !b.trim().is_empty()) {
      relay = relay.with_endpoint(endpoint_for_base(base.trim()));
    }
    relay
  }

  /// Inputs for one ask: relay, credential, transcript context.
  fn ask_parts(&self) -> (ChatRelay, String, Option<String>) {
    let transcript = self.store.has_transcript().then(|| self.store.as_plain_text());
    (self.relay(), self.api_key().unwrap_or_default().to_string(), transcript)
  }

  /// Send `question` in the background; the reply shows up through `check_pending`.
  pub fn trigger_ask(&mut self, question: &str) {
    let question = question.trim().to_string();
    if question.is_empty() {
      return;
    }
    if self.tasks.chat_rx.is_some() {
      self.set_error("Still waiting for the previous answer.".to_string());
      return;
    }
    self.push_chat(EntryKind::User, question.clone());
    let (relay, key, transcript) = self.ask_parts();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(relay.ask(&question, transcript.as_deref(), &key).await);
    });
    self.tasks.chat_rx = Some(rx);
    self.status_message = Some("Thinking…".to_string());
  }

  /// Ask and wait for the reply. Errors are logged to the chat as system entries too.
  pub async fn ask_now(&mut self, question: &str) -> error::Result<String> {
    let question = question.trim().to_string();
    self.push_chat(EntryKind::User, question.clone());
    let (relay, key, transcript) = self.ask_parts();
    let result = relay.ask(&question, transcript.as_deref(), &key).await;
    self.apply_chat_result(result.as_ref().map(String::clone).map_err(ToString::to_string));
    result
  }

  fn apply_chat_result(&mut self, result: std::result::Result<String, String>) {
    match result {
      Ok(answer) => self.push_chat(EntryKind::Assistant, answer),
      Err(msg) => {
        warn!(err = %msg, "chat: request failed");
        self.push_chat(EntryKind::System, msg);
      }
    }
  }

  // --- Polling ---

  pub fn check_pending(&mut self) {
    let mut events = Vec::new();
    let mut lost = false;
    if let Some(rx) = self.tasks.transcript_rx.as_mut() {
      loop {
        match rx.try_recv() {
          Ok(ev) => events.push(ev),
          Err(mpsc::error::TryRecvError::Empty) => break,
          Err(mpsc::error::TryRecvError::Disconnected) => {
            lost = true;
            break;
          }
        }
      }
    }
    for (video_id, event) in events {
      self.apply_transcript_event(video_id, event);
    }
    if lost {
      self.transcript_task_lost();
    }

    if let Some(mut rx) = self.tasks.chat_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.status_message = None;
          self.apply_chat_result(result.map_err(|e| e.to_string()));
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.chat_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.push_chat(EntryKind::System, "Chat task failed.".to_string());
        }
      }
    }

    if let Some(t) = self.search_edited_at
      && t.elapsed() >= Duration::from_millis(constants().search_debounce_ms)
    {
      self.apply_search();
    }

    self.expire_error();
  }
}

/// Open `url` with the platform's default handler.
pub fn open_in_browser(url: &str) -> std::io::Result<()> {
  #[cfg(target_os = "macos")]
  let cmd = "open";
  #[cfg(not(target_os = "macos"))]
  let cmd = "xdg-open";
  let mut child = std::process::Command::new(cmd)
    .arg(url)
    .stdin(std::process::Stdio::null())
    .stdout(std::process::Stdio::null())
    .stderr(std::process::Stdio::null())
    .spawn()?;
  // Reap the child in a background thread to avoid zombie processes.
  std::thread::spawn(move || {
    let _ = child.wait();
  });
  Ok(())
}
