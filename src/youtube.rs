use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

use crate::constants::constants;
use crate::error::{Error, Result};
use crate::fetcher::decode_entities;

static PLAYER_RESPONSE_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"ytInitialPlayerResponse\s*=\s*\{").expect("player response pattern is valid"));

static TITLE_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern is valid"));

/// Title and id of the video on the current watch page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
  pub title: String,
  pub video_id: String,
}

/// A downloaded watch page: the raw markup plus the player response embedded in it.
#[derive(Debug, Clone)]
pub struct WatchPage {
  pub video_id: String,
  pub markup: String,
  pub player_response: Option<Value>,
}

impl WatchPage {
  pub fn from_markup(video_id: &str, markup: String) -> Self {
    let player_response = extract_player_response(&markup);
    Self { video_id: video_id.to_string(), markup, player_response }
  }

  /// Video title from the player response, falling back to the document `<title>`.
  pub fn title(&self) -> String {
    let from_details = self
      .player_response
      .as_ref()
      .and_then(|pr| pr.pointer("/videoDetails/title"))
      .and_then(Value::as_str)
      .map(str::trim)
      .filter(|t| !t.is_empty());
    if let Some(title) = from_details {
      return title.to_string();
    }
    TITLE_RE
      .captures(&self.markup)
      .and_then(|c| c.get(1))
      .map(|m| decode_entities(m.as_str().trim()))
      .map(|t| t.trim_end_matches(" - YouTube").trim().to_string())
      .filter(|t| !t.is_empty())
      .unwrap_or_else(|| self.video_id.clone())
  }

  pub fn info(&self) -> VideoInfo {
    VideoInfo { title: self.title(), video_id: self.video_id.clone() }
  }
}

/// Thin client for the video site's watch pages.
#[derive(Debug, Clone)]
pub struct YouTube {
  http: Client,
  base_url: String,
}

impl YouTube {
  pub fn new(http: Client) -> Self {
    Self::with_base_url(http, &constants().youtube_base_url)
  }

  pub fn with_base_url(http: Client, base_url: &str) -> Self {
    Self { http, base_url: base_url.trim_end_matches('/').to_string() }
  }

  pub fn http(&self) -> &Client {
    &self.http
  }

  pub fn watch_url(&self, video_id: &str) -> String {
    format!("{}/watch?v={}", self.base_url, video_id)
  }

  /// Download the watch page markup for `video_id`.
  pub async fn fetch_markup(&self, video_id: &str) -> Result<String> {
    let url = self.watch_url(video_id);
    debug!(url = %url, "youtube: fetching watch page");
    let response = self.http.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(Error::TranscriptFetchFailed(format!("watch page returned {}", status)));
    }
    Ok(response.text().await?)
  }

  pub async fn load_page(&self, video_id: &str) -> Result<WatchPage> {
    let markup = self.fetch_markup(video_id).await?;
    let page = WatchPage::from_markup(video_id, markup);
    info!(
      video_id = %video_id,
      bytes = page.markup.len(),
      player_response = page.player_response.is_some(),
      "youtube: watch page loaded"
    );
    Ok(page)
  }
}

/// Build the shared HTTP client with the configured timeout and user agent.
pub fn http_client() -> anyhow::Result<Client> {
  let c = constants();
  let client = Client::builder().timeout(c.request_timeout()).user_agent(c.user_agent.as_str()).build()?;
  Ok(client)
}

/// Link that opens `video_id` at `secs` (floored to whole seconds).
pub fn timestamp_url(video_id: &str, secs: f64) -> String {
  let secs = if secs.is_finite() && secs > 0.0 { secs.floor() as u64 } else { 0 };
  format!("https://www.youtube.com/watch?v={}&t={}s", video_id, secs)
}

fn is_video_id(s: &str) -> bool {
  s.len() == 11 && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Extract the video id from a watch URL, a short link, a shorts/embed/live URL, or a bare id.
pub fn video_id_from_url(input: &str) -> Result<String> {
  let trimmed = input.trim();
  if is_video_id(trimmed) {
    return Ok(trimmed.to_string());
  }

  let invalid = || Error::InvalidVideoUrl(trimmed.to_string());
  let url = Url::parse(trimmed).map_err(|_| invalid())?;
  let host = url.host_str().unwrap_or("").trim_start_matches("www.").trim_start_matches("m.");

  let candidate = match host {
    "youtu.be" => url.path_segments().and_then(|mut s| s.next()).map(str::to_string),
    "youtube.com" | "music.youtube.com" => {
      let mut segments = url.path_segments().into_iter().flatten();
      match segments.next() {
        Some("watch") => url.query_pairs().find(|(k, _)| k == "v").map(|(_, v)| v.into_owned()),
        Some("shorts" | "embed" | "live") => segments.next().map(str::to_string),
        _ => None,
      }
    }
    _ => None,
  };

  candidate.filter(|id| is_video_id(id)).ok_or_else(invalid)
}

/// Extract the JSON object assigned to `ytInitialPlayerResponse` in the page markup.
pub fn extract_player_response(markup: &str) -> Option<Value> {
  let m = PLAYER_RESPONSE_RE.find(markup)?;
  let open = m.end() - 1;
  let fragment = balanced_fragment(markup, open)?;
  match serde_json::from_str(fragment) {
    Ok(value) => Some(value),
    Err(e) => {
      debug!(err = %e, "youtube: embedded player response did not parse");
      None
    }
  }
}

/// Return the bracket-balanced JSON fragment starting at byte `open` (`{` or `[`).
///
/// String literals are skipped so brackets inside them don't count. Returns `None` when
/// `open` isn't an opening bracket or the fragment never closes.
pub fn balanced_fragment(s: &str, open: usize) -> Option<&str> {
  let bytes = s.as_bytes();
  let (opener, closer) = match bytes.get(open)? {
    b'{' => (b'{', b'}'),
    b'[' => (b'[', b']'),
    _ => return None,
  };

  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;
  for (i, &b) in bytes.iter().enumerate().skip(open) {
    if in_string {
      if escaped {
        escaped = false;
      } else if b == b'\\' {
        escaped = true;
      } else if b == b'"' {
        in_string = false;
      }
      continue;
    }
    match b {
      b'"' => in_string = true,
      _ if b == opener => depth += 1,
      _ if b == closer => {
        depth -= 1;
        if depth == 0 {
          return Some(&s[open..=i]);
        }
      }
      _ => {}
    }
  }
  None
}
