use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::youtube::{WatchPage, YouTube, balanced_fragment};

static CAPTION_TRACKS_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#""captionTracks"\s*:\s*\["#).expect("caption tracks pattern is valid"));

/// A caption stream the page advertises.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
  pub base_url: String,
  #[serde(default)]
  pub language_code: String,
  /// `"asr"` for auto-generated tracks.
  #[serde(default)]
  pub kind: Option<String>,
  #[serde(default, deserialize_with = "track_name")]
  pub name: Option<String>,
}

impl CaptionTrack {
  pub fn is_english(&self) -> bool {
    let code = self.language_code.to_ascii_lowercase();
    code == "en" || code.starts_with("en-") || code.starts_with("en_")
  }

  pub fn is_auto_generated(&self) -> bool {
    self.kind.as_deref() == Some("asr")
  }
}

/// Track names come as `{"simpleText": ".."}` or `{"runs": [{"text": ".."}]}`.
fn track_name<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(value.and_then(|v| {
    if let Some(s) = v.get("simpleText").and_then(Value::as_str) {
      return Some(s.to_string());
    }
    let runs = v.get("runs")?.as_array()?;
    let text: String = runs.iter().filter_map(|r| r.get("text").and_then(Value::as_str)).collect();
    (!text.is_empty()).then_some(text)
  }))
}

/// Pick the track to show: English first (manual over auto-generated), otherwise the first one.
pub fn choose_track(tracks: Vec<CaptionTrack>) -> Option<CaptionTrack> {
  let english = |manual: bool| tracks.iter().position(|t| t.is_english() && t.is_auto_generated() != manual);
  let idx = english(true).or_else(|| english(false)).unwrap_or(0);
  tracks.into_iter().nth(idx)
}

/// Caption tracks listed in the player response, if any.
pub fn tracks_from_player_response(player_response: &Value) -> Vec<CaptionTrack> {
  player_response
    .pointer("/captions/playerCaptionsTracklistRenderer/captionTracks")
    .and_then(Value::as_array)
    .map(|list| {
      list
        .iter()
        .filter_map(|t| serde_json::from_value::<CaptionTrack>(t.clone()).ok())
        .filter(|t| !t.base_url.is_empty())
        .collect()
    })
    .unwrap_or_default()
}

/// Scan raw markup for the embedded `"captionTracks":[...]` fragment.
///
/// Returns `Ok(None)` when the markup has no such fragment and `MalformedCaptionIndex`
/// when the fragment is there but doesn't parse as an array of tracks.
pub fn tracks_from_markup(markup: &str) -> Result<Option<Vec<CaptionTrack>>> {
  let Some(m) = CAPTION_TRACKS_RE.find(markup) else {
    return Ok(None);
  };
  let open = m.end() - 1;
  let fragment = balanced_fragment(markup, open)
    .ok_or_else(|| Error::MalformedCaptionIndex("caption track list is not terminated".to_string()))?;
  let tracks: Vec<CaptionTrack> =
    serde_json::from_str(fragment).map_err(|e| Error::MalformedCaptionIndex(e.to_string()))?;
  Ok(Some(tracks.into_iter().filter(|t| !t.base_url.is_empty()).collect()))
}

/// Finds the caption track for a watch page, trying each strategy in order.
pub struct CaptionLocator<'a> {
  youtube: &'a YouTube,
}

impl<'a> CaptionLocator<'a> {
  pub fn new(youtube: &'a YouTube) -> Self {
    Self { youtube }
  }

  pub async fn locate(&self, page: &WatchPage) -> Result<CaptionTrack> {
    // Strategy 1: the player response already embedded in the page.
    if let Some(pr) = &page.player_response {
      let tracks = tracks_from_player_response(pr);
      if let Some(track) = choose_track(tracks) {
        info!(video_id = %page.video_id, lang = %track.language_code, "locator: track from player response");
        return Ok(track);
      }
      debug!(video_id = %page.video_id, "locator: player response lists no caption tracks");
    }

    // Strategy 2: re-fetch the page and scan the markup for the track list.
    let markup = match self.youtube.fetch_markup(&page.video_id).await {
      Ok(markup) => markup,
      Err(e) => {
        warn!(video_id = %page.video_id, err = %e, "locator: page re-fetch failed, scanning original markup");
        page.markup.clone()
      }
    };
    match tracks_from_markup(&markup)?.and_then(choose_track) {
      Some(track) => {
        info!(video_id = %page.video_id, lang = %track.language_code, "locator: track from page markup");
        Ok(track)
      }
      None => Err(Error::NoCaptionsAvailable),
    }
  }
}
