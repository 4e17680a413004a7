//! Caption track download and decoding.
//!
//! A track URL can deliver either the JSON3 event format or one of the XML cue formats
//! (`<text start dur>` in seconds, or the `<p t d>` millisecond variant). The body is
//! sniffed by attempting JSON3 first; the content-type header is never trusted.

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

// Caption styling markup only: `<font color="#fff">`, `<i>`, `</b>`, `<c.colorE5E5E5>`. Anything else
// between angle brackets is transcript text.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
  // Safety: the pattern is a literal and known to compile.
  Regex::new(r#"(?i)</?(?:font|i|b|u|s|c(?:\.[\w-]+)*)(?:\s+[\w-]+=(?:"[^"]*"|'[^']*'|[^\s<>"']+))*\s*/?>"#)
    .expect("tag pattern is valid")
});

/// One timed caption entry, text already decoded to plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCue {
  pub start_secs: f64,
  pub duration_secs: f64,
  pub text: String,
}

// --- JSON3 ---

#[derive(Debug, Deserialize)]
struct Json3 {
  events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
  #[serde(default)]
  t_start_ms: f64,
  #[serde(default)]
  d_duration_ms: f64,
  segs: Option<Vec<Json3Seg>>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
  #[serde(default)]
  utf8: String,
}

fn parse_json3(body: &str) -> Option<Vec<RawCue>> {
  let doc: Json3 = serde_json::from_str(body).ok()?;
  let cues = doc
    .events
    .into_iter()
    .filter_map(|ev| {
      let segs = ev.segs?;
      let text: String = segs.iter().map(|s| s.utf8.as_str()).collect();
      Some(RawCue {
        start_secs: ev.t_start_ms.max(0.0) / 1000.0,
        duration_secs: ev.d_duration_ms.max(0.0) / 1000.0,
        text: clean_text(&text),
      })
    })
    .collect();
  Some(cues)
}

// --- XML ---

fn attr_f64(node: &roxmltree::Node, name: &str) -> Option<f64> {
  node.attribute(name).and_then(|v| v.trim().parse::<f64>().ok()).filter(|v| v.is_finite())
}

fn node_text(node: &roxmltree::Node) -> String {
  node.descendants().filter(|n| n.is_text()).filter_map(|n| n.text()).collect()
}

fn parse_xml(body: &str) -> std::result::Result<Vec<RawCue>, String> {
  let doc = roxmltree::Document::parse(body).map_err(|e| format!("XML parse error: {}", e))?;

  let mut cues = Vec::new();
  for node in doc.descendants().filter(|n| n.is_element()) {
    match node.tag_name().name() {
      // srv1: <text start="1.23" dur="2.5">...</text>
      "text" => {
        let Some(start) = attr_f64(&node, "start") else { continue };
        let dur = attr_f64(&node, "dur").unwrap_or(0.0);
        cues.push(RawCue {
          start_secs: start.max(0.0),
          duration_secs: dur.max(0.0),
          text: clean_text(&node_text(&node)),
        });
      }
      // srv3: <p t="1230" d="2500">...<s>..</s></p>
      "p" => {
        let Some(t) = attr_f64(&node, "t") else { continue };
        let d = attr_f64(&node, "d").unwrap_or(0.0);
        cues.push(RawCue {
          start_secs: t.max(0.0) / 1000.0,
          duration_secs: d.max(0.0) / 1000.0,
          text: clean_text(&node_text(&node)),
        });
      }
      _ => {}
    }
  }

  if cues.is_empty() && !matches!(doc.root_element().tag_name().name(), "transcript" | "timedtext") {
    return Err(format!("unexpected root element <{}>", doc.root_element().tag_name().name()));
  }
  Ok(cues)
}

/// Decode a caption payload in either format into cues sorted by start time.
pub fn decode_payload(body: &str) -> Result<Vec<RawCue>> {
  let trimmed = body.trim_start_matches('\u{feff}').trim();
  if trimmed.is_empty() {
    return Err(Error::TranscriptParseFailed("empty caption payload".to_string()));
  }

  let mut cues = match parse_json3(trimmed) {
    Some(cues) => {
      debug!(cues = cues.len(), "fetcher: decoded JSON3 payload");
      cues
    }
    None => {
      let cues = parse_xml(trimmed).map_err(Error::TranscriptParseFailed)?;
      debug!(cues = cues.len(), "fetcher: decoded XML payload");
      cues
    }
  };
  cues.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));
  Ok(cues)
}

/// Ask for JSON3 delivery unless the track URL already names a format.
pub fn with_json3_format(track_url: &str) -> Result<String> {
  let mut url =
    Url::parse(track_url).map_err(|e| Error::TranscriptFetchFailed(format!("bad track URL {}: {}", track_url, e)))?;
  if !url.query_pairs().any(|(k, _)| k == "fmt") {
    url.query_pairs_mut().append_pair("fmt", "json3");
  }
  Ok(url.into())
}

/// Download the caption track at `track_url` and decode it.
pub async fn fetch_cues(http: &Client, track_url: &str) -> Result<Vec<RawCue>> {
  let url = with_json3_format(track_url)?;
  let response = http.get(&url).send().await?;
  let status = response.status();
  if !status.is_success() {
    return Err(Error::TranscriptFetchFailed(format!("caption track returned {}", status)));
  }
  let body = response.text().await?;
  let cues = decode_payload(&body)?;
  info!(cues = cues.len(), bytes = body.len(), "fetcher: caption track decoded");
  Ok(cues)
}

// --- Text cleanup ---

/// Decode entities, drop inline markup (`<font>`, `<i>`, ...) and collapse whitespace.
pub fn clean_text(raw: &str) -> String {
  // Tracks are often escaped twice (`&amp;#39;`), so decode until stable.
  let mut text = decode_entities(raw);
  for _ in 0..2 {
    let next = decode_entities(&text);
    if next == text {
      break;
    }
    text = next;
  }
  let stripped = TAG_RE.replace_all(&text, " ");
  stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn named_entity(name: &str) -> Option<char> {
  Some(match name {
    "amp" => '&',
    "lt" => '<',
    "gt" => '>',
    "quot" => '"',
    "apos" => '\'',
    "nbsp" => '\u{a0}',
    "ndash" => '–',
    "mdash" => '—',
    "hellip" => '…',
    "lsquo" => '‘',
    "rsquo" => '’',
    "ldquo" => '“',
    "rdquo" => '”',
    "laquo" => '«',
    "raquo" => '»',
    "copy" => '©',
    "reg" => '®',
    "trade" => '™',
    "deg" => '°',
    "eacute" => 'é',
    "egrave" => 'è',
    "aacute" => 'á',
    "agrave" => 'à',
    "iacute" => 'í',
    "oacute" => 'ó',
    "uacute" => 'ú',
    "ntilde" => 'ñ',
    "uuml" => 'ü',
    "ouml" => 'ö',
    "auml" => 'ä',
    "szlig" => 'ß',
    "ccedil" => 'ç',
    _ => return None,
  })
}

/// Decode one level of HTML character references. Unknown references are kept verbatim.
pub fn decode_entities(s: &str) -> String {
  if !s.contains('&') {
    return s.to_string();
  }

  let mut out = String::with_capacity(s.len());
  let mut rest = s;
  while let Some(amp) = rest.find('&') {
    out.push_str(&rest[..amp]);
    let after = &rest[amp + 1..];
    let decoded = after.find(';').filter(|&end| end > 0 && end <= 10).and_then(|end| {
      let name = &after[..end];
      let ch = if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
          Some(hex) => u32::from_str_radix(hex, 16).ok(),
          None => num.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32).filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
      } else {
        named_entity(name)
      };
      ch.map(|c| (c, end))
    });

    match decoded {
      Some((c, end)) => {
        out.push(c);
        rest = &after[end + 1..];
      }
      None => {
        out.push('&');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  const JSON3: &str = r#"{
    "wireMagic": "pb3",
    "events": [
      {"tStartMs": 0, "dDurationMs": 5000, "id": 1, "wpWinPosId": 1},
      {"tStartMs": 200, "dDurationMs": 1500, "segs": [{"utf8": "Hello"}]},
      {"tStartMs": 3000, "dDurationMs": 1200, "segs": [{"utf8": "wor"}, {"utf8": "ld", "tOffsetMs": 300}]},
      {"tStartMs": 4000, "segs": [{"utf8": "\n"}]}
    ]
  }"#;

  const SRV1: &str = r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="15.2" dur="2.1">it&amp;#39;s   &lt;font color=&quot;#E5E5E5&quot;&gt;fine&lt;/font&gt;</text><text start="1.5" dur="3">Tom &amp;amp; Jerry</text></transcript>"#;

  const SRV3: &str = r#"<?xml version="1.0" encoding="utf-8" ?><timedtext format="3"><body><p t="1000" d="2000">first <s>line</s></p><p t="13000" d="500"><s>second</s></p></body></timedtext>"#;

  #[test]
  fn decodes_json3_events() {
    let cues = decode_payload(JSON3).unwrap();
    assert_eq!(cues.len(), 3);
    assert_eq!(cues[0], RawCue { start_secs: 0.2, duration_secs: 1.5, text: "Hello".to_string() });
    assert_eq!(cues[1].text, "world");
    assert_eq!(cues[1].start_secs, 3.0);
    assert_eq!(cues[2].text, "");
  }

  #[test]
  fn decodes_srv1_xml_and_sorts() {
    let cues = decode_payload(SRV1).unwrap();
    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0].start_secs, 1.5);
    assert_eq!(cues[0].text, "Tom & Jerry");
    assert_eq!(cues[1].text, "it's fine");
    assert_eq!(cues[1].duration_secs, 2.1);
  }

  #[test]
  fn decodes_srv3_xml_milliseconds() {
    let cues = decode_payload(SRV3).unwrap();
    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0], RawCue { start_secs: 1.0, duration_secs: 2.0, text: "first line".to_string() });
    assert_eq!(cues[1].start_secs, 13.0);
  }

  #[test]
  fn rejects_garbage_payload() {
    assert!(matches!(decode_payload("<html><body>nope"), Err(Error::TranscriptParseFailed(_))));
    assert!(matches!(decode_payload("   "), Err(Error::TranscriptParseFailed(_))));
    assert!(matches!(decode_payload(r#"{"unexpected": true}"#), Err(Error::TranscriptParseFailed(_))));
  }

  #[test]
  fn decode_entities_named_and_numeric() {
    assert_eq!(decode_entities("a &amp; b &lt;c&gt; &#39;d&#39; &#x263A;"), "a & b <c> 'd' ☺");
    assert_eq!(decode_entities("AT&T &unknown; & done"), "AT&T &unknown; & done");
    assert_eq!(decode_entities("&amp;#39;"), "&#39;");
  }

  #[test]
  fn control_character_references_are_kept_verbatim() {
    assert_eq!(decode_entities("a&#0;b &#x1B;[31m &#127;"), "a&#0;b &#x1B;[31m &#127;");
    assert_eq!(decode_entities("one&#10;two&#9;three"), "one\ntwo\tthree");
  }

  #[test]
  fn clean_text_collapses_whitespace_and_tags() {
    assert_eq!(clean_text("  one\n two&amp;#39;s  <i>three</i> "), "one two's three");
    assert_eq!(clean_text(r##"<font color="#E5E5E5">so</font> <c.colorCCCCCC>then</c>"##), "so then");
  }

  #[test]
  fn literal_angle_brackets_survive() {
    assert_eq!(clean_text("if x < 5 and y > 3 then"), "if x < 5 and y > 3 then");
    assert_eq!(clean_text("a &amp;lt; b and c &amp;gt; d"), "a < b and c > d");
    assert_eq!(clean_text("x <b and c> y"), "x <b and c> y");
    assert_eq!(clean_text("&lt;i&gt;aside&lt;/i&gt; &lt;3"), "aside <3");
  }

  #[test]
  fn xml_cue_keeps_comparison_text() {
    let body = r#"<transcript><text start="1" dur="2">a &amp;lt; b and c &amp;gt; d</text></transcript>"#;
    let cues = decode_payload(body).unwrap();
    assert_eq!(cues[0].text, "a < b and c > d");
  }

  #[test]
  fn json3_format_is_requested_once() {
    let url = with_json3_format("https://example.com/api/timedtext?v=abc&lang=en").unwrap();
    assert_eq!(url, "https://example.com/api/timedtext?v=abc&lang=en&fmt=json3");
    let kept = with_json3_format("https://example.com/api/timedtext?v=abc&fmt=srv3").unwrap();
    assert_eq!(kept, "https://example.com/api/timedtext?v=abc&fmt=srv3");
  }

  #[tokio::test]
  async fn fetch_cues_falls_back_to_xml_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/timedtext"))
      .and(query_param("fmt", "json3"))
      .respond_with(ResponseTemplate::new(200).set_body_string(SRV1))
      .mount(&server)
      .await;

    let url = format!("{}/api/timedtext?v=abc&lang=en", server.uri());
    let cues = fetch_cues(&Client::new(), &url).await.unwrap();
    assert_eq!(cues.len(), 2);
  }

  #[tokio::test]
  async fn fetch_cues_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

    let url = format!("{}/api/timedtext?v=abc", server.uri());
    let err = fetch_cues(&Client::new(), &url).await.unwrap_err();
    assert!(matches!(err, Error::TranscriptFetchFailed(_)));
  }
}
