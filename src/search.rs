//! Incremental substring search over transcript lines.

use std::ops::Range;

use crate::segment::TranscriptLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Next,
  Prev,
}

/// Matches of the current query. `current` indexes into `match_lines`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
  pub query: String,
  /// Indices of matching transcript lines, ascending.
  pub match_lines: Vec<usize>,
  pub current: Option<usize>,
}

impl SearchState {
  pub fn is_active(&self) -> bool {
    !self.query.is_empty()
  }

  /// Transcript line index of the current match.
  pub fn current_line(&self) -> Option<usize> {
    self.current.and_then(|i| self.match_lines.get(i).copied())
  }

  /// Counter text shown next to the search box.
  pub fn counter(&self) -> String {
    match self.current {
      _ if self.query.is_empty() => String::new(),
      Some(i) => format!("{} of {} matches", i + 1, self.match_lines.len()),
      None => "No matches found".to_string(),
    }
  }
}

/// Byte ranges of every case-insensitive occurrence of `query` in `text`, non-overlapping.
pub fn highlight(text: &str, query: &str) -> Vec<Range<usize>> {
  let needle: Vec<char> = query.chars().flat_map(char::to_lowercase).collect();
  if needle.is_empty() {
    return Vec::new();
  }

  let mut ranges = Vec::new();
  let mut from = 0;
  while from < text.len() {
    match match_at(text, from, &needle) {
      Some(end) => {
        ranges.push(from..end);
        from = end;
      }
      None => {
        from += text[from..].chars().next().map_or(1, char::len_utf8);
      }
    }
  }
  ranges
}

/// If `needle` (already lowercased) matches `text` at byte `start`, return the end byte.
fn match_at(text: &str, start: usize, needle: &[char]) -> Option<usize> {
  let mut matched = 0;
  for (offset, c) in text[start..].char_indices() {
    for lc in c.to_lowercase() {
      if needle.get(matched) != Some(&lc) {
        return None;
      }
      matched += 1;
    }
    if matched == needle.len() {
      return Some(start + offset + c.len_utf8());
    }
  }
  None
}

pub fn line_matches(text: &str, query: &str) -> bool {
  !highlight(text, query).is_empty()
}

/// Recompute the search state for `query`. An empty query clears everything.
pub fn set_query(lines: &[TranscriptLine], query: &str) -> SearchState {
  if query.is_empty() {
    return SearchState::default();
  }
  let match_lines: Vec<usize> =
    lines.iter().enumerate().filter(|(_, l)| line_matches(&l.text, query)).map(|(i, _)| i).collect();
  let current = if match_lines.is_empty() { None } else { Some(0) };
  SearchState { query: query.to_string(), match_lines, current }
}

/// Move to the next or previous match, wrapping around. No-op without matches.
pub fn navigate(state: &SearchState, direction: Direction) -> SearchState {
  let count = state.match_lines.len();
  if count == 0 {
    return state.clone();
  }
  let i = state.current.unwrap_or(0);
  let next = match direction {
    Direction::Next => (i + 1) % count,
    Direction::Prev => {
      if i == 0 {
        count - 1
      } else {
        i - 1
      }
    }
  };
  SearchState { current: Some(next), ..state.clone() }
}

/// Split `text` into `(segment, highlighted)` pieces for rendering.
pub fn split_highlighted<'t>(text: &'t str, query: &str) -> Vec<(&'t str, bool)> {
  let mut pieces = Vec::new();
  let mut last = 0;
  for r in highlight(text, query) {
    if r.start > last {
      pieces.push((&text[last..r.start], false));
    }
    pieces.push((&text[r.clone()], true));
    last = r.end;
  }
  if last < text.len() || pieces.is_empty() {
    pieces.push((&text[last..], false));
  }
  pieces
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lines(texts: &[&str]) -> Vec<TranscriptLine> {
    texts.iter().enumerate().map(|(i, t)| TranscriptLine::new(i as f64 * 15.0, t.to_string())).collect()
  }

  // --- highlight ---

  #[test]
  fn highlights_every_occurrence() {
    assert_eq!(highlight("the cat sat on the mat", "the"), vec![0..3, 15..18]);
    assert_eq!(highlight("The THE the", "the"), vec![0..3, 4..7, 8..11]);
  }

  #[test]
  fn highlight_is_non_overlapping() {
    assert_eq!(highlight("aaaa", "aa"), vec![0..2, 2..4]);
  }

  #[test]
  fn highlight_handles_multibyte() {
    let text = "Ärger über Übermut";
    let ranges = highlight(text, "über");
    assert_eq!(ranges.len(), 2);
    assert_eq!(&text[ranges[0].clone()], "über");
    assert_eq!(&text[ranges[1].clone()], "Über");
  }

  #[test]
  fn highlight_treats_query_literally() {
    assert_eq!(highlight("cost is $5 (approx.)", "(approx.)"), vec![11..20]);
    assert!(highlight("abc", "a.c").is_empty());
  }

  #[test]
  fn empty_query_highlights_nothing() {
    assert!(highlight("anything", "").is_empty());
  }

  // --- set_query ---

  #[test]
  fn set_query_marks_matching_lines() {
    let ls = lines(&["Rust is fast", "Go is simple", "rust again"]);
    let state = set_query(&ls, "RUST");
    assert_eq!(state.match_lines, vec![0, 2]);
    assert_eq!(state.current, Some(0));
    assert_eq!(state.counter(), "1 of 2 matches");
  }

  #[test]
  fn no_matches() {
    let state = set_query(&lines(&["alpha", "beta"]), "gamma");
    assert!(state.match_lines.is_empty());
    assert_eq!(state.current, None);
    assert_eq!(state.counter(), "No matches found");
  }

  #[test]
  fn clearing_the_query_resets_everything() {
    let ls = lines(&["alpha", "beta", "alphabet"]);
    let state = set_query(&ls, "alpha");
    let state = navigate(&state, Direction::Next);
    assert_eq!(state.current, Some(1));

    let cleared = set_query(&ls, "");
    assert_eq!(cleared, SearchState::default());
    assert!(!cleared.is_active());
    assert_eq!(cleared.counter(), "");
    assert!(ls.iter().all(|l| split_highlighted(&l.text, &cleared.query) == vec![(l.text.as_str(), false)]));
  }

  // --- navigate ---

  #[test]
  fn next_wraps_to_first() {
    let ls = lines(&["x", "x", "x"]);
    let mut state = set_query(&ls, "x");
    state = navigate(&state, Direction::Next);
    state = navigate(&state, Direction::Next);
    assert_eq!(state.current, Some(2));
    state = navigate(&state, Direction::Next);
    assert_eq!(state.current, Some(0));
  }

  #[test]
  fn prev_wraps_to_last() {
    let ls = lines(&["x", "y", "x", "x"]);
    let state = set_query(&ls, "x");
    let state = navigate(&state, Direction::Prev);
    assert_eq!(state.current, Some(2));
    assert_eq!(state.current_line(), Some(3));
  }

  #[test]
  fn navigate_without_matches_is_noop() {
    let state = set_query(&lines(&["a"]), "zzz");
    assert_eq!(navigate(&state, Direction::Next), state);
    assert_eq!(navigate(&SearchState::default(), Direction::Prev), SearchState::default());
  }

  // --- split_highlighted ---

  #[test]
  fn split_highlighted_pieces() {
    assert_eq!(
      split_highlighted("say hello, Hello!", "hello"),
      vec![("say ", false), ("hello", true), (", ", false), ("Hello", true), ("!", false)]
    );
    assert_eq!(split_highlighted("hello", "hello"), vec![("hello", true)]);
  }
}
