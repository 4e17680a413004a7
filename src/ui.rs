use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, Padding, Paragraph, Tabs},
};
use unicode_width::UnicodeWidthChar;

use crate::app::{App, EntryKind, Focus, Tab};
use crate::input::TextInput;
use crate::search::split_highlighted;
use crate::theme::Theme;
use crate::transcript::TranscriptState;

const SPINNER: [&str; 4] = ["◐", "◓", "◑", "◒"];

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// Wrap styled pieces into lines of at most `width` display columns, breaking at spaces
/// where possible.
pub fn wrap_styled(pieces: &[(&str, Style)], width: usize) -> Vec<Line<'static>> {
  let width = width.max(1);
  // Flatten to styled chars so a highlight can span a line break.
  let chars: Vec<(char, Style)> = pieces.iter().flat_map(|(s, style)| s.chars().map(move |c| (c, *style))).collect();

  let mut rows: Vec<Vec<(char, Style)>> = Vec::new();
  let mut row: Vec<(char, Style)> = Vec::new();
  let mut row_w = 0;
  let mut last_space: Option<usize> = None;
  for (c, style) in chars {
    if c == '\n' {
      rows.push(std::mem::take(&mut row));
      row_w = 0;
      last_space = None;
      continue;
    }
    let w = c.width().unwrap_or(0);
    if row_w + w > width && !row.is_empty() {
      match last_space {
        Some(idx) => {
          let rest = row.split_off(idx + 1);
          row.pop();
          rows.push(std::mem::replace(&mut row, rest));
        }
        None => rows.push(std::mem::take(&mut row)),
      }
      row_w = row.iter().map(|(c, _)| c.width().unwrap_or(0)).sum();
      last_space = None;
    }
    if c == ' ' {
      last_space = Some(row.len());
    }
    row.push((c, style));
    row_w += w;
  }
  if !row.is_empty() || rows.is_empty() {
    rows.push(row);
  }

  rows.into_iter().map(|r| Line::from(group_spans(r))).collect()
}

fn group_spans(row: Vec<(char, Style)>) -> Vec<Span<'static>> {
  let mut spans: Vec<Span<'static>> = Vec::new();
  let mut text = String::new();
  let mut current: Option<Style> = None;
  for (c, style) in row {
    if current.is_some_and(|s| s != style) {
      spans.push(Span::styled(std::mem::take(&mut text), current.unwrap_or_default()));
    }
    current = Some(style);
    text.push(c);
  }
  if !text.is_empty() {
    spans.push(Span::styled(text, current.unwrap_or_default()));
  }
  spans
}

fn rounded_block<'a>(theme: &Theme, title: impl Into<Line<'a>>, focused: bool) -> Block<'a> {
  let color = if focused { theme.accent } else { theme.border };
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(color))
}

// --- UI Rendering ---

/// Area the panel occupies: docked right, clamped to the configured size.
fn panel_area(app: &App, full: Rect) -> Rect {
  let width = app.settings.panel_width.max(40).min(full.width);
  let height = app.settings.panel_height.max(12).min(full.height);
  Rect { x: full.x + full.width - width, y: full.y, width, height }
}

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();
  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());
  let area = panel_area(app, frame.area());

  let [header_area, tabs_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(area);

  render_header(frame, app, header_area);
  if app.sidebar_visible {
    render_tabs(frame, app, tabs_area);
    match app.tab {
      Tab::Transcript => render_transcript(frame, app, main_area),
      Tab::Chat => render_chat(frame, app, main_area),
      Tab::Settings => render_settings(frame, app, main_area),
    }
  } else {
    render_hidden(frame, theme, main_area);
  }
  render_status(frame, app, status_area);
  render_input(frame, app, input_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let title_w = (area.width as usize).saturating_sub(version.len() + 8);
  let title = app.video_info.as_ref().map(|i| i.title.as_str()).or(app.store.video_id()).unwrap_or("no video");
  let left = Line::from(vec![
    Span::styled(" ▶ ytx ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
    Span::styled(truncate_str(title, title_w), Style::default().fg(theme.fg)),
  ]);
  frame.render_widget(left, area);

  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_tabs(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let selected = Tab::ALL.iter().position(|t| *t == app.tab).unwrap_or(0);
  let tabs = Tabs::new(Tab::ALL.iter().map(|t| t.label()))
    .select(selected)
    .style(Style::default().fg(theme.muted))
    .highlight_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .divider("│");
  frame.render_widget(tabs, area);
}

fn render_hidden(frame: &mut Frame, theme: &Theme, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("Panel hidden", Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
    Line::from(Span::styled("Press s or Ctrl+B to show it again.", Style::default().fg(theme.muted))),
  ];
  let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(rounded_block(theme, "", false));
  frame.render_widget(paragraph, area);
}

fn render_transcript(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();

  if !app.store.has_transcript() {
    let (headline, detail, color) = match &app.transcript_state {
      TranscriptState::Loading { stage, .. } => {
        let tick = (app.started_at.elapsed().as_millis() / 150) as usize % SPINNER.len();
        (format!("{} {}…", SPINNER[tick], stage), String::new(), theme.status)
      }
      TranscriptState::Failed { message, retryable } => {
        let hint = if *retryable { "Press r to retry." } else { "" };
        (message.clone(), hint.to_string(), theme.error)
      }
      _ if app.store.video_id().is_some() => {
        ("No transcript loaded".to_string(), "Press r to fetch it.".to_string(), theme.fg)
      }
      _ => ("No video open".to_string(), "Press o and paste a video URL.".to_string(), theme.fg),
    };
    let text = vec![
      Line::from(""),
      Line::from(Span::styled(headline, Style::default().fg(color).add_modifier(Modifier::BOLD))),
      Line::from(""),
      Line::from(Span::styled(detail, Style::default().fg(theme.muted))),
    ];
    let paragraph =
      Paragraph::new(text).alignment(Alignment::Center).block(rounded_block(theme, " Transcript ", false));
    frame.render_widget(paragraph, area);
    return;
  }

  // Inner width: area minus 2 borders minus 2 chars for the highlight symbol.
  let inner_w = area.width.saturating_sub(4) as usize;
  let query = app.search.query.as_str();
  let current_match = app.search.current_line();
  let selected = app.list_state.selected();

  let items: Vec<ListItem> = app
    .store
    .lines()
    .iter()
    .enumerate()
    .map(|(i, line)| {
      let is_selected = Some(i) == selected;
      let fg = if is_selected { theme.highlight_fg } else { theme.fg };
      let bg = if is_selected {
        theme.highlight_bg
      } else if i % 2 == 1 {
        theme.stripe_bg
      } else {
        theme.bg
      };
      let match_bg = if Some(i) == current_match { theme.current_match_bg } else { theme.match_bg };

      let stamp = format!("{:>8} ", line.timestamp);
      let stamp_style = Style::default().fg(theme.accent);
      let mut pieces: Vec<(&str, Style)> = vec![(stamp.as_str(), stamp_style)];
      for (text, hit) in split_highlighted(&line.text, query) {
        let style = Style::default().fg(fg);
        pieces.push((text, if hit { style.bg(match_bg).add_modifier(Modifier::BOLD) } else { style }));
      }
      ListItem::new(wrap_styled(&pieces, inner_w)).bg(bg)
    })
    .collect();

  let title = Line::from(vec![
    Span::styled(" Transcript ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
    Span::styled(format!("{} lines ", app.store.lines().len()), Style::default().fg(theme.muted)),
  ]);
  let list = List::new(items)
    .block(rounded_block(theme, title, app.focus == Focus::List))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_chat(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let inner_w = area.width.saturating_sub(4) as usize;
  let inner_h = area.height.saturating_sub(2) as usize;

  let mut lines: Vec<Line> = Vec::new();
  for entry in &app.chat {
    let (label, color) = match entry.kind {
      EntryKind::User => ("You", theme.user_fg),
      EntryKind::Assistant => ("AI", theme.assistant_fg),
      EntryKind::System => ("•", theme.muted),
    };
    lines.push(Line::from(vec![
      Span::styled(format!("{} ", label), Style::default().fg(color).add_modifier(Modifier::BOLD)),
      Span::styled(entry.at.format("%H:%M").to_string(), Style::default().fg(theme.muted)),
    ]));
    let text_style = match entry.kind {
      EntryKind::System => Style::default().fg(theme.muted).add_modifier(Modifier::ITALIC),
      _ => Style::default().fg(color),
    };
    lines.extend(wrap_styled(&[(entry.text.as_str(), text_style)], inner_w));
    lines.push(Line::from(""));
  }

  let max_scroll = lines.len().saturating_sub(inner_h).min(u16::MAX as usize) as u16;
  app.chat_scroll = app.chat_scroll.min(max_scroll);

  let title = if app.status().ai_enabled { " AI Chat " } else { " AI Chat (no API key) " };
  let paragraph = Paragraph::new(lines)
    .scroll((app.chat_scroll, 0))
    .block(rounded_block(theme, title, app.focus == Focus::Chat).padding(Padding::horizontal(1)));
  frame.render_widget(paragraph, area);
}

fn render_settings(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let s = &app.settings;
  let key = match s.api_key() {
    Some(k) if k.chars().count() > 8 => {
      let head: String = k.chars().take(3).collect();
      let tail: String = k.chars().skip(k.chars().count() - 4).collect();
      format!("{}…{}", head, tail)
    }
    Some(_) => "set".to_string(),
    None => "not set".to_string(),
  };
  let models = s.models.as_ref().map(|m| m.join(", ")).unwrap_or_else(|| "default".to_string());
  let rows: Vec<(&str, String, Option<&str>)> = vec![
    ("Theme", s.theme.clone(), Some("t")),
    ("Auto-fetch", if s.auto_fetch { "on" } else { "off" }.to_string(), Some("f")),
    ("API key", key, Some("k")),
    ("Models", models, None),
    ("API base", s.api_base.clone().unwrap_or_else(|| "default".to_string()), None),
    ("Font size", s.font_size.to_string(), None),
    ("Panel size", format!("{}×{}", s.panel_width, s.panel_height), None),
  ];

  let mut lines = vec![Line::from("")];
  for (label, value, key) in rows {
    let mut spans = vec![
      Span::styled(format!("{:<12}", label), Style::default().fg(theme.muted)),
      Span::styled(value, Style::default().fg(theme.fg)),
    ];
    if let Some(k) = key {
      spans.push(Span::raw("  "));
      spans.push(Span::styled(format!(" {} ", k), Style::default().fg(theme.key_fg).bg(theme.key_bg)));
    }
    lines.push(Line::from(spans));
  }
  let paragraph =
    Paragraph::new(lines).block(rounded_block(theme, " Settings ", false).padding(Padding::horizontal(1)));
  frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(msg) = &app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(theme.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let TranscriptState::Loading { stage, .. } = &app.transcript_state {
    (format!(" ⏳ {}…", stage), Style::default().fg(theme.status))
  } else if let Some(info) = &app.info_message {
    (format!(" ℹ {}", info), Style::default().fg(theme.muted))
  } else if app.search.is_active() {
    (format!(" {}", app.search.counter()), Style::default().fg(theme.muted))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let focus = app.focus;
  let (title, input, mask) = match focus {
    Focus::Url => (" Video URL ".to_string(), &mut app.url_input, false),
    Focus::ApiKey => (" API key ".to_string(), &mut app.key_input, true),
    Focus::Chat => (" Ask about this video ".to_string(), &mut app.chat_input, false),
    _ if app.tab == Tab::Chat => (" Ask about this video ".to_string(), &mut app.chat_input, false),
    _ => {
      let counter = app.search.counter();
      let title = if counter.is_empty() { " Search transcript ".to_string() } else { format!(" Search · {} ", counter) };
      (title, &mut app.search_input, false)
    }
  };
  let focused = matches!(focus, Focus::Url | Focus::ApiKey | Focus::Chat | Focus::Search);
  render_text_input(frame, theme, area, &title, input, focused, mask);
}

fn render_text_input(
  frame: &mut Frame,
  theme: &Theme,
  area: Rect,
  title: &str,
  input: &mut TextInput,
  focused: bool,
  mask: bool,
) {
  let border_color = if focused { theme.accent } else { theme.border };
  let block = Block::bordered()
    .title(title.to_string())
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let shown: String = if mask { "•".repeat(input.text.chars().count()) } else { input.text.clone() };
  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&shown, input.cursor);

  if cursor_col < input.scroll {
    input.scroll = cursor_col;
  } else if cursor_col >= input.scroll + inner_w {
    input.scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = shown
    .chars()
    .scan(0usize, |col, c| {
      let w = c.width().unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= input.scroll)
    .take_while(|(start, _, _)| *start < input.scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let paragraph = Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(block);
  frame.render_widget(paragraph, area);

  if focused {
    let cursor_x = area.x + 2 + (cursor_col - input.scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let keys: Vec<(&str, &str)> = match app.focus {
    Focus::Search => vec![("Enter", "Apply"), ("↑/↓", "Prev/Next"), ("Esc", "Clear")],
    Focus::Chat => vec![("Enter", "Send"), ("Esc", "Back")],
    Focus::Url => vec![("Enter", "Open"), ("Esc", "Cancel")],
    Focus::ApiKey => vec![("Enter", "Save"), ("Esc", "Cancel")],
    Focus::List if !app.sidebar_visible => vec![("s", "Show"), ("o", "Open URL"), ("q", "Quit")],
    Focus::List => {
      let mut k = vec![("Tab", "Tabs"), ("o", "Open URL")];
      match app.tab {
        Tab::Transcript => {
          k.push(("/", "Search"));
          if app.search.is_active() {
            k.push(("n/N", "Next/Prev"));
          }
          if app.store.has_transcript() {
            k.push(("Enter", "Watch"));
            k.push(("c", "Copy"));
            k.push(("d", "Save"));
          }
          k.push(("r", "Fetch"));
        }
        Tab::Chat => k.push(("i", "Ask")),
        Tab::Settings => {
          k.push(("t", "Theme"));
          k.push(("f", "Auto-fetch"));
          k.push(("k", "API key"));
        }
      }
      k.push(("s", "Hide"));
      k.push(("q", "Quit"));
      k
    }
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw(" "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);
}

#[cfg(test)]
mod tests {
  use super::*;

  fn texts(lines: &[Line]) -> Vec<String> {
    lines.iter().map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect()).collect()
  }

  #[test]
  fn truncates_with_ellipsis() {
    assert_eq!(truncate_str("hello world", 6), "hello…");
    assert_eq!(truncate_str("short", 10), "short");
  }

  #[test]
  fn wide_chars_count_double() {
    assert_eq!(display_width("日本", 2), 4);
    assert_eq!(display_width("abc", 2), 2);
  }

  #[test]
  fn wraps_at_spaces() {
    let lines = wrap_styled(&[("the quick brown fox", Style::default())], 10);
    assert_eq!(texts(&lines), vec!["the quick", "brown fox"]);
  }

  #[test]
  fn hard_wraps_long_words() {
    let lines = wrap_styled(&[("abcdefghij", Style::default())], 4);
    assert_eq!(texts(&lines), vec!["abcd", "efgh", "ij"]);
  }

  #[test]
  fn wrapping_keeps_styles_apart() {
    let hit = Style::default().add_modifier(Modifier::BOLD);
    let lines = wrap_styled(&[("say ", Style::default()), ("hello", hit), (" now", Style::default())], 40);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].spans.len(), 3);
    assert_eq!(lines[0].spans[1].content, "hello");
    assert_eq!(lines[0].spans[1].style, hit);
  }

  #[test]
  fn empty_text_is_one_blank_line() {
    assert_eq!(wrap_styled(&[], 10).len(), 1);
  }
}
