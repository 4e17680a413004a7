use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{App, Focus, Tab};
use crate::search::Direction;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Single-line text field: contents, cursor (char index) and horizontal scroll.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
  pub text: String,
  pub cursor: usize,
  pub scroll: usize,
}

impl TextInput {
  pub fn set(&mut self, text: &str) {
    self.text = text.to_string();
    self.cursor = self.text.chars().count();
    self.scroll = 0;
  }

  pub fn clear(&mut self) {
    self.text.clear();
    self.cursor = 0;
    self.scroll = 0;
  }

  /// Take the contents, leaving the field empty.
  pub fn take(&mut self) -> String {
    let text = std::mem::take(&mut self.text);
    self.clear();
    text
  }

  /// Apply an editing key. Returns `true` when the text changed.
  pub fn edit(&mut self, code: KeyCode) -> bool {
    match code {
      KeyCode::Char(c) => {
        let byte_idx = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_idx, c);
        self.cursor += 1;
        true
      }
      KeyCode::Backspace => {
        if self.cursor > 0 {
          self.cursor -= 1;
          let byte_idx = char_to_byte_index(&self.text, self.cursor);
          self.text.remove(byte_idx);
          return true;
        }
        false
      }
      KeyCode::Delete => {
        if self.cursor < self.text.chars().count() {
          let byte_idx = char_to_byte_index(&self.text, self.cursor);
          self.text.remove(byte_idx);
          return true;
        }
        false
      }
      KeyCode::Left => {
        self.cursor = self.cursor.saturating_sub(1);
        false
      }
      KeyCode::Right => {
        if self.cursor < self.text.chars().count() {
          self.cursor += 1;
        }
        false
      }
      KeyCode::Home => {
        self.cursor = 0;
        false
      }
      KeyCode::End => {
        self.cursor = self.text.chars().count();
        false
      }
      _ => false,
    }
  }
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: event::KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) {
    match key.code {
      KeyCode::Char('c') => app.should_quit = true,
      KeyCode::Char('t') => app.next_theme(),
      KeyCode::Char('b') => app.toggle_sidebar(),
      _ => {}
    }
    return;
  }

  match app.focus {
    Focus::List => handle_list_key(app, key),
    Focus::Search => handle_search_key(app, key),
    Focus::Chat => handle_chat_key(app, key),
    Focus::Url => handle_url_key(app, key),
    Focus::ApiKey => handle_api_key_key(app, key),
  }
}

fn handle_list_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Char('q') | KeyCode::Esc => {
      if app.search.is_active() && key.code == KeyCode::Esc {
        app.set_search_query("");
      } else {
        app.should_quit = true;
      }
    }
    KeyCode::Tab => app.next_tab(),
    KeyCode::Char('o') => {
      app.url_input.clear();
      app.focus = Focus::Url;
    }
    KeyCode::Char('s') => app.toggle_sidebar(),
    _ if !app.sidebar_visible => {}
    _ => match app.tab {
      Tab::Transcript => handle_transcript_key(app, key),
      Tab::Chat => handle_chat_tab_key(app, key),
      Tab::Settings => handle_settings_key(app, key),
    },
  }
}

fn handle_transcript_key(app: &mut App, key: event::KeyEvent) {
  let count = app.store.lines().len();
  match key.code {
    KeyCode::Char('/') => app.focus = Focus::Search,
    KeyCode::Char('n') => app.search_step(Direction::Next),
    KeyCode::Char('N') => app.search_step(Direction::Prev),
    KeyCode::Char('r') => {
      app.refresh_transcript();
    }
    KeyCode::Char('c') => match app.copy_transcript() {
      Ok(lines) => app.info_message = Some(format!("Copied {} lines to the clipboard", lines)),
      Err(e) => app.set_error(format!("{:#}", e)),
    },
    KeyCode::Char('d') => match app.download_transcript() {
      Ok(path) => app.info_message = Some(format!("Saved {}", path.display())),
      Err(e) => app.set_error(format!("{:#}", e)),
    },
    KeyCode::Enter => app.open_selected_line(),
    KeyCode::Down | KeyCode::Char('j') => {
      if count > 0 {
        let i = app.list_state.selected().map_or(0, |i| (i + 1).min(count - 1));
        app.list_state.select(Some(i));
      }
    }
    KeyCode::Up | KeyCode::Char('k') => {
      if count > 0 {
        let i = app.list_state.selected().map_or(0, |i| i.saturating_sub(1));
        app.list_state.select(Some(i));
      }
    }
    KeyCode::PageDown => {
      if count > 0 {
        let i = app.list_state.selected().map_or(0, |i| (i + 10).min(count - 1));
        app.list_state.select(Some(i));
      }
    }
    KeyCode::PageUp => {
      if count > 0 {
        let i = app.list_state.selected().map_or(0, |i| i.saturating_sub(10));
        app.list_state.select(Some(i));
      }
    }
    KeyCode::Char('g') | KeyCode::Home => {
      if count > 0 {
        app.list_state.select(Some(0));
      }
    }
    KeyCode::Char('G') | KeyCode::End => {
      if count > 0 {
        app.list_state.select(Some(count - 1));
      }
    }
    _ => {}
  }
}

fn handle_chat_tab_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Char('i') | KeyCode::Char('a') | KeyCode::Enter => app.focus = Focus::Chat,
    KeyCode::Down | KeyCode::Char('j') => app.chat_scroll = app.chat_scroll.saturating_add(1),
    KeyCode::Up | KeyCode::Char('k') => app.chat_scroll = app.chat_scroll.saturating_sub(1),
    _ => {}
  }
}

fn handle_settings_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Char('t') => app.next_theme(),
    KeyCode::Char('f') => app.toggle_auto_fetch(),
    KeyCode::Char('k') => {
      app.key_input.clear();
      app.focus = Focus::ApiKey;
    }
    _ => {}
  }
}

fn handle_search_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => {
      app.apply_search();
      app.focus = Focus::List;
    }
    KeyCode::Esc => {
      app.set_search_query("");
      app.focus = Focus::List;
    }
    KeyCode::Down => app.search_step(Direction::Next),
    KeyCode::Up => app.search_step(Direction::Prev),
    code => {
      if app.search_input.edit(code) {
        app.search_edited();
      }
    }
  }
}

fn handle_chat_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => {
      let question = app.chat_input.take();
      app.trigger_ask(&question);
    }
    KeyCode::Esc => app.focus = Focus::List,
    code => {
      app.chat_input.edit(code);
    }
  }
}

fn handle_url_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => {
      let url = app.url_input.take();
      app.focus = Focus::List;
      if let Err(e) = app.navigate(&url) {
        app.set_error(e.to_string());
      }
    }
    KeyCode::Esc => {
      app.url_input.clear();
      app.focus = Focus::List;
    }
    code => {
      app.url_input.edit(code);
    }
  }
}

fn handle_api_key_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => {
      let key = app.key_input.take();
      app.set_api_key(&key);
      app.focus = Focus::List;
      app.info_message = Some(if app.settings.ai_enabled() { "API key saved" } else { "API key cleared" }.to_string());
    }
    KeyCode::Esc => {
      app.key_input.clear();
      app.focus = Focus::List;
    }
    code => {
      app.key_input.edit(code);
    }
  }
}
