use ratatui::style::Color;

/// Panel colors.
#[derive(Debug)]
pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  /// Search match background.
  pub match_bg: Color,
  /// Current search match background.
  pub current_match_bg: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
  pub user_fg: Color,
  pub assistant_fg: Color,
}

pub static THEMES: [Theme; 2] = [
  Theme {
    name: "dark",
    bg: Color::Rgb(24, 24, 27),
    fg: Color::Rgb(228, 228, 231),
    accent: Color::Rgb(239, 68, 68),
    muted: Color::Rgb(113, 113, 122),
    border: Color::Rgb(63, 63, 70),
    highlight_fg: Color::Rgb(250, 250, 250),
    highlight_bg: Color::Rgb(63, 63, 70),
    stripe_bg: Color::Rgb(31, 31, 35),
    match_bg: Color::Rgb(113, 63, 18),
    current_match_bg: Color::Rgb(202, 138, 4),
    status: Color::Rgb(96, 165, 250),
    error: Color::Rgb(248, 113, 113),
    key_fg: Color::Rgb(24, 24, 27),
    key_bg: Color::Rgb(161, 161, 170),
    user_fg: Color::Rgb(147, 197, 253),
    assistant_fg: Color::Rgb(228, 228, 231),
  },
  Theme {
    name: "light",
    bg: Color::Rgb(250, 250, 250),
    fg: Color::Rgb(24, 24, 27),
    accent: Color::Rgb(220, 38, 38),
    muted: Color::Rgb(113, 113, 122),
    border: Color::Rgb(212, 212, 216),
    highlight_fg: Color::Rgb(24, 24, 27),
    highlight_bg: Color::Rgb(228, 228, 231),
    stripe_bg: Color::Rgb(244, 244, 245),
    match_bg: Color::Rgb(254, 240, 138),
    current_match_bg: Color::Rgb(250, 204, 21),
    status: Color::Rgb(37, 99, 235),
    error: Color::Rgb(220, 38, 38),
    key_fg: Color::Rgb(250, 250, 250),
    key_bg: Color::Rgb(82, 82, 91),
    user_fg: Color::Rgb(29, 78, 216),
    assistant_fg: Color::Rgb(24, 24, 27),
  },
];

/// Index of the theme called `name`, falling back to the first theme.
pub fn theme_index(name: &str) -> usize {
  THEMES.iter().position(|t| t.name.eq_ignore_ascii_case(name)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_by_name() {
    assert_eq!(THEMES[theme_index("light")].name, "light");
    assert_eq!(THEMES[theme_index("DARK")].name, "dark");
    assert_eq!(theme_index("neon"), 0);
  }
}
