use serde::Deserialize;

const MIN_SIDE: u32 = 100;
const MAX_SIDE: u32 = 2048;
const DEFAULT_SIDE: u32 = 512;
const MAX_TEXT: usize = 50;
const DEFAULT_TEXT: &str = "AI Generated";
const DEFAULT_BG: &str = "6366f1";
const DEFAULT_FG: &str = "ffffff";

#[derive(Deserialize, Debug, Default)]
pub struct PlaceholderQuery {
  pub width: Option<String>,
  pub height: Option<String>,
  pub text: Option<String>,
  pub bg: Option<String>,
  pub color: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct PlaceholderSpec {
  pub width: u32,
  pub height: u32,
  pub text: String,
  pub bg: String,
  pub color: String,
}

impl PlaceholderSpec {
  pub fn from_query(query: &PlaceholderQuery) -> Self {
    Self {
      width: side(query.width.as_deref()),
      height: side(query.height.as_deref()),
      text: sanitize_text(query.text.as_deref().filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TEXT)),
      bg: hex_color(query.bg.as_deref(), DEFAULT_BG),
      color: hex_color(query.color.as_deref(), DEFAULT_FG),
    }
  }

  pub fn render(&self) -> String {
    let font_size = self.width.min(self.height) as f32 / 10.0;
    let footer_y = self.height.saturating_sub(30);
    format!(
      r##"<svg width="{w}" height="{h}" xmlns="http://www.w3.org/2000/svg">
  <defs>
    <linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">
      <stop offset="0%" style="stop-color:#{bg};stop-opacity:1" />
      <stop offset="100%" style="stop-color:#{bg}88;stop-opacity:1" />
    </linearGradient>
  </defs>
  <rect width="100%" height="100%" fill="url(#grad)"/>
  <text x="50%" y="50%" font-family="Arial, sans-serif" font-size="{font_size}" fill="#{fg}" text-anchor="middle" dominant-baseline="middle">{text}</text>
  <text x="50%" y="{footer_y}" font-family="Arial, sans-serif" font-size="14" fill="#{fg}88" text-anchor="middle" dominant-baseline="middle">AI Generated Image</text>
</svg>"##,
      w = self.width,
      h = self.height,
      bg = self.bg,
      fg = self.color,
      text = self.text,
    )
  }
}

fn side(raw: Option<&str>) -> u32 {
  raw
    .and_then(|v| leading_int(v.trim()))
    .map(|v| v.clamp(i64::from(MIN_SIDE), i64::from(MAX_SIDE)) as u32)
    .unwrap_or(DEFAULT_SIDE)
}

/// Parses the leading integer of `raw`, ignoring trailing junk ("300px" -> 300).
fn leading_int(raw: &str) -> Option<i64> {
  let (sign, digits) = match raw.strip_prefix('-') {
    Some(rest) => (-1, rest),
    None => (1, raw.strip_prefix('+').unwrap_or(raw)),
  };
  let end = digits
    .find(|c: char| !c.is_ascii_digit())
    .unwrap_or(digits.len());
  if end == 0 {
    return None;
  }
  Some(digits[..end].parse::<i64>().unwrap_or(i64::MAX) * sign)
}

fn sanitize_text(raw: &str) -> String {
  raw
    .chars()
    .take(MAX_TEXT)
    .filter(|c| !matches!(c, '<' | '>' | '&' | '"' | '\''))
    .collect()
}

fn hex_color(raw: Option<&str>, default: &str) -> String {
  let color: String = raw
    .unwrap_or(default)
    .chars()
    .filter(|c| c.is_ascii_hexdigit())
    .take(6)
    .collect();
  if color.is_empty() {
    default.to_string()
  } else {
    color
  }
}
