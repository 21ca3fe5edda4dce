use std::path::Path;

use tracing::warn;

const MAX_FILENAME_BYTES: usize = 255;
const RESERVED_NAMES: &[&str] = &[
  "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
  "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Makes a title safe to use as a cache file name on every platform.
///
/// Path separators, characters reserved on Windows and control characters
/// are removed, trailing dots and spaces are trimmed and the result is cut
/// to 255 bytes on a char boundary.
pub fn sanitize_filename(name: &str) -> String {
  let mut cleaned: String = name
    .chars()
    .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | '?' | '*' | ':' | '|' | '"' | '<' | '>'))
    .collect();

  let trimmed_len = cleaned.trim_end_matches(['.', ' ']).len();
  cleaned.truncate(trimmed_len);
  let cleaned = cleaned.trim_start().to_string();

  let stem = cleaned.split('.').next().unwrap_or_default();
  let mut cleaned = if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
    format!("{}_", cleaned)
  } else {
    cleaned
  };

  if cleaned.len() > MAX_FILENAME_BYTES {
    let mut cut = MAX_FILENAME_BYTES;
    while !cleaned.is_char_boundary(cut) {
      cut -= 1;
    }
    cleaned.truncate(cut);
  }

  if cleaned.is_empty() {
    "untitled".to_string()
  } else {
    cleaned
  }
}

/// Reads a line-oriented reference list. Blank lines and lines starting
/// with `comment_char` are skipped; a missing or unreadable file yields an
/// empty list.
pub async fn load_lines(path: &Path, comment_char: char) -> Vec<String> {
  match tokio::fs::read_to_string(path).await {
    Ok(content) => parse_lines(&content, comment_char),
    Err(e) => {
      warn!("Error loading {}: {}", path.display(), e);
      Vec::new()
    }
  }
}

fn parse_lines(content: &str, comment_char: char) -> Vec<String> {
  content
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with(comment_char))
    .map(str::to_string)
    .collect()
}
