use std::sync::LazyLock;

use regex::Regex;

use super::track::{ProviderKind, TrackReference};

static FOLDER_LINK: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^https://drive\.google\.com/(?:drive/folders/|open\?id=|drive/u/\d/folders/)([0-9A-Za-z_-]+)",
  )
  .unwrap()
});

static FILE_LINK: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^https://drive\.google\.com/file/d/([0-9A-Za-z_-]+)").unwrap());

static WATCH_WITH_LIST: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"watch\?v=.+&(list=[^&]+)").unwrap());

const PLAYLIST_PREFIX: &str = "https://www.youtube.com/playlist?";

/// Outcome of classifying raw user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
  pub reference: TrackReference,
  pub kind: ProviderKind,
  pub is_playlist: bool,
}

/// Maps raw input to a provider reference. Never fails: anything that is
/// not a cloud-storage link is handed to the video platform, which also
/// treats free text as a search.
pub fn classify(input: &str) -> Classified {
  if let Some(id) = FOLDER_LINK.captures(input).and_then(|c| c.get(1)) {
    return Classified {
      reference: TrackReference::new(id.as_str()),
      kind: ProviderKind::CloudStorage,
      is_playlist: true,
    };
  }

  if let Some(id) = FILE_LINK.captures(input).and_then(|c| c.get(1)) {
    return Classified {
      reference: TrackReference::new(id.as_str()),
      kind: ProviderKind::CloudStorage,
      is_playlist: false,
    };
  }

  let reference = match WATCH_WITH_LIST.captures(input).and_then(|c| c.get(1)) {
    Some(list) => format!("{}{}", PLAYLIST_PREFIX, list.as_str()),
    None => input.to_string(),
  };
  let is_playlist = reference.contains("www.youtube.com/playlist");

  Classified {
    reference: TrackReference::new(reference),
    kind: ProviderKind::VideoPlatform,
    is_playlist,
  }
}

/// Canonical single-file link for a cloud-storage file id, so listed folder
/// entries classify back to single cloud files.
pub fn cloud_file_link(file_id: &str) -> String {
  format!("https://drive.google.com/file/d/{}/view", file_id)
}
