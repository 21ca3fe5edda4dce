use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{
  duration::format_duration,
  types::{ChannelId, UserId},
};

/// The back ends a reference can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderKind {
  CloudStorage,
  VideoPlatform,
}

impl ProviderKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::CloudStorage => "gdrive",
      Self::VideoPlatform => "youtube",
    }
  }
}

impl fmt::Display for ProviderKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Opaque identifier of one track or container within a provider: a URL,
/// a file id or free search text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackReference(String);

impl TrackReference {
  pub fn new(reference: impl Into<String>) -> Self {
    Self(reference.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for TrackReference {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

impl From<String> for TrackReference {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl fmt::Display for TrackReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Thumbnail {
  /// Hosted by the provider.
  Remote(String),
  /// Cover art extracted into the image cache.
  Cached(PathBuf),
  /// Fixed fallback when nothing else exists.
  Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
  pub title: String,
  pub track_count: usize,
}

/// Normalised metadata of one track.
///
/// `reference` and `kind` are fixed at resolve time; everything else may be
/// filled in or corrected when the track is materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
  reference: TrackReference,
  kind: ProviderKind,
  pub title: String,
  pub artist: Option<String>,
  pub uploader: Option<String>,
  pub webpage_url: String,
  /// Length in whole seconds, `0` for live streams or unknown length.
  pub duration_secs: u64,
  pub thumbnail: Option<Thumbnail>,
  /// Sanitized file name inside the audio cache.
  pub cache_name: String,
  /// Set once the cache file exists.
  pub local_path: Option<PathBuf>,
  pub requester: Option<UserId>,
  pub channel: Option<ChannelId>,
  pub volume: f32,
}

impl TrackDescriptor {
  pub fn new(
    reference: TrackReference,
    kind: ProviderKind,
    title: impl Into<String>,
    webpage_url: impl Into<String>,
    cache_name: impl Into<String>,
  ) -> Self {
    Self {
      reference,
      kind,
      title: title.into(),
      artist: None,
      uploader: None,
      webpage_url: webpage_url.into(),
      duration_secs: 0,
      thumbnail: None,
      cache_name: cache_name.into(),
      local_path: None,
      requester: None,
      channel: None,
      volume: 1.0,
    }
  }

  pub fn reference(&self) -> &TrackReference {
    &self.reference
  }

  pub fn kind(&self) -> ProviderKind {
    self.kind
  }

  pub fn is_live(&self) -> bool {
    self.duration_secs == 0
  }

  pub fn formatted_duration(&self) -> String {
    format_duration(self.duration_secs)
  }
}
