use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourcesConfig {
  #[serde(default = "enabled")]
  pub gdrive: bool,
  #[serde(default = "enabled")]
  pub youtube: bool,
  /// Parallel resolutions when a playlist is expanded.
  #[serde(default = "default_track_resolve_concurrency")]
  pub track_resolve_concurrency: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GDriveConfig {
  #[serde(default = "default_client_secrets_path")]
  pub client_secrets_path: PathBuf,
  #[serde(default = "default_token_path")]
  pub token_path: PathBuf,
  /// Seconds after a refresh before the access token is treated as stale.
  #[serde(default = "default_staleness_secs")]
  pub staleness_secs: u64,
  #[serde(default = "default_download_retries")]
  pub download_retries: u32,
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YouTubeConfig {
  #[serde(default = "default_binary")]
  pub binary: String,
  #[serde(default = "default_audio_format")]
  pub audio_format: String,
  #[serde(default = "default_search")]
  pub default_search: String,
  /// Limit on one `-J` metadata run.
  #[serde(default = "default_metadata_timeout_secs")]
  pub metadata_timeout_secs: u64,
  /// Limit on one download and conversion run.
  #[serde(default = "default_download_timeout_secs")]
  pub download_timeout_secs: u64,
}

fn enabled() -> bool {
  true
}

fn default_track_resolve_concurrency() -> usize {
  10
}

fn default_client_secrets_path() -> PathBuf {
  PathBuf::from("credentials.json")
}

fn default_token_path() -> PathBuf {
  PathBuf::from("token.json")
}

fn default_staleness_secs() -> u64 {
  3000
}

fn default_download_retries() -> u32 {
  3
}

fn default_request_timeout_secs() -> u64 {
  30
}

fn default_binary() -> String {
  "yt-dlp".to_string()
}

fn default_audio_format() -> String {
  "mp3".to_string()
}

fn default_search() -> String {
  "ytsearch".to_string()
}

fn default_metadata_timeout_secs() -> u64 {
  60
}

fn default_download_timeout_secs() -> u64 {
  900
}

impl Default for SourcesConfig {
  fn default() -> Self {
    Self {
      gdrive: enabled(),
      youtube: enabled(),
      track_resolve_concurrency: default_track_resolve_concurrency(),
    }
  }
}

impl Default for GDriveConfig {
  fn default() -> Self {
    Self {
      client_secrets_path: default_client_secrets_path(),
      token_path: default_token_path(),
      staleness_secs: default_staleness_secs(),
      download_retries: default_download_retries(),
      request_timeout_secs: default_request_timeout_secs(),
    }
  }
}

impl Default for YouTubeConfig {
  fn default() -> Self {
    Self {
      binary: default_binary(),
      audio_format: default_audio_format(),
      default_search: default_search(),
      metadata_timeout_secs: default_metadata_timeout_secs(),
      download_timeout_secs: default_download_timeout_secs(),
    }
  }
}
