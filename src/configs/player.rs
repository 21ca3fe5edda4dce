use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
  /// How long the engine waits on an empty queue before falling back to
  /// autoplay or tearing the session down.
  #[serde(default = "default_dequeue_timeout_secs")]
  pub dequeue_timeout_secs: u64,
  #[serde(default = "default_volume")]
  pub default_volume: f32,
  #[serde(default = "default_autoplay")]
  pub autoplay: bool,
  #[serde(default = "default_autoplay_file")]
  pub autoplay_file: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
  #[serde(default = "default_audio_dir")]
  pub audio_dir: PathBuf,
  #[serde(default = "default_image_dir")]
  pub image_dir: PathBuf,
  /// Thumbnail reference used when a track has no cover art at all.
  #[serde(default = "default_placeholder_thumbnail")]
  pub placeholder_thumbnail: String,
  /// Upper bound on waiting for another task that is writing the same file.
  #[serde(default = "default_wait_timeout_secs")]
  pub wait_timeout_secs: u64,
}

fn default_dequeue_timeout_secs() -> u64 {
  5
}

fn default_volume() -> f32 {
  0.5
}

fn default_autoplay() -> bool {
  true
}

fn default_autoplay_file() -> PathBuf {
  PathBuf::from("autoplaylist.txt")
}

fn default_audio_dir() -> PathBuf {
  PathBuf::from("audio_cache")
}

fn default_image_dir() -> PathBuf {
  PathBuf::from("image_cache")
}

fn default_placeholder_thumbnail() -> String {
  "attachment://placeholder.jpg".to_string()
}

fn default_wait_timeout_secs() -> u64 {
  600
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      dequeue_timeout_secs: default_dequeue_timeout_secs(),
      default_volume: default_volume(),
      autoplay: default_autoplay(),
      autoplay_file: default_autoplay_file(),
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      audio_dir: default_audio_dir(),
      image_dir: default_image_dir(),
      placeholder_thumbnail: default_placeholder_thumbnail(),
      wait_timeout_secs: default_wait_timeout_secs(),
    }
  }
}
