use std::{ffi::OsString, path::Path, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use super::{
  cache::{CacheOutcome, MediaCache},
  plugin::Provider,
  tags,
  track::{PlaylistSummary, ProviderKind, Thumbnail, TrackDescriptor, TrackReference},
};
use crate::{
  common::{errors::SourceError, files::sanitize_filename},
  configs::YouTubeConfig,
};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Video platform access through an external `yt-dlp` binary.
pub struct YouTubeSource {
  binary: String,
  audio_format: String,
  default_search: String,
  metadata_timeout: Duration,
  download_timeout: Duration,
  cache: Arc<MediaCache>,
}

impl YouTubeSource {
  pub fn new(config: &YouTubeConfig, cache: Arc<MediaCache>) -> Self {
    Self {
      binary: config.binary.clone(),
      audio_format: config.audio_format.clone(),
      default_search: config.default_search.clone(),
      metadata_timeout: Duration::from_secs(config.metadata_timeout_secs),
      download_timeout: Duration::from_secs(config.download_timeout_secs),
      cache,
    }
  }

  /// Runs the binary and returns its stdout. The last stderr line becomes
  /// the error on a non-zero exit. A run past `limit` is killed.
  async fn run<I, S>(&self, args: I, limit: Duration) -> Result<Vec<u8>, String>
  where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
  {
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    debug!("Running {} {:?}", self.binary, args);

    let child = Command::new(&self.binary)
      .args(&args)
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output();
    let output = tokio::time::timeout(limit, child)
      .await
      .map_err(|_| format!("{} timed out after {:?}", self.binary, limit))?
      .map_err(|e| format!("could not run {}: {}", self.binary, e))?;

    if output.status.success() {
      return Ok(output.stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let reason = stderr
      .lines()
      .rev()
      .find(|l| !l.trim().is_empty())
      .unwrap_or("no output")
      .trim()
      .to_string();
    Err(format!("{} exited with {}: {}", self.binary, output.status, reason))
  }

  async fn dump_json(&self, reference: &TrackReference, flat: bool) -> Result<Value, SourceError> {
    let mut args = vec!["-J", "--no-warnings", "--default-search", self.default_search.as_str()];
    args.push(if flat { "--flat-playlist" } else { "--no-playlist" });
    args.push("--");
    args.push(reference.as_str());

    let stdout = self
      .run(args, self.metadata_timeout)
      .await
      .map_err(|e| SourceError::resolution(reference.as_str(), e))?;
    serde_json::from_slice(&stdout).map_err(|e| SourceError::resolution(reference.as_str(), e))
  }

  async fn download(&self, url: &str, staging: &Path) -> Result<(), String> {
    // yt-dlp picks the extension itself; convert next to the staging file
    // and move the result into place
    let mut template = staging.as_os_str().to_owned();
    template.push(".%(ext)s");
    let mut converted = staging.as_os_str().to_owned();
    converted.push(".");
    converted.push(&self.audio_format);

    let args: Vec<OsString> = vec![
      "-f".into(),
      "bestaudio/best".into(),
      "-x".into(),
      "--audio-format".into(),
      self.audio_format.clone().into(),
      "--no-playlist".into(),
      "--no-warnings".into(),
      "--quiet".into(),
      "-o".into(),
      template,
      "--".into(),
      url.into(),
    ];
    self.run(args, self.download_timeout).await?;

    tokio::fs::rename(&converted, staging)
      .await
      .map_err(|e| format!("converted file missing: {}", e))
  }
}

/// The info dict itself, or the first non-null entry of a search or
/// playlist result.
fn first_entry(info: &Value) -> Option<&Value> {
  match info.get("entries") {
    Some(Value::Array(entries)) => entries.iter().find(|e| e.is_object()),
    Some(_) => None,
    None => info.is_object().then_some(info),
  }
}

fn str_field<'a>(info: &'a Value, key: &str) -> Option<&'a str> {
  info.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn descriptor_from_info(
  reference: &TrackReference,
  info: &Value,
  audio_format: &str,
) -> Result<TrackDescriptor, SourceError> {
  let raw_title =
    str_field(info, "title").ok_or_else(|| SourceError::resolution(reference.as_str(), "no title"))?;
  let title = sanitize_filename(raw_title);
  let cache_name = format!("{}.{}", title, audio_format);

  let webpage_url = str_field(info, "webpage_url")
    .map(str::to_string)
    .or_else(|| str_field(info, "id").map(|id| format!("{}{}", WATCH_URL, id)))
    .ok_or_else(|| SourceError::resolution(reference.as_str(), "no page url"))?;

  let mut descriptor = TrackDescriptor::new(
    reference.clone(),
    ProviderKind::VideoPlatform,
    title,
    webpage_url,
    cache_name,
  );

  let is_live = info.get("is_live").and_then(Value::as_bool).unwrap_or(false);
  descriptor.duration_secs = match info.get("duration").and_then(Value::as_f64) {
    Some(secs) if !is_live && secs > 0.0 => secs as u64,
    _ => 0,
  };
  descriptor.uploader = str_field(info, "uploader").map(str::to_string);
  descriptor.artist = str_field(info, "artist").map(str::to_string);
  descriptor.thumbnail = str_field(info, "thumbnail").map(|t| Thumbnail::Remote(t.to_string()));

  Ok(descriptor)
}

fn playlist_summary(reference: &TrackReference, info: &Value) -> Result<PlaylistSummary, SourceError> {
  let entries = info
    .get("entries")
    .and_then(Value::as_array)
    .ok_or_else(|| SourceError::resolution(reference.as_str(), "not a playlist"))?;

  let title = str_field(info, "title")
    .or_else(|| str_field(info, "id"))
    .unwrap_or(reference.as_str())
    .to_string();

  Ok(PlaylistSummary {
    title,
    track_count: entries.len(),
  })
}

fn playlist_entries(info: &Value) -> Vec<TrackReference> {
  let Some(entries) = info.get("entries").and_then(Value::as_array) else {
    return Vec::new();
  };

  entries
    .iter()
    .filter_map(|entry| {
      str_field(entry, "url")
        .map(str::to_string)
        .or_else(|| str_field(entry, "id").map(|id| format!("{}{}", WATCH_URL, id)))
    })
    .map(TrackReference::new)
    .collect()
}

#[async_trait]
impl Provider for YouTubeSource {
  fn kind(&self) -> ProviderKind {
    ProviderKind::VideoPlatform
  }

  async fn resolve_track(&self, reference: &TrackReference) -> Result<TrackDescriptor, SourceError> {
    let info = self.dump_json(reference, false).await?;
    let entry = first_entry(&info)
      .ok_or_else(|| SourceError::resolution(reference.as_str(), "no matches found"))?;
    descriptor_from_info(reference, entry, &self.audio_format)
  }

  async fn resolve_playlist_summary(
    &self,
    reference: &TrackReference,
  ) -> Result<PlaylistSummary, SourceError> {
    let info = self.dump_json(reference, true).await?;
    playlist_summary(reference, &info)
  }

  async fn list_playlist_entries(
    &self,
    reference: &TrackReference,
  ) -> Result<Vec<TrackReference>, SourceError> {
    let info = self.dump_json(reference, true).await?;
    let entries = playlist_entries(&info);
    if entries.is_empty() {
      return Err(SourceError::resolution(reference.as_str(), "playlist is empty"));
    }
    Ok(entries)
  }

  async fn materialize(&self, descriptor: TrackDescriptor) -> Result<TrackDescriptor, SourceError> {
    info!("Started downloading {} from {}", descriptor.title, descriptor.webpage_url);

    let url = descriptor.webpage_url.clone();
    let outcome = self
      .cache
      .ensure(&descriptor.cache_name, |staging| async move {
        self.download(&url, &staging).await
      })
      .await
      .map_err(|e| SourceError::materialization(&descriptor.title, e))?;

    if let CacheOutcome::Fetched(_) = &outcome {
      info!("Downloaded {}", descriptor.title);
    }

    tags::enrich(descriptor, outcome.into_path(), &self.cache).await
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn reference(s: &str) -> TrackReference {
    TrackReference::new(s)
  }

  #[test]
  fn search_results_use_the_first_playable_entry() {
    let info = json!({
      "_type": "playlist",
      "entries": [
        null,
        {
          "id": "dQw4w9WgXcQ",
          "title": "Never Gonna Give You Up",
          "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
          "duration": 212.0,
          "uploader": "Rick Astley",
          "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg"
        }
      ]
    });

    let entry = first_entry(&info).unwrap();
    let descriptor = descriptor_from_info(&reference("never gonna"), entry, "mp3").unwrap();

    assert_eq!(descriptor.title, "Never Gonna Give You Up");
    assert_eq!(descriptor.cache_name, "Never Gonna Give You Up.mp3");
    assert_eq!(descriptor.duration_secs, 212);
    assert_eq!(descriptor.formatted_duration(), "03:32");
    assert_eq!(descriptor.uploader.as_deref(), Some("Rick Astley"));
    assert_eq!(descriptor.reference().as_str(), "never gonna");
    assert_eq!(descriptor.kind(), ProviderKind::VideoPlatform);
    assert!(matches!(descriptor.thumbnail, Some(Thumbnail::Remote(_))));
  }

  #[test]
  fn single_videos_are_their_own_entry() {
    let info = json!({"id": "abc", "title": "A/B: test", "duration": 10});
    let entry = first_entry(&info).unwrap();
    let descriptor = descriptor_from_info(&reference("https://youtu.be/abc"), entry, "mp3").unwrap();

    assert_eq!(descriptor.title, "AB test");
    assert_eq!(descriptor.webpage_url, "https://www.youtube.com/watch?v=abc");
    assert_eq!(descriptor.duration_secs, 10);
  }

  #[test]
  fn empty_searches_find_nothing() {
    assert!(first_entry(&json!({"entries": []})).is_none());
    assert!(first_entry(&json!({"entries": [null, null]})).is_none());
  }

  #[test]
  fn live_streams_have_no_length() {
    let info = json!({"id": "live1", "title": "Radio", "duration": 3600, "is_live": true});
    let descriptor = descriptor_from_info(&reference("radio"), &info, "mp3").unwrap();
    assert!(descriptor.is_live());
    assert_eq!(descriptor.formatted_duration(), "LIVE");
  }

  #[test]
  fn flat_playlists_list_urls_in_order() {
    let info = json!({
      "title": "Road trip",
      "entries": [
        {"id": "a1", "url": "https://www.youtube.com/watch?v=a1"},
        {"id": "b2"},
        {"title": "private video"}
      ]
    });

    let summary = playlist_summary(&reference("PL1"), &info).unwrap();
    assert_eq!(summary.title, "Road trip");
    assert_eq!(summary.track_count, 3);

    let entries: Vec<_> = playlist_entries(&info)
      .into_iter()
      .map(|r| r.as_str().to_string())
      .collect();
    assert_eq!(
      entries,
      vec![
        "https://www.youtube.com/watch?v=a1",
        "https://www.youtube.com/watch?v=b2"
      ]
    );
  }

  #[test]
  fn a_single_video_is_not_a_playlist() {
    let info = json!({"id": "abc", "title": "Song"});
    assert!(matches!(
      playlist_summary(&reference("abc"), &info),
      Err(SourceError::Resolution { .. })
    ));
    assert!(playlist_entries(&info).is_empty());
  }

  #[tokio::test]
  async fn a_missing_binary_is_a_resolution_error() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(MediaCache::new(&crate::configs::CacheConfig {
      audio_dir: dir.path().join("audio"),
      image_dir: dir.path().join("images"),
      ..Default::default()
    }));
    let source = YouTubeSource::new(
      &YouTubeConfig {
        binary: dir.path().join("no-such-yt-dlp").display().to_string(),
        ..Default::default()
      },
      cache,
    );

    let err = source.resolve_track(&reference("anything")).await.unwrap_err();
    assert!(matches!(err, SourceError::Resolution { .. }));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn hung_processes_are_killed_at_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(MediaCache::new(&crate::configs::CacheConfig {
      audio_dir: dir.path().join("audio"),
      image_dir: dir.path().join("images"),
      ..Default::default()
    }));
    let source = YouTubeSource::new(
      &YouTubeConfig {
        binary: "sleep".into(),
        ..Default::default()
      },
      cache,
    );

    let started = std::time::Instant::now();
    let err = source
      .run(["5"], Duration::from_millis(200))
      .await
      .unwrap_err();

    assert!(err.contains("timed out"), "{}", err);
    assert!(started.elapsed() < Duration::from_secs(4));
  }
}
