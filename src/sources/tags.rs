use std::path::{Path, PathBuf};

use symphonia::core::{
  codecs::CODEC_TYPE_NULL,
  formats::FormatOptions,
  io::MediaSourceStream,
  meta::{MetadataOptions, MetadataRevision, StandardTagKey, StandardVisualKey},
  probe::Hint,
};
use tracing::{debug, warn};

use super::{
  cache::MediaCache,
  track::{Thumbnail, TrackDescriptor},
};
use crate::common::{errors::SourceError, types::AnyResult};

/// What the embedded tags of a cached file tell us.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EmbeddedTags {
  pub duration_secs: u64,
  pub artist: Option<String>,
  pub cover_art: Option<Vec<u8>>,
}

impl EmbeddedTags {
  fn absorb(&mut self, revision: &MetadataRevision) {
    for tag in revision.tags() {
      match tag.std_key {
        Some(StandardTagKey::Artist) => self.artist = Some(tag.value.to_string()),
        Some(StandardTagKey::AlbumArtist) if self.artist.is_none() => {
          self.artist = Some(tag.value.to_string())
        }
        _ => {}
      }
    }

    // front cover wins, otherwise the first picture
    let cover = revision
      .visuals()
      .iter()
      .find(|v| v.usage == Some(StandardVisualKey::FrontCover))
      .or_else(|| revision.visuals().first());
    if let Some(visual) = cover {
      self.cover_art = Some(visual.data.to_vec());
    }
  }
}

/// Reads an audio file for its length, artist and cover art. Blocking.
pub fn read_tags(path: &Path) -> AnyResult<EmbeddedTags> {
  let file = std::fs::File::open(path)?;
  let mut hint = Hint::new();
  if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
    hint.with_extension(&ext.to_lowercase());
  }

  let mss = MediaSourceStream::new(Box::new(file), Default::default());
  let mut probed = symphonia::default::get_probe().format(
    &hint,
    mss,
    &FormatOptions::default(),
    &MetadataOptions::default(),
  )?;

  let mut tags = EmbeddedTags::default();

  // ID3v2 and friends are read during probing, container tags afterwards
  if let Some(metadata) = probed.metadata.get() {
    if let Some(revision) = metadata.current() {
      tags.absorb(revision);
    }
  }

  let mut format = probed.format;
  if let Some(revision) = format.metadata().current() {
    tags.absorb(revision);
  }

  let track = format
    .tracks()
    .iter()
    .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
    .ok_or("no audio track found")?;

  if let (Some(n_frames), Some(rate)) = (track.codec_params.n_frames, track.codec_params.sample_rate) {
    if rate > 0 {
      tags.duration_secs = n_frames / rate as u64;
    }
  }

  Ok(tags)
}

/// Fills in duration, artist and thumbnail from the cached file at `path`.
///
/// Cover art is extracted into the image cache once per title. A remote
/// thumbnail from the provider is kept; without one the cached image is
/// used, and without that the placeholder.
pub async fn enrich(
  mut descriptor: TrackDescriptor,
  path: PathBuf,
  cache: &MediaCache,
) -> Result<TrackDescriptor, SourceError> {
  let tag_path = path.clone();
  let tags = tokio::task::spawn_blocking(move || read_tags(&tag_path))
    .await
    .map_err(|e| SourceError::materialization(&descriptor.title, e))?
    .map_err(|e| SourceError::materialization(&descriptor.title, e))?;

  if tags.duration_secs > 0 {
    descriptor.duration_secs = tags.duration_secs;
  }
  if tags.artist.is_some() {
    descriptor.artist = tags.artist;
  }

  let image_path = cache.image_path(&descriptor.title);
  let mut has_image = tokio::fs::try_exists(&image_path).await.unwrap_or(false);
  if !has_image {
    if let Some(cover) = tags.cover_art {
      match tokio::fs::write(&image_path, cover).await {
        Ok(()) => {
          debug!("Saved cover art to {}", image_path.display());
          has_image = true;
        }
        Err(e) => warn!("Could not save cover art for {}: {}", descriptor.title, e),
      }
    }
  }

  descriptor.thumbnail = match descriptor.thumbnail.take() {
    Some(Thumbnail::Remote(url)) => Some(Thumbnail::Remote(url)),
    _ if has_image => Some(Thumbnail::Cached(image_path)),
    _ => Some(Thumbnail::Placeholder(cache.placeholder().to_string())),
  };
  descriptor.local_path = Some(path);

  Ok(descriptor)
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::{
    configs::CacheConfig,
    sources::track::{ProviderKind, TrackReference},
  };

  /// One second of 8 kHz mono 16-bit silence.
  pub(crate) fn silent_wav() -> Vec<u8> {
    let rate: u32 = 8000;
    let data_len: u32 = rate * 2;
    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&rate.to_le_bytes());
    wav.extend_from_slice(&(rate * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);
    wav
  }

  fn cache_in(dir: &Path) -> MediaCache {
    MediaCache::new(&CacheConfig {
      audio_dir: dir.join("audio"),
      image_dir: dir.join("images"),
      placeholder_thumbnail: "attachment://placeholder.jpg".into(),
      wait_timeout_secs: 5,
    })
  }

  #[test]
  fn reads_length_of_plain_pcm() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    std::fs::write(&path, silent_wav()).unwrap();

    let tags = read_tags(&path).unwrap();
    assert_eq!(tags.duration_secs, 1);
    assert_eq!(tags.artist, None);
    assert_eq!(tags.cover_art, None);
  }

  #[test]
  fn garbage_is_not_audio() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.mp3");
    std::fs::write(&path, b"definitely not an mp3").unwrap();
    assert!(read_tags(&path).is_err());
  }

  #[tokio::test]
  async fn enrich_falls_back_to_the_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path());
    cache.prepare().await.unwrap();
    let path = cache.audio_path("tone.wav");
    tokio::fs::write(&path, silent_wav()).await.unwrap();

    let descriptor = TrackDescriptor::new(
      TrackReference::new("file-1"),
      ProviderKind::CloudStorage,
      "tone",
      "https://drive.google.com/file/d/file-1/view",
      "tone.wav",
    );
    let enriched = enrich(descriptor, path.clone(), &cache).await.unwrap();

    assert_eq!(enriched.duration_secs, 1);
    assert_eq!(enriched.local_path.as_deref(), Some(path.as_path()));
    assert_eq!(
      enriched.thumbnail,
      Some(Thumbnail::Placeholder("attachment://placeholder.jpg".into()))
    );
  }

  #[tokio::test]
  async fn enrich_prefers_an_already_cached_image_and_keeps_remote_ones() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path());
    cache.prepare().await.unwrap();
    let path = cache.audio_path("tone.wav");
    tokio::fs::write(&path, silent_wav()).await.unwrap();
    tokio::fs::write(cache.image_path("tone"), b"jpeg").await.unwrap();

    let descriptor = TrackDescriptor::new(
      TrackReference::new("file-1"),
      ProviderKind::CloudStorage,
      "tone",
      "",
      "tone.wav",
    );
    let enriched = enrich(descriptor.clone(), path.clone(), &cache).await.unwrap();
    assert_eq!(enriched.thumbnail, Some(Thumbnail::Cached(cache.image_path("tone"))));

    let mut remote = descriptor;
    remote.thumbnail = Some(Thumbnail::Remote("https://i.ytimg.com/vi/x/hq.jpg".into()));
    remote.duration_secs = 212;
    let enriched = enrich(remote, path, &cache).await.unwrap();
    assert_eq!(
      enriched.thumbnail,
      Some(Thumbnail::Remote("https://i.ytimg.com/vi/x/hq.jpg".into()))
    );
    // the probed length replaces the provider's estimate
    assert_eq!(enriched.duration_secs, 1);
  }
}
