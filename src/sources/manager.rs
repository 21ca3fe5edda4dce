use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{info, warn};

use super::{
  cache::MediaCache,
  classifier::{Classified, classify, cloud_file_link},
  gdrive::GDriveSource,
  plugin::BoxedProvider,
  track::{PlaylistSummary, ProviderKind, TrackDescriptor, TrackReference},
  youtube::YouTubeSource,
};
use crate::{
  common::{errors::SourceError, http::HttpClient, types::AnyResult},
  configs::Config,
};

/// One entry of a batch that could not be resolved.
#[derive(Debug)]
pub struct LoadFailure {
  pub reference: TrackReference,
  pub error: SourceError,
}

/// Everything a single user input expanded to.
#[derive(Debug, Default)]
pub struct LoadResult {
  /// Set when the input named a playlist or folder.
  pub playlist: Option<PlaylistSummary>,
  /// Resolved tracks, in provider order.
  pub tracks: Vec<TrackDescriptor>,
  /// Entries that failed; the rest of the batch is unaffected.
  pub failures: Vec<LoadFailure>,
}

/// Routes references to the provider of their kind.
pub struct SourceManager {
  cloud: Option<BoxedProvider>,
  video: Option<BoxedProvider>,
  resolve_concurrency: usize,
}

impl SourceManager {
  /// Prepares the media cache and registers every enabled provider.
  /// A provider that fails to initialise is logged and left out.
  pub async fn new(config: &Config) -> AnyResult<Self> {
    let cache = Arc::new(MediaCache::new(&config.cache));
    cache.prepare().await?;
    let http = HttpClient::new()?;

    let mut cloud: Option<BoxedProvider> = None;
    let mut video: Option<BoxedProvider> = None;

    macro_rules! register_source {
      ($enabled:expr, $slot:ident, $name:literal, $ctor:expr) => {
        if $enabled {
          match $ctor {
            Ok(src) => {
              info!("Loaded source: {}", $name);
              let provider: BoxedProvider = Arc::new(src);
              $slot = Some(provider);
            }
            Err(e) => {
              tracing::error!("{} source failed to initialize: {}", $name, e);
            }
          }
        }
      };
    }

    register_source!(
      config.sources.gdrive,
      cloud,
      "Google Drive",
      GDriveSource::new(config, http.clone(), cache.clone())
    );
    register_source!(
      config.sources.youtube,
      video,
      "YouTube",
      Ok::<_, SourceError>(YouTubeSource::new(&config.youtube, cache.clone()))
    );

    Ok(Self::with_providers(
      cloud,
      video,
      config.sources.track_resolve_concurrency,
    ))
  }

  pub fn with_providers(
    cloud: Option<BoxedProvider>,
    video: Option<BoxedProvider>,
    resolve_concurrency: usize,
  ) -> Self {
    Self {
      cloud,
      video,
      resolve_concurrency: resolve_concurrency.max(1),
    }
  }

  pub fn provider(&self, kind: ProviderKind) -> Result<&BoxedProvider, SourceError> {
    let slot = match kind {
      ProviderKind::CloudStorage => &self.cloud,
      ProviderKind::VideoPlatform => &self.video,
    };
    slot
      .as_ref()
      .ok_or_else(|| SourceError::resolution(kind.as_str(), "source is disabled"))
  }

  pub async fn resolve_track(
    &self,
    kind: ProviderKind,
    reference: &TrackReference,
  ) -> Result<TrackDescriptor, SourceError> {
    self.provider(kind)?.resolve_track(reference).await
  }

  pub async fn resolve_playlist_summary(
    &self,
    kind: ProviderKind,
    reference: &TrackReference,
  ) -> Result<PlaylistSummary, SourceError> {
    self.provider(kind)?.resolve_playlist_summary(reference).await
  }

  pub async fn list_playlist_entries(
    &self,
    kind: ProviderKind,
    reference: &TrackReference,
  ) -> Result<Vec<TrackReference>, SourceError> {
    self.provider(kind)?.list_playlist_entries(reference).await
  }

  /// Materializes with the provider the descriptor came from.
  pub async fn materialize(&self, descriptor: TrackDescriptor) -> Result<TrackDescriptor, SourceError> {
    self.provider(descriptor.kind())?.materialize(descriptor).await
  }

  /// Playlist entries as links that classify back to single tracks of the
  /// same provider. Cloud file ids become file links.
  pub async fn expand_to_links(&self, classified: &Classified) -> Result<Vec<String>, SourceError> {
    let entries = self
      .list_playlist_entries(classified.kind, &classified.reference)
      .await?;

    Ok(
      entries
        .into_iter()
        .map(|entry| match classified.kind {
          ProviderKind::CloudStorage => cloud_file_link(entry.as_str()),
          ProviderKind::VideoPlatform => entry.to_string(),
        })
        .collect(),
    )
  }

  /// Classifies raw input and resolves everything it names.
  ///
  /// A single reference that fails to resolve is an error. Inside a
  /// playlist, failing entries are collected in [`LoadResult::failures`]
  /// and the rest still load; only credential failures abort the batch.
  pub async fn load(&self, input: &str) -> Result<LoadResult, SourceError> {
    let classified = classify(input);
    let provider = self.provider(classified.kind)?.clone();

    if !classified.is_playlist {
      let track = provider.resolve_track(&classified.reference).await?;
      return Ok(LoadResult {
        playlist: None,
        tracks: vec![track],
        failures: Vec::new(),
      });
    }

    let summary = provider
      .resolve_playlist_summary(&classified.reference)
      .await?;
    let entries = provider.list_playlist_entries(&classified.reference).await?;
    info!(
      "Resolving {} entries of {} ({})",
      entries.len(),
      summary.title,
      classified.kind
    );

    let results: Vec<_> = stream::iter(entries)
      .map(|reference| {
        let provider = provider.clone();
        async move {
          let result = provider.resolve_track(&reference).await;
          (reference, result)
        }
      })
      .buffered(self.resolve_concurrency)
      .collect()
      .await;

    let mut loaded = LoadResult {
      playlist: Some(summary),
      ..Default::default()
    };
    for (reference, result) in results {
      match result {
        Ok(track) => loaded.tracks.push(track),
        Err(error) if error.is_fatal_for_provider() => return Err(error),
        Err(error) => {
          warn!("Skipping {}: {}", reference, error);
          loaded.failures.push(LoadFailure { reference, error });
        }
      }
    }

    Ok(loaded)
  }
}
