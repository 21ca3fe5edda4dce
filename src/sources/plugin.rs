use std::sync::Arc;

use async_trait::async_trait;

use super::track::{PlaylistSummary, ProviderKind, TrackDescriptor, TrackReference};
use crate::common::errors::SourceError;

/// Capability set every back end implements.
///
/// Each provider (cloud storage, video platform) resolves references of its
/// own [`ProviderKind`] into descriptors and makes them playable from the
/// local media cache.
#[async_trait]
pub trait Provider: Send + Sync {
  fn kind(&self) -> ProviderKind;

  /// Resolve one reference into track metadata.
  ///
  /// Fails with [`SourceError::Resolution`] when the reference does not
  /// exist or cannot be played.
  async fn resolve_track(&self, reference: &TrackReference) -> Result<TrackDescriptor, SourceError>;

  /// Title and size of a playlist or folder.
  async fn resolve_playlist_summary(
    &self,
    reference: &TrackReference,
  ) -> Result<PlaylistSummary, SourceError>;

  /// References of the tracks inside a playlist, in provider order.
  /// An empty container is an error.
  async fn list_playlist_entries(
    &self,
    reference: &TrackReference,
  ) -> Result<Vec<TrackReference>, SourceError>;

  /// Make sure a local cache file exists and enrich the descriptor from
  /// it. A cache hit skips the fetch entirely.
  async fn materialize(&self, descriptor: TrackDescriptor) -> Result<TrackDescriptor, SourceError>;
}

pub type BoxedProvider = Arc<dyn Provider>;
