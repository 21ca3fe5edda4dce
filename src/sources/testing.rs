//! In-memory provider used by the manager and engine tests.

use std::{
  collections::{HashMap, HashSet},
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
  plugin::Provider,
  track::{PlaylistSummary, ProviderKind, TrackDescriptor, TrackReference},
};
use crate::common::errors::{CredentialError, SourceError};

pub(crate) struct FakeProvider {
  kind: ProviderKind,
  tracks: HashMap<String, String>,
  playlists: HashMap<String, (String, Vec<String>)>,
  broken: HashSet<String>,
  pub revoked: AtomicBool,
  pub resolved: Mutex<Vec<String>>,
  pub materialized: Mutex<Vec<String>>,
}

impl FakeProvider {
  pub fn new(kind: ProviderKind) -> Self {
    Self {
      kind,
      tracks: HashMap::new(),
      playlists: HashMap::new(),
      broken: HashSet::new(),
      revoked: AtomicBool::new(false),
      resolved: Mutex::new(Vec::new()),
      materialized: Mutex::new(Vec::new()),
    }
  }

  /// A resolvable reference with the given title.
  pub fn track(mut self, reference: &str, title: &str) -> Self {
    self.tracks.insert(reference.to_string(), title.to_string());
    self
  }

  pub fn playlist(mut self, reference: &str, title: &str, entries: &[&str]) -> Self {
    self.playlists.insert(
      reference.to_string(),
      (title.to_string(), entries.iter().map(|e| e.to_string()).collect()),
    );
    self
  }

  /// Resolves fine but fails to materialize.
  pub fn broken(mut self, title: &str) -> Self {
    self.broken.insert(title.to_string());
    self
  }

  pub fn shared(self) -> Arc<Self> {
    Arc::new(self)
  }

  fn check_credentials(&self) -> Result<(), SourceError> {
    if self.revoked.load(Ordering::SeqCst) {
      return Err(CredentialError::Refresh("invalid_grant".into()).into());
    }
    Ok(())
  }
}

pub(crate) fn descriptor(kind: ProviderKind, reference: &str, title: &str) -> TrackDescriptor {
  let mut descriptor = TrackDescriptor::new(
    TrackReference::new(reference),
    kind,
    title,
    format!("https://example.test/{}", reference),
    format!("{}.mp3", title),
  );
  descriptor.duration_secs = 60;
  descriptor
}

#[async_trait]
impl Provider for FakeProvider {
  fn kind(&self) -> ProviderKind {
    self.kind
  }

  async fn resolve_track(&self, reference: &TrackReference) -> Result<TrackDescriptor, SourceError> {
    self.check_credentials()?;
    self.resolved.lock().push(reference.to_string());
    match self.tracks.get(reference.as_str()) {
      Some(title) => Ok(descriptor(self.kind, reference.as_str(), title)),
      None => Err(SourceError::resolution(reference.as_str(), "video unavailable")),
    }
  }

  async fn resolve_playlist_summary(
    &self,
    reference: &TrackReference,
  ) -> Result<PlaylistSummary, SourceError> {
    self.check_credentials()?;
    self
      .playlists
      .get(reference.as_str())
      .map(|(title, entries)| PlaylistSummary {
        title: title.clone(),
        track_count: entries.len(),
      })
      .ok_or_else(|| SourceError::resolution(reference.as_str(), "no such playlist"))
  }

  async fn list_playlist_entries(
    &self,
    reference: &TrackReference,
  ) -> Result<Vec<TrackReference>, SourceError> {
    self.check_credentials()?;
    match self.playlists.get(reference.as_str()) {
      Some((_, entries)) if !entries.is_empty() => {
        Ok(entries.iter().map(|e| TrackReference::new(e.as_str())).collect())
      }
      _ => Err(SourceError::resolution(reference.as_str(), "empty playlist")),
    }
  }

  async fn materialize(&self, mut descriptor: TrackDescriptor) -> Result<TrackDescriptor, SourceError> {
    self.materialized.lock().push(descriptor.title.clone());
    if self.broken.contains(&descriptor.title) {
      return Err(SourceError::materialization(&descriptor.title, "HTTP Error 403"));
    }
    descriptor.local_path = Some(PathBuf::from("/cache").join(&descriptor.cache_name));
    Ok(descriptor)
  }
}
