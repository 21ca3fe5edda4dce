pub mod api;
pub mod token;

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, info};

use self::{
  api::{DriveApi, DriveError, DriveFile},
  token::CredentialGuard,
};
use super::{
  cache::{CacheOutcome, MediaCache},
  classifier::cloud_file_link,
  plugin::Provider,
  tags,
  track::{PlaylistSummary, ProviderKind, TrackDescriptor, TrackReference},
};
use crate::{
  common::{errors::SourceError, files::sanitize_filename},
  configs::Config,
};

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Audio files shared through a cloud drive. Folders act as playlists.
pub struct GDriveSource {
  api: DriveApi,
  cache: Arc<MediaCache>,
  download_retries: u32,
}

impl GDriveSource {
  pub fn new(
    config: &Config,
    http: reqwest::Client,
    cache: Arc<MediaCache>,
  ) -> Result<Self, SourceError> {
    let credentials = CredentialGuard::from_config(&config.gdrive, http.clone())?;
    Ok(Self::with_credentials(
      http,
      Arc::new(credentials),
      cache,
      config.gdrive.download_retries,
      Duration::from_secs(config.gdrive.request_timeout_secs),
    ))
  }

  pub fn with_credentials(
    http: reqwest::Client,
    credentials: Arc<CredentialGuard>,
    cache: Arc<MediaCache>,
    download_retries: u32,
    request_timeout: Duration,
  ) -> Self {
    Self {
      api: DriveApi::new(http, credentials, request_timeout),
      cache,
      download_retries: download_retries.max(1),
    }
  }

  /// Points the provider at another Drive v3 endpoint.
  pub fn with_api_base(mut self, base_url: impl Into<String>) -> Self {
    self.api = self.api.with_base_url(base_url);
    self
  }
}

fn map_drive_error(reference: &str, err: DriveError) -> SourceError {
  match err {
    DriveError::Credential(e) => SourceError::Credential(e),
    e if e.is_not_found() => SourceError::resolution(reference, "no such file or folder"),
    e => SourceError::resolution(reference, e),
  }
}

/// Builds the descriptor for a file before anything is downloaded. The
/// cache name keeps the extension, the title drops it.
fn descriptor_from_file(file: DriveFile) -> TrackDescriptor {
  let cache_name = sanitize_filename(&file.name);
  let title = match cache_name.rsplit_once('.') {
    Some((stem, _)) if !stem.is_empty() => stem.to_string(),
    _ => cache_name.clone(),
  };
  let webpage_url = file
    .web_view_link
    .clone()
    .unwrap_or_else(|| cloud_file_link(&file.id));

  let mut descriptor = TrackDescriptor::new(
    TrackReference::new(file.id),
    ProviderKind::CloudStorage,
    title,
    webpage_url,
    cache_name,
  );
  descriptor.uploader = file.owners.into_iter().find_map(|o| o.display_name);
  descriptor
}

/// Runs `op` up to `attempts` times while it fails transiently, backing off
/// a little longer each time.
async fn with_retries<T, F, Fut>(attempts: u32, what: &str, mut op: F) -> Result<T, DriveError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, DriveError>>,
{
  let mut attempt = 1;
  loop {
    match op().await {
      Err(e) if e.is_transient() && attempt < attempts => {
        debug!("Retrying {} after transient failure ({}/{}): {}", what, attempt, attempts, e);
        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
        attempt += 1;
      }
      other => return other,
    }
  }
}

#[async_trait]
impl Provider for GDriveSource {
  fn kind(&self) -> ProviderKind {
    ProviderKind::CloudStorage
  }

  async fn resolve_track(&self, reference: &TrackReference) -> Result<TrackDescriptor, SourceError> {
    let file = self
      .api
      .get_file(reference.as_str())
      .await
      .map_err(|e| map_drive_error(reference.as_str(), e))?;
    Ok(descriptor_from_file(file))
  }

  async fn resolve_playlist_summary(
    &self,
    reference: &TrackReference,
  ) -> Result<PlaylistSummary, SourceError> {
    let folder = self
      .api
      .get_file(reference.as_str())
      .await
      .map_err(|e| map_drive_error(reference.as_str(), e))?;
    let files = self
      .api
      .list_audio(reference.as_str())
      .await
      .map_err(|e| map_drive_error(reference.as_str(), e))?;

    Ok(PlaylistSummary {
      title: folder.name,
      track_count: files.len(),
    })
  }

  async fn list_playlist_entries(
    &self,
    reference: &TrackReference,
  ) -> Result<Vec<TrackReference>, SourceError> {
    let files = self
      .api
      .list_audio(reference.as_str())
      .await
      .map_err(|e| map_drive_error(reference.as_str(), e))?;

    if files.is_empty() {
      return Err(SourceError::resolution(
        reference.as_str(),
        "folder contains no audio files",
      ));
    }
    Ok(files.into_iter().map(|f| TrackReference::new(f.id)).collect())
  }

  async fn materialize(&self, descriptor: TrackDescriptor) -> Result<TrackDescriptor, SourceError> {
    // surface credential failures as such instead of as a failed download
    self.api.credentials().access_token().await?;

    let file_id = descriptor.reference().as_str().to_string();
    let outcome = self
      .cache
      .ensure(&descriptor.cache_name, |staging| async move {
        let bytes =
          with_retries(self.download_retries, &file_id, || self.api.download(&file_id, &staging)).await?;
        debug!("Fetched {} bytes of {}", bytes, file_id);
        Ok::<_, DriveError>(())
      })
      .await
      .map_err(|e| SourceError::materialization(&descriptor.title, e))?;

    if let CacheOutcome::Fetched(path) = &outcome {
      info!("Downloaded {} to {}", descriptor.title, path.display());
    }

    tags::enrich(descriptor, outcome.into_path(), &self.cache).await
  }
}

#[cfg(test)]
mod tests {
  use std::{
    path::Path,
    sync::atomic::{AtomicU32, Ordering},
  };

  use reqwest::StatusCode;
  use serde_json::json;
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
  };

  use super::{api::Owner, token::tests::guard, *};
  use crate::{configs::CacheConfig, sources::tags::tests::silent_wav};

  async fn drive_source(
    server: &MockServer,
    dir: &Path,
    credentials: Arc<CredentialGuard>,
    timeout: Duration,
  ) -> GDriveSource {
    let cache = MediaCache::new(&CacheConfig {
      audio_dir: dir.join("audio"),
      image_dir: dir.join("images"),
      placeholder_thumbnail: "placeholder".into(),
      wait_timeout_secs: 5,
    });
    cache.prepare().await.unwrap();
    GDriveSource::with_credentials(reqwest::Client::new(), credentials, Arc::new(cache), 3, timeout)
      .with_api_base(server.uri())
  }

  fn file(name: &str, link: Option<&str>) -> DriveFile {
    DriveFile {
      id: "1AbC".into(),
      name: name.into(),
      owners: vec![Owner {
        display_name: Some("Uploader".into()),
      }],
      created_time: None,
      web_view_link: link.map(str::to_string),
    }
  }

  #[test]
  fn descriptor_uses_the_sanitized_name() {
    let descriptor = descriptor_from_file(file(
      "Artist - Song: Live?.mp3",
      Some("https://drive.google.com/file/d/1AbC/view?usp=drivesdk"),
    ));

    assert_eq!(descriptor.title, "Artist - Song Live");
    assert_eq!(descriptor.cache_name, "Artist - Song Live.mp3");
    assert_eq!(descriptor.kind(), ProviderKind::CloudStorage);
    assert_eq!(descriptor.reference().as_str(), "1AbC");
    assert_eq!(descriptor.uploader.as_deref(), Some("Uploader"));
    assert_eq!(descriptor.artist, None);
    assert!(descriptor.is_live());
  }

  #[test]
  fn descriptor_without_link_or_extension() {
    let descriptor = descriptor_from_file(file("untagged", None));
    assert_eq!(descriptor.title, "untagged");
    assert_eq!(descriptor.cache_name, "untagged");
    assert_eq!(descriptor.webpage_url, "https://drive.google.com/file/d/1AbC/view");
  }

  #[tokio::test(start_paused = true)]
  async fn transient_failures_are_retried_silently() {
    let calls = AtomicU32::new(0);
    let result = with_retries(3, "1AbC", || async {
      match calls.fetch_add(1, Ordering::SeqCst) {
        0 | 1 => Err(DriveError::Status {
          status: StatusCode::BAD_GATEWAY,
          body: String::new(),
        }),
        _ => Ok(42u64),
      }
    })
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn retries_stop_at_the_limit_and_skip_permanent_errors() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = with_retries(3, "1AbC", || async {
      calls.fetch_add(1, Ordering::SeqCst);
      Err(DriveError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: String::new(),
      })
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let calls = AtomicU32::new(0);
    let result: Result<(), _> = with_retries(3, "1AbC", || async {
      calls.fetch_add(1, Ordering::SeqCst);
      Err(DriveError::Status {
        status: StatusCode::FORBIDDEN,
        body: String::new(),
      })
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn credential_failures_are_not_downgraded() {
    let err = map_drive_error(
      "1AbC",
      DriveError::Credential(crate::common::errors::CredentialError::Refresh("revoked".into())),
    );
    assert!(err.is_fatal_for_provider());

    let err = map_drive_error(
      "1AbC",
      DriveError::Status {
        status: StatusCode::NOT_FOUND,
        body: String::new(),
      },
    );
    assert!(matches!(err, SourceError::Resolution { .. }));
  }

  #[tokio::test]
  async fn materialize_downloads_once_and_reads_the_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/files/1AbC"))
      .and(query_param("alt", "media"))
      .and(header("authorization", "Bearer access-1"))
      .respond_with(ResponseTemplate::new(200).set_body_bytes(silent_wav()))
      .expect(1)
      .mount(&server)
      .await;

    let dir = tempfile::tempdir().unwrap();
    let (credentials, refresher, store) = guard(Duration::from_secs(3000));
    let source = drive_source(&server, dir.path(), credentials, Duration::from_secs(5)).await;
    let descriptor = descriptor_from_file(file("Quiet.wav", None));

    let first = source.materialize(descriptor.clone()).await.unwrap();
    let second = source.materialize(descriptor).await.unwrap();

    let local = first.local_path.clone().unwrap();
    assert_eq!(local, dir.path().join("audio/Quiet.wav"));
    assert_eq!(second.local_path, Some(local));
    assert_eq!(first.duration_secs, 1);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.writes.lock().len(), 1);
    server.verify().await;
  }

  #[tokio::test]
  async fn credential_failure_surfaces_before_any_download() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (credentials, refresher, _) = guard(Duration::from_secs(3000));
    refresher.fail.store(true, Ordering::SeqCst);
    let source = drive_source(&server, dir.path(), credentials, Duration::from_secs(5)).await;

    let err = source
      .materialize(descriptor_from_file(file("Quiet.wav", None)))
      .await
      .unwrap_err();

    assert!(err.is_fatal_for_provider());
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(!dir.path().join("audio/Quiet.wav").exists());
  }

  #[tokio::test]
  async fn rejected_token_is_refreshed_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/files/1AbC"))
      .and(header("authorization", "Bearer access-1"))
      .respond_with(ResponseTemplate::new(401))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/files/1AbC"))
      .and(header("authorization", "Bearer access-2"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": "1AbC",
        "name": "Song.mp3",
        "owners": [{"displayName": "Someone"}]
      })))
      .expect(1)
      .mount(&server)
      .await;

    let dir = tempfile::tempdir().unwrap();
    let (credentials, refresher, _) = guard(Duration::from_secs(3000));
    let source = drive_source(&server, dir.path(), credentials, Duration::from_secs(5)).await;

    let track = source
      .resolve_track(&TrackReference::new("1AbC"))
      .await
      .unwrap();

    assert_eq!(track.title, "Song");
    assert_eq!(track.uploader.as_deref(), Some("Someone"));
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    server.verify().await;
  }

  #[tokio::test]
  async fn persistent_rejection_is_retried_only_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/files/1AbC"))
      .respond_with(ResponseTemplate::new(401))
      .expect(2)
      .mount(&server)
      .await;

    let dir = tempfile::tempdir().unwrap();
    let (credentials, refresher, _) = guard(Duration::from_secs(3000));
    let source = drive_source(&server, dir.path(), credentials, Duration::from_secs(5)).await;

    let err = source
      .resolve_track(&TrackReference::new("1AbC"))
      .await
      .unwrap_err();

    assert!(matches!(err, SourceError::Resolution { .. }));
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    server.verify().await;
  }

  #[tokio::test]
  async fn folder_listing_follows_page_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/files"))
      .and(query_param("pageToken", "p2"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "files": [{"id": "c", "name": "c.mp3"}]
      })))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/files"))
      .and(query_param("q", "mimeType contains 'audio' and 'F1' in parents"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "nextPageToken": "p2",
        "files": [{"id": "a", "name": "a.mp3"}, {"id": "b", "name": "b.flac"}]
      })))
      .expect(1)
      .mount(&server)
      .await;

    let dir = tempfile::tempdir().unwrap();
    let (credentials, _, _) = guard(Duration::from_secs(3000));
    let source = drive_source(&server, dir.path(), credentials, Duration::from_secs(5)).await;

    let entries = source
      .list_playlist_entries(&TrackReference::new("F1"))
      .await
      .unwrap();

    let ids: Vec<&str> = entries.iter().map(TrackReference::as_str).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    server.verify().await;
  }

  #[tokio::test]
  async fn stalled_downloads_give_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/files/1AbC"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_bytes(silent_wav())
          .set_delay(Duration::from_secs(3)),
      )
      .mount(&server)
      .await;

    let dir = tempfile::tempdir().unwrap();
    let (credentials, _, _) = guard(Duration::from_secs(3000));
    let source = drive_source(&server, dir.path(), credentials, Duration::from_millis(300)).await;

    let err = source
      .api
      .download("1AbC", &dir.path().join("partial"))
      .await
      .unwrap_err();

    assert!(matches!(err, DriveError::Stalled(_)));
    assert!(err.is_transient());
  }
}
