use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};

use crate::{common::errors::CredentialError, configs::GDriveConfig};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The persisted user credential, as written to `token.json`.
///
/// Unknown fields (scopes, id tokens) are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenBlob {
  #[serde(default)]
  pub access_token: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub refresh_token: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expires_in: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub token_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expires_at: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl TokenBlob {
  pub fn load(path: &Path) -> Result<Self, CredentialError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CredentialError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CredentialError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  fn stamp_expiry(&mut self) {
    let Some(expires_in) = self.expires_in else {
      return;
    };
    let at = OffsetDateTime::now_utc() + time::Duration::seconds(expires_in as i64);
    self.expires_at = at.format(&Rfc3339).ok();
  }
}

/// OAuth client registration, as downloaded from the cloud console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
  pub client_id: String,
  pub client_secret: String,
  #[serde(default = "default_token_uri")]
  pub token_uri: String,
}

fn default_token_uri() -> String {
  DEFAULT_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SecretsFile {
  Installed { installed: ClientSecrets },
  Web { web: ClientSecrets },
  Flat(ClientSecrets),
}

impl ClientSecrets {
  /// Accepts the console's `installed` and `web` layouts as well as a flat
  /// object.
  pub fn parse(path: &Path, raw: &str) -> Result<Self, CredentialError> {
    let file: SecretsFile = serde_json::from_str(raw).map_err(|source| CredentialError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(match file {
      SecretsFile::Installed { installed } => installed,
      SecretsFile::Web { web } => web,
      SecretsFile::Flat(secrets) => secrets,
    })
  }

  pub fn load(path: &Path) -> Result<Self, CredentialError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CredentialError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(path, &raw)
  }
}

/// Performs the refresh round-trip against the authorization server.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
  async fn refresh(&self, refresh_token: &str) -> Result<TokenBlob, CredentialError>;
}

/// Writes the refreshed credential to stable storage.
#[async_trait]
pub trait TokenStore: Send + Sync {
  async fn persist(&self, token: &TokenBlob) -> Result<(), CredentialError>;
}

pub struct OAuthRefresher {
  client: reqwest::Client,
  secrets: ClientSecrets,
  timeout: Duration,
}

impl OAuthRefresher {
  pub fn new(client: reqwest::Client, secrets: ClientSecrets, timeout: Duration) -> Self {
    Self {
      client,
      secrets,
      timeout,
    }
  }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
  async fn refresh(&self, refresh_token: &str) -> Result<TokenBlob, CredentialError> {
    let params = [
      ("client_id", self.secrets.client_id.as_str()),
      ("client_secret", self.secrets.client_secret.as_str()),
      ("refresh_token", refresh_token),
      ("grant_type", "refresh_token"),
    ];

    let resp = self
      .client
      .post(&self.secrets.token_uri)
      .form(&params)
      .timeout(self.timeout)
      .send()
      .await
      .map_err(|e| CredentialError::Refresh(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(CredentialError::Refresh(format!("{}: {}", status, body)));
    }

    resp
      .json::<TokenBlob>()
      .await
      .map_err(|e| CredentialError::Refresh(e.to_string()))
  }
}

/// Stores the credential as JSON, replacing the file atomically.
pub struct FileTokenStore {
  path: PathBuf,
}

impl FileTokenStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

#[async_trait]
impl TokenStore for FileTokenStore {
  async fn persist(&self, token: &TokenBlob) -> Result<(), CredentialError> {
    let persist_err = |source| CredentialError::Persist {
      path: self.path.clone(),
      source,
    };
    let json = serde_json::to_vec_pretty(token)
      .map_err(|e| persist_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let mut tmp = self.path.clone().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, json).await.map_err(persist_err)?;
    tokio::fs::rename(&tmp, &self.path).await.map_err(persist_err)
  }
}

struct CredentialState {
  token: TokenBlob,
  last_refresh: Option<Instant>,
}

impl CredentialState {
  fn is_fresh(&self, staleness: Duration) -> bool {
    self
      .last_refresh
      .is_some_and(|at| at.elapsed() < staleness && !self.token.access_token.is_empty())
  }
}

/// Staleness-gated access token for the cloud-storage API.
///
/// Owned by the provider and shared by reference. The state lock is held
/// across the refresh round-trip, so callers that observe a stale token
/// concurrently wait for one refresh instead of racing on the token file.
pub struct CredentialGuard {
  state: Mutex<CredentialState>,
  refresh_secret: String,
  staleness: Duration,
  refresher: Arc<dyn TokenRefresher>,
  store: Arc<dyn TokenStore>,
}

impl CredentialGuard {
  pub fn new(
    token: TokenBlob,
    staleness: Duration,
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn TokenStore>,
  ) -> Result<Self, CredentialError> {
    let refresh_secret = token
      .refresh_token
      .clone()
      .filter(|t| !t.is_empty())
      .ok_or_else(|| CredentialError::MissingRefreshToken(PathBuf::from("<memory>")))?;

    Ok(Self {
      state: Mutex::new(CredentialState {
        token,
        last_refresh: None,
      }),
      refresh_secret,
      staleness,
      refresher,
      store,
    })
  }

  /// Reads `client_secrets_path` and `token_path` and wires up the real
  /// refresher and file store.
  pub fn from_config(config: &GDriveConfig, client: reqwest::Client) -> Result<Self, CredentialError> {
    let secrets = ClientSecrets::load(&config.client_secrets_path)?;
    let token = TokenBlob::load(&config.token_path)?;
    if token.refresh_token.as_deref().is_none_or(str::is_empty) {
      return Err(CredentialError::MissingRefreshToken(config.token_path.clone()));
    }

    Self::new(
      token,
      Duration::from_secs(config.staleness_secs),
      Arc::new(OAuthRefresher::new(
        client,
        secrets,
        Duration::from_secs(config.request_timeout_secs),
      )),
      Arc::new(FileTokenStore::new(&config.token_path)),
    )
  }

  /// A fresh access token, refreshing first when the last refresh is older
  /// than the staleness window or has never happened.
  pub async fn access_token(&self) -> Result<String, CredentialError> {
    let mut state = self.state.lock().await;
    if state.is_fresh(self.staleness) {
      return Ok(state.token.access_token.clone());
    }

    debug!("Refreshing cloud storage access token");
    let mut token = self.refresher.refresh(&self.refresh_secret).await?;
    // rotations may omit the long-lived secret; keep the one we started with
    token.refresh_token = Some(self.refresh_secret.clone());
    token.stamp_expiry();

    self.store.persist(&token).await?;

    let first = state.last_refresh.is_none();
    state.token = token;
    state.last_refresh = Some(Instant::now());
    if first {
      info!("Cloud storage credential refreshed");
    }
    Ok(state.token.access_token.clone())
  }

  /// Forces the next call to refresh, e.g. after the API rejected the token.
  pub async fn invalidate(&self) {
    let mut state = self.state.lock().await;
    if state.last_refresh.take().is_some() {
      warn!("Cloud storage access token was rejected, refreshing on next use");
    }
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[derive(Default)]
  pub(crate) struct CountingRefresher {
    pub calls: AtomicUsize,
    pub fail: std::sync::atomic::AtomicBool,
  }

  #[async_trait]
  impl TokenRefresher for CountingRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenBlob, CredentialError> {
      assert_eq!(refresh_token, "long-lived");
      let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
      tokio::time::sleep(Duration::from_millis(50)).await;
      if self.fail.load(Ordering::SeqCst) {
        return Err(CredentialError::Refresh("invalid_grant".into()));
      }
      Ok(TokenBlob {
        access_token: format!("access-{}", n),
        // some servers rotate the secret, the guard must not adopt it
        refresh_token: Some("rotated".into()),
        expires_in: Some(3599),
        ..Default::default()
      })
    }
  }

  #[derive(Default)]
  pub(crate) struct MemoryStore {
    pub writes: parking_lot::Mutex<Vec<TokenBlob>>,
  }

  #[async_trait]
  impl TokenStore for MemoryStore {
    async fn persist(&self, token: &TokenBlob) -> Result<(), CredentialError> {
      self.writes.lock().push(token.clone());
      Ok(())
    }
  }

  pub(crate) fn guard(
    staleness: Duration,
  ) -> (Arc<CredentialGuard>, Arc<CountingRefresher>, Arc<MemoryStore>) {
    let refresher = Arc::new(CountingRefresher::default());
    let store = Arc::new(MemoryStore::default());
    let token = TokenBlob {
      access_token: "stale".into(),
      refresh_token: Some("long-lived".into()),
      ..Default::default()
    };
    let guard = CredentialGuard::new(token, staleness, refresher.clone(), store.clone()).unwrap();
    (Arc::new(guard), refresher, store)
  }

  #[tokio::test(start_paused = true)]
  async fn first_use_refreshes_and_preserves_the_refresh_secret() {
    let (guard, refresher, store) = guard(Duration::from_secs(3000));

    assert_eq!(guard.access_token().await.unwrap(), "access-1");
    assert_eq!(guard.access_token().await.unwrap(), "access-1");
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

    let writes = store.writes.lock();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].refresh_token.as_deref(), Some("long-lived"));
    assert!(writes[0].expires_at.is_some());
  }

  #[tokio::test(start_paused = true)]
  async fn concurrent_stale_callers_share_one_refresh() {
    let (guard, refresher, store) = guard(Duration::from_secs(3000));

    let calls: Vec<_> = (0..8)
      .map(|_| {
        let guard = guard.clone();
        tokio::spawn(async move { guard.access_token().await })
      })
      .collect();
    for call in calls {
      assert_eq!(call.await.unwrap().unwrap(), "access-1");
    }

    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.writes.lock().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn refreshes_again_after_the_staleness_window() {
    let (guard, refresher, _) = guard(Duration::from_secs(3000));

    assert_eq!(guard.access_token().await.unwrap(), "access-1");
    tokio::time::advance(Duration::from_secs(2999)).await;
    assert_eq!(guard.access_token().await.unwrap(), "access-1");
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(guard.access_token().await.unwrap(), "access-2");
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn failed_refresh_persists_nothing_and_is_retried() {
    let (guard, refresher, store) = guard(Duration::from_secs(3000));
    refresher.fail.store(true, Ordering::SeqCst);

    let err = guard.access_token().await.unwrap_err();
    assert!(matches!(err, CredentialError::Refresh(_)));
    assert!(store.writes.lock().is_empty());

    refresher.fail.store(false, Ordering::SeqCst);
    assert_eq!(guard.access_token().await.unwrap(), "access-2");
  }

  #[tokio::test(start_paused = true)]
  async fn invalidate_forces_a_refresh() {
    let (guard, refresher, _) = guard(Duration::from_secs(3000));
    guard.access_token().await.unwrap();
    guard.invalidate().await;
    assert_eq!(guard.access_token().await.unwrap(), "access-2");
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn client_secrets_accept_console_layouts() {
    let path = Path::new("credentials.json");
    let installed = r#"{"installed":{"client_id":"id","client_secret":"s","redirect_uris":["http://localhost"]}}"#;
    let web = r#"{"web":{"client_id":"id","client_secret":"s","token_uri":"https://example.test/token"}}"#;
    let flat = r#"{"client_id":"id","client_secret":"s"}"#;

    assert_eq!(ClientSecrets::parse(path, installed).unwrap().token_uri, DEFAULT_TOKEN_URI);
    assert_eq!(
      ClientSecrets::parse(path, web).unwrap().token_uri,
      "https://example.test/token"
    );
    assert_eq!(ClientSecrets::parse(path, flat).unwrap().client_id, "id");
    assert!(matches!(
      ClientSecrets::parse(path, "{}"),
      Err(CredentialError::Parse { .. })
    ));
  }

  #[tokio::test]
  async fn file_store_round_trips_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("token.json");
    std::fs::write(
      &path,
      r#"{"access_token":"a","refresh_token":"r","scopes":["drive.readonly"]}"#,
    )
    .unwrap();

    let token = TokenBlob::load(&path).unwrap();
    FileTokenStore::new(&path).persist(&token).await.unwrap();

    let reloaded = TokenBlob::load(&path).unwrap();
    assert_eq!(reloaded, token);
    assert!(reloaded.extra.contains_key("scopes"));
    assert!(!dir.path().join("token.json.tmp").exists());
  }

  #[test]
  fn guard_requires_a_refresh_secret() {
    let result = CredentialGuard::new(
      TokenBlob::default(),
      Duration::from_secs(1),
      Arc::new(CountingRefresher::default()),
      Arc::new(MemoryStore::default()),
    );
    assert!(matches!(result, Err(CredentialError::MissingRefreshToken(_))));
  }
}
