use std::{
  future::Future,
  io::ErrorKind,
  path::{Path, PathBuf},
  time::{Duration, SystemTime},
};

use tokio::{fs, io::AsyncWriteExt, time::Instant};
use tracing::{debug, warn};

use crate::{
  common::{errors::CacheError, files::sanitize_filename},
  configs::CacheConfig,
};

const LOCK_SUFFIX: &str = ".lock";
const STAGING_SUFFIX: &str = ".part";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const MIN_HEARTBEAT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
  /// The file was already there (or another writer finished it).
  Hit(PathBuf),
  /// This call fetched the file.
  Fetched(PathBuf),
}

impl CacheOutcome {
  pub fn path(&self) -> &Path {
    match self {
      Self::Hit(path) | Self::Fetched(path) => path,
    }
  }

  pub fn into_path(self) -> PathBuf {
    match self {
      Self::Hit(path) | Self::Fetched(path) => path,
    }
  }
}

/// On-disk media and cover-art cache shared by every session.
///
/// Files are keyed by sanitized name. A writer claims a name by creating
/// `<name>.lock` with create-new semantics and its own id as content, writes
/// into `<name>.<id>.part` and renames it into place; everyone else waits
/// for the rename. The lock's mtime is refreshed while the writer works.
#[derive(Debug)]
pub struct MediaCache {
  audio_dir: PathBuf,
  image_dir: PathBuf,
  placeholder: String,
  wait_timeout: Duration,
  poll_interval: Duration,
}

enum Claim {
  Ready(PathBuf),
  Owned(WriterLock),
}

/// Held while this task owns a cache name. Dropping it (including when the
/// owning task is cancelled) discards partial data and releases the lock,
/// unless the lock was reclaimed by someone else in the meantime.
struct WriterLock {
  lock: PathBuf,
  staging: PathBuf,
  owner: String,
  handle: std::fs::File,
}

impl WriterLock {
  /// Keeps the lock's mtime recent so waiters do not take it for abandoned.
  fn touch(&self) {
    if let Err(e) = self.handle.set_modified(SystemTime::now()) {
      debug!("Could not refresh cache lock {}: {}", self.lock.display(), e);
    }
  }
}

impl Drop for WriterLock {
  fn drop(&mut self) {
    let _ = std::fs::remove_file(&self.staging);
    if std::fs::read_to_string(&self.lock).is_ok_and(|owner| owner == self.owner) {
      let _ = std::fs::remove_file(&self.lock);
    }
  }
}

impl MediaCache {
  pub fn new(config: &CacheConfig) -> Self {
    Self {
      audio_dir: config.audio_dir.clone(),
      image_dir: config.image_dir.clone(),
      placeholder: config.placeholder_thumbnail.clone(),
      wait_timeout: Duration::from_secs(config.wait_timeout_secs),
      poll_interval: POLL_INTERVAL,
    }
  }

  pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
    self.poll_interval = poll_interval;
    self
  }

  /// Creates the cache directories.
  pub async fn prepare(&self) -> Result<(), CacheError> {
    for dir in [&self.audio_dir, &self.image_dir] {
      fs::create_dir_all(dir).await.map_err(CacheError::io(dir))?;
    }
    Ok(())
  }

  pub fn audio_path(&self, cache_name: &str) -> PathBuf {
    self.audio_dir.join(cache_name)
  }

  /// Where extracted cover art for a title lives.
  pub fn image_path(&self, title: &str) -> PathBuf {
    self.image_dir.join(format!("{}.jpg", sanitize_filename(title)))
  }

  pub fn placeholder(&self) -> &str {
    &self.placeholder
  }

  /// Returns the cached file for `cache_name`, running `fetch` to create it
  /// when it is missing.
  ///
  /// `fetch` receives a staging path and must leave the complete file there;
  /// it is only promoted to the final name on success. Concurrent callers
  /// for the same name wait for the first writer instead of fetching again.
  pub async fn ensure<F, Fut, E>(&self, cache_name: &str, fetch: F) -> Result<CacheOutcome, CacheError>
  where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
  {
    let target = self.audio_path(cache_name);

    let writer = match self.claim(cache_name, &target).await? {
      Claim::Ready(path) => {
        debug!("Cache hit for {}", path.display());
        return Ok(CacheOutcome::Hit(path));
      }
      Claim::Owned(writer) => writer,
    };

    let fetched = {
      let fetch = fetch(writer.staging.clone());
      tokio::pin!(fetch);
      let mut heartbeat = tokio::time::interval(self.heartbeat_interval());
      loop {
        tokio::select! {
          result = &mut fetch => break result,
          _ = heartbeat.tick() => writer.touch(),
        }
      }
    };
    fetched.map_err(|e| CacheError::Fetch(e.to_string()))?;

    fs::rename(&writer.staging, &target)
      .await
      .map_err(CacheError::io(&target))?;

    drop(writer);
    Ok(CacheOutcome::Fetched(target))
  }

  /// Writers refresh their lock several times within one wait timeout, so
  /// a live writer never looks abandoned.
  fn heartbeat_interval(&self) -> Duration {
    (self.wait_timeout / 4).max(MIN_HEARTBEAT)
  }

  fn staging_path(&self, cache_name: &str, owner: &str) -> PathBuf {
    self.audio_path(&format!("{}.{}{}", cache_name, owner, STAGING_SUFFIX))
  }

  async fn claim(&self, cache_name: &str, target: &Path) -> Result<Claim, CacheError> {
    let lock = self.audio_path(&format!("{}{}", cache_name, LOCK_SUFFIX));
    let owner = uuid::Uuid::new_v4().simple().to_string();
    let started = Instant::now();

    loop {
      if exists(target).await? {
        return Ok(Claim::Ready(target.to_path_buf()));
      }

      match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&lock)
        .await
      {
        Ok(mut file) => {
          let stamped = match file.write_all(owner.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
          };
          if let Err(e) = stamped {
            let _ = fs::remove_file(&lock).await;
            return Err(CacheError::Io { path: lock, source: e });
          }
          let writer = WriterLock {
            staging: self.staging_path(cache_name, &owner),
            lock,
            owner,
            handle: file.into_std().await,
          };
          // another writer may have finished between the check and the claim
          if exists(target).await? {
            return Ok(Claim::Ready(target.to_path_buf()));
          }
          return Ok(Claim::Owned(writer));
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
          if self.lock_is_abandoned(&lock).await {
            self.reclaim(cache_name, &lock).await;
            continue;
          }
          if started.elapsed() >= self.wait_timeout {
            return Err(CacheError::WriterTimeout {
              path: target.to_path_buf(),
              waited: self.wait_timeout,
            });
          }
          tokio::time::sleep(self.poll_interval).await;
        }
        Err(e) => return Err(CacheError::Io { path: lock, source: e }),
      }
    }
  }

  /// Removes an abandoned lock and the partial file of its dead writer. The
  /// lock is only removed if nobody replaced it since it was inspected.
  async fn reclaim(&self, cache_name: &str, lock: &Path) {
    let Ok(previous) = fs::read_to_string(lock).await else {
      return;
    };
    warn!("Removing abandoned cache lock {}", lock.display());
    if !previous.is_empty() {
      let _ = fs::remove_file(self.staging_path(cache_name, &previous)).await;
    }
    if fs::read_to_string(lock).await.is_ok_and(|owner| owner == previous) {
      let _ = fs::remove_file(lock).await;
    }
  }

  /// A lock whose writer stopped refreshing it long ago belongs to a writer
  /// that died without cleaning up.
  async fn lock_is_abandoned(&self, lock: &Path) -> bool {
    let Ok(metadata) = fs::metadata(lock).await else {
      return false;
    };
    metadata
      .modified()
      .ok()
      .and_then(|modified| SystemTime::now().duration_since(modified).ok())
      .is_some_and(|age| age > self.wait_timeout * 2)
  }
}

async fn exists(path: &Path) -> Result<bool, CacheError> {
  fs::try_exists(path).await.map_err(CacheError::io(path))
}
