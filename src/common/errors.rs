use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::types::GuildId;

/// Exception severity levels attached to player events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
  /// Expected failure, e.g. a removed video or an empty folder.
  Common,
  /// Unexpected failure that the session survived.
  Suspicious,
  /// The session could not continue.
  Fault,
}

/// Failures of the persisted OAuth credential and its refresh round-trip.
#[derive(Debug, Error)]
pub enum CredentialError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed credential file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("{0} does not contain a refresh_token")]
  MissingRefreshToken(PathBuf),

  #[error("token refresh failed: {0}")]
  Refresh(String),

  #[error("failed to persist refreshed token to {path}: {source}")]
  Persist {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Errors surfaced by providers.
#[derive(Debug, Error)]
pub enum SourceError {
  /// The reference does not exist, is unplayable or cannot be listed.
  #[error("could not resolve `{reference}`: {reason}")]
  Resolution { reference: String, reason: String },

  /// The cache file could not be fetched or its tags could not be read.
  #[error("could not materialize `{title}`: {reason}")]
  Materialization { title: String, reason: String },

  #[error(transparent)]
  Credential(#[from] CredentialError),
}

impl SourceError {
  pub fn resolution(reference: impl Into<String>, reason: impl ToString) -> Self {
    Self::Resolution {
      reference: reference.into(),
      reason: reason.to_string(),
    }
  }

  pub fn materialization(title: impl Into<String>, reason: impl ToString) -> Self {
    Self::Materialization {
      title: title.into(),
      reason: reason.to_string(),
    }
  }

  /// Credential failures abort the whole provider call, including batches.
  pub fn is_fatal_for_provider(&self) -> bool {
    matches!(self, Self::Credential(_))
  }
}

/// Errors of the shared on-disk media cache.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache io error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("gave up waiting {waited:?} for another writer of {path}")]
  WriterTimeout { path: PathBuf, waited: Duration },

  #[error("{0}")]
  Fetch(String),
}

impl CacheError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }
}

/// Errors reported by the external audio sink.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
  #[error("the voice connection produced no audio source")]
  NoSource,

  #[error("not connected to a voice channel")]
  NotConnected,

  #[error("audio sink failed: {0}")]
  Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
  #[error("no entry became available within {0:?}")]
  TimedOut(Duration),

  #[error("index {index} is out of range for a queue of {len} entries")]
  OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum SessionError {
  #[error("the session for guild {0} has been torn down")]
  Closed(GuildId),

  #[error("playback could not start, even after reconnecting: {0}")]
  Sink(#[from] SinkError),

  #[error(transparent)]
  Queue(#[from] QueueError),
}
