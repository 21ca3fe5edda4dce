use std::{path::Path, sync::Arc, time::Duration};

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::token::CredentialGuard;
use crate::common::errors::CredentialError;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const FILE_FIELDS: &str = "id,name,owners(displayName),createdTime,webViewLink";
const LIST_FIELDS: &str = "files(name,id),nextPageToken";
const LIST_ORDER: &str = "folder,name,createdTime";
const PAGE_SIZE: &str = "1000";

#[derive(Debug, Error)]
pub enum DriveError {
  #[error(transparent)]
  Credential(#[from] CredentialError),

  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("drive api returned {status}: {body}")]
  Status { status: StatusCode, body: String },

  #[error("could not write download: {0}")]
  Io(#[from] std::io::Error),

  #[error("no data from the drive api for {0:?}")]
  Stalled(Duration),
}

impl DriveError {
  /// Failures worth retrying without telling anyone.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_body(),
      Self::Status { status, .. } => {
        status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
      }
      Self::Stalled(_) => true,
      _ => false,
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::Status { status, .. } if *status == StatusCode::NOT_FOUND)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
  pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub owners: Vec<Owner>,
  pub created_time: Option<String>,
  pub web_view_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedFile {
  pub id: String,
  pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
  #[serde(default)]
  files: Vec<ListedFile>,
  next_page_token: Option<String>,
}

/// Thin client for the handful of Drive v3 calls the provider needs.
///
/// `timeout` bounds every metadata call, the wait for a download's response
/// and each gap between download chunks.
pub struct DriveApi {
  http: reqwest::Client,
  credentials: Arc<CredentialGuard>,
  timeout: Duration,
  base_url: String,
}

impl DriveApi {
  pub fn new(http: reqwest::Client, credentials: Arc<CredentialGuard>, timeout: Duration) -> Self {
    Self {
      http,
      credentials,
      timeout,
      base_url: DEFAULT_API_BASE.to_string(),
    }
  }

  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into().trim_end_matches('/').to_string();
    self
  }

  pub fn credentials(&self) -> &CredentialGuard {
    &self.credentials
  }

  /// Metadata of a file or folder.
  pub async fn get_file(&self, id: &str) -> Result<DriveFile, DriveError> {
    let url = format!("{}/files/{}", self.base_url, id);
    let resp = self
      .send_authorized(|| {
        self
          .http
          .get(&url)
          .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
          .timeout(self.timeout)
      })
      .await?;
    Ok(resp.json().await?)
  }

  /// Every audio file directly inside `folder_id`, following page tokens.
  pub async fn list_audio(&self, folder_id: &str) -> Result<Vec<ListedFile>, DriveError> {
    let url = format!("{}/files", self.base_url);
    let query = format!("mimeType contains 'audio' and '{}' in parents", folder_id);
    let mut files = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
      let resp = self
        .send_authorized(|| {
          let mut req = self
            .http
            .get(&url)
            .query(&[
              ("q", query.as_str()),
              ("fields", LIST_FIELDS),
              ("orderBy", LIST_ORDER),
              ("pageSize", PAGE_SIZE),
              ("supportsAllDrives", "true"),
              ("includeItemsFromAllDrives", "true"),
            ])
            .timeout(self.timeout);
          if let Some(token) = &page_token {
            req = req.query(&[("pageToken", token.as_str())]);
          }
          req
        })
        .await?;

      let page: FileList = resp.json().await?;
      files.extend(page.files);

      match page.next_page_token {
        Some(token) if !token.is_empty() => {
          debug!("Fetching next page of folder {}", folder_id);
          page_token = Some(token);
        }
        _ => break,
      }
    }

    Ok(files)
  }

  /// Streams the file contents into `dest`, truncating whatever is there.
  pub async fn download(&self, id: &str, dest: &Path) -> Result<u64, DriveError> {
    let url = format!("{}/files/{}", self.base_url, id);
    let mut resp = self
      .send_authorized(|| {
        self
          .http
          .get(&url)
          .query(&[("alt", "media"), ("supportsAllDrives", "true")])
      })
      .await?;

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    loop {
      let chunk = tokio::time::timeout(self.timeout, resp.chunk())
        .await
        .map_err(|_| DriveError::Stalled(self.timeout))??;
      let Some(chunk) = chunk else {
        break;
      };
      file.write_all(&chunk).await?;
      written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
  }

  /// Sends with a bearer token. A 401 invalidates the token and the request
  /// is sent once more with a fresh one.
  async fn send_authorized<F>(&self, build: F) -> Result<Response, DriveError>
  where
    F: Fn() -> RequestBuilder,
  {
    let mut retried = false;
    loop {
      let token = self.credentials.access_token().await?;
      let resp = tokio::time::timeout(self.timeout, build().bearer_auth(token).send())
        .await
        .map_err(|_| DriveError::Stalled(self.timeout))??;
      let status = resp.status();

      if status == StatusCode::UNAUTHORIZED && !retried {
        self.credentials.invalidate().await;
        retried = true;
        continue;
      }
      if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DriveError::Status { status, body });
      }
      return Ok(resp);
    }
  }
}
