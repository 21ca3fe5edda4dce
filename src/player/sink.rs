use std::path::Path;

use async_trait::async_trait;

use super::engine::EngineMessage;
use crate::common::errors::SinkError;

/// The voice connection a session plays into. Encoding and transport are
/// the host's business; the engine only hands over cached files.
#[async_trait]
pub trait AudioSink: Send + Sync {
  fn is_connected(&self) -> bool;

  /// Starts playing `path`. The sink must call [`CompletionHandle::finish`]
  /// exactly once when playback ends, whether naturally, by error or
  /// because [`AudioSink::stop`] was called.
  async fn play(&self, path: &Path, volume: f32, on_finish: CompletionHandle) -> Result<(), SinkError>;

  async fn stop(&self);

  async fn pause(&self);

  async fn resume(&self);

  async fn set_volume(&self, volume: f32);

  /// Rejoins a voice channel the bot already occupies. Returns whether a
  /// connection exists afterwards.
  async fn reconnect(&self) -> bool;

  async fn disconnect(&self);
}

/// Delivers "track finished" into the engine task.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
  tx: flume::Sender<EngineMessage>,
  token: u64,
}

impl CompletionHandle {
  pub(crate) fn new(tx: flume::Sender<EngineMessage>, token: u64) -> Self {
    Self { tx, token }
  }

  pub fn finish(&self, error: Option<String>) {
    let _ = self.tx.send(EngineMessage::TrackFinished {
      token: self.token,
      error,
    });
  }
}
