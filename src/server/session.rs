use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
  common::{
    errors::SessionError,
    types::{ChannelId, SessionId, UserId},
  },
  player::{AudioSink, EngineMessage, QueueEntry, SessionState},
  sources::TrackDescriptor,
};

/// Command-side handle of one guild's playback session.
pub struct Session {
  pub session_id: SessionId,
  pub state: Arc<SessionState>,
  sink: Arc<dyn AudioSink>,
  commands: flume::Sender<EngineMessage>,
  cancel: CancellationToken,
}

impl Session {
  pub fn new(
    state: Arc<SessionState>,
    sink: Arc<dyn AudioSink>,
    commands: flume::Sender<EngineMessage>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      session_id: SessionId::generate(),
      state,
      sink,
      commands,
      cancel,
    }
  }

  pub fn is_alive(&self) -> bool {
    !self.state.is_closed() && !self.cancel.is_cancelled()
  }

  fn ensure_alive(&self) -> Result<(), SessionError> {
    if self.is_alive() {
      Ok(())
    } else {
      Err(SessionError::Closed(self.state.guild_id))
    }
  }

  /// Appends a track and returns its 1-based position in the queue.
  pub fn enqueue(
    &self,
    descriptor: TrackDescriptor,
    requester: Option<UserId>,
    channel: Option<ChannelId>,
  ) -> Result<usize, SessionError> {
    self.ensure_alive()?;
    self.state.queue.put(QueueEntry::new(descriptor, requester, channel));
    Ok(self.state.queue.len())
  }

  /// Appends a batch in order, e.g. a resolved playlist.
  pub fn enqueue_all(
    &self,
    tracks: Vec<TrackDescriptor>,
    requester: Option<UserId>,
    channel: Option<ChannelId>,
  ) -> Result<usize, SessionError> {
    self.ensure_alive()?;
    let count = tracks.len();
    self.state.queue.extend(
      tracks
        .into_iter()
        .map(|descriptor| QueueEntry::new(descriptor, requester, channel)),
    );
    Ok(count)
  }

  /// Clears the skip votes and ends the current track. Returns whether
  /// anything was playing.
  pub fn skip(&self) -> bool {
    self.state.clear_skip_votes();
    let Some(token) = self.state.track_token() else {
      return false;
    };
    self.commands.send(EngineMessage::Skip { token }).is_ok()
  }

  pub fn add_skip_vote(&self, user: UserId) -> usize {
    self.state.add_skip_vote(user)
  }

  /// Clears the queue and leaves the voice channel. The session tears
  /// down afterwards.
  pub fn stop(&self) {
    if self.commands.send(EngineMessage::Stop).is_err() {
      debug!("Session {} already stopped", self.session_id);
    }
  }

  pub fn set_loop(&self, looping: bool) {
    self.state.set_looping(looping);
  }

  /// Flips the loop flag and returns the new value.
  pub fn toggle_loop(&self) -> bool {
    let looping = !self.state.is_looping();
    self.state.set_looping(looping);
    looping
  }

  pub fn set_autoplay(&self, autoplay: bool) {
    self.state.set_autoplay(autoplay);
  }

  /// Sets the session volume. Tracks pick it up when they start; the one
  /// playing now is adjusted directly. Range checks are the caller's job.
  pub async fn set_volume(&self, volume: f32) {
    self.state.set_volume(volume);
    if self.state.is_playing() {
      self.sink.set_volume(volume).await;
    }
  }

  pub fn volume(&self) -> f32 {
    self.state.volume()
  }

  pub async fn pause(&self) -> bool {
    if !self.state.is_playing() || self.state.is_paused() {
      return false;
    }
    self.sink.pause().await;
    self.state.set_paused(true);
    true
  }

  pub async fn resume(&self) -> bool {
    if !self.state.is_playing() || !self.state.is_paused() {
      return false;
    }
    self.sink.resume().await;
    self.state.set_paused(false);
    true
  }

  /// The current track followed by the pending ones, sliced to
  /// `[start, end)`.
  pub fn queue_view(&self, start: usize, end: usize) -> Vec<QueueEntry> {
    let current: Vec<QueueEntry> = self.state.current().into_iter().collect();
    let pending = self.state.queue.slice(0, end.saturating_sub(current.len()));
    current
      .into_iter()
      .chain(pending)
      .skip(start)
      .take(end.saturating_sub(start))
      .collect()
  }

  pub fn history_view(&self, start: usize, end: usize) -> Vec<QueueEntry> {
    self.state.history_view(start, end)
  }

  pub fn shuffle(&self) {
    self.state.queue.shuffle();
  }

  /// Removes the pending entry at the 0-based `index`.
  pub fn remove(&self, index: usize) -> Result<QueueEntry, SessionError> {
    Ok(self.state.queue.remove(index)?)
  }

  pub fn clear(&self) -> usize {
    self.state.queue.clear()
  }

  pub fn current(&self) -> Option<QueueEntry> {
    self.state.current()
  }

  pub fn is_playing(&self) -> bool {
    self.sink.is_connected() && self.state.is_playing()
  }

  /// Cancels the engine task; teardown runs on that task.
  pub fn shutdown(&self) {
    debug!("Shutting down session {}", self.session_id);
    self.cancel.cancel();
  }
}
