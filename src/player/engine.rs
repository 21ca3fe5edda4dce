use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
  entry::QueueEntry,
  events::PlayerEvent,
  sink::{AudioSink, CompletionHandle},
  state::SessionState,
};
use crate::{
  common::{
    errors::{QueueError, SessionError, Severity, SourceError},
    files::load_lines,
  },
  configs::PlayerConfig,
  sources::{SourceManager, classify},
};

/// Messages delivered into the engine task.
#[derive(Debug)]
pub enum EngineMessage {
  /// Sent by the sink through a [`CompletionHandle`]. Tokens of earlier
  /// tracks are ignored.
  TrackFinished { token: u64, error: Option<String> },
  /// Ends the track with this completion token. Skips aimed at an earlier
  /// track are ignored.
  Skip { token: u64 },
  Stop,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
  pub dequeue_timeout: Duration,
  pub autoplay_file: PathBuf,
}

impl From<&PlayerConfig> for EngineSettings {
  fn from(config: &PlayerConfig) -> Self {
    Self {
      dequeue_timeout: Duration::from_secs(config.dequeue_timeout_secs),
      autoplay_file: config.autoplay_file.clone(),
    }
  }
}

enum Flow {
  Continue,
  TearDown,
}

enum Dequeued {
  Entry(QueueEntry),
  TimedOut,
  Stopped,
}

/// Drives one session: dequeue, materialize, play, wait, repeat.
///
/// The engine is the only writer of the session's current track and
/// history. Commands that need its cooperation (skip, stop) and the sink's
/// completion signal arrive over one channel, so all of them are handled
/// on the engine's own task.
pub struct PlaybackEngine {
  state: Arc<SessionState>,
  sources: Arc<SourceManager>,
  sink: Arc<dyn AudioSink>,
  events: flume::Sender<PlayerEvent>,
  tx: flume::Sender<EngineMessage>,
  rx: flume::Receiver<EngineMessage>,
  settings: EngineSettings,
  fallback: Vec<String>,
  last_token: u64,
  cancel: CancellationToken,
}

impl PlaybackEngine {
  pub fn new(
    state: Arc<SessionState>,
    sources: Arc<SourceManager>,
    sink: Arc<dyn AudioSink>,
    events: flume::Sender<PlayerEvent>,
    settings: EngineSettings,
  ) -> Self {
    let (tx, rx) = flume::unbounded();
    Self {
      state,
      sources,
      sink,
      events,
      tx,
      rx,
      settings,
      fallback: Vec::new(),
      last_token: 0,
      cancel: CancellationToken::new(),
    }
  }

  pub fn sender(&self) -> flume::Sender<EngineMessage> {
    self.tx.clone()
  }

  /// Cancelling this token ends [`PlaybackEngine::run`] at its next
  /// suspension point; the session is torn down either way.
  pub fn cancellation(&self) -> CancellationToken {
    self.cancel.clone()
  }

  pub async fn run(mut self) -> Result<(), SessionError> {
    let guild_id = self.state.guild_id;
    info!("Playback started for guild {}", guild_id);

    let cancel = self.cancel.clone();
    let result = tokio::select! {
      _ = cancel.cancelled() => {
        debug!("Playback for guild {} cancelled", guild_id);
        Ok(())
      }
      result = self.drive() => result,
    };

    if let Err(e) = &result {
      error!("Session for guild {} failed: {}", guild_id, e);
      let title = self
        .state
        .current()
        .map(|c| c.title().to_string())
        .unwrap_or_default();
      self.emit(PlayerEvent::TrackException {
        guild_id,
        title,
        message: e.to_string(),
        severity: Severity::Fault,
      });
    }

    self.teardown().await;
    result
  }

  async fn drive(&mut self) -> Result<(), SessionError> {
    while let Flow::Continue = self.step().await? {}
    Ok(())
  }

  async fn step(&mut self) -> Result<Flow, SessionError> {
    let guild_id = self.state.guild_id;
    self.state.set_playing(false);
    self.emit(PlayerEvent::DismissNowPlaying { guild_id });

    if self.state.is_looping() {
      if let Some(current) = self.state.current() {
        self.state.queue.put(current);
      }
    }

    let entry = match self.dequeue().await? {
      Dequeued::Entry(entry) => entry,
      Dequeued::Stopped => return Ok(Flow::TearDown),
      Dequeued::TimedOut => {
        self.state.set_current(None);
        if !self.state.autoplay() {
          debug!("Queue of guild {} drained and autoplay is off", guild_id);
          return Ok(Flow::TearDown);
        }
        if !self.sink.is_connected() {
          debug!("Guild {} has no voice connection left", guild_id);
          return Ok(Flow::TearDown);
        }
        match self.autoplay_next().await {
          Some(entry) => entry,
          None => return Ok(Flow::TearDown),
        }
      }
    };

    self.state.set_current(Some(entry.clone()));
    self.state.record_history(entry.clone());

    let mut descriptor = entry.descriptor().clone();
    descriptor.volume = self.state.volume();

    let descriptor = match self.sources.materialize(descriptor).await {
      Ok(descriptor) => descriptor,
      Err(e) => {
        self.report_failure(entry.title(), &e);
        self.state.set_current(None);
        return Ok(Flow::Continue);
      }
    };

    let entry = entry.with_descriptor(descriptor);
    self.state.set_current(Some(entry.clone()));
    self.state.refresh_history(entry.clone());

    let Some(path) = entry.descriptor().local_path.clone() else {
      let e = SourceError::materialization(entry.title(), "no cached file");
      self.report_failure(entry.title(), &e);
      self.state.set_current(None);
      return Ok(Flow::Continue);
    };

    self.last_token += 1;
    let token = self.last_token;
    self
      .start_playback(&path, entry.descriptor().volume, token)
      .await?;
    self.state.start_track(token);

    self.emit(PlayerEvent::NowPlaying {
      guild_id,
      track: Box::new(entry.descriptor().clone()),
      requester: entry.requester(),
      duration: entry.descriptor().formatted_duration(),
    });

    self.wait_for_finish(token).await
  }

  async fn dequeue(&mut self) -> Result<Dequeued, SessionError> {
    let state = self.state.clone();
    let rx = self.rx.clone();
    let get = state.queue.get(self.settings.dequeue_timeout);
    tokio::pin!(get);

    loop {
      tokio::select! {
        result = &mut get => {
          return match result {
            Ok(entry) => Ok(Dequeued::Entry(entry)),
            Err(QueueError::TimedOut(_)) => Ok(Dequeued::TimedOut),
            Err(e) => Err(e.into()),
          };
        }
        message = rx.recv_async() => match message {
          Ok(EngineMessage::Stop) | Err(_) => {
            self.stop_playback().await;
            return Ok(Dequeued::Stopped);
          }
          // nothing is playing, so both are leftovers of the last track
          Ok(EngineMessage::Skip { .. } | EngineMessage::TrackFinished { .. }) => {}
        }
      }
    }
  }

  /// Picks random fallback references until one resolves. Playlists are
  /// expanded into the fallback list instead of being played directly.
  async fn autoplay_next(&mut self) -> Option<QueueEntry> {
    if self.fallback.is_empty() {
      info!("Fetching autoplay list");
      self.fallback = load_lines(&self.settings.autoplay_file, '#').await;
    }

    while !self.fallback.is_empty() {
      let index = rand::thread_rng().gen_range(0..self.fallback.len());
      let link = self.fallback.swap_remove(index);
      info!("Trying {} from autoplay list", link);

      let classified = classify(&link);
      if classified.is_playlist {
        match self.sources.expand_to_links(&classified).await {
          Ok(links) => {
            info!("Adding {} tracks from {}", links.len(), link);
            self.fallback.extend(links);
          }
          Err(e) => warn!("Skipping autoplay playlist {}: {}", link, e),
        }
        continue;
      }

      match self
        .sources
        .resolve_track(classified.kind, &classified.reference)
        .await
      {
        Ok(descriptor) => {
          self.state.queue.put(QueueEntry::new(descriptor, None, None));
          // anything queued by a user in the meantime still goes first
          if let Some(entry) = self.state.queue.try_get() {
            return Some(entry);
          }
        }
        Err(e) => warn!("Skipping autoplay entry {}: {}", link, e),
      }
    }

    info!("Autoplay list exhausted for guild {}", self.state.guild_id);
    None
  }

  /// Hands the file to the sink. A sink that cannot start gets one
  /// reconnect; failing again ends the session.
  async fn start_playback(&self, path: &Path, volume: f32, token: u64) -> Result<(), SessionError> {
    let on_finish = CompletionHandle::new(self.tx.clone(), token);
    let first = match self.sink.play(path, volume, on_finish.clone()).await {
      Ok(()) => return Ok(()),
      Err(e) => e,
    };

    warn!(
      "Could not start playback in guild {} ({}), reconnecting",
      self.state.guild_id, first
    );
    if !self.sink.reconnect().await {
      return Err(SessionError::Sink(first));
    }
    self
      .sink
      .play(path, volume, on_finish)
      .await
      .map_err(SessionError::Sink)
  }

  async fn wait_for_finish(&mut self, token: u64) -> Result<Flow, SessionError> {
    loop {
      let Ok(message) = self.rx.recv_async().await else {
        return Ok(Flow::TearDown);
      };

      match message {
        EngineMessage::TrackFinished { token: t, error } if t == token => {
          if let Some(message) = error {
            let title = self
              .state
              .current()
              .map(|c| c.title().to_string())
              .unwrap_or_default();
            warn!("Playback of {} ended with an error: {}", title, message);
            self.emit(PlayerEvent::TrackException {
              guild_id: self.state.guild_id,
              title,
              message,
              severity: Severity::Suspicious,
            });
          }
          return Ok(Flow::Continue);
        }
        EngineMessage::TrackFinished { token: stale, .. } => {
          debug!("Ignoring completion of earlier track {}", stale);
        }
        EngineMessage::Skip { token: t } if t == token => {
          self.state.clear_skip_votes();
          self.sink.stop().await;
          return Ok(Flow::Continue);
        }
        EngineMessage::Skip { token: stale } => {
          debug!("Ignoring skip of earlier track {}", stale);
        }
        EngineMessage::Stop => {
          self.stop_playback().await;
          return Ok(Flow::TearDown);
        }
      }
    }
  }

  async fn stop_playback(&self) {
    let dropped = self.state.queue.clear();
    debug!("Stopping guild {}, dropped {} queued tracks", self.state.guild_id, dropped);
    self.state.set_current(None);
    if self.sink.is_connected() {
      self.sink.stop().await;
      self.sink.disconnect().await;
    }
  }

  async fn teardown(&mut self) {
    let guild_id = self.state.guild_id;
    self.state.close();
    self.state.queue.clear();
    self.state.set_current(None);
    self.state.set_playing(false);
    if self.sink.is_connected() {
      self.sink.stop().await;
      self.sink.disconnect().await;
    }

    self.emit(PlayerEvent::DismissNowPlaying { guild_id });
    self.emit(PlayerEvent::TornDown { guild_id });
    info!("Session for guild {} torn down", guild_id);
  }

  fn report_failure(&self, title: &str, error: &SourceError) {
    warn!("Skipping {}: {}", title, error);
    let severity = if error.is_fatal_for_provider() {
      Severity::Suspicious
    } else {
      Severity::Common
    };
    self.emit(PlayerEvent::TrackException {
      guild_id: self.state.guild_id,
      title: title.to_string(),
      message: error.to_string(),
      severity,
    });
  }

  fn emit(&self, event: PlayerEvent) {
    let _ = self.events.send(event);
  }
}
