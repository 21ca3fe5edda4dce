use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{info, warn};

use super::session::Session;
use crate::{
  common::types::GuildId,
  configs::PlayerConfig,
  player::{AudioSink, EngineSettings, PlaybackEngine, PlayerEvent, SessionState},
  sources::SourceManager,
};

/// Registry of live sessions, one per guild.
pub struct SessionManager {
  sessions: Arc<DashMap<GuildId, Arc<Session>>>,
  sources: Arc<SourceManager>,
  settings: EngineSettings,
  default_volume: f32,
  autoplay: bool,
  events_tx: flume::Sender<PlayerEvent>,
  events_rx: flume::Receiver<PlayerEvent>,
}

impl SessionManager {
  pub fn new(config: &PlayerConfig, sources: Arc<SourceManager>) -> Self {
    let (events_tx, events_rx) = flume::unbounded();
    Self {
      sessions: Arc::new(DashMap::new()),
      sources,
      settings: EngineSettings::from(config),
      default_volume: config.default_volume,
      autoplay: config.autoplay,
      events_tx,
      events_rx,
    }
  }

  /// Player events of every session. Each event goes to one receiver.
  pub fn events(&self) -> flume::Receiver<PlayerEvent> {
    self.events_rx.clone()
  }

  pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session>> {
    self
      .sessions
      .get(&guild_id)
      .map(|s| s.value().clone())
      .filter(|s| s.is_alive())
  }

  /// The guild's live session, or a new one playing into the sink that
  /// `connect` returns. A torn-down session is never handed out again.
  pub fn get_or_create<F>(&self, guild_id: GuildId, connect: F) -> Arc<Session>
  where
    F: FnOnce() -> Arc<dyn AudioSink>,
  {
    match self.sessions.entry(guild_id) {
      Entry::Occupied(entry) if entry.get().is_alive() => entry.get().clone(),
      entry => {
        let session = self.spawn(guild_id, connect());
        entry.insert(session.clone());
        session
      }
    }
  }

  fn spawn(&self, guild_id: GuildId, sink: Arc<dyn AudioSink>) -> Arc<Session> {
    let state = Arc::new(SessionState::new(guild_id, self.default_volume, self.autoplay));
    let engine = PlaybackEngine::new(
      state.clone(),
      self.sources.clone(),
      sink.clone(),
      self.events_tx.clone(),
      self.settings.clone(),
    );
    let session = Arc::new(Session::new(
      state,
      sink,
      engine.sender(),
      engine.cancellation(),
    ));

    let sessions = self.sessions.clone();
    let session_id = session.session_id;
    tokio::spawn(async move {
      if let Err(e) = engine.run().await {
        warn!("Session {} ended with an error: {}", session_id, e);
      }
      sessions.remove_if(&guild_id, |_, s| s.session_id == session_id);
    });

    info!("Created session {} for guild {}", session_id, guild_id);
    session
  }

  /// Stops the guild's session and forgets it.
  pub fn remove(&self, guild_id: GuildId) -> Option<Arc<Session>> {
    let (_, session) = self.sessions.remove(&guild_id)?;
    session.shutdown();
    Some(session)
  }

  pub fn len(&self) -> usize {
    self.sessions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sessions.is_empty()
  }

  pub fn shutdown(&self) {
    info!("Shutting down {} sessions", self.sessions.len());
    for entry in self.sessions.iter() {
      entry.value().shutdown();
    }
    self.sessions.clear();
  }
}
