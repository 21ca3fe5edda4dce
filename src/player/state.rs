use std::{
  collections::HashSet,
  sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use parking_lot::{Mutex, RwLock};

use super::{entry::QueueEntry, history::History, queue::PlaybackQueue};
use crate::common::types::{GuildId, UserId};

/// Everything one guild's playback shares between its engine task and the
/// command layer.
///
/// Only the engine changes `current` and `history`; commands read them and
/// change flags, volume and the queue.
#[derive(Debug)]
pub struct SessionState {
  pub guild_id: GuildId,
  pub queue: PlaybackQueue,
  current: RwLock<Option<QueueEntry>>,
  history: RwLock<History>,
  looping: AtomicBool,
  autoplay: AtomicBool,
  playing: AtomicBool,
  track_token: AtomicU64,
  paused: AtomicBool,
  closed: AtomicBool,
  volume: Mutex<f32>,
  skip_votes: Mutex<HashSet<UserId>>,
}

impl SessionState {
  pub fn new(guild_id: GuildId, volume: f32, autoplay: bool) -> Self {
    Self {
      guild_id,
      queue: PlaybackQueue::new(),
      current: RwLock::new(None),
      history: RwLock::new(History::new()),
      looping: AtomicBool::new(false),
      autoplay: AtomicBool::new(autoplay),
      playing: AtomicBool::new(false),
      track_token: AtomicU64::new(0),
      paused: AtomicBool::new(false),
      closed: AtomicBool::new(false),
      volume: Mutex::new(volume),
      skip_votes: Mutex::new(HashSet::new()),
    }
  }

  pub fn current(&self) -> Option<QueueEntry> {
    self.current.read().clone()
  }

  pub(crate) fn set_current(&self, entry: Option<QueueEntry>) {
    *self.current.write() = entry;
  }

  pub fn history_len(&self) -> usize {
    self.history.read().len()
  }

  pub fn history_view(&self, start: usize, end: usize) -> Vec<QueueEntry> {
    self.history.read().view(start, end)
  }

  pub(crate) fn record_history(&self, entry: QueueEntry) {
    self.history.write().record(entry);
  }

  pub(crate) fn refresh_history(&self, entry: QueueEntry) {
    self.history.write().replace_front(entry);
  }

  pub fn is_looping(&self) -> bool {
    self.looping.load(Ordering::Acquire)
  }

  pub fn set_looping(&self, looping: bool) {
    self.looping.store(looping, Ordering::Release);
  }

  pub fn autoplay(&self) -> bool {
    self.autoplay.load(Ordering::Acquire)
  }

  pub fn set_autoplay(&self, autoplay: bool) {
    self.autoplay.store(autoplay, Ordering::Release);
  }

  /// True while a track is handed to the sink and has not finished.
  pub fn is_playing(&self) -> bool {
    self.playing.load(Ordering::Acquire)
  }

  pub(crate) fn set_playing(&self, playing: bool) {
    self.playing.store(playing, Ordering::Release);
    if !playing {
      self.track_token.store(0, Ordering::Release);
      self.paused.store(false, Ordering::Release);
    }
  }

  /// Completion token of the track on the sink, if one is playing. Skips
  /// carry it so a skip aimed at a finished track cannot hit the next one.
  pub fn track_token(&self) -> Option<u64> {
    match self.track_token.load(Ordering::Acquire) {
      0 => None,
      token => Some(token),
    }
  }

  pub(crate) fn start_track(&self, token: u64) {
    self.track_token.store(token, Ordering::Release);
    self.set_playing(true);
  }

  pub fn is_paused(&self) -> bool {
    self.paused.load(Ordering::Acquire)
  }

  pub(crate) fn set_paused(&self, paused: bool) {
    self.paused.store(paused, Ordering::Release);
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  pub(crate) fn close(&self) {
    self.closed.store(true, Ordering::Release);
  }

  pub fn volume(&self) -> f32 {
    *self.volume.lock()
  }

  pub fn set_volume(&self, volume: f32) {
    *self.volume.lock() = volume;
  }

  /// Adds a vote and returns the new tally. Repeated votes do not count.
  pub fn add_skip_vote(&self, user: UserId) -> usize {
    let mut votes = self.skip_votes.lock();
    votes.insert(user);
    votes.len()
  }

  pub fn skip_votes(&self) -> usize {
    self.skip_votes.lock().len()
  }

  pub fn clear_skip_votes(&self) {
    self.skip_votes.lock().clear();
  }
}
