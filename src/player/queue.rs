use std::{collections::VecDeque, time::Duration};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::{sync::Notify, time::Instant};

use super::entry::QueueEntry;
use crate::common::errors::QueueError;

/// FIFO of pending tracks for one session.
///
/// Producers never block. The engine waits on [`PlaybackQueue::get`] with a
/// deadline so an idle session can fall back to autoplay or shut down.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
  entries: Mutex<VecDeque<QueueEntry>>,
  available: Notify,
}

impl PlaybackQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn put(&self, entry: QueueEntry) {
    self.entries.lock().push_back(entry);
    self.available.notify_one();
  }

  pub fn extend(&self, entries: impl IntoIterator<Item = QueueEntry>) {
    let mut queue = self.entries.lock();
    let before = queue.len();
    queue.extend(entries);
    if queue.len() > before {
      self.available.notify_one();
    }
  }

  pub fn try_get(&self) -> Option<QueueEntry> {
    self.entries.lock().pop_front()
  }

  /// Takes the oldest entry, waiting up to `timeout` for one to arrive.
  ///
  /// [`QueueError::TimedOut`] only means nothing arrived in time; the queue
  /// may well be filled again later.
  pub async fn get(&self, timeout: Duration) -> Result<QueueEntry, QueueError> {
    let deadline = Instant::now() + timeout;
    loop {
      let notified = self.available.notified();
      tokio::pin!(notified);
      // register before checking so a put in between is not missed
      notified.as_mut().enable();

      if let Some(entry) = self.try_get() {
        return Ok(entry);
      }
      if tokio::time::timeout_at(deadline, notified).await.is_err() {
        return Err(QueueError::TimedOut(timeout));
      }
    }
  }

  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.lock().is_empty()
  }

  /// Entries in `[start, end)` in queue order, clamped to the queue length.
  pub fn slice(&self, start: usize, end: usize) -> Vec<QueueEntry> {
    self
      .entries
      .lock()
      .iter()
      .skip(start)
      .take(end.saturating_sub(start))
      .cloned()
      .collect()
  }

  pub fn shuffle(&self) {
    let mut entries = self.entries.lock();
    entries.make_contiguous().shuffle(&mut rand::thread_rng());
  }

  pub fn remove(&self, index: usize) -> Result<QueueEntry, QueueError> {
    let mut entries = self.entries.lock();
    let len = entries.len();
    entries.remove(index).ok_or(QueueError::OutOfRange { index, len })
  }

  /// Drops every pending entry and returns how many there were.
  pub fn clear(&self) -> usize {
    let mut entries = self.entries.lock();
    let dropped = entries.len();
    entries.clear();
    dropped
  }
}
