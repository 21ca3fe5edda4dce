use std::collections::VecDeque;

use super::entry::QueueEntry;

/// Played tracks, most recent first, at most one entry per title.
#[derive(Debug, Default, Clone)]
pub struct History {
  entries: VecDeque<QueueEntry>,
}

impl History {
  pub fn new() -> Self {
    Self::default()
  }

  /// Puts `entry` at the front, dropping any older entry with its title.
  pub fn record(&mut self, entry: QueueEntry) {
    self.entries.retain(|e| e.title() != entry.title());
    self.entries.push_front(entry);
  }

  /// Swaps the front entry for an updated copy of the same track.
  pub fn replace_front(&mut self, entry: QueueEntry) {
    match self.entries.front_mut() {
      Some(front) if front.title() == entry.title() => *front = entry,
      _ => self.record(entry),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Entries in `[start, end)`, clamped to the history length.
  pub fn view(&self, start: usize, end: usize) -> Vec<QueueEntry> {
    self
      .entries
      .iter()
      .skip(start)
      .take(end.saturating_sub(start))
      .cloned()
      .collect()
  }
}
