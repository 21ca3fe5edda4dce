use crate::{
  common::types::{ChannelId, UserId},
  sources::TrackDescriptor,
};

/// A resolved track waiting in, or taken from, a session queue together
/// with the user who asked for it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
  descriptor: TrackDescriptor,
  requester: Option<UserId>,
}

impl QueueEntry {
  pub fn new(mut descriptor: TrackDescriptor, requester: Option<UserId>, channel: Option<ChannelId>) -> Self {
    descriptor.requester = requester;
    descriptor.channel = channel;
    Self {
      descriptor,
      requester,
    }
  }

  pub fn descriptor(&self) -> &TrackDescriptor {
    &self.descriptor
  }

  pub fn requester(&self) -> Option<UserId> {
    self.requester
  }

  pub fn title(&self) -> &str {
    &self.descriptor.title
  }

  /// Same requester, updated track data.
  pub fn with_descriptor(&self, descriptor: TrackDescriptor) -> Self {
    Self::new(descriptor, self.requester, self.descriptor.channel)
  }
}
