use serde::Serialize;

use crate::{
  common::{
    errors::Severity,
    types::{GuildId, UserId},
  },
  sources::TrackDescriptor,
};

/// Notifications the engine publishes for the host to render.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
  /// Replaces any earlier now-playing notification of the guild.
  #[serde(rename_all = "camelCase")]
  NowPlaying {
    guild_id: GuildId,
    track: Box<TrackDescriptor>,
    requester: Option<UserId>,
    duration: String,
  },
  #[serde(rename_all = "camelCase")]
  DismissNowPlaying { guild_id: GuildId },
  #[serde(rename_all = "camelCase")]
  TrackException {
    guild_id: GuildId,
    title: String,
    message: String,
    severity: Severity,
  },
  #[serde(rename_all = "camelCase")]
  TornDown { guild_id: GuildId },
}
