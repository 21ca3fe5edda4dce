/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

macro_rules! snowflake_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub u64);

    impl From<u64> for $name {
      fn from(u: u64) -> Self {
        Self(u)
      }
    }

    impl std::fmt::Display for $name {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
      }
    }
  };
}

snowflake_id!(
  /// Voice-chat guild (server) a session is bound to.
  GuildId
);
snowflake_id!(
  /// Text or voice channel id.
  ChannelId
);
snowflake_id!(
  /// User who requested a track.
  UserId
);

/// Identifies one engine run. A guild gets a fresh id every time its
/// session is recreated after teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
  pub fn generate() -> Self {
    Self(uuid::Uuid::new_v4())
  }
}

impl std::fmt::Display for SessionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0.simple())
  }
}
