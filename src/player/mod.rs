pub mod engine;
pub mod entry;
pub mod events;
pub mod history;
pub mod queue;
pub mod sink;
pub mod state;

pub use engine::{EngineMessage, EngineSettings, PlaybackEngine};
pub use entry::QueueEntry;
pub use events::PlayerEvent;
pub use history::History;
pub use queue::PlaybackQueue;
pub use sink::{AudioSink, CompletionHandle};
pub use state::SessionState;
