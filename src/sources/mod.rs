pub mod cache;
pub mod classifier;
pub mod gdrive;
pub mod manager;
pub mod plugin;
pub mod tags;
pub mod track;
pub mod youtube;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheOutcome, MediaCache};
pub use classifier::{Classified, classify, cloud_file_link};
pub use manager::{LoadFailure, LoadResult, SourceManager};
pub use plugin::{BoxedProvider, Provider};
pub use track::{PlaylistSummary, ProviderKind, Thumbnail, TrackDescriptor, TrackReference};
