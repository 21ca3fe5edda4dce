pub mod banner;
pub mod duration;
pub mod errors;
pub mod files;
pub mod http;
pub mod logger;
pub mod types;

pub use duration::format_duration;
pub use errors::*;
pub use files::sanitize_filename;
pub use http::*;
pub use types::*;
