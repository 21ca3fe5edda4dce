pub mod session;
pub mod session_manager;

pub use session::Session;
pub use session_manager::SessionManager;
