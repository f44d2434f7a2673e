// Session engine shared by the binary and the headless tests.
// Terminal rendering stays in the binary.
pub mod answers;
pub mod app_dirs;
pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod integrity;
pub mod journal;
pub mod model;
pub mod runtime;
pub mod session;
pub mod timer;
pub mod util;

pub use error::SessionError;
pub use session::{SessionController, SessionSnapshot, SessionState};
