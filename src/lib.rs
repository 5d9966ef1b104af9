pub mod auth;
pub mod config;
pub mod core;
pub mod explorer;
pub mod firestore;
pub mod session;
pub mod storage;

pub use config::{ConfigError, ProjectConfig};
pub use crate::core::endpoints::Endpoints;
pub use session::{ConsoleSession, SessionError};
