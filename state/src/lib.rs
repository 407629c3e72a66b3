// Agentkit State
// SQLite persistence of run traces and feedback

pub mod database;
pub mod error;

pub use database::{STATE_DB_FILE_NAME, StateDb};
pub use error::{Result, StateError};
