// Harvest Infrastructure - SQLite Adapter
// Implements: RecordSink

mod connection;
mod error;
mod migration;
mod record_sink;

pub use connection::create_pool;
pub use error::map_sqlx_error;
pub use migration::run_migrations;
pub use record_sink::SqliteRecordSink;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
