//! Request/response log persistence
//!
//! Every validated call to the proxy leaves:
//! - one `request_logs` row, written before any upstream attempt
//! - at most one `response_logs` row referencing it, written afterwards
//!
//! ```text
//! request_logs (id) <──1:1── response_logs (request_id)
//! ```

pub mod cleanup;
pub mod database;
pub mod records;

pub use cleanup::{run_cleanup_now, spawn_cleanup_task, CleanupConfig};
pub use database::{LogDb, LogStore};
pub use records::{
    CleanupStats, LogStats, NewRequestLog, NewResponseLog, RequestLog, ResponseLog,
    ResponseStatus, TokenCounts,
};
