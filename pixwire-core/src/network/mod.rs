//! TCP ingest.

mod server;

pub use server::{StreamServer, serve_connection};

/// Port the receiver listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 6556;
