//! ASCII-Chat server core: accept/lifecycle management, per-client task
//! fabric, bounded media queues, render ticks and the stats loop.
//!
//! The binary in `main.rs` wires configuration and signals around
//! [`server::run`]; everything else lives here so integration tests can
//! drive a real server on an ephemeral port.

pub mod buffers;
pub mod client;
pub mod config;
pub mod error;
pub mod listener;
pub mod palette;
pub mod render;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod stats;
pub mod sync;

pub use config::ServerConfig;
pub use shutdown::ShutdownToken;
pub use state::ServerState;
