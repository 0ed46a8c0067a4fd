//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait_for_shutdown_signal() returns
//!
//! Shutdown (shutdown.rs):
//!     trigger() → block ticker loop exits → monitor writes a final snapshot
//! ```
//!
//! # Design Decisions
//! - In-flight watches are not drained; their last transition is already
//!   persisted and they resume on the next start

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown_signal;
