//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     services source → initial fetch → checker manager
//!     → report queue + workers → reload loop (+ watcher)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop accepting HTTP traffic
//!
//! Shutdown (shutdown.rs, Gateway::stop):
//!     stop reload loop → drain report queue → flush batches → unload checkers
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Gateway, StartupError};
