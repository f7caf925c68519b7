//! Adapter dispatch: resolution, checker execution and report fan-out.
//!
//! # Data Flow
//! ```text
//! CheckRequest
//!     → checker_manager.rs (snapshot load, resolver.rs, cached build, run all)
//!     → CheckResponse
//!
//! ReportRequest
//!     → report queue
//!     → consumer_manager.rs (N workers, every consumer in order)
//!     → batching.rs (optional per-consumer coalescing)
//! ```

pub mod batching;
pub mod checker_manager;
pub mod consumer_manager;
pub mod resolver;

pub use batching::{BatchingConfig, BatchingConsumer};
pub use checker_manager::{CheckerKey, CheckerManager};
pub use consumer_manager::{ReportConsumerManager, ReportReceiver};
pub use resolver::resolve;
