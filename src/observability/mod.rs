//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms about the gateway itself)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Any `metrics` recorder installed by the embedding process
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all HTTP spans
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
