//! Check and report entry points.
//!
//! # Data Flow
//! ```text
//! transport (http/server.rs)
//!     → Controller::check  → CheckerManager::check → CheckResponse
//!     → Controller::report → report queue → ReportConsumerManager workers
//! ```

pub mod controller;
pub mod labels;
pub mod types;

pub use controller::{report_queue, Controller, ControllerError};
pub use types::{
    CheckError, CheckErrorCode, CheckRequest, CheckResponse, Distribution, ExponentialBuckets,
    LogEntry, MetricValue, MetricValueSet, Operation, ReportRequest, ReportResponse,
};
