//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (request ID)
//!     → access_log.rs (one event per request)
//!     → server.rs (suffix dispatch, JSON decode)
//!     → control::Controller (check inline / report enqueue)
//!     → JSON response
//! ```

pub mod access_log;
pub mod request;
pub mod server;

pub use access_log::access_log_middleware;
pub use request::{request_id_middleware, RequestId, X_REQUEST_ID};
pub use server::{build_router, AppState, HttpServer};
