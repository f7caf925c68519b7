//! mixgate: a pluggable check/report mediation gateway.
//!
//! API frontends send admission checks and usage reports; each runs through
//! the adapters that the live services configuration binds to the
//! (source, destination, method) triple.

// Core
pub mod adapter;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod reload;

// Bundled adapters
pub mod plugins;

// Transport and process
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use adapter::Registries;
pub use config::GatewayConfig;
pub use control::Controller;
pub use lifecycle::Gateway;
