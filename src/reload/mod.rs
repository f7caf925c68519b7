//! Services configuration reload.
//!
//! # Data Flow
//! ```text
//! ticker (5s) / watcher trigger
//!     → source.rs (file read or HTTP GET)
//!     → manager.rs (SHA-1 compare, YAML parse, conversion pass)
//!     → ConfigListener::config_change(Arc<ServicesConfig>) on every listener
//! ```

pub mod manager;
pub mod source;

pub use manager::{ConfigListener, ConfigManager, ReloadError, ReloadOutcome};
pub use source::{source_from_locator, ConfigSource, FetchError, FileSource, HttpSource};
