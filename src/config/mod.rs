//! Configuration management subsystem.
//!
//! Two documents are handled here:
//! - gateway settings (TOML), loaded once at startup
//! - the services configuration (YAML), fetched repeatedly and swapped live
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! services bytes (file / http)
//!     → services.rs (YAML → ServicesConfig, params still raw)
//!     → convert.rs (bind kinds to builders, decode.rs typed params)
//!     → Arc<ServicesConfig> published by the reload manager
//!
//! watcher.rs detects a file change → immediate reload trigger
//! ```
//!
//! # Design Decisions
//! - Config is immutable once converted; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod convert;
pub mod decode;
pub mod loader;
pub mod schema;
pub mod services;
pub mod validation;
pub mod watcher;

pub use convert::{convert_params, AdapterBuilder, ConversionError};
pub use decode::{decode, ConfigSchema, DecodeError, FieldKind, TypedParams, TypedValue};
pub use loader::{load_config, ConfigError};
pub use schema::{BatchSettings, GatewayConfig};
pub use services::{
    AdapterConfig, AdapterParams, BindingConfig, ResolveKey, RpcMethod, ServiceConfig,
    ServicesConfig, EVERY_SERVICE,
};
