//! Adapter contracts and the plugin registry.
//!
//! # Data Flow
//! ```text
//! startup:
//!     plugins::register_builtins(&mut Registries)
//!         → Registry<dyn CheckerBuilder>   (checkers namespace)
//!         → Registry<dyn ConsumerBuilder>  (report consumers namespace)
//!     → Arc<Registries> handed to conversion, checker manager, consumer manager
//!
//! request time:
//!     CheckerBuilder::build_checker(typed params) → Arc<dyn Checker>
//!     ConsumerBuilder::build_consumer(gateway config) → Arc<dyn ReportConsumer>
//! ```
//!
//! # Design Decisions
//! - Registries are explicit values, never process globals
//! - Builder identity is pointer identity: re-registering the same `Arc` is a no-op
//! - Builders declare a `ConfigSchema`; typed params are decoded before any build

pub mod checker;
pub mod consumer;
pub mod registry;

pub use checker::{AdapterError, Checker, CheckerBuilder};
pub use consumer::{ConsumerBuilder, ConsumerError, PrefixAndHandler, ReportConsumer};
pub use registry::{Registries, Registry, RegistryError};
