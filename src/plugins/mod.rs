//! Bundled adapters.
//!
//! | kind         | namespace       | module         |
//! |--------------|-----------------|----------------|
//! | `whitelist`  | checker         | `whitelist.rs` |
//! | `block`      | checker         | `block.rs`     |
//! | `prometheus` | report consumer | `prometheus.rs`|
//! | `statsd`     | report consumer | `statsd.rs`    |
//! | `log`        | report consumer | `log_sink.rs`  |

pub mod block;
pub mod log_sink;
pub mod prometheus;
pub mod statsd;
pub mod whitelist;

use std::sync::Arc;

use crate::adapter::{CheckerBuilder, ConsumerBuilder, Registries, RegistryError};

/// Registers every bundled adapter under its kind name.
pub fn register_builtins(registries: &mut Registries) -> Result<(), RegistryError> {
    let checkers: [(&str, Arc<dyn CheckerBuilder>); 2] = [
        (whitelist::NAME, Arc::new(whitelist::WhitelistBuilder)),
        (block::NAME, Arc::new(block::BlockBuilder)),
    ];
    for (kind, builder) in checkers {
        registries.checkers.register(kind, builder)?;
    }

    let consumers: [(&str, Arc<dyn ConsumerBuilder>); 3] = [
        (prometheus::NAME, Arc::new(prometheus::PrometheusConsumerBuilder)),
        (statsd::NAME, Arc::new(statsd::StatsdBuilder)),
        (log_sink::NAME, Arc::new(log_sink::LogSinkBuilder)),
    ];
    for (kind, builder) in consumers {
        registries.consumers.register(kind, builder)?;
    }
    Ok(())
}
