//! Report consumer plugin contract.

use std::fmt;
use std::sync::Arc;

use axum::routing::MethodRouter;
use thiserror::Error;

use crate::config::decode::ConfigSchema;
use crate::config::GatewayConfig;
use crate::control::ReportRequest;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsumerError {
    #[error("consumer build failed: {0}")]
    Build(String),

    #[error("consume failed: {0}")]
    Consume(String),
}

/// An HTTP sub-endpoint exposed by a consumer, e.g. a scrape handler.
#[derive(Clone)]
pub struct PrefixAndHandler {
    pub prefix: String,
    pub handler: MethodRouter,
}

impl fmt::Debug for PrefixAndHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefixAndHandler")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Receives report messages for export.
///
/// The same `Arc<ReportRequest>` is handed to every consumer, possibly from
/// several workers at once, so reports must be treated as read-only.
pub trait ReportConsumer: Send + Sync {
    fn name(&self) -> &str;

    /// Consumes a batch of reports in one call. Workers pass one report at a time.
    fn consume(&self, reports: &[Arc<ReportRequest>]) -> Result<(), ConsumerError>;

    fn prefix_and_handler(&self) -> Option<PrefixAndHandler> {
        None
    }
}

/// Builds consumers of one kind from the gateway settings.
pub trait ConsumerBuilder: Send + Sync {
    /// Params accepted by `reporters` entries of this kind in the services config.
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
    }

    fn build_consumer(&self, config: &GatewayConfig) -> Result<Arc<dyn ReportConsumer>, ConsumerError>;
}
