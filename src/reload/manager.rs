//! Live reload of the services configuration.
//!
//! # Responsibilities
//! - Periodically fetch the services configuration from its source
//! - Skip payloads whose SHA-1 matches the last applied one
//! - Parse, convert against the registries, and hand the new snapshot to
//!   every registered listener
//!
//! # Design Decisions
//! - One immediate fetch, then a fixed interval; file watcher triggers
//!   cause an extra fetch in between
//! - Fetch and parse errors are logged and leave the previous snapshot in
//!   place; the digest is only recorded once a snapshot was applied
//! - Reloads are serialised by an async mutex, so they never overlap

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time;

use crate::adapter::Registries;
use crate::config::convert::convert_params;
use crate::config::services::ServicesConfig;
use crate::observability::metrics;
use crate::reload::source::{ConfigSource, FetchError};

/// Receives every newly applied services snapshot.
pub trait ConfigListener: Send + Sync {
    fn config_change(&self, config: Arc<ServicesConfig>);
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("parsing services config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new snapshot was installed. Carries the number of conversion errors.
    Applied { conversion_errors: usize },
    /// The payload matched the last applied digest.
    Unchanged,
}

pub struct ConfigManager {
    source: Arc<dyn ConfigSource>,
    registries: Arc<Registries>,
    interval: Duration,
    listeners: Vec<Arc<dyn ConfigListener>>,
    digest: RwLock<Option<String>>,
    in_flight: Mutex<()>,
}

impl ConfigManager {
    pub fn new(source: Arc<dyn ConfigSource>, registries: Arc<Registries>, interval: Duration) -> Self {
        Self {
            source,
            registries,
            interval,
            listeners: Vec::new(),
            digest: RwLock::new(None),
            in_flight: Mutex::new(()),
        }
    }

    pub fn register(&mut self, listener: Arc<dyn ConfigListener>) {
        self.listeners.push(listener);
    }

    /// Hex SHA-1 of the last applied payload.
    pub fn current_digest(&self) -> Option<String> {
        self.digest.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Fetches once and notifies listeners if the payload changed.
    pub async fn fetch_and_notify(&self) -> Result<ReloadOutcome, ReloadError> {
        let _guard = self.in_flight.lock().await;

        let data = self.source.fetch().await?;
        let digest = hex::encode(Sha1::digest(&data));
        if self.current_digest().as_deref() == Some(digest.as_str()) {
            return Ok(ReloadOutcome::Unchanged);
        }

        let mut config = ServicesConfig::from_yaml(&data)?;
        let errors = convert_params(&mut config, &self.registries);
        for error in &errors {
            tracing::warn!(error = %error, "Adapter entry disabled");
        }

        *self.digest.write().unwrap_or_else(PoisonError::into_inner) = Some(digest.clone());

        let config = Arc::new(config);
        for listener in &self.listeners {
            listener.config_change(config.clone());
        }

        tracing::info!(
            source = %self.source.describe(),
            digest = %digest,
            services = config.services.len(),
            conversion_errors = errors.len(),
            "Services config applied"
        );
        Ok(ReloadOutcome::Applied {
            conversion_errors: errors.len(),
        })
    }

    async fn reload(&self) {
        match self.fetch_and_notify().await {
            Ok(ReloadOutcome::Applied { .. }) => metrics::record_config_reload("applied"),
            Ok(ReloadOutcome::Unchanged) => metrics::record_config_reload("unchanged"),
            Err(e) => {
                tracing::error!(source = %self.source.describe(), error = %e, "Services config reload failed");
                metrics::record_config_reload("error");
            }
        }
    }

    /// Reload loop. Runs until `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
        mut triggers: Option<mpsc::UnboundedReceiver<()>>,
    ) {
        tracing::info!(
            source = %self.source.describe(),
            interval_secs = self.interval.as_secs(),
            "Config manager starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reload().await;
                }
                trigger = next_trigger(&mut triggers) => {
                    match trigger {
                        Some(()) => self.reload().await,
                        None => triggers = None,
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Config manager received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

async fn next_trigger(triggers: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match triggers {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
