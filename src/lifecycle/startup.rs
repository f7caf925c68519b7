//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the config manager from the services source and fetch once
//! - Create the checker manager and subscribe it to reloads
//! - Create the report queue, build consumers and start the workers
//! - Start the reload loop (and the file watcher when enabled)
//! - Tear everything down in reverse order on stop
//!
//! # Design Decisions
//! - A failed initial fetch is logged, not fatal: the gateway serves with an
//!   empty rule set until the next successful reload
//! - An unusable source locator is fatal
//! - Subsystems initialize in order; the listener is bound by the caller last

use std::sync::Arc;

use axum::Router;
use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::adapter::Registries;
use crate::config::services::ServicesConfig;
use crate::config::watcher::ServicesWatcher;
use crate::config::GatewayConfig;
use crate::control::{report_queue, Controller};
use crate::dispatch::{CheckerManager, ReportConsumerManager};
use crate::http::server::{build_router, AppState};
use crate::lifecycle::Shutdown;
use crate::reload::{source_from_locator, ConfigManager, FetchError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("services source: {0}")]
    Source(#[from] FetchError),

    #[error("services watcher: {0}")]
    Watch(#[from] notify::Error),
}

/// A running gateway, minus its HTTP listener.
pub struct Gateway {
    config: GatewayConfig,
    controller: Controller,
    checker_manager: Arc<CheckerManager>,
    config_manager: Arc<ConfigManager>,
    consumers: ReportConsumerManager,
    workers: Vec<JoinHandle<()>>,
    reload_task: JoinHandle<()>,
    shutdown: Shutdown,
    _watcher: Option<RecommendedWatcher>,
}

impl Gateway {
    pub async fn start(config: GatewayConfig, registries: Arc<Registries>) -> Result<Self, StartupError> {
        let source = source_from_locator(&config.services.source, config.services.fetch_timeout())?;

        let checker_manager = Arc::new(CheckerManager::new(Arc::new(ServicesConfig::default())));
        let mut config_manager =
            ConfigManager::new(source.clone(), registries.clone(), config.services.poll_interval());
        config_manager.register(checker_manager.clone());

        if let Err(e) = config_manager.fetch_and_notify().await {
            tracing::warn!(
                source = %source.describe(),
                error = %e,
                "Initial services config fetch failed, starting with no adapters"
            );
        }
        let config_manager = Arc::new(config_manager);

        let (report_tx, report_rx) = report_queue(config.reports.queue_capacity);
        let consumers = ReportConsumerManager::new(report_rx, &registries, &config.reports.consumers, &config);
        let workers = consumers.start(config.reports.workers);
        tracing::info!(
            workers = config.reports.workers,
            consumers = ?consumers.consumer_names(),
            "Report pipeline started"
        );

        let (watcher, triggers) = match (config.services.watch, source.local_path()) {
            (true, Some(path)) => {
                let (watcher, rx) = ServicesWatcher::new(&path);
                (Some(watcher.run()?), Some(rx))
            }
            (true, None) => {
                tracing::warn!(source = %source.describe(), "Watching is only supported for file sources");
                (None, None)
            }
            (false, _) => (None, None),
        };

        let shutdown = Shutdown::new();
        let reload_task = tokio::spawn(config_manager.clone().run(shutdown.subscribe(), triggers));

        Ok(Self {
            controller: Controller::new(checker_manager.clone(), report_tx),
            config,
            checker_manager,
            config_manager,
            consumers,
            workers,
            reload_task,
            shutdown,
            _watcher: watcher,
        })
    }

    /// Router over this gateway's controller and consumer endpoints.
    pub fn router(&self) -> Router {
        let state = AppState {
            controller: self.controller.clone(),
            config_manager: Some(self.config_manager.clone()),
        };
        build_router(
            state,
            self.consumers.prefix_and_handlers(),
            self.config.listener.request_timeout(),
        )
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn checker_manager(&self) -> &Arc<CheckerManager> {
        &self.checker_manager
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    /// Stops reloads, drains the report queue and unloads every checker.
    ///
    /// Routers handed out by [`Gateway::router`] hold queue senders; drop them
    /// first or the workers will not drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        if let Err(e) = self.reload_task.await {
            tracing::error!(error = %e, "Reload task failed");
        }

        drop(self.controller);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Report worker failed");
            }
        }
        self.consumers.close().await;
        self.checker_manager.unload_all();
        tracing::info!("Gateway stopped");
    }
}
