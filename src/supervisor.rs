/// owns the shutdown signal and the dispatch worker's lifecycle
///
use anyhow::{anyhow, Result};
use async_std::task::JoinHandle;
use log::*;

use crate::config::Config;
use crate::dispatch::{self, Dispatcher, JobResponse};
use crate::error::DispatchError;
use crate::logging::LogContext;
use crate::task::{HandlerRegistry, Payload};
use crate::worker::{Shutdown, WorkerStatus};

#[derive(Debug)]
pub struct Supervisor {
    config: Config,
    shutdown: Shutdown,
    dispatcher: Dispatcher,
    handle: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// validate the config and start the dispatch worker (which starts its cache)
    pub fn start(config: Config, registry: HandlerRegistry) -> Result<Supervisor> {
        Supervisor::start_with_log(config, registry, &LogContext::default())
    }

    pub fn start_with_log(
        config: Config,
        registry: HandlerRegistry,
        log: &LogContext,
    ) -> Result<Supervisor> {
        config.validate()?;

        let shutdown = Shutdown::new();
        let (dispatcher, handle) = dispatch::start(&config, registry, &shutdown, log);

        info!(target: log.target(), "supervisor started dispatch worker {}", dispatcher.id());

        Ok(Supervisor {
            config,
            shutdown,
            dispatcher,
            handle: Some(handle),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// a handle for callers; clone freely
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// the shared stop signal, for a transport layer that wants to fire it itself
    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub async fn submit(&self, task: &str, payload: Payload) -> Result<JobResponse, DispatchError> {
        self.dispatcher.submit(task, payload).await
    }

    pub async fn status(&self) -> Result<Vec<WorkerStatus>, DispatchError> {
        self.dispatcher.status().await
    }

    /// Signal both actors and wait for them, no longer than the configured grace period.
    pub async fn shutdown(mut self) -> Result<()> {
        let grace = self.config.shutdown_grace();
        info!("shutdown pipeline, grace: {:?}", grace);

        self.shutdown.signal();

        if let Some(handle) = self.handle.take() {
            async_std::future::timeout(grace, handle)
                .await
                .map_err(|_| anyhow!("workers did not stop within {:?}", grace))?;
        }

        info!("workers shut down gracefully");

        Ok(())
    }
}
