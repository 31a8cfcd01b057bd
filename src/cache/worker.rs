use anyhow::Result;
use async_channel::{bounded, Receiver, Sender};
use async_std::stream;
use async_std::task::JoinHandle;
use domain_keys::keys::RouteKey;
use futures::{select_biased, FutureExt, StreamExt};
use hashbrown::HashMap;
use log::*;
use service_uptime::Uptime;

use crate::config::{Backpressure, CacheConfig};
use crate::error::CacheError;
use crate::logging::LogContext;
use crate::worker::{enqueue, reply, ShutdownListener, WorkerState, WorkerStatus, OK};

pub type CacheValue = serde_json::Value;

#[derive(Debug, Clone)]
pub enum CacheRequest {
    /// replies with None on a miss
    Get(String, Sender<Option<CacheValue>>),
    Set(String, CacheValue),
    Clear,
    Len(Sender<usize>),
    Status(Sender<WorkerStatus>), // request the worker's status
}

// the actor loop; the store never leaves this function
pub async fn handler(
    ctx: LogContext,
    config: CacheConfig,
    rx: Receiver<CacheRequest>,
    shutdown: ShutdownListener,
) -> Result<()> {
    let uptime = Uptime::new();
    let mut state = WorkerState::Running;
    let mut error_count = 0u16;
    let mut flushes = 0u64;
    let mut processed = 0u64;

    let mut store: HashMap<String, CacheValue> = HashMap::new();
    let mut flush_timer = stream::interval(config.flush_interval());

    info!(target: ctx.target(), "cache {} running, flush every {:?}", ctx.id(), config.flush_interval());

    loop {
        select_biased! {
            _ = shutdown.recv().fuse() => {
                info!(target: ctx.target(), "cache {} shutting down", ctx.id());
                break;
            }
            _ = flush_timer.next().fuse() => {
                store = HashMap::new();
                flushes += 1;
                info!(target: ctx.target(), "cache {} flushed", ctx.id());
            }
            request = rx.recv().fuse() => {
                let request = match request {
                    Ok(request) => request,
                    Err(_) => {
                        info!(target: ctx.target(), "cache {} request channel closed", ctx.id());
                        break;
                    }
                };

                processed += 1;
                match request {
                    CacheRequest::Get(key, tx) => {
                        debug!(target: ctx.target(), "get key: {}", key);
                        error_count = error_count.saturating_add(reply(store.get(&key).cloned(), tx).await);
                    }
                    CacheRequest::Set(key, value) => {
                        debug!(target: ctx.target(), "set key: {}", key);
                        store.insert(key, value);
                    }
                    CacheRequest::Clear => {
                        info!(target: ctx.target(), "cache {} clear request received", ctx.id());
                        store = HashMap::new();
                    }
                    CacheRequest::Len(tx) => {
                        error_count = error_count.saturating_add(reply(store.len(), tx).await);
                    }
                    CacheRequest::Status(tx) => {
                        let status = WorkerStatus::new(
                            ctx.id().to_string(),
                            OK.to_string(),
                            state,
                            uptime.to_string(),
                            error_count,
                        )
                        .with_counts(flushes, processed);

                        if reply(status, tx).await > 0 {
                            error_count = error_count.saturating_add(1);
                            error!(target: ctx.target(), "error returning status for cache {}", ctx.id());
                        }
                    }
                }
            }
        }
    }

    state = WorkerState::Stopped;

    // anything still queued is dropped; GET callers see their response channel close
    rx.close();
    let mut abandoned = 0;
    while rx.try_recv().is_ok() {
        abandoned += 1;
    }
    if abandoned > 0 {
        warn!(target: ctx.target(), "cache {} abandoned {} queued requests", ctx.id(), abandoned);
    }

    info!(target: ctx.target(), "cache {} state: {:?}, errors: {}", ctx.id(), state, error_count);

    Ok(())
}

/// Handle to a running cache actor.
#[derive(Debug, Clone)]
pub struct CacheWorker {
    id: String,
    uptime: Uptime,
    client: CacheClient,
}

impl CacheWorker {
    /// create and start a new cache actor; it stops when the listener fires.
    pub fn start(
        config: CacheConfig,
        shutdown: ShutdownListener,
        parent: &LogContext,
    ) -> (CacheWorker, JoinHandle<()>) {
        let uptime = Uptime::new();
        let id = RouteKey::create();
        let ctx = parent.child("cache", &id);

        info!(target: ctx.target(), "starting up cache worker, id: {}", id);

        let (request_tx, request_receiver) = bounded(config.queue.capacity.max(1));

        // run the handler loop as a background task
        let handle = async_std::task::spawn(async move {
            let target = ctx.target().to_string();
            let id = ctx.id().to_string();
            match handler(ctx, config, request_receiver, shutdown).await {
                Ok(()) => info!(target: target.as_str(), "cache handler exit for worker id: {}", id),
                Err(e) => error!(target: target.as_str(), "cache worker exit with error: {:?}", e),
            }
        });

        let worker = CacheWorker {
            id,
            uptime,
            client: CacheClient::new(request_tx, config.queue.backpressure),
        };

        (worker, handle)
    }

    /// return the worker's id
    pub fn id(&self) -> String {
        self.id.to_string()
    }

    /// return how long this worker has been alive
    pub fn get_uptime(&self) -> String {
        self.uptime.to_string()
    }

    /// the cache interface handed to task handlers
    pub fn client(&self) -> CacheClient {
        self.client.clone()
    }
}

/// The only way to reach the store: every call is a message to the cache actor.
#[derive(Debug, Clone)]
pub struct CacheClient {
    request_tx: Sender<CacheRequest>,
    backpressure: Backpressure,
}

impl CacheClient {
    pub fn new(request_tx: Sender<CacheRequest>, backpressure: Backpressure) -> CacheClient {
        CacheClient {
            request_tx,
            backpressure,
        }
    }

    async fn send(&self, request: CacheRequest) -> Result<(), CacheError> {
        enqueue(&self.request_tx, request, self.backpressure).await?;
        Ok(())
    }

    /// Ok(None) is a cache miss, not an error
    pub async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        let (tx, rx) = bounded(1);
        self.send(CacheRequest::Get(key.to_string(), tx)).await?;
        rx.recv().await.map_err(|_| CacheError::NoResponse)
    }

    pub async fn set<V: Into<CacheValue>>(&self, key: &str, value: V) -> Result<(), CacheError> {
        self.send(CacheRequest::Set(key.to_string(), value.into()))
            .await
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.send(CacheRequest::Clear).await
    }

    pub async fn len(&self) -> Result<usize, CacheError> {
        let (tx, rx) = bounded(1);
        self.send(CacheRequest::Len(tx)).await?;
        rx.recv().await.map_err(|_| CacheError::NoResponse)
    }

    pub async fn status(&self) -> Result<WorkerStatus, CacheError> {
        let (tx, rx) = bounded(1);
        self.send(CacheRequest::Status(tx)).await?;
        rx.recv().await.map_err(|_| CacheError::NoResponse)
    }

    pub fn is_closed(&self) -> bool {
        self.request_tx.is_closed()
    }

    /// This is invoked by the client to enable sending raw requests to the worker
    pub fn request_channel(&self) -> Sender<CacheRequest> {
        self.request_tx.clone()
    }
}
