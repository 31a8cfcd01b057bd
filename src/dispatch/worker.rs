use anyhow::Result;
use async_channel::{bounded, Receiver, Sender};
use async_std::stream;
use async_std::sync::RwLock;
use async_std::task::JoinHandle;
use domain_keys::keys::RouteKey;
use futures::{select_biased, FutureExt, StreamExt};
use log::*;
use serde::{Deserialize, Serialize};
use service_uptime::Uptime;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheWorker;
use crate::config::{Backpressure, Config, DispatchConfig};
use crate::error::{DispatchError, TaskError};
use crate::logging::LogContext;
use crate::task::{ExecutionContext, HandlerRegistry, Payload};
use crate::worker::{enqueue, reply, Shutdown, ShutdownListener, WorkerState, WorkerStatus, OK};

/// One unit of work. The response channel belongs to the caller; the actor
/// writes to it at most once.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub task: String,
    pub payload: Payload,
    pub response: Sender<JobResponse>,
}

impl Job {
    /// a new job plus the receiving end of its single-slot response channel
    pub fn new(task: &str, payload: Payload) -> (Job, Receiver<JobResponse>) {
        let (response, rx) = bounded(1);
        let job = Job {
            id: RouteKey::create(),
            task: task.to_string(),
            payload,
            response,
        };

        (job, rx)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
    pub task: String,
    pub result: Result<Payload, TaskError>,
}

impl JobResponse {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn data(&self) -> Option<&Payload> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<Payload, TaskError> {
        self.result
    }
}

#[derive(Debug)]
pub enum Command {
    Submit(Job),
    /// replies with the dispatch status followed by its cache's status
    Status(Sender<Vec<WorkerStatus>>),
}

/// The dispatch actor's private state. Only `run` touches it.
struct DispatchActor {
    ctx: LogContext,
    config: DispatchConfig,
    registry: HandlerRegistry,
    lock: Arc<RwLock<()>>,
    cache: CacheWorker,
    cache_shutdown: Option<Shutdown>,
    cache_handle: JoinHandle<()>,
    uptime: Uptime,
    state: WorkerState,
    error_count: u16,
    heartbeats: u64,
    processed: u64,
}

impl DispatchActor {
    async fn run(mut self, rx: Receiver<Command>, shutdown: ShutdownListener) -> Result<()> {
        let mut heartbeat = stream::interval(self.config.heartbeat_interval());

        info!(target: self.ctx.target(), "dispatch {} running with tasks: {:?}", self.ctx.id(), self.registry.task_names());

        loop {
            select_biased! {
                _ = shutdown.recv().fuse() => {
                    info!(target: self.ctx.target(), "dispatch {} received shutdown", self.ctx.id());
                    break;
                }
                _ = heartbeat.next().fuse() => {
                    self.heartbeats += 1;
                    info!(target: self.ctx.target(), "dispatch {} alive", self.ctx.id());
                }
                cmd = rx.recv().fuse() => match cmd {
                    Ok(cmd) => self.command(cmd).await,
                    Err(_) => {
                        info!(target: self.ctx.target(), "dispatch {} job queue closed", self.ctx.id());
                        break;
                    }
                }
            }
        }

        // no new work from here on; submitters get a closed error
        rx.close();

        if self.config.drain_on_shutdown {
            self.state = WorkerState::Draining;
            info!(target: self.ctx.target(), "dispatch {} draining {} queued jobs", self.ctx.id(), rx.len());
            while let Ok(cmd) = rx.try_recv() {
                self.command(cmd).await;
            }
        } else {
            // dropping a job drops its response sender, which wakes the caller
            let mut abandoned = 0;
            while rx.try_recv().is_ok() {
                abandoned += 1;
            }
            if abandoned > 0 {
                warn!(target: self.ctx.target(), "dispatch {} abandoned {} queued jobs", self.ctx.id(), abandoned);
            }
        }

        self.state = WorkerState::Stopped;

        if let Some(cache_shutdown) = self.cache_shutdown.take() {
            cache_shutdown.signal();
        }
        self.cache_handle.await;

        info!(target: self.ctx.target(), "dispatch {} state: {:?}, processed: {}, errors: {}", self.ctx.id(), self.state, self.processed, self.error_count);

        Ok(())
    }

    async fn command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit(job) => self.execute(job).await,
            Command::Status(tx) => {
                let mut list = vec![self.status()];
                match self.cache.client().status().await {
                    Ok(status) => list.push(status),
                    Err(e) => warn!(target: self.ctx.target(), "cache status unavailable: {}", e),
                }

                if reply(list, tx).await > 0 {
                    self.error_count = self.error_count.saturating_add(1);
                    error!(target: self.ctx.target(), "error returning status for dispatch {}", self.ctx.id());
                }
            }
        }
    }

    /// look up, run, and answer exactly once
    async fn execute(&mut self, job: Job) {
        let Job {
            id,
            task,
            payload,
            response,
        } = job;

        self.processed += 1;

        let result = match self.registry.lookup(&task) {
            Ok(handler) => {
                let context = ExecutionContext::new(
                    &id,
                    &task,
                    self.lock.clone(),
                    self.cache.client(),
                    self.ctx.child("task", &id),
                );

                match AssertUnwindSafe(handler.handle(payload, &context))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(data)) => {
                        info!(target: self.ctx.target(), "processing of task {} completed, job: {}", task, id);
                        Ok(data)
                    }
                    Ok(Err(e)) => {
                        error!(target: self.ctx.target(), "failed to process task {}, job: {}: {:#}", task, id, e);
                        Err(TaskError::handler(&task, &e))
                    }
                    Err(_) => {
                        error!(target: self.ctx.target(), "task {} panicked, job: {}", task, id);
                        Err(TaskError::Panicked { task: task.clone() })
                    }
                }
            }
            Err(e) => {
                error!(target: self.ctx.target(), "job {} rejected: {}", id, e);
                Err(e)
            }
        };

        if result.is_err() {
            self.error_count = self.error_count.saturating_add(1);
        }

        let msg = JobResponse {
            job_id: id.clone(),
            task,
            result,
        };

        if reply(msg, response).await > 0 {
            warn!(target: self.ctx.target(), "caller gave up on job {} before the response", id);
        }
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus::new(
            self.ctx.id().to_string(),
            OK.to_string(),
            self.state,
            self.uptime.to_string(),
            self.error_count,
        )
        .with_counts(self.heartbeats, self.processed)
    }
}

/// Start the dispatch actor and the cache actor it owns.
///
/// Both stop when `shutdown` fires. With `drain_on_shutdown` the cache instead
/// gets a private signal that dispatch fires after the queue is drained, so
/// drained jobs can still use it.
pub fn start(
    config: &Config,
    registry: HandlerRegistry,
    shutdown: &Shutdown,
    parent: &LogContext,
) -> (Dispatcher, JoinHandle<()>) {
    let uptime = Uptime::new();
    let id = RouteKey::create();
    let ctx = parent.child("dispatch", &id);

    info!(target: ctx.target(), "starting up dispatch worker, id: {}", id);

    let (cache_shutdown, cache_listener) = if config.dispatch.drain_on_shutdown {
        let private = Shutdown::new();
        let listener = private.listener();
        (Some(private), listener)
    } else {
        (None, shutdown.listener())
    };

    let (cache, cache_handle) = CacheWorker::start(config.cache, cache_listener, &ctx);

    let (request_tx, request_receiver) = bounded(config.dispatch.queue.capacity.max(1));

    let actor = DispatchActor {
        ctx: ctx.clone(),
        config: config.dispatch,
        registry,
        lock: Arc::new(RwLock::new(())),
        cache,
        cache_shutdown,
        cache_handle,
        uptime: uptime.clone(),
        state: WorkerState::Running,
        error_count: 0,
        heartbeats: 0,
        processed: 0,
    };

    let listener = shutdown.listener();
    let handle = async_std::task::spawn(async move {
        let target = ctx.target().to_string();
        let id = ctx.id().to_string();
        match actor.run(request_receiver, listener).await {
            Ok(()) => info!(target: target.as_str(), "dispatch handler exit for worker id: {}", id),
            Err(e) => error!(target: target.as_str(), "dispatch worker exit with error: {:?}", e),
        }
    });

    let dispatcher = Dispatcher {
        id,
        uptime,
        request_tx,
        backpressure: config.dispatch.queue.backpressure,
        response_timeout: config.dispatch.response_timeout(),
    };

    (dispatcher, handle)
}

/// The submit-job interface: cheap to clone, one per caller if desired.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    id: String,
    uptime: Uptime,
    request_tx: Sender<Command>,
    backpressure: Backpressure,
    response_timeout: Option<Duration>,
}

impl Dispatcher {
    /// return the dispatch worker's id
    pub fn id(&self) -> String {
        self.id.to_string()
    }

    pub fn get_uptime(&self) -> String {
        self.uptime.to_string()
    }

    /// Enqueue a job and wait for its response, bounded by the configured timeout.
    pub async fn submit(&self, task: &str, payload: Payload) -> Result<JobResponse, DispatchError> {
        match self.response_timeout {
            Some(timeout) => self.submit_with_timeout(task, payload, timeout).await,
            None => {
                let (job, rx) = Job::new(task, payload);
                self.send_and_wait(job, rx).await
            }
        }
    }

    pub async fn submit_with_timeout(
        &self,
        task: &str,
        payload: Payload,
        timeout: Duration,
    ) -> Result<JobResponse, DispatchError> {
        let (job, rx) = Job::new(task, payload);
        let job_id = job.id.clone();

        match async_std::future::timeout(timeout, self.send_and_wait(job, rx)).await {
            Ok(resp) => resp,
            Err(_) => Err(DispatchError::Timeout {
                job_id,
                timeout_ms: timeout.as_millis(),
            }),
        }
    }

    /// submit and flatten the task's own error into the dispatch error
    pub async fn run(&self, task: &str, payload: Payload) -> Result<Payload, DispatchError> {
        let resp = self.submit(task, payload).await?;
        Ok(resp.into_result()?)
    }

    async fn send_and_wait(
        &self,
        job: Job,
        rx: Receiver<JobResponse>,
    ) -> Result<JobResponse, DispatchError> {
        let job_id = job.id.clone();
        enqueue(&self.request_tx, Command::Submit(job), self.backpressure).await?;

        rx.recv()
            .await
            .map_err(|_| DispatchError::Abandoned { job_id })
    }

    /// status of the dispatch worker and its cache worker
    pub async fn status(&self) -> Result<Vec<WorkerStatus>, DispatchError> {
        let (tx, rx) = bounded(1);
        enqueue(&self.request_tx, Command::Status(tx), self.backpressure).await?;
        rx.recv().await.map_err(|_| DispatchError::Closed)
    }

    /// number of jobs waiting in the queue
    pub fn queue_len(&self) -> usize {
        self.request_tx.len()
    }

    pub fn is_closed(&self) -> bool {
        self.request_tx.is_closed()
    }

    /// This is invoked by the client to enable sending raw commands to the worker
    pub fn request_channel(&self) -> Sender<Command> {
        self.request_tx.clone()
    }
}
