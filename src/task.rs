/// task handlers, the read-only registry that names them, and the
/// per-job execution context they run with
///
use anyhow::{anyhow, Result};
use async_std::sync::RwLock;
use async_trait::async_trait;
use hashbrown::HashMap;
use log::*;
use std::fmt;
use std::sync::Arc;

use crate::cache::CacheClient;
use crate::error::TaskError;
use crate::logging::LogContext;

/// opaque job input and output
pub type Payload = serde_json::Value;

/// A named unit of business logic run by the dispatch actor.
///
/// Handlers reach shared state only through the [`ExecutionContext`]: the cache
/// client for the cache actor, and the execution lock for any extra state a
/// handler introduces.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, payload: Payload, ctx: &ExecutionContext) -> Result<Payload>;
}

/// Built for one handler invocation and dropped when it returns.
#[derive(Clone)]
pub struct ExecutionContext {
    job_id: String,
    task: String,
    lock: Arc<RwLock<()>>,
    cache: CacheClient,
    log: LogContext,
}

impl ExecutionContext {
    pub fn new(
        job_id: &str,
        task: &str,
        lock: Arc<RwLock<()>>,
        cache: CacheClient,
        log: LogContext,
    ) -> ExecutionContext {
        ExecutionContext {
            job_id: job_id.to_string(),
            task: task.to_string(),
            lock,
            cache,
            log,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn task_name(&self) -> &str {
        &self.task
    }

    /// the execution lock owned by the dispatch actor
    pub fn lock(&self) -> &RwLock<()> {
        &self.lock
    }

    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }

    pub fn log(&self) -> &LogContext {
        &self.log
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("job_id", &self.job_id)
            .field("task", &self.task)
            .finish()
    }
}

/// Fixed map from task name to handler; populated once and never mutated.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// a registry holding the built-in handlers
    pub fn with_defaults() -> HandlerRegistry {
        HandlerRegistry::builder().register(SampleTask).build()
    }

    /// checked lookup; a miss is reported as an unknown task
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn TaskHandler>, TaskError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("tasks", &self.task_names())
            .finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl RegistryBuilder {
    /// add a handler under its own name; a later registration replaces an earlier one
    pub fn register<H: TaskHandler + 'static>(mut self, handler: H) -> RegistryBuilder {
        let name = handler.name().to_string();
        if self.handlers.insert(name.clone(), Arc::new(handler)).is_some() {
            warn!("task handler {} registered twice, keeping the last one", name);
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}

/// Upper-cases a string payload and memoizes the result in the cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleTask;

impl SampleTask {
    pub const NAME: &'static str = "sampleTask";

    pub fn cache_key(text: &str) -> String {
        format!("{}:{}", SampleTask::NAME, text)
    }
}

#[async_trait]
impl TaskHandler for SampleTask {
    fn name(&self) -> &str {
        SampleTask::NAME
    }

    async fn handle(&self, payload: Payload, ctx: &ExecutionContext) -> Result<Payload> {
        let text = payload
            .as_str()
            .ok_or_else(|| anyhow!("expected a string payload, got: {}", payload))?;

        let key = SampleTask::cache_key(text);
        if let Some(hit) = ctx.cache().get(&key).await? {
            debug!(target: ctx.log().target(), "job {} cache hit for {}", ctx.job_id(), key);
            return Ok(hit);
        }

        let result = Payload::String(text.to_uppercase());
        ctx.cache().set(&key, result.clone()).await?;

        Ok(result)
    }
}
