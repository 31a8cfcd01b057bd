/// error types for job execution, cache access and job submission
///
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// why a job failed; delivered to the caller inside the job response
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TaskError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("task {task} failed: {message}")]
    Handler { task: String, message: String },

    #[error("task {task} panicked")]
    Panicked { task: String },
}

impl TaskError {
    /// keep the handler's full error chain
    pub fn handler(task: &str, err: &anyhow::Error) -> TaskError {
        TaskError::Handler {
            task: task.to_string(),
            message: format!("{:#}", err),
        }
    }
}

/// result of pushing onto a bounded actor queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache queue is full")]
    QueueFull,
    #[error("cache worker is closed")]
    Closed,
    #[error("cache worker dropped the request without a response")]
    NoResponse,
}

impl From<QueueError> for CacheError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full => CacheError::QueueFull,
            QueueError::Closed => CacheError::Closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("job queue is full")]
    QueueFull,
    #[error("dispatch worker is closed")]
    Closed,
    #[error("job {job_id} was abandoned without a response")]
    Abandoned { job_id: String },
    #[error("job {job_id} timed out after {timeout_ms}ms")]
    Timeout { job_id: String, timeout_ms: u128 },
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl From<QueueError> for DispatchError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full => DispatchError::QueueFull,
            QueueError::Closed => DispatchError::Closed,
        }
    }
}
