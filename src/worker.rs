/// worker support structs shared by the cache and dispatch actors
///
use async_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::config::Backpressure;
use crate::error::QueueError;

pub type JsonString = String;

pub const OK: &str = "ok";

/// Running -> Draining -> Stopped; Draining is only entered when a drain is configured.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    #[default]
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub status: String,
    pub state: WorkerState,
    pub uptime: String,
    pub error_count: u16,
    /// timer ticks observed: heartbeats for dispatch, flushes for the cache
    pub ticks: u64,
    pub processed: u64,
}

impl WorkerStatus {
    pub fn new(
        worker_id: String,
        status: String,
        state: WorkerState,
        uptime: String,
        error_count: u16,
    ) -> WorkerStatus {
        WorkerStatus {
            worker_id,
            status,
            state,
            uptime,
            error_count,
            ticks: 0,
            processed: 0,
        }
    }

    pub fn with_counts(mut self, ticks: u64, processed: u64) -> WorkerStatus {
        self.ticks = ticks;
        self.processed = processed;
        self
    }

    pub fn to_json(&self) -> JsonString {
        match serde_json::to_string(self) {
            Ok(js) => js,
            Err(e) => {
                format!(r#"{}"status":"json parse error: {:?}"{}"#, "{", e, "}\n")
            }
        }
    }
}

/// A broadcast stop signal. Nothing is ever sent on the channel; closing it wakes
/// every listener at once. Dropping the last `Shutdown` has the same effect.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Shutdown {
    pub fn new() -> Shutdown {
        let (tx, rx) = async_channel::bounded(1);
        Shutdown { tx, rx }
    }

    /// fire the signal; returns true only for the call that actually closed it
    pub fn signal(&self) -> bool {
        self.tx.close()
    }

    pub fn is_signaled(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.rx.clone(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Shutdown::new()
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: Receiver<()>,
}

impl ShutdownListener {
    /// resolves once the signal has fired
    pub async fn recv(&self) {
        while self.rx.recv().await.is_ok() {}
    }

    pub fn is_signaled(&self) -> bool {
        self.rx.is_closed()
    }
}

/// send a message to an actor's inbound queue under the given backpressure policy
pub async fn enqueue<T>(tx: &Sender<T>, msg: T, policy: Backpressure) -> Result<(), QueueError> {
    match policy {
        Backpressure::Block => tx.send(msg).await.map_err(|_| QueueError::Closed),
        Backpressure::Reject => tx.try_send(msg).map_err(|e| match e {
            async_channel::TrySendError::Full(_) => QueueError::Full,
            async_channel::TrySendError::Closed(_) => QueueError::Closed,
        }),
    }
}

/// reply on a single-use response channel; returns 1 when the receiver is gone
pub async fn reply<T>(msg: T, tx: Sender<T>) -> u16 {
    if tx.send(msg).await.is_err() {
        1u16
    } else {
        0u16
    }
}
