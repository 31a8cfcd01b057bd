#![doc = include_str!("../README.md")]

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod supervisor;
pub mod task;
pub mod worker;

pub use config::Config;
pub use error::{CacheError, DispatchError, TaskError};
pub use supervisor::Supervisor;
pub use task::{ExecutionContext, HandlerRegistry, Payload, TaskHandler};

/// the current app version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
