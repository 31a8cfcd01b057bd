/// log4rs setup and the per-actor log context
///
use anyhow::{anyhow, Result};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {l} {t} - {m}{n}";

/// Install the log4rs backend; reads the yaml file when given, otherwise logs to stdout.
pub fn init(config_file: Option<&str>) -> Result<()> {
    if let Some(path) = config_file {
        return log4rs::init_file(path, Default::default())
            .map_err(|e| anyhow!("log config {}: {}", path, e));
    }

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))?;

    log4rs::init_config(config)?;

    Ok(())
}

/// Where an actor writes its log lines. Each actor gets its own target so the
/// log4rs config can route or silence it independently of the others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    target: String,
    id: String,
}

impl LogContext {
    pub fn new(target: &str, id: &str) -> LogContext {
        LogContext {
            target: target.to_string(),
            id: id.to_string(),
        }
    }

    /// a nested context, e.g. `dispatch_lib::dispatch::task` for a job run by dispatch
    pub fn child(&self, name: &str, id: &str) -> LogContext {
        LogContext {
            target: format!("{}::{}", self.target, name),
            id: id.to_string(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Default for LogContext {
    fn default() -> Self {
        LogContext::new("dispatch_lib", "main")
    }
}
