/// the dispatch actor: the single point where jobs are taken in, matched to a
/// registered handler and run, one at a time.
///
/// On start it creates the cache actor it shares with every handler; it also
/// carries a heartbeat timer and listens for the shared shutdown signal.
///
pub mod worker;

pub use worker::{start, Command, Dispatcher, Job, JobResponse};
