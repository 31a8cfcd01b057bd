/// the cache actor: a single owner of an in-memory key/value store.
/// use cases:
/// * spot-cache for task handlers that want to memoize work between jobs
/// * shared scratch state visible to every job run by the dispatch actor
///
/// The store is never pruned key by key; an explicit clear or the periodic flush
/// replaces it wholesale. Every get/set/clear is a message, so all operations
/// observe a single total order.
///
pub mod worker;

pub use worker::{CacheClient, CacheRequest, CacheValue, CacheWorker};
