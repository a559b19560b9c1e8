//! Concurrency utilities: a counting semaphore that caps in-flight
//! filesystem calls, and a fixed-worker task pool fed by a non-blocking
//! job queue.

pub mod pool;
pub mod semaphore;

pub use pool::TaskPool;
pub use semaphore::{Semaphore, default_capacity};
