//! Counting semaphore over a bounded channel. Caps the number of
//! concurrently outstanding stat/readdir/file calls so the engine never
//! exhausts file descriptors or OS threads.

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::utils::fd_limit::max_tasks_by_fd_limit;

pub struct Semaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
    capacity: usize,
}

impl Semaphore {
    pub fn new(capacity: usize) -> Semaphore {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Semaphore { tx, rx, capacity }
    }

    /// Blocks until a slot is free. The channel outlives every caller, so
    /// the send cannot fail.
    pub fn acquire(&self) {
        let _ = self.tx.send(());
    }

    pub fn release(&self) {
        let _ = self.rx.recv();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Default semaphore capacity: twice the logical CPU count, additionally
/// capped so we stay under the process FD limit.
pub fn default_capacity() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let capacity = cpus * 2;
    match max_tasks_by_fd_limit() {
        Some(max) => capacity.min(max).max(1),
        None => capacity,
    }
}
