//! Task pool: a fixed set of worker threads (one per [`Semaphore`] slot)
//! serving an unbounded job queue. `run` only enqueues and never blocks, so
//! a task submitted from inside another running task cannot deadlock against
//! the slot its parent still holds; queued work costs no OS thread until a
//! worker picks it up.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::Semaphore;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct WaitState {
    pending: Mutex<usize>,
    done: Condvar,
}

#[derive(Clone)]
pub struct TaskPool {
    jobs: Sender<Job>,
    wait_state: Arc<WaitState>,
    capacity: usize,
}

impl TaskPool {
    /// Spawn one worker per semaphore slot. Workers exit when every clone of
    /// the pool has been dropped.
    pub fn new(sem: Arc<Semaphore>) -> TaskPool {
        let (jobs, queue) = unbounded::<Job>();
        let wait_state = Arc::new(WaitState {
            pending: Mutex::new(0),
            done: Condvar::new(),
        });
        let capacity = sem.capacity();
        for _ in 0..capacity {
            spawn_worker(queue.clone(), Arc::clone(&sem), Arc::clone(&wait_state));
        }
        TaskPool {
            jobs,
            wait_state,
            capacity,
        }
    }

    /// Enqueue `f` as its own task. The caller never blocks; the task runs
    /// once a worker and a semaphore slot are available.
    pub fn run<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut pending = self.wait_state.pending.lock().unwrap();
            *pending += 1;
        }
        // Cannot fail: the workers' receiver lives as long as any sender.
        let _ = self.jobs.send(Box::new(f));
    }

    /// Block until every task submitted so far (including tasks submitted
    /// by other tasks in the meantime) has completed.
    pub fn wait(&self) {
        let mut pending = self.wait_state.pending.lock().unwrap();
        while *pending > 0 {
            pending = self.wait_state.done.wait(pending).unwrap();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn spawn_worker(queue: Receiver<Job>, sem: Arc<Semaphore>, wait_state: Arc<WaitState>) {
    thread::spawn(move || {
        while let Ok(job) = queue.recv() {
            sem.acquire();
            job();
            sem.release();
            let mut pending = wait_state.pending.lock().unwrap();
            *pending -= 1;
            if *pending == 0 {
                wait_state.done.notify_all();
            }
        }
    });
}
