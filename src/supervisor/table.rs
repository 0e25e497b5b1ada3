//! The worker table: the ordered collection of live workers.
//!
//! Order across workers carries no semantic meaning, which is what licenses
//! O(1) swap-with-last removal.

#![allow(dead_code)] // Some accessors are only exercised by tests

use crate::supervisor::worker::Worker;

#[derive(Default)]
pub struct WorkerTable {
    workers: Vec<Worker>,
}

impl WorkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.iter()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Worker> {
        self.workers.get_mut(index)
    }

    pub fn push(&mut self, worker: Worker) {
        self.workers.push(worker);
    }

    /// Drop every worker record. Used in the forked child, where the
    /// inherited pipe read ends must not leak into the new process image.
    pub fn clear(&mut self) {
        self.workers.clear();
    }

    /// Sweep for terminated workers.
    ///
    /// For each one: flush any residual stderr fragment to supervisor
    /// stderr, report `Process <pid> exited (<status>)` on stdout, and
    /// remove the record. Removal is swap-with-last, so the freed slot is
    /// re-examined before the index advances. Returns how many workers were
    /// reaped.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        let mut index = 0;
        while index < self.workers.len() {
            match self.workers[index].try_wait() {
                Some(status) => {
                    let mut worker = self.workers.swap_remove(index);
                    worker.flush_residual();
                    println!("Process {} exited ({})", worker.pid(), status);
                    reaped += 1;
                }
                None => index += 1,
            }
        }
        reaped
    }
}
