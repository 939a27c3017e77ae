//! Classic synchronization patterns, each runnable as a session.
//!
//! - Bounded buffer and the producer-consumer session around it
//! - Worker pool
//! - Readers-writers
//! - Lock ordering

pub mod bounded_queue;
pub mod ordered_locks;
pub mod producer_consumer;
pub mod reader_writer;
pub mod worker_pool;

pub use bounded_queue::BoundedQueue;
pub use ordered_locks::{LockPair, OrderedLockDemo};
pub use producer_consumer::ProducerConsumerSession;
pub use reader_writer::ReaderWriterSession;
pub use worker_pool::WorkerPool;

use std::thread;

use crate::errors::{SessionError, SessionResult};

/// Named threads spawned by one session, joined together.
#[derive(Default)]
pub(crate) struct TaskGroup {
    handles: Vec<(String, thread::JoinHandle<()>)>,
}

impl TaskGroup {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn spawn<F>(&mut self, name: String, task: F) -> std::io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.clone()).spawn(task)?;
        tracing::trace!("Spawned session thread {}", &name);
        self.handles.push((name, handle));
        Ok(())
    }

    /// Joins every thread, then reports the first one that panicked.
    pub(crate) fn join_all(self) -> SessionResult<()> {
        tracing::debug!("Joining {} session threads", self.handles.len());
        let mut panicked = None;
        for (name, handle) in self.handles {
            if handle.join().is_err() {
                tracing::warn!("Session thread {} panicked", &name);
                panicked.get_or_insert(name);
            }
        }

        match panicked {
            Some(name) => Err(SessionError::ThreadPanicked(name)),
            None => Ok(()),
        }
    }
}
