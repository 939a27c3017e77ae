//! Classic thread-synchronization patterns, each runnable as a self-contained session.
//!
//! This crate provides:
//! - **Bounded buffer**: a fixed-capacity FIFO with timed blocking `put`/`get`
//! - **Producer-consumer**: producers and consumers around one bounded buffer
//! - **Worker pool**: a fixed number of workers draining a backlog of tasks
//! - **Readers-writers**: a readers-preference gate over a shared counter
//! - **Lock ordering**: two locks taken in one global order, and the opposed order that deadlocks
//! - **Contention drills**: the mutex-counter race check and a chunked parallel slice update
//!
//! # Examples
//!
//! ```rust
//! use foundation_patterns::scenarios::worker_pool::{WorkerPool, WorkerPoolConfig};
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new().max_workers(2).immediate())
//!     .expect("two workers is a valid pool");
//! let results = pool.run(5).expect("pool should run");
//!
//! assert_eq!(results.len(), 5);
//! assert_eq!(results.sorted_pairs(), vec![(0, 0), (1, 1), (2, 4), (3, 9), (4, 16)]);
//! ```
//!
//! Every session joins all of its threads before `run` returns, and every loop
//! re-checks both the session's [`StopSignal`] and the process-wide interrupt
//! signal installed by [`signals::install_interrupt_handler`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod contention;
pub mod errors;
pub mod pacing;
pub mod scenarios;
pub mod signals;

pub use config::DemoSettings;
pub use errors::{ConfigError, QueueError, SessionError, SessionResult, TaskFailure};
pub use pacing::DelayRange;
pub use signals::{SessionState, StopSignal};
