//! Contention drills.
//!
//! - [`race_check`]: many threads incrementing one mutex-protected counter,
//!   repeated over several trials; every trial must land on exactly
//!   `tasks * iterations`.
//! - [`parallel_add`]: adds a value to every element of a slice, split into
//!   contiguous chunks handled by scoped threads.

use std::fmt;
use std::num::NonZeroUsize;
use std::ops::AddAssign;
use std::sync::{Mutex, MutexGuard};
use std::thread;

/// A counter whose every increment happens under a mutex.
#[derive(Debug, Default)]
pub struct LockedCounter {
    value: Mutex<u64>,
}

impl LockedCounter {
    /// Creates a new counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, u64> {
        match self.value.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }

    /// Adds one under the lock.
    pub fn increment(&self) {
        *self.guard() += 1;
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        *self.guard()
    }

    /// Sets the counter back to zero.
    pub fn reset(&self) {
        *self.guard() = 0;
    }
}

/// Spawns `tasks` threads that each increment `counter` `iterations` times,
/// and waits for all of them.
pub fn increment_concurrently(counter: &LockedCounter, tasks: usize, iterations: usize) {
    thread::scope(|scope| {
        for _ in 0..tasks {
            scope.spawn(|| {
                for _ in 0..iterations {
                    counter.increment();
                }
            });
        }
    });
}

/// Configuration for [`race_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceCheckConfig {
    tasks: usize,
    iterations: usize,
    trials: usize,
}

impl RaceCheckConfig {
    /// Defaults: 5 tasks × 1000 increments, repeated over 100 trials.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tasks: 5,
            iterations: 1_000,
            trials: 100,
        }
    }

    /// Sets the number of incrementing threads.
    #[must_use]
    pub const fn tasks(mut self, count: usize) -> Self {
        self.tasks = count;
        self
    }

    /// Sets the increments each thread performs.
    #[must_use]
    pub const fn iterations(mut self, count: usize) -> Self {
        self.iterations = count;
        self
    }

    /// Sets the number of trials.
    #[must_use]
    pub const fn trials(mut self, count: usize) -> Self {
        self.trials = count;
        self
    }

    /// Value every trial must reach.
    #[must_use]
    pub const fn expected(&self) -> u64 {
        (self.tasks as u64) * (self.iterations as u64)
    }
}

impl Default for RaceCheckConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`race_check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceCheckReport {
    /// Trials run.
    pub trials: usize,
    /// Value every trial should have reached.
    pub expected: u64,
    /// `(trial, observed)` for every trial that missed `expected`.
    pub mismatches: Vec<(usize, u64)>,
}

impl RaceCheckReport {
    /// Returns true when every trial reached `expected`.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl fmt::Display for RaceCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Race check: {} trials expecting {}, {} desynchronized",
            self.trials,
            self.expected,
            self.mismatches.len()
        )?;
        for (trial, observed) in &self.mismatches {
            write!(f, "\n  Trial {trial}: counted {observed}")?;
        }
        Ok(())
    }
}

/// Repeats the concurrent increment drill and records every trial that did
/// not land on the expected total.
#[must_use]
pub fn race_check(config: RaceCheckConfig) -> RaceCheckReport {
    let span = tracing::info_span!(
        "race_check",
        tasks = config.tasks,
        iterations = config.iterations
    );
    let _enter = span.enter();

    let counter = LockedCounter::new();
    let expected = config.expected();
    let mut mismatches = Vec::new();

    for trial in 0..config.trials {
        counter.reset();
        increment_concurrently(&counter, config.tasks, config.iterations);

        let observed = counter.get();
        if observed != expected {
            tracing::warn!("Trial {} desynchronized: {} != {}", trial, observed, expected);
            mismatches.push((trial, observed));
        }
    }

    RaceCheckReport {
        trials: config.trials,
        expected,
        mismatches,
    }
}

/// How a slice was divided between threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlan {
    /// Threads the slice was split across.
    pub threads: usize,
    /// Base chunk length.
    pub chunk: usize,
    /// The first `remainder` chunks carry one extra element.
    pub remainder: usize,
}

impl SplitPlan {
    /// Plans a split of `len` elements over at most `max_threads` threads.
    #[must_use]
    pub fn new(len: usize, max_threads: NonZeroUsize) -> Self {
        if len == 0 {
            return Self {
                threads: 0,
                chunk: 0,
                remainder: 0,
            };
        }

        let threads = len.min(max_threads.get());
        Self {
            threads,
            chunk: len / threads,
            remainder: len % threads,
        }
    }

    /// Length of the `index`-th chunk.
    #[must_use]
    pub fn chunk_len(&self, index: usize) -> usize {
        self.chunk + usize::from(index < self.remainder)
    }
}

/// Adds `addend` to every element using one thread per available core.
pub fn parallel_add<T>(values: &mut [T], addend: T) -> SplitPlan
where
    T: AddAssign + Copy + Send + Sync,
{
    let cores = thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
    parallel_add_with(values, addend, cores)
}

/// Adds `addend` to every element using at most `max_threads` threads.
pub fn parallel_add_with<T>(values: &mut [T], addend: T, max_threads: NonZeroUsize) -> SplitPlan
where
    T: AddAssign + Copy + Send + Sync,
{
    let plan = SplitPlan::new(values.len(), max_threads);
    tracing::debug!(
        "Splitting {} elements: chunk {}, remainder {}, threads {}",
        values.len(),
        plan.chunk,
        plan.remainder,
        plan.threads
    );

    let mut rest = values;
    thread::scope(|scope| {
        for index in 0..plan.threads {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(plan.chunk_len(index));
            rest = tail;
            scope.spawn(move || {
                for value in head {
                    *value += addend;
                }
            });
        }
    });

    plan
}
