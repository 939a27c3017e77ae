//! Fixed-size worker pool draining a backlog of numbered tasks.

use core::time::Duration;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use concurrent_queue::ConcurrentQueue;

use super::TaskGroup;
use crate::errors::{BoxedError, ConfigError, SessionResult, TaskFailure};
use crate::pacing::{thread_rng, DelayRange};
use crate::signals::{interrupt_signal, StopSignal};

type TaskOutcome = Result<u64, TaskFailure>;

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    max_workers: usize,
    task_delay: DelayRange,
    seed: Option<u64>,
}

impl WorkerPoolConfig {
    /// Defaults: 4 workers, each default task takes 0.5–2.0s.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_workers: 4,
            task_delay: DelayRange::millis(500, 2_000),
            seed: None,
        }
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub const fn max_workers(mut self, count: usize) -> Self {
        self.max_workers = count;
        self
    }

    /// Sets how long the default task sleeps before computing its result.
    #[must_use]
    pub const fn task_delay(mut self, delay: DelayRange) -> Self {
        self.task_delay = delay;
        self
    }

    /// Sets the seed for the task delays.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Removes the task delay, for tests.
    #[must_use]
    pub const fn immediate(self) -> Self {
        self.task_delay(DelayRange::ZERO)
    }

    /// Returns the number of worker threads.
    #[must_use]
    pub const fn get_max_workers(&self) -> usize {
        self.max_workers
    }

    /// # Errors
    ///
    /// Rejects a pool without workers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The deterministic part of the default task.
#[must_use]
pub fn square(task_id: usize) -> u64 {
    let id = task_id as u64;
    id * id
}

/// Outcome of every task submitted to one [`WorkerPool::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResults {
    outcomes: BTreeMap<usize, TaskOutcome>,
    completion_order: Vec<usize>,
    peak_concurrency: usize,
    elapsed: Duration,
}

impl TaskResults {
    /// Number of tasks reported, always the number submitted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true when no task was submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Returns the outcome of one task.
    #[must_use]
    pub fn get(&self, task_id: usize) -> Option<&TaskOutcome> {
        self.outcomes.get(&task_id)
    }

    /// Successful `(task_id, result)` pairs sorted by task id.
    #[must_use]
    pub fn sorted_pairs(&self) -> Vec<(usize, u64)> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| outcome.as_ref().ok().map(|value| (*id, *value)))
            .collect()
    }

    /// Failed tasks sorted by task id.
    #[must_use]
    pub fn failures(&self) -> Vec<(usize, &TaskFailure)> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| outcome.as_ref().err().map(|failure| (*id, failure)))
            .collect()
    }

    /// Returns how many tasks produced a value.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|outcome| outcome.is_ok()).count()
    }

    /// Task ids in the order their outcomes were reported.
    #[must_use]
    pub fn completion_order(&self) -> &[usize] {
        &self.completion_order
    }

    /// Most tasks observed running at the same time.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak_concurrency
    }

    /// Returns the wall-clock time of the run.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl fmt::Display for TaskResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "All tasks completed in {:.2?}", self.elapsed)?;
        writeln!(f, "Results: {:?}", self.sorted_pairs())?;
        let failures = self.failures();
        if failures.is_empty() {
            write!(f, "Failures: none")
        } else {
            write!(f, "Failures:")?;
            for (id, failure) in failures {
                write!(f, "\n  Task {id}: {failure}")?;
            }
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
struct Occupancy {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A pool of at most `max_workers` threads executing numbered tasks.
///
/// Every task id in `0..task_count` is queued up front, workers take ids
/// off the backlog until it is empty. A task that errors or panics is
/// recorded as a [`TaskFailure`] and the worker moves on.
///
/// # Examples
///
/// ```
/// use foundation_patterns::scenarios::worker_pool::{WorkerPool, WorkerPoolConfig};
///
/// let pool = WorkerPool::new(WorkerPoolConfig::new().max_workers(3)).unwrap();
/// let results = pool
///     .run_with(4, |id| if id == 2 { Err("bad input".into()) } else { Ok(id as u64 + 10) })
///     .unwrap();
///
/// assert_eq!(results.len(), 4);
/// assert_eq!(results.sorted_pairs(), vec![(0, 10), (1, 11), (3, 13)]);
/// assert_eq!(results.failures().len(), 1);
/// ```
pub struct WorkerPool {
    config: WorkerPoolConfig,
    interrupt: StopSignal,
}

impl WorkerPool {
    /// # Errors
    ///
    /// Returns [`crate::SessionError::InvalidConfig`] when `max_workers` is 0.
    pub fn new(config: WorkerPoolConfig) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            interrupt: interrupt_signal(),
        })
    }

    /// Replaces the process-wide interrupt signal this pool watches.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: StopSignal) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Returns the pool's configuration.
    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Runs the default task for ids `0..task_count`: sleep a random delay,
    /// then return the square of the id.
    ///
    /// The sleep ends early on interrupt and the task reports
    /// [`TaskFailure::Cancelled`].
    ///
    /// # Errors
    ///
    /// Fails only if a worker thread cannot be spawned or dies outside the
    /// per-task boundary.
    pub fn run(&self, task_count: usize) -> SessionResult<TaskResults> {
        let delay = self.config.task_delay;
        let seed = self.config.seed;
        let interrupt = self.interrupt.clone();

        self.run_with(task_count, move |task_id| {
            let mut rng = thread_rng(seed, task_id as u64);
            let processing = delay.sample(&mut rng);
            tracing::info!("Task {}: Starting (will take {:.2?})", task_id, processing);
            if interrupt.sleep(processing) {
                tracing::info!("Task {}: Interrupted while processing", task_id);
                return Err(TaskFailure::Cancelled.into());
            }
            let result = square(task_id);
            tracing::info!("Task {}: Completed with result {}", task_id, result);
            Ok(result)
        })
    }

    /// Runs `task` for every id in `0..task_count` and waits for all of them.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::run`].
    pub fn run_with<F>(&self, task_count: usize, task: F) -> SessionResult<TaskResults>
    where
        F: Fn(usize) -> Result<u64, BoxedError> + Send + Sync + 'static,
    {
        let span = tracing::info_span!(
            "WorkerPool::run",
            tasks = task_count,
            max_workers = self.config.max_workers
        );
        let _enter = span.enter();

        tracing::info!(
            "Running worker pool with {} tasks and {} workers",
            task_count,
            self.config.max_workers
        );

        let started = Instant::now();
        let backlog = Arc::new(ConcurrentQueue::unbounded());
        let results = Arc::new(ConcurrentQueue::unbounded());
        let occupancy = Arc::new(Occupancy::default());
        let task = Arc::new(task);

        for task_id in 0..task_count {
            if let Err(err) = backlog.push(task_id) {
                tracing::warn!("Backlog refused task {}: {}", task_id, err);
            }
        }

        let worker_count = self.config.max_workers.min(task_count);
        let mut group = TaskGroup::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let worker = Worker {
                id: worker_id,
                backlog: Arc::clone(&backlog),
                results: Arc::clone(&results),
                occupancy: Arc::clone(&occupancy),
                interrupt: self.interrupt.clone(),
                task: Arc::clone(&task),
            };

            if let Err(err) = group.spawn(format!("Worker-{worker_id}"), move || worker.run()) {
                tracing::warn!("Failed to spawn worker {}: {}", worker_id, err);
                group.join_all()?;
                return Err(err.into());
            }
        }

        group.join_all()?;

        let mut outcomes = BTreeMap::new();
        let mut completion_order = Vec::with_capacity(task_count);
        for (task_id, outcome) in results.try_iter() {
            completion_order.push(task_id);
            outcomes.insert(task_id, outcome);
        }

        let results = TaskResults {
            outcomes,
            completion_order,
            peak_concurrency: occupancy.peak.load(Ordering::SeqCst),
            elapsed: started.elapsed(),
        };
        tracing::info!("All tasks completed in {:?}", results.elapsed);
        Ok(results)
    }
}

struct Worker<F> {
    id: usize,
    backlog: Arc<ConcurrentQueue<usize>>,
    results: Arc<ConcurrentQueue<(usize, TaskOutcome)>>,
    occupancy: Arc<Occupancy>,
    interrupt: StopSignal,
    task: Arc<F>,
}

impl<F> Worker<F>
where
    F: Fn(usize) -> Result<u64, BoxedError>,
{
    fn run(self) {
        while let Ok(task_id) = self.backlog.pop() {
            let outcome = if self.interrupt.probe() {
                Err(TaskFailure::Cancelled)
            } else {
                self.execute(task_id)
            };

            if let Err(failure) = &outcome {
                tracing::warn!("Task {} generated an exception: {}", task_id, failure);
            }

            if let Err(err) = self.results.push((task_id, outcome)) {
                tracing::warn!("Worker {} could not report task {}: {}", self.id, task_id, err);
            }
        }

        tracing::debug!("Worker {} found the backlog empty", self.id);
    }

    fn execute(&self, task_id: usize) -> TaskOutcome {
        self.occupancy.enter();
        let caught = panic::catch_unwind(AssertUnwindSafe(|| (*self.task)(task_id)));
        self.occupancy.leave();

        match caught {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => match err.downcast::<TaskFailure>() {
                Ok(failure) => Err(*failure),
                Err(err) => Err(TaskFailure::Failed(err.to_string())),
            },
            Err(payload) => Err(TaskFailure::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}

/// Builds a pool and runs the default task `task_count` times.
///
/// # Errors
///
/// See [`WorkerPool::new`] and [`WorkerPool::run`].
pub fn run(task_count: usize, config: WorkerPoolConfig) -> SessionResult<TaskResults> {
    WorkerPool::new(config)?.run(task_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SessionError;
    use std::thread;
    use tracing_test::traced_test;

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::new(WorkerPoolConfig::new().max_workers(workers).immediate())
            .unwrap()
            .with_interrupt(StopSignal::new())
    }

    #[test]
    #[ntest::timeout(10000)]
    fn every_task_reports_its_square() {
        for (tasks, workers) in [(0, 1), (1, 1), (5, 2), (10, 4), (3, 8)] {
            let results = pool(workers).run(tasks).unwrap();

            assert_eq!(results.len(), tasks);
            let expected: Vec<_> = (0..tasks).map(|id| (id, square(id))).collect();
            assert_eq!(results.sorted_pairs(), expected);
            assert!(results.failures().is_empty());
            assert_eq!(results.completion_order().len(), tasks);
        }
    }

    #[test]
    #[traced_test]
    fn run_announces_its_shape() {
        let results = pool(2).run(4).unwrap();
        assert_eq!(results.succeeded(), 4);
        assert!(logs_contain("Running worker pool with 4 tasks and 2 workers"));
    }

    #[test]
    #[ntest::timeout(10000)]
    fn no_more_than_max_workers_run_at_once() {
        let results = pool(3)
            .run_with(12, |id| {
                thread::sleep(Duration::from_millis(20));
                Ok(id as u64)
            })
            .unwrap();

        assert_eq!(results.len(), 12);
        assert!(results.peak_concurrency() >= 1);
        assert!(results.peak_concurrency() <= 3);
    }

    #[test]
    #[ntest::timeout(10000)]
    fn failures_are_captured_per_task() {
        let results = pool(2)
            .run_with(6, |id| match id {
                3 => Err("division by zero".into()),
                5 => panic!("task {id} exploded"),
                _ => Ok(square(id)),
            })
            .unwrap();

        assert_eq!(results.len(), 6);
        assert_eq!(results.succeeded(), 4);
        assert_eq!(
            results.get(3),
            Some(&Err(TaskFailure::Failed("division by zero".to_string())))
        );
        assert_eq!(
            results.get(5),
            Some(&Err(TaskFailure::Panicked("task 5 exploded".to_string())))
        );
        assert_eq!(
            results.sorted_pairs(),
            vec![(0, 0), (1, 1), (2, 4), (4, 16)]
        );
    }

    #[test]
    fn single_worker_completes_in_submission_order() {
        let results = pool(1).run(5).unwrap();
        assert_eq!(results.completion_order(), &[0, 1, 2, 3, 4]);
        assert_eq!(results.peak_concurrency(), 1);
    }

    #[test]
    fn interrupted_pool_cancels_pending_tasks() {
        let interrupt = StopSignal::new();
        interrupt.turn_on();

        let results = WorkerPool::new(WorkerPoolConfig::new().max_workers(2).immediate())
            .unwrap()
            .with_interrupt(interrupt)
            .run(4)
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(results.succeeded(), 0);
        assert!(results
            .failures()
            .iter()
            .all(|(_, failure)| **failure == TaskFailure::Cancelled));
    }

    #[test]
    #[ntest::timeout(5000)]
    fn interrupt_cuts_running_tasks_short() {
        let interrupt = StopSignal::new();
        let pool = WorkerPool::new(
            WorkerPoolConfig::new()
                .max_workers(2)
                .task_delay(DelayRange::millis(2000, 2000)),
        )
        .unwrap()
        .with_interrupt(interrupt.clone());

        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            interrupt.turn_on();
        });

        let started = Instant::now();
        let results = pool.run(4).unwrap();
        trigger.join().unwrap();

        assert!(started.elapsed() < Duration::from_millis(1500));
        assert_eq!(results.len(), 4);
        assert_eq!(results.succeeded(), 0);
        assert!(results
            .failures()
            .iter()
            .all(|(_, failure)| **failure == TaskFailure::Cancelled));
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(
            WorkerPool::new(WorkerPoolConfig::new().max_workers(0)),
            Err(SessionError::InvalidConfig(ConfigError::ZeroWorkers))
        ));
    }
}
