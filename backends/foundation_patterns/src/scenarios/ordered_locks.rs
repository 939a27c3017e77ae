//! Two locks, one global acquisition order.
//!
//! Every task takes `L1` before `L2`, so no cycle can form in the wait-for
//! graph and the safe run always terminates. [`OrderedLockDemo::run_opposed`]
//! builds the contrast case, where one task takes `L2` first, and detects the
//! resulting circular wait with a deadline instead of hanging.

use core::time::Duration;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Instant;

use super::TaskGroup;
use crate::errors::{SessionError, SessionResult};
use crate::pacing::{thread_rng, DelayRange};
use crate::signals::{interrupt_signal, StopSignal};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Longest an opposed run waits before declaring a deadlock.
pub const MAX_PATIENCE: Duration = Duration::from_secs(3600);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    }
}

/// The two locks `L1` and `L2`.
#[derive(Debug, Default)]
pub struct LockPair {
    first: Mutex<()>,
    second: Mutex<()>,
}

impl LockPair {
    /// Creates a new pair with both locks free.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires `L1`. The only way to reach `L2` is through the returned guard.
    pub fn lock_first(&self) -> FirstGuard<'_> {
        FirstGuard {
            pair: self,
            guard: lock(&self.first),
        }
    }

    /// Acquires `L1` then `L2` back to back.
    pub fn lock_in_order(&self) -> OrderedGuards<'_> {
        self.lock_first().and_second()
    }

    /// Whether `L1` and `L2` are currently free.
    #[must_use]
    pub fn is_free(&self) -> (bool, bool) {
        (
            !matches!(self.first.try_lock(), Err(TryLockError::WouldBlock)),
            !matches!(self.second.try_lock(), Err(TryLockError::WouldBlock)),
        )
    }
}

/// Holds `L1`.
pub struct FirstGuard<'a> {
    pair: &'a LockPair,
    guard: MutexGuard<'a, ()>,
}

impl<'a> FirstGuard<'a> {
    /// Acquires `L2` while keeping `L1`.
    pub fn and_second(self) -> OrderedGuards<'a> {
        let second = lock(&self.pair.second);
        OrderedGuards {
            _second: second,
            _first: self.guard,
        }
    }
}

/// Holds `L1` and `L2`; drops `L2` first, then `L1`.
pub struct OrderedGuards<'a> {
    // field order is drop order
    _second: MutexGuard<'a, ()>,
    _first: MutexGuard<'a, ()>,
}

/// Configuration for the lock-ordering demo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedLockConfig {
    tasks: usize,
    rounds: usize,
    hold: DelayRange,
    seed: Option<u64>,
}

impl OrderedLockConfig {
    /// Defaults: 2 tasks, 1 round each, holding `L1` for 100ms before taking `L2`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tasks: 2,
            rounds: 1,
            hold: DelayRange::fixed(Duration::from_millis(100)),
            seed: None,
        }
    }

    /// Sets the number of tasks in the safe run.
    #[must_use]
    pub const fn tasks(mut self, count: usize) -> Self {
        self.tasks = count;
        self
    }

    /// Sets how many rounds each task performs.
    #[must_use]
    pub const fn rounds(mut self, count: usize) -> Self {
        self.rounds = count;
        self
    }

    /// Sets how long each task works while holding only `L1`.
    #[must_use]
    pub const fn hold(mut self, hold: DelayRange) -> Self {
        self.hold = hold;
        self
    }

    /// Sets the seed for the hold delays.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns the number of tasks in the safe run.
    #[must_use]
    pub const fn get_tasks(&self) -> usize {
        self.tasks
    }

    /// Returns the rounds each task performs.
    #[must_use]
    pub const fn get_rounds(&self) -> usize {
        self.rounds
    }
}

impl Default for OrderedLockConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`OrderedLockDemo::run_safe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeRunReport {
    /// Times some task held both locks.
    pub acquisitions: usize,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

impl fmt::Display for SafeRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Safe execution completed successfully: {} acquisitions in {:.2?}",
            self.acquisitions, self.elapsed
        )
    }
}

/// Outcome of [`OrderedLockDemo::run_opposed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpposedRunReport {
    /// Tasks that gave up waiting for their second lock.
    pub timed_out: Vec<String>,
    /// Tasks that did get both locks.
    pub completed: Vec<String>,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

impl OpposedRunReport {
    /// Returns true when any task timed out waiting for its second lock.
    #[must_use]
    pub fn deadlock_detected(&self) -> bool {
        !self.timed_out.is_empty()
    }
}

impl fmt::Display for OpposedRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.deadlock_detected() {
            write!(
                f,
                "Deadlock detected after {:.2?}: {} stalled waiting for their second lock",
                self.elapsed,
                self.timed_out.join(", ")
            )
        } else {
            write!(f, "Opposed execution completed in {:.2?}", self.elapsed)
        }
    }
}

/// Runs tasks over one [`LockPair`].
pub struct OrderedLockDemo {
    config: OrderedLockConfig,
    locks: Arc<LockPair>,
    interrupt: StopSignal,
}

impl OrderedLockDemo {
    /// Creates a new demo over a fresh [`LockPair`].
    #[must_use]
    pub fn new(config: OrderedLockConfig) -> Self {
        Self {
            config,
            locks: Arc::new(LockPair::new()),
            interrupt: interrupt_signal(),
        }
    }

    /// Replaces the process-wide interrupt signal this demo watches.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: StopSignal) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Returns the locks the demo runs over.
    #[must_use]
    pub fn locks(&self) -> &LockPair {
        &self.locks
    }

    /// Every task acquires `L1` then `L2`, works briefly, and releases in
    /// reverse. Always terminates.
    ///
    /// # Errors
    ///
    /// Fails only if a task thread cannot be spawned or panics.
    pub fn run_safe(&self) -> SessionResult<SafeRunReport> {
        let span = tracing::info_span!("OrderedLockDemo::run_safe", tasks = self.config.tasks);
        let _enter = span.enter();
        tracing::info!("Demonstrating SAFE execution (consistent lock ordering)...");

        let started = Instant::now();
        let acquisitions = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::with_capacity(self.config.tasks);

        for id in 1..=self.config.tasks {
            let locks = Arc::clone(&self.locks);
            let acquisitions = Arc::clone(&acquisitions);
            let interrupt = self.interrupt.clone();
            let config = self.config;

            let spawned = group.spawn(format!("Thread-{id}-Safe"), move || {
                let mut rng = thread_rng(config.seed, id as u64);
                for _ in 0..config.rounds {
                    if interrupt.probe() {
                        break;
                    }

                    tracing::info!("Thread {} (Safe): Attempting to acquire lock1...", id);
                    let first = locks.lock_first();
                    tracing::info!("Thread {} (Safe): Acquired lock1", id);

                    let hold = config.hold.sample(&mut rng);
                    if !hold.is_zero() {
                        thread::sleep(hold);
                    }

                    tracing::info!("Thread {} (Safe): Attempting to acquire lock2...", id);
                    let both = first.and_second();
                    tracing::info!("Thread {} (Safe): Both locks acquired!", id);
                    acquisitions.fetch_add(1, Ordering::SeqCst);
                    drop(both);
                }
            });

            if let Err(err) = spawned {
                group.join_all()?;
                return Err(SessionError::Spawn(err));
            }
        }

        group.join_all()?;

        let report = SafeRunReport {
            acquisitions: acquisitions.load(Ordering::SeqCst),
            elapsed: started.elapsed(),
        };
        tracing::info!("Safe execution completed successfully!");
        Ok(report)
    }

    /// Task A takes `L1` then `L2`, task B takes `L2` then `L1`.
    ///
    /// Both tasks wait for each other to hold their first lock, then poll for
    /// the second one until `patience` runs out, so the circular wait shows up
    /// as timed-out tasks rather than a hung process.
    ///
    /// # Errors
    ///
    /// Fails only if a task thread cannot be spawned or panics.
    pub fn run_opposed(&self, patience: Duration) -> SessionResult<OpposedRunReport> {
        let span = tracing::info_span!("OrderedLockDemo::run_opposed");
        let _enter = span.enter();
        tracing::warn!("Demonstrating UNSAFE execution (opposite lock ordering)...");

        let started = Instant::now();
        let deadline = patience_deadline(started, patience);
        let arrived = Arc::new(AtomicUsize::new(0));
        let outcomes = Arc::new(Mutex::new(Vec::with_capacity(2)));
        let mut group = TaskGroup::with_capacity(2);

        for (name, forward) in [("Thread-1-Unsafe", true), ("Thread-2-Unsafe", false)] {
            let locks = Arc::clone(&self.locks);
            let arrived = Arc::clone(&arrived);
            let outcomes = Arc::clone(&outcomes);

            let spawned = group.spawn(name.to_string(), move || {
                let (held, wanted) = if forward {
                    (&locks.first, &locks.second)
                } else {
                    (&locks.second, &locks.first)
                };

                let _held = lock(held);
                tracing::info!("{}: Acquired its first lock", name);

                arrived.fetch_add(1, Ordering::SeqCst);
                while arrived.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                    thread::sleep(POLL_INTERVAL);
                }

                let acquired = acquire_before(wanted, deadline);
                if acquired {
                    tracing::info!("{}: Both locks acquired!", name);
                } else {
                    tracing::warn!("{}: Gave up waiting for its second lock", name);
                }

                lock(&outcomes).push((name, acquired));
            });

            if let Err(err) = spawned {
                group.join_all()?;
                return Err(SessionError::Spawn(err));
            }
        }

        group.join_all()?;

        let outcomes = std::mem::take(&mut *lock(&outcomes));

        let (completed, timed_out): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(|(_, acquired)| *acquired);

        let report = OpposedRunReport {
            timed_out: timed_out.into_iter().map(|(name, _)| name.to_string()).collect(),
            completed: completed.into_iter().map(|(name, _)| name.to_string()).collect(),
            elapsed: started.elapsed(),
        };
        tracing::info!("{}", report);
        Ok(report)
    }
}

/// `patience` is capped at [`MAX_PATIENCE`] so the deadline always exists.
fn patience_deadline(started: Instant, patience: Duration) -> Instant {
    let patience = patience.min(MAX_PATIENCE);
    started.checked_add(patience).unwrap_or(started)
}

/// Polls `mutex` until it is acquired or `deadline` passes; releases it again.
fn acquire_before(mutex: &Mutex<()>, deadline: Instant) -> bool {
    loop {
        match mutex.try_lock() {
            Ok(_) | Err(TryLockError::Poisoned(_)) => return true,
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return false;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// Runs the safe demo with the given config.
///
/// # Errors
///
/// See [`OrderedLockDemo::run_safe`].
pub fn run_safe(config: OrderedLockConfig) -> SessionResult<SafeRunReport> {
    OrderedLockDemo::new(config).run_safe()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn demo(config: OrderedLockConfig) -> OrderedLockDemo {
        OrderedLockDemo::new(config).with_interrupt(StopSignal::new())
    }

    #[test]
    fn patience_is_capped_instead_of_overflowing() {
        let started = Instant::now();
        assert_eq!(
            patience_deadline(started, Duration::MAX),
            started + MAX_PATIENCE
        );
        assert_eq!(
            patience_deadline(started, Duration::from_millis(5)),
            started + Duration::from_millis(5)
        );
    }

    #[test]
    fn ordered_guards_hold_both_locks_until_dropped() {
        let pair = LockPair::new();
        assert_eq!(pair.is_free(), (true, true));

        let first = pair.lock_first();
        assert_eq!(pair.is_free(), (false, true));

        let both = first.and_second();
        assert_eq!(pair.is_free(), (false, false));

        drop(both);
        assert_eq!(pair.is_free(), (true, true));

        let _both = pair.lock_in_order();
        assert_eq!(pair.is_free(), (false, false));
    }

    #[test]
    #[ntest::timeout(5000)]
    fn default_safe_run_completes() {
        let report = demo(OrderedLockConfig::new()).run_safe().unwrap();
        assert_eq!(report.acquisitions, 2);
        assert!(report.elapsed >= Duration::from_millis(100));
    }

    #[test]
    #[ntest::timeout(20000)]
    fn safe_run_terminates_under_jitter() {
        for seed in 0..20 {
            let config = OrderedLockConfig::new()
                .tasks(4)
                .rounds(5)
                .hold(DelayRange::millis(0, 3))
                .seed(seed);

            let report = demo(config).run_safe().unwrap();
            assert_eq!(report.acquisitions, 20);
            assert!(report.elapsed < Duration::from_secs(5));
        }
    }

    #[test]
    #[ntest::timeout(5000)]
    fn opposed_order_is_detected_as_deadlock() {
        let demo = demo(OrderedLockConfig::new());
        let report = demo.run_opposed(Duration::from_millis(100)).unwrap();

        assert!(report.deadlock_detected());
        assert!(!report.timed_out.is_empty());
        assert_eq!(report.timed_out.len() + report.completed.len(), 2);
        assert_eq!(demo.locks().is_free(), (true, true));
    }

    #[test]
    #[traced_test]
    fn opposed_run_reports_the_deadlock() {
        demo(OrderedLockConfig::new())
            .run_opposed(Duration::from_millis(50))
            .unwrap();
        assert!(logs_contain("Deadlock detected after"));
    }

    #[test]
    fn interrupted_safe_run_acquires_nothing() {
        let interrupt = StopSignal::new();
        interrupt.turn_on();
        let report = OrderedLockDemo::new(OrderedLockConfig::new())
            .with_interrupt(interrupt)
            .run_safe()
            .unwrap();
        assert_eq!(report.acquisitions, 0);
    }
}
