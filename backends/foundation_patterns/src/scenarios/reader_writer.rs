//! Readers-writers over one shared counter, readers-preference variant.
//!
//! Two distinct locks are involved:
//!
//! 1. the readers-count lock, a plain mutex around the number of active
//!    readers and the resource guard held on behalf of the reader group;
//! 2. the resource lock, exclusive, taken by each writer and by the reader
//!    group as a whole.
//!
//! The reader moving the count 0 → 1 acquires the resource lock while still
//! inside the readers-count section; the reader moving it 1 → 0 releases it.
//! Writers can starve while readers keep overlapping.

use core::time::Duration;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use super::TaskGroup;
use crate::errors::{ConfigError, SessionError, SessionResult};
use crate::pacing::{thread_rng, DelayRange};
use crate::signals::{interrupt_signal, SessionState, Shutdown, StateCell, StopSignal};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    }
}

/// An exclusive lock that owns the value it protects.
///
/// The value is only reachable through a [`ResourceGuard`], and the guard may
/// be released by a different thread than the one that acquired it. The
/// reader group needs this: the reader that takes the lock for the group is
/// rarely the one that gives it back.
#[derive(Debug)]
pub struct ResourceLock<T> {
    // `None` while a guard holds the value
    slot: Mutex<Option<T>>,
    released: Condvar,
}

impl<T: Default> ResourceLock<T> {
    /// Creates a new unlocked resource holding `value`.
    #[must_use]
    pub fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Some(value)),
            released: Condvar::new(),
        })
    }

    /// Blocks until the lock is free, then takes it.
    #[must_use]
    pub fn lock(self: &Arc<Self>) -> ResourceGuard<T> {
        let mut slot = lock(&self.slot);
        loop {
            if let Some(value) = slot.take() {
                return ResourceGuard {
                    value,
                    lock: Arc::clone(self),
                };
            }
            slot = match self.released.wait(slot) {
                Ok(g) => g,
                Err(e) => e.into_inner(),
            };
        }
    }

    /// Returns true while some guard holds the value.
    #[must_use]
    pub fn is_held(&self) -> bool {
        lock(&self.slot).is_none()
    }

    fn release(&self, value: T) {
        *lock(&self.slot) = Some(value);
        self.released.notify_one();
    }
}

/// Owned guard of a [`ResourceLock`], hands the value back on drop.
#[derive(Debug)]
pub struct ResourceGuard<T: Default> {
    value: T,
    lock: Arc<ResourceLock<T>>,
}

impl<T: Default> Deref for ResourceGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Default> DerefMut for ResourceGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Default> Drop for ResourceGuard<T> {
    fn drop(&mut self) {
        self.lock.release(std::mem::take(&mut self.value));
    }
}

#[derive(Debug, Default)]
struct ReaderGroup {
    count: usize,
    // held for the whole group exactly while `count > 0`
    hold: Option<ResourceGuard<u64>>,
}

/// Records who is inside a critical section so overlaps can be counted.
#[derive(Debug, Default)]
struct AccessMonitor {
    active_readers: AtomicUsize,
    active_writers: AtomicUsize,
    peak_readers: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    violations: AtomicUsize,
}

impl AccessMonitor {
    fn begin_read(&self) {
        let readers = self.active_readers.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_readers.fetch_max(readers, Ordering::SeqCst);
        if self.active_writers.load(Ordering::SeqCst) > 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn end_read(&self) {
        self.active_readers.fetch_sub(1, Ordering::SeqCst);
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn begin_write(&self) {
        let writers = self.active_writers.fetch_add(1, Ordering::SeqCst);
        if writers > 0 || self.active_readers.load(Ordering::SeqCst) > 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn end_write(&self) {
        self.active_writers.fetch_sub(1, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> AccessStats {
        AccessStats {
            reads: self.reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
            peak_readers: self.peak_readers.load(Ordering::SeqCst),
            overlap_violations: self.violations.load(Ordering::SeqCst),
        }
    }
}

/// Counts gathered from the critical sections of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessStats {
    /// Completed read critical sections.
    pub reads: usize,
    /// Completed write critical sections.
    pub writes: usize,
    /// Most readers seen inside the critical section together.
    pub peak_readers: usize,
    /// Entries that found a writer alongside a reader or another writer.
    pub overlap_violations: usize,
}

/// The shared counter, owned by the resource lock, plus the readers-count lock.
#[derive(Debug)]
struct SharedResource {
    resource: Arc<ResourceLock<u64>>,
    readers: Mutex<ReaderGroup>,
    monitor: AccessMonitor,
}

impl SharedResource {
    fn new() -> Self {
        Self {
            resource: ResourceLock::new(0),
            readers: Mutex::new(ReaderGroup::default()),
            monitor: AccessMonitor::default(),
        }
    }

    fn read(&self) -> ReadAccess<'_> {
        let value = {
            let mut group = lock(&self.readers);
            group.count += 1;
            match &group.hold {
                Some(guard) => **guard,
                None => {
                    let guard = self.resource.lock();
                    let value = *guard;
                    group.hold = Some(guard);
                    value
                }
            }
        };

        self.monitor.begin_read();
        ReadAccess {
            shared: self,
            value,
        }
    }

    fn write(&self) -> WriteAccess<'_> {
        let guard = self.resource.lock();
        self.monitor.begin_write();
        WriteAccess {
            shared: self,
            guard,
        }
    }

    /// Blocks while a writer or the reader group holds the counter.
    fn value(&self) -> u64 {
        *self.resource.lock()
    }

    fn readers_count(&self) -> usize {
        lock(&self.readers).count
    }
}

struct ReadAccess<'a> {
    shared: &'a SharedResource,
    // writers are shut out for as long as the group holds the lock
    value: u64,
}

impl ReadAccess<'_> {
    fn value(&self) -> u64 {
        self.value
    }
}

impl Drop for ReadAccess<'_> {
    fn drop(&mut self) {
        self.shared.monitor.end_read();

        let mut group = lock(&self.shared.readers);
        group.count = group.count.saturating_sub(1);
        if group.count == 0 {
            group.hold = None;
        }
    }
}

struct WriteAccess<'a> {
    shared: &'a SharedResource,
    guard: ResourceGuard<u64>,
}

impl WriteAccess<'_> {
    fn increment(&mut self) -> (u64, u64) {
        let old = *self.guard;
        *self.guard = old + 1;
        (old, *self.guard)
    }
}

impl Drop for WriteAccess<'_> {
    fn drop(&mut self) {
        // runs before `guard` releases the resource lock
        self.shared.monitor.end_write();
    }
}

/// Configuration for a readers-writers session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderWriterConfig {
    readers: usize,
    writers: usize,
    duration: Duration,
    read_hold: DelayRange,
    read_pause: DelayRange,
    write_hold: DelayRange,
    write_pause: DelayRange,
    seed: Option<u64>,
}

impl ReaderWriterConfig {
    /// Creates a configuration with the demo defaults.
    ///
    /// Defaults:
    /// - `readers`: 3, `writers`: 2
    /// - `duration`: 5s
    /// - readers hold 100–300ms and pause 0.5–1.0s
    /// - writers hold 200–500ms and pause 1.0–2.0s
    #[must_use]
    pub const fn new() -> Self {
        Self {
            readers: 3,
            writers: 2,
            duration: Duration::from_secs(5),
            read_hold: DelayRange::millis(100, 300),
            read_pause: DelayRange::millis(500, 1_000),
            write_hold: DelayRange::millis(200, 500),
            write_pause: DelayRange::millis(1_000, 2_000),
            seed: None,
        }
    }

    /// Sets the number of reader threads.
    #[must_use]
    pub const fn readers(mut self, count: usize) -> Self {
        self.readers = count;
        self
    }

    /// Sets the number of writer threads.
    #[must_use]
    pub const fn writers(mut self, count: usize) -> Self {
        self.writers = count;
        self
    }

    /// Sets how long the session runs.
    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the in-critical-section delay and the think time for readers.
    #[must_use]
    pub const fn read_pacing(mut self, hold: DelayRange, pause: DelayRange) -> Self {
        self.read_hold = hold;
        self.read_pause = pause;
        self
    }

    /// Sets the in-critical-section delay and the think time for writers.
    #[must_use]
    pub const fn write_pacing(mut self, hold: DelayRange, pause: DelayRange) -> Self {
        self.write_hold = hold;
        self.write_pause = pause;
        self
    }

    /// Sets the seed for every pacing delay.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Removes every delay, for tests.
    #[must_use]
    pub const fn immediate(self) -> Self {
        self.read_pacing(DelayRange::ZERO, DelayRange::ZERO)
            .write_pacing(DelayRange::ZERO, DelayRange::ZERO)
    }

    /// Returns the number of reader threads.
    #[must_use]
    pub const fn get_readers(&self) -> usize {
        self.readers
    }

    /// Returns the number of writer threads.
    #[must_use]
    pub const fn get_writers(&self) -> usize {
        self.writers
    }

    /// Returns how long the session runs.
    #[must_use]
    pub const fn get_duration(&self) -> Duration {
        self.duration
    }

    /// Returns the reader critical-section delay.
    #[must_use]
    pub const fn get_read_hold(&self) -> DelayRange {
        self.read_hold
    }

    /// Returns the reader think time.
    #[must_use]
    pub const fn get_read_pause(&self) -> DelayRange {
        self.read_pause
    }

    /// Returns the writer critical-section delay.
    #[must_use]
    pub const fn get_write_hold(&self) -> DelayRange {
        self.write_hold
    }

    /// Returns the writer think time.
    #[must_use]
    pub const fn get_write_pause(&self) -> DelayRange {
        self.write_pause
    }

    /// # Errors
    ///
    /// Rejects a zero duration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration.is_zero() {
            return Err(ConfigError::InvalidDuration("duration"));
        }
        Ok(())
    }
}

impl Default for ReaderWriterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a finished readers-writers session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderWriterReport {
    /// Final value of the shared counter.
    pub final_value: u64,
    /// Counts gathered from the critical sections.
    pub stats: AccessStats,
    /// Wall-clock time from start to the last join.
    pub elapsed: Duration,
}

impl fmt::Display for ReaderWriterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Reader-Writer simulation completed in {:.2?}. Final value: {}",
            self.elapsed, self.final_value
        )?;
        write!(
            f,
            "Reads: {}, Writes: {}, Peak concurrent readers: {}, Overlaps: {}",
            self.stats.reads,
            self.stats.writes,
            self.stats.peak_readers,
            self.stats.overlap_violations
        )
    }
}

/// Runs concurrent readers and exclusive writers over one counter until the
/// configured duration elapses.
///
/// # Examples
///
/// ```
/// use foundation_patterns::scenarios::reader_writer::{ReaderWriterConfig, ReaderWriterSession};
/// use foundation_patterns::DelayRange;
/// use std::time::Duration;
///
/// let config = ReaderWriterConfig::new()
///     .readers(2)
///     .writers(1)
///     .duration(Duration::from_millis(100))
///     .read_pacing(DelayRange::millis(1, 2), DelayRange::millis(1, 2))
///     .write_pacing(DelayRange::millis(1, 2), DelayRange::millis(1, 2));
///
/// let report = ReaderWriterSession::new(config).unwrap().run().unwrap();
/// assert_eq!(report.final_value, report.stats.writes as u64);
/// assert_eq!(report.stats.overlap_violations, 0);
/// ```
pub struct ReaderWriterSession {
    config: ReaderWriterConfig,
    shared: Arc<SharedResource>,
    stop: StopSignal,
    interrupt: StopSignal,
    state: StateCell,
}

impl ReaderWriterSession {
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when the config fails validation.
    pub fn new(config: ReaderWriterConfig) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shared: Arc::new(SharedResource::new()),
            stop: StopSignal::new(),
            interrupt: interrupt_signal(),
            state: StateCell::new(),
        })
    }

    /// Replaces the process-wide interrupt signal this session watches.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: StopSignal) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Returns where the session is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Returns the signal that ends this session.
    #[must_use]
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Current value of the shared counter.
    ///
    /// Takes the resource lock, so it waits for any writer or reader group.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.shared.value()
    }

    /// Number of readers currently inside the reader group.
    #[must_use]
    pub fn readers_count(&self) -> usize {
        self.shared.readers_count()
    }

    /// Returns the access counts gathered so far.
    #[must_use]
    pub fn access_stats(&self) -> AccessStats {
        self.shared.monitor.snapshot()
    }

    /// Runs the session, blocking until every reader and writer has exited.
    ///
    /// # Errors
    ///
    /// Fails if the session already ran, a thread could not be spawned or a
    /// thread panicked.
    pub fn run(&self) -> SessionResult<ReaderWriterReport> {
        if !self.state.start() {
            return Err(SessionError::AlreadyStarted);
        }

        let span = tracing::info_span!(
            "ReaderWriterSession::run",
            readers = self.config.readers,
            writers = self.config.writers
        );
        let _enter = span.enter();

        tracing::info!(
            "Starting Reader-Writer simulation for {:?}",
            self.config.duration
        );

        let started = Instant::now();
        let shutdown = Shutdown::new(self.stop.clone(), self.interrupt.clone());
        let mut group = TaskGroup::with_capacity(self.config.readers + self.config.writers);

        if let Err(err) = self.spawn_tasks(&mut group, &shutdown) {
            tracing::warn!("Failed to spawn reader-writer threads: {}", err);
            self.shut_down(group)?;
            return Err(SessionError::Spawn(err));
        }

        if self.interrupt.sleep(self.config.duration) {
            tracing::info!("Reader-Writer simulation interrupted");
        }

        self.shut_down(group)?;

        let report = ReaderWriterReport {
            final_value: self.value(),
            stats: self.access_stats(),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Reader-Writer simulation completed. Final value: {}",
            report.final_value
        );
        Ok(report)
    }

    fn shut_down(&self, group: TaskGroup) -> SessionResult<()> {
        self.state.advance(SessionState::Stopping);
        self.stop.turn_on();
        let joined = group.join_all();
        self.state.advance(SessionState::Stopped);
        joined
    }

    fn spawn_tasks(&self, group: &mut TaskGroup, shutdown: &Shutdown) -> std::io::Result<()> {
        for id in 0..self.config.readers {
            let shared = Arc::clone(&self.shared);
            let shutdown = shutdown.clone();
            let config = self.config;
            group.spawn(format!("Reader-{id}"), move || {
                reader(id, &shared, &shutdown, &config);
            })?;
        }

        for id in 0..self.config.writers {
            let shared = Arc::clone(&self.shared);
            let shutdown = shutdown.clone();
            let config = self.config;
            group.spawn(format!("Writer-{id}"), move || {
                writer(id, &shared, &shutdown, &config);
            })?;
        }

        Ok(())
    }
}

fn reader(id: usize, shared: &SharedResource, shutdown: &Shutdown, config: &ReaderWriterConfig) {
    let mut rng = thread_rng(config.seed, id as u64);

    while !shutdown.requested() {
        {
            let access = shared.read();
            tracing::info!(
                "Reader {}: Reading value {} (Active readers: {})",
                id,
                access.value(),
                shared.readers_count()
            );
            shutdown.pause(config.read_hold.sample(&mut rng));
        }

        shutdown.pause(config.read_pause.sample(&mut rng));
    }

    tracing::debug!("Reader {} stopped", id);
}

fn writer(id: usize, shared: &SharedResource, shutdown: &Shutdown, config: &ReaderWriterConfig) {
    let mut rng = thread_rng(config.seed, 1_000 + id as u64);

    while !shutdown.requested() {
        {
            let mut access = shared.write();
            let (old, new) = access.increment();
            tracing::info!("Writer {}: Updated value from {} to {}", id, old, new);
            shutdown.pause(config.write_hold.sample(&mut rng));
        }

        shutdown.pause(config.write_pause.sample(&mut rng));
    }

    tracing::debug!("Writer {} stopped", id);
}

/// Builds and runs a one-shot session.
///
/// # Errors
///
/// See [`ReaderWriterSession::new`] and [`ReaderWriterSession::run`].
pub fn run(config: ReaderWriterConfig) -> SessionResult<ReaderWriterReport> {
    ReaderWriterSession::new(config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn quick_config() -> ReaderWriterConfig {
        ReaderWriterConfig::new()
            .duration(Duration::from_millis(300))
            .read_pacing(DelayRange::millis(1, 3), DelayRange::millis(1, 5))
            .write_pacing(DelayRange::millis(1, 3), DelayRange::millis(1, 5))
    }

    fn session(config: ReaderWriterConfig) -> ReaderWriterSession {
        ReaderWriterSession::new(config)
            .unwrap()
            .with_interrupt(StopSignal::new())
    }

    #[test]
    #[ntest::timeout(5000)]
    fn resource_guard_can_be_released_from_another_thread() {
        let resource = ResourceLock::new(0_u64);
        let guard = resource.lock();
        assert!(resource.is_held());

        thread::spawn(move || {
            let mut guard = guard;
            *guard += 5;
        })
        .join()
        .unwrap();
        assert!(!resource.is_held());

        let again = resource.lock();
        assert!(resource.is_held());
        assert_eq!(*again, 5);
    }

    #[test]
    #[ntest::timeout(5000)]
    fn readers_share_while_writers_wait() {
        let shared = Arc::new(SharedResource::new());

        let first = shared.read();
        let second = shared.read();
        assert_eq!(shared.readers_count(), 2);
        assert!(shared.resource.is_held());

        let shared_clone = Arc::clone(&shared);
        let writer = thread::spawn(move || {
            let mut access = shared_clone.write();
            access.increment().1
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!writer.is_finished());
        assert_eq!(first.value(), 0);

        drop(first);
        assert!(shared.resource.is_held());
        drop(second);

        assert_eq!(writer.join().unwrap(), 1);
        assert_eq!(shared.value(), 1);
        assert_eq!(shared.readers_count(), 0);
        assert!(!shared.resource.is_held());
        assert_eq!(shared.monitor.snapshot().overlap_violations, 0);
    }

    #[test]
    #[ntest::timeout(5000)]
    fn counter_lives_inside_the_resource_lock() {
        let shared = SharedResource::new();
        {
            let mut access = shared.write();
            assert_eq!(access.increment(), (0, 1));
            assert_eq!(access.increment(), (1, 2));
            assert!(shared.resource.is_held());
        }

        let reader = shared.read();
        assert_eq!(reader.value(), 2);
        assert!(shared.resource.is_held());
        drop(reader);

        let guard = shared.resource.lock();
        assert_eq!(*guard, 2);
        drop(guard);
        assert_eq!(shared.value(), 2);
    }

    #[test]
    fn monitor_counts_overlapping_entries() {
        let monitor = AccessMonitor::default();
        monitor.begin_read();
        monitor.begin_write();
        monitor.begin_write();

        let stats = monitor.snapshot();
        assert_eq!(stats.overlap_violations, 2);
        assert_eq!(stats.peak_readers, 1);
    }

    #[test]
    #[ntest::timeout(10000)]
    fn writers_never_overlap_anyone() {
        let session = session(quick_config().readers(4).writers(3));
        let report = session.run().unwrap();

        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.stop_signal().probe());
        assert_eq!(report.stats.overlap_violations, 0);
        assert_eq!(report.final_value, report.stats.writes as u64);
        assert_eq!(session.readers_count(), 0);
        assert!(!session.shared.resource.is_held());
    }

    #[test]
    #[ntest::timeout(10000)]
    fn readers_run_concurrently() {
        let config = quick_config()
            .readers(4)
            .writers(0)
            .read_pacing(DelayRange::millis(20, 20), DelayRange::millis(1, 1));
        let report = session(config).run().unwrap();

        assert_eq!(report.final_value, 0);
        assert!(report.stats.reads > 0);
        assert!(report.stats.peak_readers >= 2);
    }

    #[test]
    #[ntest::timeout(10000)]
    fn writers_alone_count_every_write() {
        let report = session(quick_config().readers(0).writers(3)).run().unwrap();

        assert!(report.stats.writes > 0);
        assert_eq!(report.final_value, report.stats.writes as u64);
        assert_eq!(report.stats.overlap_violations, 0);
    }

    #[test]
    #[ntest::timeout(10000)]
    fn empty_session_keeps_the_counter_at_zero() {
        let report = session(quick_config().readers(0).writers(0)).run().unwrap();
        assert_eq!(report.final_value, 0);
        assert_eq!(report.stats, AccessStats::default());
    }

    #[test]
    fn session_runs_only_once() {
        let session = session(quick_config().readers(0).writers(0));
        session.run().unwrap();
        assert!(matches!(session.run(), Err(SessionError::AlreadyStarted)));
    }
}
