//! Producers and consumers sharing one bounded buffer for a fixed duration.

use core::time::Duration;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::{BoundedQueue, TaskGroup};
use crate::errors::{ConfigError, SessionError, SessionResult};
use crate::pacing::{thread_rng, DelayRange};
use crate::signals::{interrupt_signal, SessionState, Shutdown, StateCell, StopSignal};

/// Default wait for a `put` or `get` before it gives up.
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration for a producer-consumer session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProducerConsumerConfig {
    capacity: usize,
    producers: usize,
    consumers: usize,
    duration: Duration,
    put_timeout: Duration,
    get_timeout: Duration,
    produce_pause: DelayRange,
    consume_work: DelayRange,
    seed: Option<u64>,
}

impl ProducerConsumerConfig {
    /// Creates a configuration with the demo defaults.
    ///
    /// Defaults:
    /// - `capacity`: 5
    /// - `producers`: 2, `consumers`: 3
    /// - `duration`: 5s
    /// - `put_timeout` / `get_timeout`: 500ms
    /// - `produce_pause`: 100–500ms, `consume_work`: 100–800ms
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capacity: 5,
            producers: 2,
            consumers: 3,
            duration: Duration::from_secs(5),
            put_timeout: DEFAULT_QUEUE_TIMEOUT,
            get_timeout: DEFAULT_QUEUE_TIMEOUT,
            produce_pause: DelayRange::millis(100, 500),
            consume_work: DelayRange::millis(100, 800),
            seed: None,
        }
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of producer threads.
    #[must_use]
    pub const fn producers(mut self, count: usize) -> Self {
        self.producers = count;
        self
    }

    /// Sets the number of consumer threads.
    #[must_use]
    pub const fn consumers(mut self, count: usize) -> Self {
        self.consumers = count;
        self
    }

    /// Sets how long the session runs.
    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the `put` and `get` timeouts.
    #[must_use]
    pub const fn timeouts(mut self, put: Duration, get: Duration) -> Self {
        self.put_timeout = put;
        self.get_timeout = get;
        self
    }

    /// Sets the producer think time.
    #[must_use]
    pub const fn produce_pause(mut self, pause: DelayRange) -> Self {
        self.produce_pause = pause;
        self
    }

    /// Sets the consumer work time.
    #[must_use]
    pub const fn consume_work(mut self, work: DelayRange) -> Self {
        self.consume_work = work;
        self
    }

    /// Sets the seed for every pacing delay.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Removes every simulated delay.
    #[must_use]
    pub const fn immediate(self) -> Self {
        self.produce_pause(DelayRange::ZERO)
            .consume_work(DelayRange::ZERO)
    }

    /// Returns the queue capacity.
    #[must_use]
    pub const fn get_capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of producer threads.
    #[must_use]
    pub const fn get_producers(&self) -> usize {
        self.producers
    }

    /// Returns the number of consumer threads.
    #[must_use]
    pub const fn get_consumers(&self) -> usize {
        self.consumers
    }

    /// Returns how long the session runs.
    #[must_use]
    pub const fn get_duration(&self) -> Duration {
        self.duration
    }

    /// Longest time `run` may take beyond the configured duration.
    #[must_use]
    pub fn shutdown_allowance(&self) -> Duration {
        self.put_timeout.max(self.get_timeout)
            + self.produce_pause.max().max(self.consume_work.max())
    }

    /// # Errors
    ///
    /// Rejects a zero capacity and zero duration or timeouts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.duration.is_zero() {
            return Err(ConfigError::InvalidDuration("duration"));
        }
        if self.put_timeout.is_zero() {
            return Err(ConfigError::InvalidDuration("put_timeout"));
        }
        if self.get_timeout.is_zero() {
            return Err(ConfigError::InvalidDuration("get_timeout"));
        }
        Ok(())
    }
}

impl Default for ProducerConsumerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a finished producer-consumer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConsumerReport {
    /// Items successfully put into the queue.
    pub produced: usize,
    /// Items taken out of the queue.
    pub consumed: usize,
    /// Items still queued when every thread had stopped.
    pub left_in_queue: usize,
    /// `put` calls that timed out on a full queue.
    pub full_timeouts: usize,
    /// `get` calls that timed out on an empty queue.
    pub empty_timeouts: usize,
    /// Wall-clock time from start to the last join.
    pub elapsed: Duration,
}

impl fmt::Display for ProducerConsumerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Producer-Consumer simulation completed in {:.2?}", self.elapsed)?;
        writeln!(
            f,
            "Produced: {}, Consumed: {}, Left in queue: {}",
            self.produced, self.consumed, self.left_in_queue
        )?;
        write!(
            f,
            "Full timeouts: {}, Empty timeouts: {}",
            self.full_timeouts, self.empty_timeouts
        )
    }
}

#[derive(Debug, Default)]
struct Tally {
    produced: AtomicUsize,
    consumed: AtomicUsize,
    full_timeouts: AtomicUsize,
    empty_timeouts: AtomicUsize,
}

/// Runs producers and consumers around one [`BoundedQueue`] until the
/// configured duration elapses.
///
/// A session is single-shot: its [`StopSignal`] is set once and never reset.
///
/// # Examples
///
/// ```
/// use foundation_patterns::scenarios::producer_consumer::{
///     ProducerConsumerConfig, ProducerConsumerSession,
/// };
/// use foundation_patterns::SessionState;
/// use std::time::Duration;
///
/// let config = ProducerConsumerConfig::new()
///     .duration(Duration::from_millis(100))
///     .timeouts(Duration::from_millis(20), Duration::from_millis(20))
///     .immediate();
///
/// let session = ProducerConsumerSession::new(config).unwrap();
/// let report = session.run().unwrap();
///
/// assert_eq!(session.state(), SessionState::Stopped);
/// assert_eq!(report.produced, report.consumed + report.left_in_queue);
/// ```
pub struct ProducerConsumerSession {
    config: ProducerConsumerConfig,
    queue: BoundedQueue<u32>,
    stop: StopSignal,
    interrupt: StopSignal,
    state: StateCell,
    tally: Arc<Tally>,
}

impl ProducerConsumerSession {
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when the config fails validation.
    pub fn new(config: ProducerConsumerConfig) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self {
            queue: BoundedQueue::new(config.capacity),
            config,
            stop: StopSignal::new(),
            interrupt: interrupt_signal(),
            state: StateCell::new(),
            tally: Arc::new(Tally::default()),
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

    /// Returns the queue shared by producers and consumers.
    #[must_use]
    pub fn queue(&self) -> &BoundedQueue<u32> {
        &self.queue
    }

    /// Runs the session, blocking until every producer and consumer has exited.
    ///
    /// # Errors
    ///
    /// Fails if the session already ran, a thread could not be spawned or a
    /// thread panicked.
    pub fn run(&self) -> SessionResult<ProducerConsumerReport> {
        if !self.state.start() {
            return Err(SessionError::AlreadyStarted);
        }

        let span = tracing::info_span!(
            "ProducerConsumerSession::run",
            producers = self.config.producers,
            consumers = self.config.consumers
        );
        let _enter = span.enter();

        tracing::info!(
            "Starting Producer-Consumer simulation for {:?} (queue capacity {})",
            self.config.duration,
            self.config.capacity
        );

        let started = Instant::now();
        let shutdown = Shutdown::new(self.stop.clone(), self.interrupt.clone());
        let mut group =
            TaskGroup::with_capacity(self.config.producers + self.config.consumers);

        if let Err(err) = self.spawn_tasks(&mut group, &shutdown) {
            tracing::warn!("Failed to spawn producer-consumer threads: {}", err);
            self.shut_down(group)?;
            return Err(SessionError::Spawn(err));
        }

        if self.interrupt.sleep(self.config.duration) {
            tracing::info!("Producer-Consumer simulation interrupted");
        }

        self.shut_down(group)?;

        let report = ProducerConsumerReport {
            produced: self.tally.produced.load(Ordering::SeqCst),
            consumed: self.tally.consumed.load(Ordering::SeqCst),
            left_in_queue: self.queue.len(),
            full_timeouts: self.tally.full_timeouts.load(Ordering::SeqCst),
            empty_timeouts: self.tally.empty_timeouts.load(Ordering::SeqCst),
            elapsed: started.elapsed(),
        };
        tracing::info!("Producer-Consumer simulation completed in {:?}", report.elapsed);
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
        for id in 0..self.config.producers {
            let producer = Producer {
                id,
                queue: self.queue.clone(),
                shutdown: shutdown.clone(),
                tally: Arc::clone(&self.tally),
                config: self.config,
            };
            group.spawn(format!("Producer-{id}"), move || producer.run())?;
        }

        for id in 0..self.config.consumers {
            let consumer = Consumer {
                id,
                queue: self.queue.clone(),
                shutdown: shutdown.clone(),
                tally: Arc::clone(&self.tally),
                config: self.config,
            };
            group.spawn(format!("Consumer-{id}"), move || consumer.run())?;
        }

        Ok(())
    }
}

struct Producer {
    id: usize,
    queue: BoundedQueue<u32>,
    shutdown: Shutdown,
    tally: Arc<Tally>,
    config: ProducerConsumerConfig,
}

impl Producer {
    fn run(self) {
        let mut rng = thread_rng(self.config.seed, self.id as u64);

        while !self.shutdown.requested() {
            let item = rng.u32(1..=100);
            match self.queue.put(item, self.config.put_timeout) {
                Ok(()) => {
                    self.tally.produced.fetch_add(1, Ordering::SeqCst);
                    tracing::info!(
                        "Producer {}: Produced {} (Queue size: {})",
                        self.id,
                        item,
                        self.queue.len()
                    );
                    self.shutdown
                        .pause(self.config.produce_pause.sample(&mut rng));
                }
                Err(_) => {
                    self.tally.full_timeouts.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!("Producer {}: Queue full, waiting...", self.id);
                }
            }
        }

        tracing::debug!("Producer {} stopped", self.id);
    }
}

struct Consumer {
    id: usize,
    queue: BoundedQueue<u32>,
    shutdown: Shutdown,
    tally: Arc<Tally>,
    config: ProducerConsumerConfig,
}

impl Consumer {
    fn run(self) {
        let mut rng = thread_rng(self.config.seed, 1_000 + self.id as u64);

        while !self.shutdown.requested() {
            match self.queue.get(self.config.get_timeout) {
                Ok(item) => {
                    self.tally.consumed.fetch_add(1, Ordering::SeqCst);
                    tracing::info!(
                        "Consumer {}: Consumed {} (Queue size: {})",
                        self.id,
                        item,
                        self.queue.len()
                    );
                    self.shutdown
                        .pause(self.config.consume_work.sample(&mut rng));
                }
                Err(_) => {
                    self.tally.empty_timeouts.fetch_add(1, Ordering::SeqCst);
                    if self.shutdown.requested() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Consumer {} stopped", self.id);
    }
}

/// Builds and runs a one-shot session.
///
/// # Errors
///
/// See [`ProducerConsumerSession::new`] and [`ProducerConsumerSession::run`].
pub fn run(config: ProducerConsumerConfig) -> SessionResult<ProducerConsumerReport> {
    ProducerConsumerSession::new(config)?.run()
}
