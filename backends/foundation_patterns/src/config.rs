//! Settings files for the demo sessions.
//!
//! A settings file is a TOML document with one optional table per session.
//! Durations are written in seconds, delay ranges as `[min, max]` pairs of
//! seconds. Anything left out keeps the session's demo default.
//!
//! ```toml
//! seed = 7
//!
//! [producer_consumer]
//! capacity = 5
//! duration_secs = 5.0
//! produce_pause_secs = [0.1, 0.5]
//!
//! [worker_pool]
//! max_workers = 4
//! tasks = 10
//! ```

use core::time::Duration;
use std::path::PathBuf;

use serde::Deserialize;

use crate::contention::RaceCheckConfig;
use crate::errors::ConfigError;
use crate::pacing::DelayRange;
use crate::scenarios::ordered_locks::OrderedLockConfig;
use crate::scenarios::producer_consumer::{ProducerConsumerConfig, DEFAULT_QUEUE_TIMEOUT};
use crate::scenarios::reader_writer::ReaderWriterConfig;
use crate::scenarios::worker_pool::WorkerPoolConfig;

/// Result of reading or converting settings.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Tasks submitted by the worker-pool demo when the settings name none.
pub const DEFAULT_TASK_COUNT: usize = 10;

/// How long the opposed lock-order run waits before declaring a deadlock.
pub const DEFAULT_PATIENCE: Duration = Duration::from_secs(2);

type SecsPair = [f64; 2];

/// Every setting the demos accept, one optional section per session.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoSettings {
    /// Seed shared by every session that does not set its own.
    pub seed: Option<u64>,
    /// `[producer_consumer]` section.
    pub producer_consumer: ProducerConsumerSettings,
    /// `[worker_pool]` section.
    pub worker_pool: WorkerPoolSettings,
    /// `[reader_writer]` section.
    pub reader_writer: ReaderWriterSettings,
    /// `[ordered_locks]` section.
    pub ordered_locks: OrderedLockSettings,
    /// `[race_check]` section.
    pub race_check: RaceCheckSettings,
}

/// Overrides for [`ProducerConsumerConfig`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProducerConsumerSettings {
    /// Queue capacity, at least 1.
    pub capacity: Option<usize>,
    /// Number of producer threads.
    pub producers: Option<usize>,
    /// Number of consumer threads.
    pub consumers: Option<usize>,
    /// How long the session runs, in seconds.
    pub duration_secs: Option<f64>,
    /// How long a `put` waits on a full queue, in seconds.
    pub put_timeout_secs: Option<f64>,
    /// How long a `get` waits on an empty queue, in seconds.
    pub get_timeout_secs: Option<f64>,
    /// Producer think time as `[min, max]` seconds.
    pub produce_pause_secs: Option<SecsPair>,
    /// Consumer work time as `[min, max]` seconds.
    pub consume_work_secs: Option<SecsPair>,
    /// Overrides the top-level seed for this session.
    pub seed: Option<u64>,
}

/// Overrides for [`WorkerPoolConfig`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerPoolSettings {
    /// Number of worker threads, at least 1.
    pub max_workers: Option<usize>,
    /// Tasks submitted by the demo.
    pub tasks: Option<usize>,
    /// Per-task processing time as `[min, max]` seconds.
    pub task_delay_secs: Option<SecsPair>,
    /// Overrides the top-level seed for this session.
    pub seed: Option<u64>,
}

/// Overrides for [`ReaderWriterConfig`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderWriterSettings {
    /// Number of reader threads.
    pub readers: Option<usize>,
    /// Number of writer threads.
    pub writers: Option<usize>,
    /// How long the session runs, in seconds.
    pub duration_secs: Option<f64>,
    /// Time a reader stays in the critical section, `[min, max]` seconds.
    pub read_hold_secs: Option<SecsPair>,
    /// Reader think time between reads, `[min, max]` seconds.
    pub read_pause_secs: Option<SecsPair>,
    /// Time a writer stays in the critical section, `[min, max]` seconds.
    pub write_hold_secs: Option<SecsPair>,
    /// Writer think time between writes, `[min, max]` seconds.
    pub write_pause_secs: Option<SecsPair>,
    /// Overrides the top-level seed for this session.
    pub seed: Option<u64>,
}

/// Overrides for [`OrderedLockConfig`] and the opposed run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrderedLockSettings {
    /// Tasks taking both locks in the safe run.
    pub tasks: Option<usize>,
    /// Rounds each task performs.
    pub rounds: Option<usize>,
    /// Time spent holding `L1` before reaching for `L2`, `[min, max]` seconds.
    pub hold_secs: Option<SecsPair>,
    /// How long the opposed run waits before declaring a deadlock, in seconds.
    pub patience_secs: Option<f64>,
    /// Overrides the top-level seed for this session.
    pub seed: Option<u64>,
}

/// Overrides for [`RaceCheckConfig`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RaceCheckSettings {
    /// Threads incrementing the counter in each trial.
    pub tasks: Option<usize>,
    /// Increments per thread.
    pub iterations: Option<usize>,
    /// Number of trials.
    pub trials: Option<usize>,
}

fn secs(field: &'static str, value: f64) -> ConfigResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration(field))
}

fn range_or(pair: Option<SecsPair>, fallback: DelayRange) -> ConfigResult<DelayRange> {
    match pair {
        Some([min, max]) => DelayRange::from_secs_f64(min, max),
        None => Ok(fallback),
    }
}

impl DemoSettings {
    /// Reads and parses a settings file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ReadFailed`] when the file cannot be read and
    /// [`ConfigError::DeserializationFailed`] when it is not a valid
    /// settings document.
    pub fn from_path<V: Into<PathBuf>>(target: V) -> ConfigResult<Self> {
        let target_path = target.into();
        let content = std::fs::read_to_string(&target_path)?;
        tracing::debug!("Loaded settings from {}", target_path.display());
        Self::parse(&content)
    }

    /// Parses a settings document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DeserializationFailed`] on malformed TOML or unknown keys.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    fn seed_for(&self, own: Option<u64>) -> Option<u64> {
        own.or(self.seed)
    }

    /// # Errors
    ///
    /// Any invalid duration or range, plus what
    /// [`ProducerConsumerConfig::validate`] rejects.
    pub fn producer_consumer(&self) -> ConfigResult<ProducerConsumerConfig> {
        let section = &self.producer_consumer;
        let mut config = ProducerConsumerConfig::new();

        if let Some(capacity) = section.capacity {
            config = config.capacity(capacity);
        }
        if let Some(producers) = section.producers {
            config = config.producers(producers);
        }
        if let Some(consumers) = section.consumers {
            config = config.consumers(consumers);
        }
        if let Some(duration) = section.duration_secs {
            config = config.duration(secs("duration_secs", duration)?);
        }

        let put = match section.put_timeout_secs {
            Some(value) => secs("put_timeout_secs", value)?,
            None => DEFAULT_QUEUE_TIMEOUT,
        };
        let get = match section.get_timeout_secs {
            Some(value) => secs("get_timeout_secs", value)?,
            None => DEFAULT_QUEUE_TIMEOUT,
        };
        config = config.timeouts(put, get);

        if let Some([min, max]) = section.produce_pause_secs {
            config = config.produce_pause(DelayRange::from_secs_f64(min, max)?);
        }
        if let Some([min, max]) = section.consume_work_secs {
            config = config.consume_work(DelayRange::from_secs_f64(min, max)?);
        }
        if let Some(seed) = self.seed_for(section.seed) {
            config = config.seed(seed);
        }

        config.validate()?;
        Ok(config)
    }

    /// Returns the pool configuration and the number of tasks to submit.
    ///
    /// # Errors
    ///
    /// An invalid delay range or zero workers.
    pub fn worker_pool(&self) -> ConfigResult<(WorkerPoolConfig, usize)> {
        let section = &self.worker_pool;
        let mut config = WorkerPoolConfig::new();

        if let Some(workers) = section.max_workers {
            config = config.max_workers(workers);
        }
        if let Some([min, max]) = section.task_delay_secs {
            config = config.task_delay(DelayRange::from_secs_f64(min, max)?);
        }
        if let Some(seed) = self.seed_for(section.seed) {
            config = config.seed(seed);
        }

        config.validate()?;
        Ok((config, section.tasks.unwrap_or(DEFAULT_TASK_COUNT)))
    }

    /// # Errors
    ///
    /// An invalid duration or range.
    pub fn reader_writer(&self) -> ConfigResult<ReaderWriterConfig> {
        let section = &self.reader_writer;
        let defaults = ReaderWriterConfig::new();
        let mut config = defaults;

        if let Some(readers) = section.readers {
            config = config.readers(readers);
        }
        if let Some(writers) = section.writers {
            config = config.writers(writers);
        }
        if let Some(duration) = section.duration_secs {
            config = config.duration(secs("duration_secs", duration)?);
        }

        config = config
            .read_pacing(
                range_or(section.read_hold_secs, defaults.get_read_hold())?,
                range_or(section.read_pause_secs, defaults.get_read_pause())?,
            )
            .write_pacing(
                range_or(section.write_hold_secs, defaults.get_write_hold())?,
                range_or(section.write_pause_secs, defaults.get_write_pause())?,
            );

        if let Some(seed) = self.seed_for(section.seed) {
            config = config.seed(seed);
        }

        config.validate()?;
        Ok(config)
    }

    /// Returns the lock-ordering configuration and the opposed-run patience.
    ///
    /// # Errors
    ///
    /// An invalid hold range or patience.
    pub fn ordered_locks(&self) -> ConfigResult<(OrderedLockConfig, Duration)> {
        let section = &self.ordered_locks;
        let mut config = OrderedLockConfig::new();

        if let Some(tasks) = section.tasks {
            config = config.tasks(tasks);
        }
        if let Some(rounds) = section.rounds {
            config = config.rounds(rounds);
        }
        if let Some([min, max]) = section.hold_secs {
            config = config.hold(DelayRange::from_secs_f64(min, max)?);
        }
        if let Some(seed) = self.seed_for(section.seed) {
            config = config.seed(seed);
        }

        let patience = match section.patience_secs {
            Some(value) => secs("patience_secs", value)?,
            None => DEFAULT_PATIENCE,
        };
        if patience.is_zero() {
            return Err(ConfigError::InvalidDuration("patience_secs"));
        }

        Ok((config, patience))
    }

    /// Returns the race-check config with this section applied.
    #[must_use]
    pub fn race_check(&self) -> RaceCheckConfig {
        let section = &self.race_check;
        let mut config = RaceCheckConfig::new();

        if let Some(tasks) = section.tasks {
            config = config.tasks(tasks);
        }
        if let Some(iterations) = section.iterations {
            config = config.iterations(iterations);
        }
        if let Some(trials) = section.trials {
            config = config.trials(trials);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_every_default() {
        let settings = DemoSettings::parse("").unwrap();

        assert_eq!(
            settings.producer_consumer().unwrap(),
            ProducerConsumerConfig::new()
        );
        assert_eq!(settings.reader_writer().unwrap(), ReaderWriterConfig::new());
        assert_eq!(
            settings.worker_pool().unwrap(),
            (WorkerPoolConfig::new(), DEFAULT_TASK_COUNT)
        );
        assert_eq!(
            settings.ordered_locks().unwrap(),
            (OrderedLockConfig::new(), DEFAULT_PATIENCE)
        );
        assert_eq!(settings.race_check(), RaceCheckConfig::new());
    }

    #[test]
    fn sections_override_their_session() {
        let settings = DemoSettings::parse(
            r#"
            seed = 11

            [producer_consumer]
            capacity = 3
            producers = 1
            duration_secs = 0.5
            produce_pause_secs = [0.0, 0.25]

            [worker_pool]
            max_workers = 2
            tasks = 6
            task_delay_secs = [0.0, 0.0]
            seed = 3

            [reader_writer]
            readers = 4
            write_hold_secs = [0.125, 0.25]

            [race_check]
            trials = 5
            "#,
        )
        .unwrap();

        let pc = settings.producer_consumer().unwrap();
        assert_eq!(
            pc,
            ProducerConsumerConfig::new()
                .capacity(3)
                .producers(1)
                .duration(Duration::from_millis(500))
                .produce_pause(DelayRange::millis(0, 250))
                .seed(11)
        );

        let (pool, tasks) = settings.worker_pool().unwrap();
        assert_eq!(tasks, 6);
        assert_eq!(
            pool,
            WorkerPoolConfig::new().max_workers(2).immediate().seed(3)
        );

        let rw = settings.reader_writer().unwrap();
        assert_eq!(rw.get_readers(), 4);
        assert_eq!(rw.get_write_hold(), DelayRange::millis(125, 250));
        assert_eq!(rw.get_read_hold(), ReaderWriterConfig::new().get_read_hold());

        assert_eq!(settings.race_check(), RaceCheckConfig::new().trials(5));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_capacity = DemoSettings::parse("[producer_consumer]\ncapacity = 0").unwrap();
        assert!(matches!(
            zero_capacity.producer_consumer(),
            Err(ConfigError::ZeroQueueCapacity)
        ));

        let no_workers = DemoSettings::parse("[worker_pool]\nmax_workers = 0").unwrap();
        assert!(matches!(no_workers.worker_pool(), Err(ConfigError::ZeroWorkers)));

        let negative = DemoSettings::parse("[reader_writer]\nduration_secs = -1.0").unwrap();
        assert!(matches!(
            negative.reader_writer(),
            Err(ConfigError::InvalidDuration("duration_secs"))
        ));

        let too_long = DemoSettings::parse("[reader_writer]\nduration_secs = 1e30").unwrap();
        assert!(matches!(
            too_long.reader_writer(),
            Err(ConfigError::InvalidDuration("duration_secs"))
        ));

        let huge_range =
            DemoSettings::parse("[worker_pool]\ntask_delay_secs = [0.0, 1e30]").unwrap();
        assert!(matches!(
            huge_range.worker_pool(),
            Err(ConfigError::InvalidDelayRange(_, _))
        ));

        let reversed = DemoSettings::parse("[ordered_locks]\nhold_secs = [0.5, 0.1]").unwrap();
        assert!(matches!(
            reversed.ordered_locks(),
            Err(ConfigError::InvalidDelayRange(_, _))
        ));
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let err = DemoSettings::parse("[worker_pool]\nworkers = 2").unwrap_err();
        assert!(matches!(err, ConfigError::DeserializationFailed(_)));
    }

    #[test]
    fn missing_file_is_a_read_failure() {
        let err = DemoSettings::from_path("/nonexistent/patterns.toml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed(_)));
    }
}
