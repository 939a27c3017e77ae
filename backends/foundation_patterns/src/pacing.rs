//! Randomized delays used to simulate work and think time.
//!
//! Delays never affect correctness, they only widen the interleavings a
//! demo run shows. Every session takes its delays as [`DelayRange`]s so
//! tests can switch them off with [`DelayRange::ZERO`].

use core::time::Duration;

use crate::errors::ConfigError;

/// A uniform range of durations `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// A range that never sleeps.
    pub const ZERO: DelayRange = DelayRange::fixed(Duration::ZERO);

    /// Creates a range, swapping the bounds if they are given backwards.
    #[must_use]
    pub const fn new(min: Duration, max: Duration) -> Self {
        if min.as_nanos() > max.as_nanos() {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    /// Creates a range that always yields `delay`.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// Creates a range from millisecond bounds.
    #[must_use]
    pub const fn millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    /// Builds a range from seconds as written in settings files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDelayRange`] for negative, non-finite,
    /// reversed or unrepresentably large bounds.
    pub fn from_secs_f64(min: f64, max: f64) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidDelayRange(min, max);
        if min > max {
            return Err(invalid());
        }
        let lower = Duration::try_from_secs_f64(min).map_err(|_| invalid())?;
        let upper = Duration::try_from_secs_f64(max).map_err(|_| invalid())?;
        Ok(Self::new(lower, upper))
    }

    /// Returns the lower bound.
    #[must_use]
    pub const fn min(&self) -> Duration {
        self.min
    }

    /// Returns the upper bound.
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Returns true when every sample is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.max.is_zero()
    }

    /// Draws a duration uniformly from the range.
    pub fn sample(&self, rng: &mut fastrand::Rng) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let span = u64::try_from((self.max - self.min).as_nanos()).unwrap_or(u64::MAX);
        self.min + Duration::from_nanos(rng.u64(0..=span))
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Creates the random source for one session thread.
///
/// With a seed every thread gets its own reproducible stream, without one
/// the generator is seeded from the environment.
pub(crate) fn thread_rng(seed: Option<u64>, stream: u64) -> fastrand::Rng {
    match seed {
        Some(seed) => fastrand::Rng::with_seed(seed.wrapping_add(stream)),
        None => fastrand::Rng::new(),
    }
}
