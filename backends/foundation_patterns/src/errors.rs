//! Error types shared by the sessions.
//!
//! Only [`SessionError`] ever ends a `run`. [`QueueError`] and [`TaskFailure`]
//! are routine outcomes that the sessions log, count and carry on from.

use derive_more::From;

/// Boxed error returned by caller-supplied tasks.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of building or running a session.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Timed-out [`crate::scenarios::bounded_queue::BoundedQueue`] operations.
#[derive(Clone, PartialEq, Eq)]
pub enum QueueError<T> {
    /// No space freed up before the timeout, the rejected item is handed back.
    Full(T),
    /// No item arrived before the timeout.
    Empty,
}

impl<T> QueueError<T> {
    /// Returns true for a `put` that timed out.
    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, QueueError::Full(_))
    }

    /// Returns true for a `get` that timed out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, QueueError::Empty)
    }

    /// Returns the item a failed `put` could not enqueue.
    pub fn into_inner(self) -> Option<T> {
        match self {
            QueueError::Full(item) => Some(item),
            QueueError::Empty => None,
        }
    }
}

impl<T> core::fmt::Debug for QueueError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            QueueError::Full(_) => write!(f, "QueueError::Full(..)"),
            QueueError::Empty => write!(f, "QueueError::Empty"),
        }
    }
}

impl<T> core::fmt::Display for QueueError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            QueueError::Full(_) => write!(f, "queue stayed full until the timeout"),
            QueueError::Empty => write!(f, "queue stayed empty until the timeout"),
        }
    }
}

impl<T> core::error::Error for QueueError<T> {}

/// Why a single worker-pool task produced no result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The task returned an error.
    Failed(String),
    /// The task panicked; the payload message when it was a string.
    Panicked(String),
    /// The run was interrupted before or while the task ran.
    Cancelled,
}

impl core::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TaskFailure::Failed(reason) => write!(f, "task failed: {reason}"),
            TaskFailure::Panicked(message) => write!(f, "task panicked: {message}"),
            TaskFailure::Cancelled => write!(f, "task cancelled by an interrupt"),
        }
    }
}

impl core::error::Error for TaskFailure {}

/// Invalid settings, caught before any thread starts.
#[derive(Debug, From)]
pub enum ConfigError {
    /// A bounded queue needs room for at least one item.
    #[from(ignore)]
    ZeroQueueCapacity,

    /// A worker pool needs at least one worker.
    #[from(ignore)]
    ZeroWorkers,

    /// The named duration is negative, non-finite or too large.
    #[from(ignore)]
    InvalidDuration(&'static str),

    /// A `[min, max]` pair in seconds that does not form a delay range.
    #[from(ignore)]
    InvalidDelayRange(f64, f64),

    /// The settings file could not be read.
    ReadFailed(std::io::Error),

    /// The settings file is not valid TOML for [`crate::DemoSettings`].
    DeserializationFailed(toml::de::Error),
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Failures that end a session `run` or stop it from being built.
#[derive(Debug, From)]
pub enum SessionError {
    /// The session config failed validation.
    InvalidConfig(ConfigError),

    /// The OS refused to start a thread.
    Spawn(std::io::Error),

    /// A session thread panicked outside the per-task boundary.
    #[from(ignore)]
    ThreadPanicked(String),

    /// Sessions are single-shot: the stop signal never resets.
    #[from(ignore)]
    AlreadyStarted,
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::InvalidConfig(err) => Some(err),
            SessionError::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

impl core::fmt::Display for SessionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SessionError::InvalidConfig(err) => write!(f, "invalid session config: {err}"),
            SessionError::Spawn(err) => write!(f, "failed to spawn session thread: {err}"),
            SessionError::ThreadPanicked(name) => write!(f, "thread {name} panicked"),
            SessionError::AlreadyStarted => write!(f, "session has already been run"),
        }
    }
}
