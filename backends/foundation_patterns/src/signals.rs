//! Cooperative stop signals and the session lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Indicates the underlying signal to be set.
const SET: usize = 1;

/// Indicates the underlying signal was not set.
const UNSET: usize = 0;

/// `StopSignal` is a monotonic shutdown flag: it moves from UNSET to SET
/// once and never back.
///
/// Clones share the same flag. Besides polling with [`StopSignal::probe`],
/// threads can sleep on the signal with [`StopSignal::sleep`] and get woken
/// as soon as it is turned on.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<SignalInner>,
}

#[derive(Debug, Default)]
struct SignalInner {
    state: AtomicUsize,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl StopSignal {
    /// Creates a new signal in the UNSET state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `turn_on` flips the state from UNSET to SET, waking every sleeper.
    ///
    /// Returns `true` only for the call that actually set the signal.
    pub fn turn_on(&self) -> bool {
        let flipped = self
            .inner
            .state
            .compare_exchange(UNSET, SET, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok();

        if flipped {
            // sleepers check the flag under this lock before waiting
            drop(match self.inner.lock.lock() {
                Ok(g) => g,
                Err(e) => e.into_inner(),
            });
            self.inner.wakeup.notify_all();
        }
        flipped
    }

    /// probe returns true when the state is SET else false.
    #[inline]
    #[must_use]
    pub fn probe(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == SET
    }

    /// Sleeps for `dur` or until the signal is turned on, whichever is first.
    ///
    /// Returns `true` if the signal was set when the sleep ended.
    pub fn sleep(&self, dur: Duration) -> bool {
        if dur.is_zero() {
            return self.probe();
        }

        // `None` when the sleep reaches past what `Instant` can represent
        let deadline = Instant::now().checked_add(dur);
        let mut guard = match self.inner.lock.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };

        loop {
            if self.probe() {
                return true;
            }

            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    match self.inner.wakeup.wait_timeout(guard, deadline - now) {
                        Ok((g, _)) => g,
                        Err(e) => e.into_inner().0,
                    }
                }
                None => match self.inner.wakeup.wait(guard) {
                    Ok(g) => g,
                    Err(e) => e.into_inner(),
                },
            };
        }
    }
}

/// What a session thread watches to decide when to leave its loop:
/// the session's own stop signal and the host interrupt signal.
#[derive(Debug, Clone)]
pub(crate) struct Shutdown {
    stop: StopSignal,
    interrupt: StopSignal,
}

impl Shutdown {
    pub(crate) fn new(stop: StopSignal, interrupt: StopSignal) -> Self {
        Self { stop, interrupt }
    }

    #[inline]
    pub(crate) fn requested(&self) -> bool {
        self.stop.probe() || self.interrupt.probe()
    }

    /// Sleeps on the session signal, the orchestrator forwards interrupts to it.
    pub(crate) fn pause(&self, dur: Duration) -> bool {
        self.stop.sleep(dur) || self.interrupt.probe()
    }
}

static INTERRUPT: OnceLock<StopSignal> = OnceLock::new();
static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Returns the process-wide interrupt signal every session watches by default.
#[must_use]
pub fn interrupt_signal() -> StopSignal {
    INTERRUPT.get_or_init(StopSignal::new).clone()
}

/// Registers a Ctrl-C handler that turns on [`interrupt_signal`].
///
/// Calling it more than once is harmless, the handler is only installed the
/// first time.
///
/// # Errors
///
/// Returns the `ctrlc` error when the handler cannot be registered.
pub fn install_interrupt_handler() -> Result<StopSignal, ctrlc::Error> {
    let signal = interrupt_signal();
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(signal);
    }

    let target = signal.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::info!("Interrupt received, stopping all running sessions");
        target.turn_on();
    }) {
        HANDLER_INSTALLED.store(false, Ordering::SeqCst);
        return Err(err);
    }

    Ok(signal)
}

/// Lifecycle of a timed session: Idle → Running → Stopping → Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Built but not started.
    Idle = 0,
    /// Threads are working.
    Running = 1,
    /// Stop was signalled, threads are winding down.
    Stopping = 2,
    /// Every thread has been joined.
    Stopped = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Running,
            2 => SessionState::Stopping,
            _ => SessionState::Stopped,
        }
    }
}

#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(SessionState::Idle as u8))
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves Idle → Running, false if the session was already started.
    pub(crate) fn start(&self) -> bool {
        self.0
            .compare_exchange(
                SessionState::Idle as u8,
                SessionState::Running as u8,
                Ordering::SeqCst,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    pub(crate) fn advance(&self, to: SessionState) {
        self.0.store(to as u8, Ordering::Release);
    }
}
