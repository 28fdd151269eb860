//! Interrupt-driven duty-cycle scheduler.
//!
//! The periodic timer interrupt calls [`DutyCycleScheduler::on_wake_interrupt`],
//! which only touches atomics: it counts sleep rounds and raises a single
//! "window requested" bit once the configured threshold is reached. The main
//! loop consumes that bit in [`DutyCycleScheduler::wait_for_window`], the only
//! suspension point of the node. All shared state is held in `portable-atomic`
//! cells so cores without compare-and-swap fall back to a critical section.

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Power-down primitive used while waiting for the next window.
pub trait WakeSource {
    /// Suspends the processor until the next interrupt.
    ///
    /// Implementations must evaluate `pending` with interrupts masked and skip
    /// the sleep when it reports `true`, so a flag raised between the caller's
    /// check and the sleep instruction is never lost.
    fn sleep_until_interrupt<F>(&mut self, pending: F)
    where
        F: Fn() -> bool;
}

/// Observable scheduler phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerState {
    /// Counting interrupts towards the next window.
    Sleeping,
    /// Threshold reached; the main loop has not resumed yet.
    Waking,
    /// An acquisition-and-transmit window is in progress.
    Active,
}

/// Counter/flag handoff between the timer interrupt and the main loop.
///
/// The interrupt context is the only writer of the wake counter and the only
/// setter of the window flag; the main loop is the only one clearing it.
#[derive(Debug)]
pub struct DutyCycleScheduler {
    max_sleep_rounds: u32,
    wake_count: AtomicU32,
    window_requested: AtomicBool,
    active: AtomicBool,
    windows_entered: AtomicU32,
}

impl DutyCycleScheduler {
    /// Creates a scheduler that opens a window every `max_sleep_rounds` interrupts.
    ///
    /// A threshold of zero behaves like one.
    #[must_use]
    pub const fn new(max_sleep_rounds: u32) -> Self {
        Self {
            max_sleep_rounds: if max_sleep_rounds == 0 {
                1
            } else {
                max_sleep_rounds
            },
            wake_count: AtomicU32::new(0),
            window_requested: AtomicBool::new(false),
            active: AtomicBool::new(false),
            windows_entered: AtomicU32::new(0),
        }
    }

    /// Interrupt-context hook. Returns `true` when this firing requested a window.
    ///
    /// Firings that arrive while a window is active are dropped so the sleep
    /// interval is always measured from the end of the previous window.
    pub fn on_wake_interrupt(&self) -> bool {
        if self.active.load(Ordering::Acquire) {
            return false;
        }

        let rounds = self.wake_count.load(Ordering::Relaxed).saturating_add(1);
        if rounds >= self.max_sleep_rounds {
            self.wake_count.store(0, Ordering::Relaxed);
            self.window_requested.store(true, Ordering::Release);
            true
        } else {
            self.wake_count.store(rounds, Ordering::Relaxed);
            false
        }
    }

    /// Blocks in `wake` until a window is requested, then enters it.
    pub fn wait_for_window<W>(&self, wake: &mut W)
    where
        W: WakeSource,
    {
        while !self.window_requested.swap(false, Ordering::AcqRel) {
            wake.sleep_until_interrupt(|| self.window_pending());
        }
        self.active.store(true, Ordering::Release);
        self.windows_entered.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-blocking variant of [`wait_for_window`](Self::wait_for_window).
    pub fn try_enter_window(&self) -> bool {
        if self.window_requested.swap(false, Ordering::AcqRel) {
            self.active.store(true, Ordering::Release);
            self.windows_entered.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Marks the active window as complete; the caller goes back to sleep next.
    pub fn finish_window(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn state(&self) -> SchedulerState {
        if self.active.load(Ordering::Acquire) {
            SchedulerState::Active
        } else if self.window_pending() {
            SchedulerState::Waking
        } else {
            SchedulerState::Sleeping
        }
    }

    /// Returns `true` while a requested window has not been entered yet.
    pub fn window_pending(&self) -> bool {
        self.window_requested.load(Ordering::Acquire)
    }

    /// Interrupt firings since the last window was requested.
    pub fn wake_count(&self) -> u32 {
        self.wake_count.load(Ordering::Relaxed)
    }

    /// Total windows entered since start-up (wraps).
    pub fn windows_entered(&self) -> u32 {
        self.windows_entered.load(Ordering::Relaxed)
    }

    pub const fn max_sleep_rounds(&self) -> u32 {
        self.max_sleep_rounds
    }
}
