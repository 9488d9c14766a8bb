use std::hint;
use std::thread;

/// How many steps spin on the processor before we start yielding to the scheduler.
const SPIN_STEPS: u32 = 64;

/// Spin-then-yield stepping for busy-wait loops.
///
/// The first [`SPIN_STEPS`] steps only emit a spin hint, which keeps wakeup latency minimal
/// when the condition becomes true quickly. After that every step yields the time slice, so a
/// long wait does not starve other runnable threads on a constrained scheduler.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    step: u32,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether the spinning phase is over and each step now yields.
    pub(crate) fn is_yielding(&self) -> bool {
        self.step >= SPIN_STEPS
    }

    pub(crate) fn snooze(&mut self) {
        if self.is_yielding() {
            thread::yield_now();
        } else {
            hint::spin_loop();
            self.step = self.step.saturating_add(1);
        }
    }
}
