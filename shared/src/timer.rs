// Timekeeping for the network driver
// A free-running tick counter driven by the board's timer interrupt, plus the
// `Clock` abstraction every bounded wait in the driver is expressed against.

use core::sync::atomic::{AtomicU64, Ordering};

/// Global tick counter
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Timer frequency in Hz
static TIMER_FREQUENCY: AtomicU64 = AtomicU64::new(1000); // Default to 1kHz (1ms ticks)

/// Source of wall-clock time for polling loops.
///
/// All timeouts in the driver are expressed in milliseconds against a `Clock`;
/// nothing ever blocks without one.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed origin. Must never go backwards.
    fn now_ms(&self) -> u64;

    /// Wait (or yield) for roughly `ms` milliseconds.
    fn delay_ms(&mut self, ms: u64);

    /// Milliseconds elapsed since `since`, saturating at zero.
    fn elapsed_ms(&self, since: u64) -> u64 {
        self.now_ms().saturating_sub(since)
    }
}

/// Set the tick frequency the timer interrupt is programmed for.
///
/// # Arguments
///
/// * `frequency_hz` - Interrupt rate in Hz (e.g. 1000 for 1ms ticks)
pub fn init_timer(frequency_hz: u64) {
    TIMER_FREQUENCY.store(frequency_hz.max(1), Ordering::Relaxed);
}

/// Get the current tick count
///
/// The tick count increments on each timer interrupt.
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Increment the tick counter
///
/// This is called by the timer interrupt handler.
pub fn increment_ticks() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Get the timer frequency in Hz
pub fn get_frequency() -> u64 {
    TIMER_FREQUENCY.load(Ordering::Relaxed)
}

/// Convert a tick count to milliseconds at the configured frequency
pub fn ticks_to_ms(ticks: u64) -> u64 {
    ticks.saturating_mul(1000) / get_frequency()
}

/// Sleep for a specified number of milliseconds
///
/// Spins on the tick counter, so the timer interrupt must be running.
pub fn sleep_ms(ms: u64) {
    let start = ticks_to_ms(get_ticks());
    while ticks_to_ms(get_ticks()).saturating_sub(start) < ms {
        core::hint::spin_loop();
    }
}

/// Clock backed by the global tick counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickClock;

impl Clock for TickClock {
    fn now_ms(&self) -> u64 {
        ticks_to_ms(get_ticks())
    }

    fn delay_ms(&mut self, ms: u64) {
        sleep_ms(ms);
    }
}

/// Clock that only moves when told to.
///
/// `delay_ms` advances time instantly, which makes every timeout in the
/// driver deterministic on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualClock {
    now: u64,
}

impl ManualClock {
    /// Create a clock reading `start_ms`
    pub const fn new(start_ms: u64) -> Self {
        Self { now: start_ms }
    }

    /// Move the clock forward by `ms`
    pub fn advance(&mut self, ms: u64) {
        self.now = self.now.saturating_add(ms);
    }

    /// Jump to an absolute time; earlier values are ignored
    pub fn set(&mut self, now_ms: u64) {
        self.now = self.now.max(now_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn delay_ms(&mut self, ms: u64) {
        self.advance(ms.max(1));
    }
}
