#![cfg_attr(not(test), no_std)]

// Shared crate for the offload-chip network driver
// Timekeeping and seeded randomness used across crates

pub mod rng;
pub mod timer;

// Re-export commonly used types
pub use rng::SeededRng;
pub use timer::{Clock, ManualClock, TickClock};
