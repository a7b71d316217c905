//! Hit/miss counters and elapsed-time groups

pub mod counters;
pub mod timers;

pub use counters::{CacheCounterSnapshot, CacheCounters};
pub use timers::{TimerSnapshot, Timers};
