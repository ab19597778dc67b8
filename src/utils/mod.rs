//! Utility functions and helpers

pub mod time;

pub use time::next_monotonic;
