//! Engine metrics.

pub mod events;
