//! Core types: job names and watermarks, recurrence rules, the clock and the
//! action trait.

pub mod action;
pub mod clock;
pub mod schedule;
pub mod types;
