//! Built-in job actions.
//!
//! This module provides actions that run outside the process, so jobs can be
//! declared in configuration without custom code.

mod command;

pub use command::{CommandAction, CommandActionBuilder};
