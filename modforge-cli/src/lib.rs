//! modforge command-line library
//!
//! This module exports the command implementations and configuration for
//! the `modforge` binary and its tests.

pub mod commands;
pub mod config;
pub mod logging;
pub mod report;
