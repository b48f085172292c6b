// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library surface for the mediaforge CLI.
//!
//! Split out from the binary so the command implementations, settings
//! loading, and output formatting can be exercised directly in tests
//! without spawning a process.

pub mod commands;
pub mod config;
pub mod format;
