//! Command-line driver for the sheet mapping engine.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod summary;
