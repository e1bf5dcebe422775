//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Dry-run planning of a query against a hierarchy file
//! - Inspecting the effective configuration

pub mod commands;
pub mod handlers;

pub use handlers::{handle_config, handle_plan};
