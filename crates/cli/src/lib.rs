//! RiskWatch CLI - command orchestration
//!
//! This crate provides the `riskwatch` binary and its commands.

pub mod commands;
pub mod context;

pub use context::{load_config, AppContext, CONFIG_ENV};
