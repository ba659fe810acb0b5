//! CLI command implementations.

pub mod common;
pub mod config;
pub mod get;
pub mod plan;
pub mod put;
