//! Shared domain types for the ISN exchange: configuration, the core data
//! model, and helpers used by every other crate.

pub mod config;
pub mod model;
pub mod sem_ver;

pub use config::{Config, ConfigIssue, ConfigSeverity, Environment, ServiceMode};
