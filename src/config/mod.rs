//! Configuration module for streakvault
//!
//! This module provides configuration management including:
//! - Path resolution for the store, archives and recovery output
//! - Operator settings persistence (retention, schedule, store layout)

pub mod paths;
pub mod settings;

pub use paths::VaultPaths;
pub use settings::{RetentionPolicy, RetentionRule, Settings};
