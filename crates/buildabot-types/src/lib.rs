//! Shared domain types for build-a-bot.
//!
//! This crate contains the core domain types used across the workspace:
//! the in-memory VirtualTree, the validated Definition and its parts, the
//! DeploymentRecord cache, hosting-service resource records, plan/report
//! types, configuration, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod definition;
pub mod error;
pub mod plan;
pub mod remote;
pub mod tree;
