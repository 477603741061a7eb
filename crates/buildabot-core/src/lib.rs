//! Definition compiler and deployment reconciler for build-a-bot.
//!
//! This crate defines the "ports" (the [`remote::RemoteService`] and
//! [`deploy::record::DeploymentStore`] traits) that the infrastructure layer
//! implements. It depends only on `buildabot-types` -- never on
//! `buildabot-infra` or any network/disk crate.

pub mod compiler;
pub mod deploy;
pub mod remote;
pub mod teardown;
