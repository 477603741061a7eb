//! Deployment: planning, reconciliation and record keeping.
//!
//! Control flow per entity is `planner::plan` -> `reconciler::reconcile`
//! -> [`record::DeploymentStore::save`], driven for a whole run by
//! [`pipeline::deploy`].

pub mod context;
pub mod pipeline;
pub mod planner;
pub mod reconciler;
pub mod record;

pub use context::ReconcileContext;
pub use pipeline::deploy;
