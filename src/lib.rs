//! Remote Hands — Brain/Worker coordination core.
//!
//! The Brain side owns the [`registry::WorkerRegistry`], which decides per
//! tool invocation whether to run locally, dispatch to a connected Worker,
//! or park the task in the durable queue. The Worker side runs the
//! [`reporter::LivenessReporter`] and a skill table that turns dispatch
//! frames into result frames.

pub mod classify;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod reporter;
pub mod strategy;
pub mod transport;
pub mod worker;
