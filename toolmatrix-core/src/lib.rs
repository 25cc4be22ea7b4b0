//! Embeddable core library for toolmatrix.
//!
//! Provides a clap-free, I/O-abstracted reconciliation pipeline suitable for linking into the CLI
//! or a dashboard backend.
//!
//! # Port traits
//!
//! All I/O is abstracted behind port traits in [`ports`]:
//! - [`InventorySource`](ports::InventorySource) loads the inventory snapshot
//! - [`UsageSource`](ports::UsageSource) loads the job logs of the usage feed
//! - [`DefinitionsSource`](ports::DefinitionsSource) loads the optional definitions table
//! - [`WritePort`](ports::WritePort) writes registry artifacts
//!
//! The [`adapters`] module provides default filesystem-backed implementations.
//!
//! # Entry points
//!
//! - [`run_cycle`](pipeline::run_cycle) runs one reconciliation cycle
//! - [`Executor`](executor::Executor) owns the trigger/coalesce lifecycle

pub mod adapters;
pub mod executor;
pub mod pipeline;
pub mod ports;
pub mod settings;
pub mod watch;

// Re-export the registry so embedders don't need toolmatrix-domain directly.
pub use toolmatrix_domain::{ToolFilter, ToolRegistry};
