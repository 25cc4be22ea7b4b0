//! Shared DTOs (schemas-as-code) for the toolmatrix workspace.
//!
//! # Design constraints
//! - The registry export is read by the dashboard; keep field names stable.
//! - Feed rows are written by other programs; deserialize them tolerantly.
//! - Prefer adding optional fields over changing semantics.

pub mod feed;
pub mod report;
pub mod tool;

/// Schema identifiers.
pub mod schema {
    pub const TOOLMATRIX_REGISTRY_V1: &str = "toolmatrix.registry.v1";
    pub const TOOLMATRIX_CYCLE_V1: &str = "toolmatrix.cycle.v1";
}
