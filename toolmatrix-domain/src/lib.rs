//! Domain logic: turn inventory rows and usage records into the canonical tool registry.
//!
//! This crate owns *what* the registry says about each tool. Reading feeds from disk and deciding
//! *when* to reconcile live in `toolmatrix-feeds` and `toolmatrix-core`.

mod aggregate;
mod catalog;
mod codes;
mod registry;
mod state;

pub use aggregate::{
    Attributed, Attribution, SkipReason, UsageTotals, aggregate, attribute, classify_record,
    usage_events,
};
pub use catalog::{
    BUILTIN_PATTERNS, Catalog, CatalogSource, CategoryPattern, CategoryTable, ResolvedCode,
};
pub use codes::{
    CodeRules, LengthRule, MarkerStrip, NormalizedCode, OperationalRule, normalize,
    operational_family,
};
pub use registry::{InventoryOutcome, ToolFilter, ToolRegistry, ToolTable};
pub use state::{ActiveJobs, Observation, transition};
