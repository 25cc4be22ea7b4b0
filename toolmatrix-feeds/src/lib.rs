//! Feed ingestion utilities.
//!
//! toolmatrix consumes files written by other programs: the inventory snapshot exported from the
//! tool spreadsheet, the job logs written by machine-control software, and a hand-authored
//! definitions table. The loaders are tolerant: unknown fields are ignored, optional fields may be
//! absent, and one bad job log does not hide the others.

mod definitions;
mod error;
mod inventory;
mod usage;

pub use definitions::load_definitions;
pub use error::{FeedError, JobLogError};
pub use inventory::{LoadedInventory, load_inventory, parse_inventory};
pub use usage::{LoadedJobLog, load_job_logs, parse_job_log};
