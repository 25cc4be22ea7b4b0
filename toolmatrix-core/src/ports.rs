//! Port traits abstracting all I/O away from the pipeline.

use camino::Utf8Path;
use toolmatrix_feeds::{LoadedInventory, LoadedJobLog};
use toolmatrix_types::feed::ToolDefinition;

/// Source of the latest inventory snapshot.
pub trait InventorySource: Send + Sync {
    fn load_inventory(&self) -> anyhow::Result<LoadedInventory>;
}

/// Source of the usage feed, one entry per job log.
pub trait UsageSource: Send + Sync {
    fn load_job_logs(&self) -> anyhow::Result<Vec<LoadedJobLog>>;
}

/// Source of the hand-authored definitions table. `Ok(None)` means there is no table.
pub trait DefinitionsSource: Send + Sync {
    fn load_definitions(&self) -> anyhow::Result<Option<Vec<ToolDefinition>>>;
}

/// File-system write operations.
pub trait WritePort: Send + Sync {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()>;
    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()>;
}
