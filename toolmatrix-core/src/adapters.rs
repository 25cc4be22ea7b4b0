//! Default filesystem-backed port implementations, plus in-memory ones for embedding and tests.

use crate::ports::{DefinitionsSource, InventorySource, UsageSource, WritePort};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use toolmatrix_feeds::{LoadedInventory, LoadedJobLog};
use toolmatrix_types::feed::{InventoryRow, ToolDefinition};

/// Reads the inventory snapshot via `toolmatrix_feeds::load_inventory`.
#[derive(Debug, Clone)]
pub struct FsInventorySource {
    pub path: Utf8PathBuf,
}

impl FsInventorySource {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}

impl InventorySource for FsInventorySource {
    fn load_inventory(&self) -> anyhow::Result<LoadedInventory> {
        toolmatrix_feeds::load_inventory(&self.path)
            .with_context(|| format!("load inventory snapshot from {}", self.path))
    }
}

/// Reads the job logs under one directory via `toolmatrix_feeds::load_job_logs`.
#[derive(Debug, Clone)]
pub struct FsUsageSource {
    pub usage_dir: Utf8PathBuf,
}

impl FsUsageSource {
    pub fn new(usage_dir: Utf8PathBuf) -> Self {
        Self { usage_dir }
    }
}

impl UsageSource for FsUsageSource {
    fn load_job_logs(&self) -> anyhow::Result<Vec<LoadedJobLog>> {
        toolmatrix_feeds::load_job_logs(&self.usage_dir)
            .with_context(|| format!("load job logs from {}", self.usage_dir))
    }
}

/// Reads the definitions table. With no path configured there is never a table.
#[derive(Debug, Clone, Default)]
pub struct FsDefinitionsSource {
    pub path: Option<Utf8PathBuf>,
}

impl FsDefinitionsSource {
    pub fn new(path: Option<Utf8PathBuf>) -> Self {
        Self { path }
    }
}

impl DefinitionsSource for FsDefinitionsSource {
    fn load_definitions(&self) -> anyhow::Result<Option<Vec<ToolDefinition>>> {
        match &self.path {
            Some(path) => toolmatrix_feeds::load_definitions(path)
                .with_context(|| format!("load definitions from {}", path)),
            None => Ok(None),
        }
    }
}

/// In-memory inventory snapshot. It has no file, so its digest is empty.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventorySource {
    rows: Vec<InventoryRow>,
}

impl InMemoryInventorySource {
    pub fn new(rows: Vec<InventoryRow>) -> Self {
        Self { rows }
    }
}

impl InventorySource for InMemoryInventorySource {
    fn load_inventory(&self) -> anyhow::Result<LoadedInventory> {
        Ok(LoadedInventory {
            path: Utf8PathBuf::from("<memory>"),
            rows: self.rows.clone(),
            digest: String::new(),
        })
    }
}

/// In-memory usage feed. Sorted by path on construction to match `FsUsageSource`'s ordering.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUsageSource {
    logs: Vec<LoadedJobLog>,
}

impl InMemoryUsageSource {
    pub fn new(mut logs: Vec<LoadedJobLog>) -> Self {
        logs.sort_by(|a, b| a.path.cmp(&b.path));
        Self { logs }
    }
}

impl UsageSource for InMemoryUsageSource {
    fn load_job_logs(&self) -> anyhow::Result<Vec<LoadedJobLog>> {
        Ok(self.logs.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDefinitionsSource {
    definitions: Option<Vec<ToolDefinition>>,
}

impl InMemoryDefinitionsSource {
    pub fn new(definitions: Option<Vec<ToolDefinition>>) -> Self {
        Self { definitions }
    }
}

impl DefinitionsSource for InMemoryDefinitionsSource {
    fn load_definitions(&self) -> anyhow::Result<Option<Vec<ToolDefinition>>> {
        Ok(self.definitions.clone())
    }
}

/// Filesystem write operations.
#[derive(Debug, Clone, Default)]
pub struct FsWritePort;

impl WritePort for FsWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir for {}", path))?;
        }
        fs::write(path, contents).with_context(|| format!("write {}", path))
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        fs::create_dir_all(path).with_context(|| format!("create_dir_all {}", path))
    }
}
