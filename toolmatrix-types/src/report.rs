use crate::tool::{Category, Tool};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate counters over the visible registry snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: u64,
    pub free: u64,
    pub in_use: u64,

    /// Tools whose category is not `OTHER`.
    pub matrix: u64,

    /// Tools at or below their warning threshold.
    pub low_stock: u64,

    /// Tools no longer listed by the latest inventory snapshot.
    pub stale: u64,

    pub by_category: BTreeMap<Category, u64>,
}

/// A feed input that could not be read or parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub rows: u64,
    pub tools_created: u64,
    pub tools_refreshed: u64,
    pub tools_stale: u64,

    /// Rows whose code was blank after trimming.
    pub rows_skipped: u64,

    /// sha256 of the snapshot file, when the source is file-backed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub records: u64,
    pub attributed: u64,

    /// Records with no extractable family code.
    pub unattributed: u64,

    /// Records with zero, negative or non-finite minutes.
    pub non_positive: u64,

    pub families: u64,
    pub events_appended: u64,
    pub tools_in_use: u64,
}

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub schema: String,
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub inventory: InventorySummary,
    pub usage: UsageSummary,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs_failed: Vec<InputFailure>,
}

impl CycleReport {
    pub fn new(cycle: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            schema: crate::schema::TOOLMATRIX_CYCLE_V1.to_string(),
            cycle,
            started_at,
            finished_at: started_at,
            inventory: InventorySummary::default(),
            usage: UsageSummary::default(),
            inputs_failed: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.inputs_failed.is_empty()
    }
}

/// Registry snapshot as written for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryExport {
    pub schema: String,
    pub generated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<u64>,

    pub stats: RegistryStats,
    pub tools: Vec<Tool>,
}

impl RegistryExport {
    pub fn new(tools: Vec<Tool>, stats: RegistryStats, cycle: Option<u64>) -> Self {
        Self {
            schema: crate::schema::TOOLMATRIX_REGISTRY_V1.to_string(),
            generated_at: Utc::now(),
            cycle,
            stats,
            tools,
        }
    }
}
