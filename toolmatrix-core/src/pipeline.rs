//! One reconciliation cycle, extracted from the executor so it can run standalone.
//!
//! The cycle is I/O-agnostic: every read goes through the port traits, and the registry is only
//! touched by a single publish at the very end.

use crate::ports::{DefinitionsSource, InventorySource, UsageSource, WritePort};
use crate::settings::ReconcileSettings;
use anyhow::Context;
use camino::Utf8Path;
use chrono::Utc;
use toolmatrix_domain::{
    ActiveJobs, Catalog, ToolRegistry, ToolTable, aggregate, attribute, usage_events,
};
use toolmatrix_render::{render_cycle_md, render_registry_md};
use toolmatrix_types::feed::UsageRecord;
use toolmatrix_types::report::{CycleReport, InputFailure, RegistryExport};
use tracing::{debug, info, warn};

/// Error type for cycle results. Exit code 2 = source unavailable, 1 = tool error.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("{input} source unavailable: {message}")]
    SourceUnavailable { input: &'static str, message: String },
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl CycleError {
    fn unavailable(input: &'static str, err: anyhow::Error) -> Self {
        CycleError::SourceUnavailable {
            input,
            message: format!("{err:#}"),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CycleError::SourceUnavailable { .. } => 2,
            CycleError::Internal(_) => 1,
        }
    }
}

/// The three input ports of a cycle.
#[derive(Clone, Copy)]
pub struct CycleSources<'a> {
    pub inventory: &'a dyn InventorySource,
    pub usage: &'a dyn UsageSource,
    pub definitions: &'a dyn DefinitionsSource,
}

/// Run one cycle and publish the result into `registry`.
///
/// Every source is read before the registry is touched. If any of them is unavailable the cycle
/// aborts with [`CycleError::SourceUnavailable`] and readers keep seeing the previous snapshot.
/// A single unreadable job log is not fatal: it is listed in `inputs_failed` and skipped.
pub fn run_cycle(
    cycle: u64,
    settings: &ReconcileSettings,
    sources: CycleSources<'_>,
    registry: &ToolRegistry,
) -> Result<CycleReport, CycleError> {
    let mut report = CycleReport::new(cycle, Utc::now());

    let definitions = sources
        .definitions
        .load_definitions()
        .map_err(|e| CycleError::unavailable("definitions", e))?;
    let catalog = Catalog::new(settings.rules.clone(), definitions);
    debug!(cycle, source = ?catalog.source(), "catalog ready");

    let inventory = sources
        .inventory
        .load_inventory()
        .map_err(|e| CycleError::unavailable("inventory", e))?;
    let logs = sources
        .usage
        .load_job_logs()
        .map_err(|e| CycleError::unavailable("usage", e))?;

    let mut records: Vec<UsageRecord> = Vec::new();
    for log in logs {
        match log.records {
            Ok(mut r) => records.append(&mut r),
            Err(e) => {
                warn!(path = %log.path, error = %e, "skipping unreadable job log");
                report.inputs_failed.push(InputFailure {
                    path: log.path.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let mut staged: ToolTable = registry.stage();

    let loaded = staged.load_inventory(&inventory.rows, &catalog);
    report.inventory.rows = loaded.rows;
    report.inventory.tools_created = loaded.created;
    report.inventory.tools_refreshed = loaded.refreshed;
    report.inventory.tools_stale = loaded.stale;
    report.inventory.rows_skipped = loaded.skipped;
    report.inventory.digest = (!inventory.digest.is_empty()).then_some(inventory.digest);

    let totals = aggregate(&records, catalog.rules());
    staged.merge_usage(&totals, &catalog);
    let appended = staged.record_usage_events(&usage_events(&attribute(&records, catalog.rules())));
    let in_use = staged.apply_claims(&ActiveJobs::from_records(&records, catalog.rules()));

    report.usage.records = totals.records;
    report.usage.attributed = totals.attributed;
    report.usage.unattributed = totals.unattributed;
    report.usage.non_positive = totals.non_positive;
    report.usage.families = totals.families() as u64;
    report.usage.events_appended = appended;
    report.usage.tools_in_use = in_use;

    registry.publish(staged);
    report.finished_at = Utc::now();

    info!(
        cycle,
        tools = registry.snapshot().len(),
        created = loaded.created,
        stale = loaded.stale,
        records = totals.records,
        unattributed = totals.unattributed,
        in_use,
        failed_inputs = report.inputs_failed.len(),
        "reconciliation cycle complete"
    );

    Ok(report)
}

/// Write `registry.json`, `registry.md` and `cycle.json` to the output directory.
pub fn write_registry_artifacts(
    registry: &ToolRegistry,
    report: &CycleReport,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;

    let table = registry.snapshot();
    let export = RegistryExport::new(table.tools().to_vec(), table.stats(), Some(report.cycle));

    let registry_json = serde_json::to_string_pretty(&export).context("serialize registry")?;
    writer.write_file(&out_dir.join("registry.json"), registry_json.as_bytes())?;

    let registry_md = render_registry_md(&export);
    writer.write_file(&out_dir.join("registry.md"), registry_md.as_bytes())?;

    let cycle_json = serde_json::to_string_pretty(report).context("serialize cycle report")?;
    writer.write_file(&out_dir.join("cycle.json"), cycle_json.as_bytes())?;

    let cycle_md = render_cycle_md(report);
    writer.write_file(&out_dir.join("cycle.md"), cycle_md.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        InMemoryDefinitionsSource, InMemoryInventorySource, InMemoryUsageSource,
    };
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use toolmatrix_feeds::{JobLogError, LoadedJobLog};
    use toolmatrix_types::feed::{InventoryRow, ToolDefinition};
    use toolmatrix_types::tool::Category;

    struct FailingInventory;

    impl InventorySource for FailingInventory {
        fn load_inventory(&self) -> anyhow::Result<toolmatrix_feeds::LoadedInventory> {
            anyhow::bail!("disk on fire")
        }
    }

    #[derive(Default)]
    struct MemWritePort {
        files: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl WritePort for MemWritePort {
        fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
            let key = path.as_str().replace('\\', "/");
            self.files
                .lock()
                .unwrap()
                .insert(key, contents.to_vec());
            Ok(())
        }

        fn create_dir_all(&self, _path: &Utf8Path) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn job(path: &str, records: Vec<UsageRecord>) -> LoadedJobLog {
        LoadedJobLog {
            path: Utf8PathBuf::from(path),
            job_id: path.to_string(),
            records: Ok(records),
        }
    }

    fn inventory() -> InMemoryInventorySource {
        InMemoryInventorySource::new(vec![
            InventoryRow::new("RT-8400300", 10.0),
            InventoryRow::new("RT-8201500", 4.0),
        ])
    }

    #[test]
    fn cycle_reports_counts_and_publishes() {
        let registry = ToolRegistry::new();
        let usage = InMemoryUsageSource::new(vec![
            job("usage/a.json", vec![UsageRecord::new("FRA-P8201-S1", 45.0)]),
            job("usage/b.json", vec![UsageRecord::new("nothing", 2.0)]),
        ]);
        let defs = InMemoryDefinitionsSource::default();
        let inv = inventory();
        let sources = CycleSources {
            inventory: &inv,
            usage: &usage,
            definitions: &defs,
        };

        let report = run_cycle(1, &ReconcileSettings::default(), sources, &registry).unwrap();

        assert_eq!(report.cycle, 1);
        assert_eq!(report.inventory.tools_created, 2);
        assert!(report.inventory.digest.is_none());
        assert_eq!(report.usage.records, 2);
        assert_eq!(report.usage.attributed, 1);
        assert_eq!(report.usage.unattributed, 1);
        assert_eq!(report.usage.events_appended, 1);
        assert!(!report.is_partial());
        assert_eq!(registry.get_by_id("RT-8201500").unwrap().usage_minutes, 45.0);
    }

    #[test]
    fn unavailable_source_keeps_previous_snapshot() {
        let registry = ToolRegistry::new();
        let usage = InMemoryUsageSource::default();
        let defs = InMemoryDefinitionsSource::default();
        let inv = inventory();
        let settings = ReconcileSettings::default();

        let ok = CycleSources {
            inventory: &inv,
            usage: &usage,
            definitions: &defs,
        };
        run_cycle(1, &settings, ok, &registry).unwrap();
        let before = registry.snapshot();

        let failing = CycleSources {
            inventory: &FailingInventory,
            ..ok
        };
        let err = run_cycle(2, &settings, failing, &registry).unwrap_err();
        assert!(matches!(
            err,
            CycleError::SourceUnavailable {
                input: "inventory",
                ..
            }
        ));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(*registry.snapshot(), *before);
    }

    #[test]
    fn broken_job_log_is_reported_not_fatal() {
        let registry = ToolRegistry::new();
        let mut broken = job("usage/broken.json", vec![]);
        broken.records = Err(JobLogError::Json {
            message: "EOF while parsing".to_string(),
        });
        let usage = InMemoryUsageSource::new(vec![
            broken,
            job("usage/ok.json", vec![UsageRecord::new("P8400", 5.0)]),
        ]);
        let defs = InMemoryDefinitionsSource::default();
        let inv = inventory();
        let sources = CycleSources {
            inventory: &inv,
            usage: &usage,
            definitions: &defs,
        };

        let report = run_cycle(1, &ReconcileSettings::default(), sources, &registry).unwrap();
        assert!(report.is_partial());
        assert_eq!(report.inputs_failed[0].path, "usage/broken.json");
        assert_eq!(registry.get_by_id("RT-8400300").unwrap().usage_minutes, 5.0);
    }

    #[test]
    fn definitions_feed_catalog() {
        let registry = ToolRegistry::new();
        let usage = InMemoryUsageSource::default();
        let mut def = ToolDefinition::new("8400");
        def.category = Some(Category::Xf);
        def.image_url = Some("/img/8400.png".into());
        let defs = InMemoryDefinitionsSource::new(Some(vec![def]));
        let inv = inventory();
        let sources = CycleSources {
            inventory: &inv,
            usage: &usage,
            definitions: &defs,
        };

        run_cycle(1, &ReconcileSettings::default(), sources, &registry).unwrap();
        let tool = registry.get_by_id("RT-8400300").unwrap();
        assert_eq!(tool.category, Category::Xf);
        assert_eq!(tool.image_url.as_deref(), Some("/img/8400.png"));
        assert_eq!(
            registry.get_by_id("RT-8201500").unwrap().category,
            Category::Other
        );
    }

    #[test]
    fn artifacts_are_written() {
        let registry = ToolRegistry::new();
        let usage = InMemoryUsageSource::default();
        let defs = InMemoryDefinitionsSource::default();
        let inv = inventory();
        let sources = CycleSources {
            inventory: &inv,
            usage: &usage,
            definitions: &defs,
        };
        let report = run_cycle(3, &ReconcileSettings::default(), sources, &registry).unwrap();

        let writer = MemWritePort::default();
        write_registry_artifacts(&registry, &report, Utf8Path::new("out"), &writer).unwrap();

        let files = writer.files.lock().unwrap();
        let mut names: Vec<&str> = files.keys().map(String::as_str).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["out/cycle.json", "out/cycle.md", "out/registry.json", "out/registry.md"]
        );

        let export: serde_json::Value =
            serde_json::from_slice(&files["out/registry.json"]).unwrap();
        assert_eq!(export["schema"], "toolmatrix.registry.v1");
        assert_eq!(export["cycle"], 3);
        assert_eq!(export["tools"].as_array().unwrap().len(), 2);
    }
}
