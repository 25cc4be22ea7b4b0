//! Executor lifecycle: process_files, trigger coalescing and graceful stop.

use camino::Utf8PathBuf;
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use toolmatrix_core::adapters::{
    FsDefinitionsSource, FsInventorySource, FsUsageSource, FsWritePort, InMemoryDefinitionsSource,
    InMemoryUsageSource,
};
use toolmatrix_core::executor::{CycleStatus, Executor, ExecutorPorts};
use toolmatrix_core::pipeline::CycleError;
use toolmatrix_core::ports::InventorySource;
use toolmatrix_core::settings::ReconcileSettings;
use toolmatrix_core::ToolFilter;
use toolmatrix_feeds::LoadedInventory;
use toolmatrix_types::feed::InventoryRow;
use toolmatrix_types::tool::{Category, ToolState};

/// Blocks its first load until released, so a test can trigger while a cycle runs.
#[derive(Default)]
struct GatedInventory {
    calls: AtomicU64,
    entered: Notify,
    held: Mutex<bool>,
    released: Condvar,
}

impl GatedInventory {
    fn holding() -> Self {
        Self {
            held: Mutex::new(true),
            ..Self::default()
        }
    }

    fn hold(&self) {
        *self.held.lock().unwrap() = true;
    }

    fn release(&self) {
        *self.held.lock().unwrap() = false;
        self.released.notify_all();
    }
}

fn gated_ports(inventory: &Arc<GatedInventory>) -> ExecutorPorts {
    ExecutorPorts {
        inventory: inventory.clone(),
        usage: Arc::new(InMemoryUsageSource::default()),
        definitions: Arc::new(InMemoryDefinitionsSource::default()),
        writer: None,
    }
}

async fn wait_completed(status: &mut tokio::sync::watch::Receiver<CycleStatus>, n: u64) {
    tokio::time::timeout(Duration::from_secs(10), status.wait_for(|s| s.completed >= n))
        .await
        .expect("cycles completed in time")
        .unwrap();
}

impl InventorySource for GatedInventory {
    fn load_inventory(&self) -> anyhow::Result<LoadedInventory> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        let mut held = self.held.lock().unwrap();
        while *held {
            held = self.released.wait(held).unwrap();
        }
        Ok(LoadedInventory {
            path: Utf8PathBuf::from("<gated>"),
            rows: vec![InventoryRow::new("RT-8400300", 10.0)],
            digest: String::new(),
        })
    }
}

fn quiet_settings() -> ReconcileSettings {
    ReconcileSettings {
        watch: false,
        out_dir: None,
        definitions_path: None,
        ..ReconcileSettings::default()
    }
}

fn root(temp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

struct Fixture {
    _temp: TempDir,
    root: Utf8PathBuf,
    settings: ReconcileSettings,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let root = root(&temp);
    fs::create_dir_all(root.join("usage")).unwrap();
    fs::write(
        root.join("inventory.json"),
        r#"[
            { "toolCode": "RT-8400300", "quantity": 10 },
            { "toolCode": "RT-8201500_1", "quantity": 4 },
            { "toolCode": "RT-X7620300", "quantity": 12 }
        ]"#,
    )
    .unwrap();
    fs::write(
        root.join("usage/job-1.json"),
        r#"{ "jobId": "J-1", "project": "PRJ-A", "tools": [
            { "toolId": "FRA-P8201-S15.2R0_H100W16L100X", "minutes": 45 }
        ] }"#,
    )
    .unwrap();
    fs::write(
        root.join("usage/job-2.json"),
        r#"{ "jobId": "J-2", "status": "in_progress", "tools": [
            { "toolId": "MILL-P7620-S3", "minutes": 7.5 }
        ] }"#,
    )
    .unwrap();

    let settings = ReconcileSettings {
        inventory_path: root.join("inventory.json"),
        usage_dir: root.join("usage"),
        definitions_path: Some(root.join("definitions.json")),
        out_dir: Some(root.join("out")),
        watch: false,
        ..ReconcileSettings::default()
    };
    Fixture {
        _temp: temp,
        root,
        settings,
    }
}

fn fs_ports(settings: &ReconcileSettings) -> ExecutorPorts {
    ExecutorPorts {
        inventory: Arc::new(FsInventorySource::new(settings.inventory_path.clone())),
        usage: Arc::new(FsUsageSource::new(settings.usage_dir.clone())),
        definitions: Arc::new(FsDefinitionsSource::new(settings.definitions_path.clone())),
        writer: Some(Arc::new(FsWritePort)),
    }
}

#[tokio::test]
async fn process_files_reconciles_fs_sources() {
    let fx = fixture();
    let exec = Executor::new(fx.settings.clone(), fs_ports(&fx.settings));

    let report = exec.process_files().await.unwrap();
    assert_eq!(report.cycle, 1);
    assert_eq!(report.inventory.tools_created, 3);
    assert_eq!(report.inventory.digest.as_ref().map(String::len), Some(64));

    let registry = exec.registry();
    let mfc = registry.get_by_id("RT-8201500_1").unwrap();
    assert_eq!(mfc.category, Category::Mfc);
    assert_eq!(mfc.usage_minutes, 45.0);
    assert!(mfc.projects.contains("PRJ-A"));

    let xfeed = registry.get_by_id("RT-X7620300").unwrap();
    assert_eq!(xfeed.category, Category::Xfeed);
    assert_eq!(xfeed.tool_state, ToolState::InUse);

    let in_use = registry.query(&ToolFilter {
        status: Some(ToolState::InUse),
        ..ToolFilter::default()
    });
    assert_eq!(in_use.len(), 1);

    assert!(fx.root.join("out/registry.json").is_file());
    assert!(fx.root.join("out/registry.md").is_file());
    assert!(fx.root.join("out/cycle.json").is_file());
}

#[tokio::test]
async fn process_files_twice_is_idempotent() {
    let fx = fixture();
    let exec = Executor::new(fx.settings.clone(), fs_ports(&fx.settings));

    exec.process_files().await.unwrap();
    let first = exec.registry().snapshot();
    let second_report = exec.process_files().await.unwrap();
    let second = exec.registry().snapshot();

    assert_eq!(*first, *second);
    assert_eq!(second_report.cycle, 2);
    assert_eq!(second_report.usage.events_appended, 0);
}

#[tokio::test]
async fn missing_usage_dir_fails_cycle_and_keeps_registry() {
    let fx = fixture();
    let exec = Executor::new(fx.settings.clone(), fs_ports(&fx.settings));
    exec.process_files().await.unwrap();
    let before = exec.registry().snapshot();

    fs::remove_dir_all(fx.root.join("usage")).unwrap();
    let err = exec.process_files().await.unwrap_err();
    assert!(matches!(
        err,
        CycleError::SourceUnavailable { input: "usage", .. }
    ));
    assert_eq!(*exec.registry().snapshot(), *before);

    let status = exec.status();
    assert_eq!(status.completed, 1);
    assert_eq!(status.failed, 1);
    assert!(status.last_error.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn triggers_during_a_cycle_collapse_into_one_rerun() {
    let inventory = Arc::new(GatedInventory::holding());
    let exec = Executor::new(quiet_settings(), gated_ports(&inventory));
    let mut status = exec.subscribe();

    exec.start().unwrap();
    inventory.entered.notified().await;

    exec.trigger();
    exec.trigger();
    inventory.release();

    wait_completed(&mut status, 2).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    exec.stop().await;

    assert_eq!(exec.status().completed, 2);
    assert_eq!(inventory.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_lets_running_cycle_finish() {
    let inventory = Arc::new(GatedInventory::holding());
    let exec = Arc::new(Executor::new(quiet_settings(), gated_ports(&inventory)));

    exec.start().unwrap();
    inventory.entered.notified().await;
    exec.trigger();

    let stopper = {
        let exec = Arc::clone(&exec);
        tokio::spawn(async move { exec.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    inventory.release();
    tokio::time::timeout(Duration::from_secs(10), stopper)
        .await
        .expect("stop returns")
        .unwrap();

    assert_eq!(exec.status().completed, 1);
    assert_eq!(inventory.calls.load(Ordering::SeqCst), 1);
    assert!(exec.registry().get_by_id("RT-8400300").is_some());
}

#[tokio::test]
async fn start_is_idempotent_and_runs_initial_cycle() {
    let fx = fixture();
    let exec = Executor::new(fx.settings.clone(), fs_ports(&fx.settings));
    let mut status = exec.subscribe();

    exec.start().unwrap();
    exec.start().unwrap();
    wait_completed(&mut status, 1).await;
    exec.stop().await;

    assert_eq!(exec.registry().stats().total, 3);
}

#[tokio::test]
async fn malformed_definitions_fail_cycle_and_keep_registry() {
    let fx = fixture();
    let exec = Executor::new(fx.settings.clone(), fs_ports(&fx.settings));
    exec.process_files().await.unwrap();
    let before = exec.registry().snapshot();

    fs::write(fx.root.join("definitions.json"), "{ \"8400\": { \"category\": ").unwrap();
    let err = exec.process_files().await.unwrap_err();
    assert!(matches!(
        err,
        CycleError::SourceUnavailable {
            input: "definitions",
            ..
        }
    ));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(*exec.registry().snapshot(), *before);
    assert_eq!(exec.status().failed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn triggers_during_process_files_collapse_into_one_rerun() {
    let inventory = Arc::new(GatedInventory::default());
    let exec = Arc::new(Executor::new(quiet_settings(), gated_ports(&inventory)));
    let mut status = exec.subscribe();

    exec.start().unwrap();
    wait_completed(&mut status, 1).await;
    // Consume the wakeup left by the initial cycle.
    inventory.entered.notified().await;

    inventory.hold();
    let direct = {
        let exec = Arc::clone(&exec);
        tokio::spawn(async move { exec.process_files().await })
    };
    inventory.entered.notified().await;

    exec.trigger();
    exec.trigger();
    inventory.release();

    let report = direct.await.unwrap().unwrap();
    assert_eq!(report.cycle, 2);
    wait_completed(&mut status, 3).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    exec.stop().await;

    assert_eq!(exec.status().completed, 3);
    assert_eq!(inventory.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_waits_for_process_files_cycle() {
    let inventory = Arc::new(GatedInventory::holding());
    let exec = Arc::new(Executor::new(quiet_settings(), gated_ports(&inventory)));

    let direct = {
        let exec = Arc::clone(&exec);
        tokio::spawn(async move { exec.process_files().await })
    };
    inventory.entered.notified().await;

    let stopper = {
        let exec = Arc::clone(&exec);
        tokio::spawn(async move { exec.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopper.is_finished());

    inventory.release();
    tokio::time::timeout(Duration::from_secs(10), stopper)
        .await
        .expect("stop returns")
        .unwrap();

    assert_eq!(exec.status().completed, 1);
    assert!(exec.registry().get_by_id("RT-8400300").is_some());
    direct.await.unwrap().unwrap();
}
