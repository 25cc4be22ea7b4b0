//! Filesystem change notifications for the pipeline inputs.
//!
//! Files are watched through their parent directory, so an exporter that replaces the inventory
//! snapshot by rename is still noticed. An input that does not exist yet is watched recursively
//! from its nearest existing ancestor, so creating it later still triggers a cycle.

use anyhow::Context;
use camino::Utf8PathBuf;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Keeps the OS watch alive; dropping it releases every watch.
pub struct InputWatcher {
    _watcher: RecommendedWatcher,
}

impl InputWatcher {
    pub fn new<F>(inputs: &[Utf8PathBuf], on_change: F) -> anyhow::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let targets: Vec<PathBuf> = inputs
            .iter()
            .map(|p| absolute(p.as_std_path()))
            .collect();
        let filter = targets.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_relevant(&event.kind, &event.paths, &filter) {
                    debug!(paths = ?event.paths, "input changed");
                    on_change();
                }
            }
            Err(e) => warn!(error = %e, "watch error"),
        })
        .context("create filesystem watcher")?;

        for (root, recursive) in watch_roots(&targets) {
            if !root.exists() {
                warn!(path = %root.display(), "no existing ancestor for input; not watched");
                continue;
            }
            let mode = if recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher
                .watch(&root, mode)
                .with_context(|| format!("watch {}", root.display()))?;
            debug!(path = %root.display(), recursive, "watching");
        }

        info!(inputs = inputs.len(), "input watcher initialized");
        Ok(Self { _watcher: watcher })
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Directories are watched as-is and files through their parent. A missing input is watched
/// recursively from its nearest existing ancestor. Recursive wins when two inputs share a root.
fn watch_roots(targets: &[PathBuf]) -> BTreeMap<PathBuf, bool> {
    let mut roots: BTreeMap<PathBuf, bool> = BTreeMap::new();
    for target in targets {
        let (root, recursive) = watch_root(target);
        *roots.entry(root).or_insert(false) |= recursive;
    }
    roots
}

fn watch_root(target: &Path) -> (PathBuf, bool) {
    if target.is_dir() {
        return (target.to_path_buf(), false);
    }
    if target.exists() {
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        return (parent, false);
    }
    let ancestor = target
        .ancestors()
        .skip(1)
        .find(|a| !a.as_os_str().is_empty() && a.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    (ancestor, true)
}

/// Content changes to one of the targets, or to anything inside a target directory.
fn is_relevant(kind: &EventKind, paths: &[PathBuf], targets: &[PathBuf]) -> bool {
    let content_change = matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    content_change
        && paths
            .iter()
            .any(|p| targets.iter().any(|t| p == t || p.starts_with(t)))
}
