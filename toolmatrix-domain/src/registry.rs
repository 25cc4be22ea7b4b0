//! The canonical tool table and the shared, atomically swapped registry around it.

use crate::aggregate::UsageTotals;
use crate::catalog::Catalog;
use crate::state::{ActiveJobs, Observation, transition};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use toolmatrix_types::feed::InventoryRow;
use toolmatrix_types::report::RegistryStats;
use toolmatrix_types::tool::{Category, Tool, ToolState, UsageEvent};
use tracing::debug;

/// Query filter. Every `None` field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFilter {
    pub status: Option<ToolState>,
    /// `Some(true)` keeps only the matrix view (category other than `OTHER`).
    pub matrix: Option<bool>,
    pub category: Option<Category>,
    pub stale: Option<bool>,
    pub low_stock: Option<bool>,
}

impl ToolFilter {
    pub fn matches(&self, tool: &Tool) -> bool {
        self.status.is_none_or(|s| tool.tool_state == s)
            && self.matrix.is_none_or(|m| tool.is_matrix() == m)
            && self.category.is_none_or(|c| tool.category == c)
            && self.stale.is_none_or(|s| tool.stale == s)
            && self.low_stock.is_none_or(|l| tool.is_low_stock() == l)
    }
}

/// Counters from one inventory load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryOutcome {
    pub rows: u64,
    pub created: u64,
    pub refreshed: u64,
    /// Known tools the snapshot no longer lists.
    pub stale: u64,
    /// Rows with a blank code.
    pub skipped: u64,
}

/// Tools in first-seen order, indexed by matrix code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolTable {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Exact match on the matrix code (surrounding whitespace ignored).
    pub fn get(&self, matrix_code: &str) -> Option<&Tool> {
        self.index
            .get(matrix_code.trim())
            .map(|&i| &self.tools[i])
    }

    /// Creates or refreshes one tool per distinct code in `rows`.
    ///
    /// A code listed twice keeps its first position and takes the later row's values. Tools
    /// missing from `rows` keep their last stock count and are flagged stale; nothing is removed.
    pub fn load_inventory(&mut self, rows: &[InventoryRow], catalog: &Catalog) -> InventoryOutcome {
        let mut outcome = InventoryOutcome {
            rows: rows.len() as u64,
            ..InventoryOutcome::default()
        };
        let mut seen: HashSet<usize> = HashSet::with_capacity(rows.len());

        for row in rows {
            let code = row.tool_code.trim();
            if code.is_empty() {
                debug!("inventory row with blank code; skipped");
                outcome.skipped += 1;
                continue;
            }

            let idx = match self.index.get(code) {
                Some(&idx) => {
                    if seen.contains(&idx) {
                        debug!(code, "code listed twice in snapshot; later row wins");
                    } else {
                        outcome.refreshed += 1;
                    }
                    idx
                }
                None => {
                    let idx = self.tools.len();
                    self.tools.push(Tool::new(code, ""));
                    self.index.insert(code.to_string(), idx);
                    outcome.created += 1;
                    idx
                }
            };
            seen.insert(idx);

            let resolved = catalog.resolve(code);
            let tool = &mut self.tools[idx];
            tool.family_code = resolved.normalized.family_code.clone();
            tool.diameter_code = resolved.normalized.diameter_code.clone();
            tool.category = resolved.normalized.category;
            tool.diameter = resolved.diameter();
            tool.tool_life = resolved.tool_life();
            tool.image_url = resolved.image_url();
            tool.set_in_pool(row.in_pool());
            tool.stale = false;
        }

        for (idx, tool) in self.tools.iter_mut().enumerate() {
            if !seen.contains(&idx) {
                if !tool.stale {
                    debug!(code = %tool.matrix_code, "tool missing from snapshot; marked stale");
                }
                tool.stale = true;
                outcome.stale += 1;
            }
        }

        outcome
    }

    /// Sets every tool's usage minutes to its family's total, or 0.
    pub fn merge_usage(&mut self, totals: &UsageTotals, catalog: &Catalog) {
        for tool in &mut self.tools {
            let family = if tool.family_code.is_empty() {
                catalog.family_of(&tool.matrix_code)
            } else {
                tool.family_code.clone()
            };
            tool.usage_minutes = totals.get(&family).unwrap_or(0.0);
        }
    }

    /// Appends events not yet in each tool's history and refreshes re-reported ones in place.
    /// Returns how many were appended.
    pub fn record_usage_events(&mut self, events: &BTreeMap<String, Vec<UsageEvent>>) -> u64 {
        let mut appended = 0;
        for tool in &mut self.tools {
            let Some(family_events) = events.get(&tool.family_code) else {
                continue;
            };
            let mut position: HashMap<String, usize> = tool
                .usage_history
                .iter()
                .enumerate()
                .map(|(i, e)| (e.event_id.clone(), i))
                .collect();
            for event in family_events {
                if let Some(project) = &event.project {
                    tool.projects.insert(project.clone());
                }
                match position.get(&event.event_id) {
                    Some(&i) => {
                        if tool.usage_history[i] != *event {
                            debug!(code = %tool.matrix_code, event_id = %event.event_id, "usage event re-reported; updated");
                            tool.usage_history[i] = event.clone();
                        }
                    }
                    None => {
                        position.insert(event.event_id.clone(), tool.usage_history.len());
                        tool.usage_history.push(event.clone());
                        appended += 1;
                    }
                }
            }
        }
        appended
    }

    /// Moves every tool through the state machine. Returns the number of tools in use.
    pub fn apply_claims(&mut self, active: &ActiveJobs) -> u64 {
        let mut in_use = 0;
        for tool in &mut self.tools {
            let observed = active.observe(&tool.family_code);
            let next = transition(tool.tool_state, observed);
            if next != tool.tool_state {
                debug!(code = %tool.matrix_code, from = %tool.tool_state, to = %next, "tool state changed");
            }
            tool.tool_state = next;
            tool.active_job = match observed {
                Observation::Claimed { job_id } => Some(job_id.to_string()),
                Observation::Unclaimed => None,
            };
            if next == ToolState::InUse {
                in_use += 1;
            }
        }
        in_use
    }

    /// Matching tools, in load order.
    pub fn query(&self, filter: &ToolFilter) -> Vec<Tool> {
        self.tools
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.tools.len() as u64,
            by_category: Category::ALL.into_iter().map(|c| (c, 0)).collect(),
            ..RegistryStats::default()
        };
        for tool in &self.tools {
            match tool.tool_state {
                ToolState::Free => stats.free += 1,
                ToolState::InUse => stats.in_use += 1,
            }
            if tool.is_matrix() {
                stats.matrix += 1;
            }
            if tool.is_low_stock() {
                stats.low_stock += 1;
            }
            if tool.stale {
                stats.stale += 1;
            }
            *stats.by_category.entry(tool.category).or_insert(0) += 1;
        }
        stats
    }
}

/// Shared registry. Readers get whole snapshots; writers stage a copy and publish it in one swap.
///
/// Writers are expected to be serialized by the caller (the executor runs one cycle at a time).
#[derive(Debug, Default)]
pub struct ToolRegistry {
    current: RwLock<Arc<ToolTable>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<ToolTable> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A private copy of the current table to mutate before [`ToolRegistry::publish`].
    pub fn stage(&self) -> ToolTable {
        (*self.snapshot()).clone()
    }

    pub fn publish(&self, table: ToolTable) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    }

    /// Stage, mutate, publish.
    pub fn update<R>(&self, f: impl FnOnce(&mut ToolTable) -> R) -> R {
        let mut staged = self.stage();
        let out = f(&mut staged);
        self.publish(staged);
        out
    }

    pub fn load_inventory(&self, rows: &[InventoryRow], catalog: &Catalog) -> InventoryOutcome {
        self.update(|t| t.load_inventory(rows, catalog))
    }

    pub fn merge_usage(&self, totals: &UsageTotals, catalog: &Catalog) {
        self.update(|t| t.merge_usage(totals, catalog))
    }

    pub fn query(&self, filter: &ToolFilter) -> Vec<Tool> {
        self.snapshot().query(filter)
    }

    pub fn get_by_id(&self, matrix_code: &str) -> Option<Tool> {
        self.snapshot().get(matrix_code).cloned()
    }

    pub fn stats(&self) -> RegistryStats {
        self.snapshot().stats()
    }
}
