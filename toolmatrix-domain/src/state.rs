//! Tool state machine: `FREE` <-> `IN_USE`, driven by the active-job set of each cycle.

use crate::codes::CodeRules;
use std::collections::BTreeMap;
use toolmatrix_types::feed::UsageRecord;
use toolmatrix_types::tool::ToolState;

/// What the latest usage feed says about one tool family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation<'a> {
    /// An in-progress job holds the tool.
    Claimed { job_id: &'a str },
    /// No in-progress job names the tool.
    Unclaimed,
}

/// Total transition function over `(current state, observed claim)`.
pub fn transition(current: ToolState, observed: Observation<'_>) -> ToolState {
    match (current, observed) {
        (ToolState::Free, Observation::Claimed { .. }) => ToolState::InUse,
        (ToolState::InUse, Observation::Claimed { .. }) => ToolState::InUse,
        (ToolState::InUse, Observation::Unclaimed) => ToolState::Free,
        (ToolState::Free, Observation::Unclaimed) => ToolState::Free,
    }
}

/// Families claimed by in-progress jobs in the latest feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveJobs {
    by_family: BTreeMap<String, String>,
}

impl ActiveJobs {
    /// Collects claims from records whose job is still running.
    ///
    /// Minutes do not matter here: a job that just started may not have reported any yet.
    /// When several running jobs name one family, the smallest job id owns it so the outcome
    /// does not depend on feed order.
    pub fn from_records(records: &[UsageRecord], rules: &CodeRules) -> Self {
        let mut by_family: BTreeMap<String, String> = BTreeMap::new();
        for record in records.iter().filter(|r| r.status.is_active()) {
            let Some(family_code) = rules.operational_family(&record.tool_id) else {
                continue;
            };
            let job = record
                .job_id
                .clone()
                .unwrap_or_else(|| record.tool_id.clone());
            by_family
                .entry(family_code)
                .and_modify(|owner| {
                    if job < *owner {
                        *owner = job.clone();
                    }
                })
                .or_insert(job);
        }
        Self { by_family }
    }

    pub fn observe(&self, family_code: &str) -> Observation<'_> {
        match self.by_family.get(family_code) {
            Some(job_id) => Observation::Claimed { job_id },
            None => Observation::Unclaimed,
        }
    }

    pub fn len(&self) -> usize {
        self.by_family.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_family.is_empty()
    }
}
