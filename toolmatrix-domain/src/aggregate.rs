//! Folds usage records into per-family totals and usage events.

use crate::codes::CodeRules;
use std::collections::{BTreeMap, HashMap};
use toolmatrix_types::feed::UsageRecord;
use toolmatrix_types::tool::UsageEvent;
use tracing::debug;
use uuid::Uuid;

/// Why a usage record was left out of aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No family code could be extracted from the identifier.
    Unattributed,
    /// Zero, negative or non-finite minutes.
    NonPositive,
}

/// A usage record together with the family it was attributed to.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributed<'a> {
    pub family_code: String,
    pub record: &'a UsageRecord,
}

/// Records split into usable and skipped.
#[derive(Debug, Clone, Default)]
pub struct Attribution<'a> {
    pub attributed: Vec<Attributed<'a>>,
    pub unattributed: u64,
    pub non_positive: u64,
}

pub fn classify_record(record: &UsageRecord, rules: &CodeRules) -> Result<String, SkipReason> {
    let family = rules
        .operational_family(&record.tool_id)
        .ok_or(SkipReason::Unattributed)?;
    if !(record.minutes.is_finite() && record.minutes > 0.0) {
        return Err(SkipReason::NonPositive);
    }
    Ok(family)
}

pub fn attribute<'a>(records: &'a [UsageRecord], rules: &CodeRules) -> Attribution<'a> {
    let mut out = Attribution::default();
    for record in records {
        match classify_record(record, rules) {
            Ok(family_code) => out.attributed.push(Attributed {
                family_code,
                record,
            }),
            Err(SkipReason::Unattributed) => {
                debug!(tool_id = %record.tool_id, "usage record has no family code; skipped");
                out.unattributed += 1;
            }
            Err(SkipReason::NonPositive) => {
                debug!(tool_id = %record.tool_id, minutes = record.minutes, "usage record has non-positive minutes; skipped");
                out.non_positive += 1;
            }
        }
    }
    out
}

/// Accumulated minutes per family code, plus skip diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageTotals {
    minutes: BTreeMap<String, f64>,
    pub records: u64,
    pub attributed: u64,
    pub unattributed: u64,
    pub non_positive: u64,
}

impl UsageTotals {
    pub fn get(&self, family_code: &str) -> Option<f64> {
        self.minutes.get(family_code).copied()
    }

    pub fn minutes(&self) -> &BTreeMap<String, f64> {
        &self.minutes
    }

    pub fn families(&self) -> usize {
        self.minutes.len()
    }

    pub fn from_minutes(minutes: BTreeMap<String, f64>) -> Self {
        Self {
            minutes,
            ..Self::default()
        }
    }
}

/// Sums minutes per family. The result does not depend on record order.
pub fn aggregate(records: &[UsageRecord], rules: &CodeRules) -> UsageTotals {
    let attribution = attribute(records, rules);

    let mut contributions: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for a in &attribution.attributed {
        contributions
            .entry(a.family_code.clone())
            .or_default()
            .push(a.record.minutes);
    }

    // Float addition is not associative; summing in sorted order keeps totals permutation-stable.
    let minutes = contributions
        .into_iter()
        .map(|(family, mut values)| {
            values.sort_by(f64::total_cmp);
            (family, values.into_iter().sum::<f64>())
        })
        .collect();

    UsageTotals {
        minutes,
        records: records.len() as u64,
        attributed: attribution.attributed.len() as u64,
        unattributed: attribution.unattributed,
        non_positive: attribution.non_positive,
    }
}

const EVENT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6d, 0x1f, 0x8a, 0x42, 0x93, 0x0c, 0x4e, 0x77, 0xb1, 0x5a, 0x2e, 0x64, 0xc8, 0x09, 0xf3, 0x1d,
]);

/// Usage events per family, in chronological order, with stable ids.
///
/// The id is the record's own identifier when the feed provides one. Otherwise it is a UUIDv5
/// over job and tool, with an occurrence counter so repeated entries within one job stay
/// distinct. Minutes and timestamp are left out: a running job re-reports its growing total
/// under the same id.
pub fn usage_events(attribution: &Attribution<'_>) -> BTreeMap<String, Vec<UsageEvent>> {
    let mut seen: HashMap<String, u32> = HashMap::new();
    let mut out: BTreeMap<String, Vec<UsageEvent>> = BTreeMap::new();

    for a in &attribution.attributed {
        let r = a.record;
        let event_id = match r.record_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let key = format!("{}|{}", r.job_id.as_deref().unwrap_or("-"), r.tool_id);
                let n = seen.entry(key.clone()).or_insert(0);
                *n += 1;
                Uuid::new_v5(&EVENT_NAMESPACE, format!("{key}#{n}").as_bytes()).to_string()
            }
        };

        out.entry(a.family_code.clone()).or_default().push(UsageEvent {
            event_id,
            tool_id: r.tool_id.clone(),
            minutes: r.minutes,
            job_id: r.job_id.clone(),
            project: r.project.clone(),
            recorded_at: r.recorded_at,
        });
    }

    for events in out.values_mut() {
        // Stable: untimed events keep feed order, after the timed ones.
        events.sort_by(|a, b| match (a.recorded_at, b.recorded_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }

    out
}
