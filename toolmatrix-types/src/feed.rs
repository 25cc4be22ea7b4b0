use crate::tool::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the inventory snapshot produced from the spreadsheet export.
///
/// Field names follow the exporter (`toolCode`); snake_case is accepted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRow {
    #[serde(alias = "toolCode", alias = "code")]
    pub tool_code: String,

    /// Physical stock count. Spreadsheets sometimes emit `10.0`, so this is a float on the wire.
    #[serde(default, alias = "qty", alias = "inPool")]
    pub quantity: f64,
}

impl InventoryRow {
    pub fn new(tool_code: impl Into<String>, quantity: f64) -> Self {
        Self {
            tool_code: tool_code.into(),
            quantity,
        }
    }

    /// Stock count clamped to a non-negative whole number.
    pub fn in_pool(&self) -> u32 {
        if self.quantity.is_finite() && self.quantity > 0.0 {
            self.quantity.floor().min(f64::from(u32::MAX)) as u32
        } else {
            0
        }
    }
}

/// Job status as reported by the machine-control software.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    #[serde(alias = "COMPLETED", alias = "done", alias = "finished")]
    Completed,
    #[serde(alias = "IN_PROGRESS", alias = "running", alias = "active")]
    InProgress,
    #[serde(alias = "ABORTED", alias = "cancelled")]
    Aborted,
}

impl JobStatus {
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::InProgress)
    }
}

/// One tool usage fact from a job log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Operational tool identifier, e.g. `FRA-P8201-S15.2R0_H100W16L100X`.
    #[serde(alias = "toolId", alias = "tool")]
    pub tool_id: String,

    #[serde(default, alias = "elapsedMinutes", alias = "usageMinutes")]
    pub minutes: f64,

    /// Feed-assigned record identifier, when the producer emits one.
    #[serde(default, alias = "recordId", skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    #[serde(default, alias = "jobId", skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(
        default,
        alias = "recordedAt",
        alias = "finishedAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl UsageRecord {
    pub fn new(tool_id: impl Into<String>, minutes: f64) -> Self {
        Self {
            tool_id: tool_id.into(),
            minutes,
            record_id: None,
            job_id: None,
            project: None,
            status: JobStatus::Completed,
            recorded_at: None,
        }
    }
}

/// Hand-authored metadata for a tool family or a specific matrix code.
///
/// `code` is matched against the cleaned matrix code first and the family code second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(alias = "familyCode", alias = "matrixCode")]
    pub code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    #[serde(default, alias = "image", alias = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<f64>,

    #[serde(default, alias = "toolLife", skip_serializing_if = "Option::is_none")]
    pub tool_life: Option<f64>,
}

impl ToolDefinition {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            category: None,
            image_url: None,
            diameter: None,
            tool_life: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_row_accepts_exporter_field_names() {
        let row: InventoryRow =
            serde_json::from_str(r#"{ "toolCode": "RT-8400300", "quantity": 10 }"#).unwrap();
        assert_eq!(row.tool_code, "RT-8400300");
        assert_eq!(row.in_pool(), 10);
    }

    #[test]
    fn inventory_row_clamps_negative_and_fractional_quantities() {
        assert_eq!(InventoryRow::new("RT-1", -4.0).in_pool(), 0);
        assert_eq!(InventoryRow::new("RT-1", 7.9).in_pool(), 7);
        assert_eq!(InventoryRow::new("RT-1", f64::NAN).in_pool(), 0);
    }

    #[test]
    fn usage_record_defaults_to_completed() {
        let rec: UsageRecord = serde_json::from_str(
            r#"{ "toolId": "FRA-P8201-S15.2R0_H100W16L100X", "minutes": 45 }"#,
        )
        .unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(rec.minutes, 45.0);
        assert!(rec.job_id.is_none());
    }

    #[test]
    fn definition_reads_camel_case_fields() {
        let def: ToolDefinition = serde_json::from_str(
            r#"{ "familyCode": "8400", "category": "ECUT", "imageUrl": "/img/8400.png", "toolLife": 120 }"#,
        )
        .unwrap();
        assert_eq!(def.code, "8400");
        assert_eq!(def.category, Some(Category::Ecut));
        assert_eq!(def.tool_life, Some(120.0));
        assert!(def.diameter.is_none());
    }

    #[test]
    fn usage_record_reads_running_alias() {
        let rec: UsageRecord =
            serde_json::from_str(r#"{ "tool": "P8201", "minutes": 1, "status": "running" }"#)
                .unwrap();
        assert!(rec.status.is_active());
    }
}
