use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Coarse tool-family classification used for filtering and display.
///
/// `Other` is the catch-all for families the category table does not know.
/// It is never an error.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Ecut,
    Mfc,
    Xf,
    Xfeed,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Ecut,
        Category::Mfc,
        Category::Xf,
        Category::Xfeed,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Ecut => "ECUT",
            Category::Mfc => "MFC",
            Category::Xf => "XF",
            Category::Xfeed => "XFEED",
            Category::Other => "OTHER",
        }
    }

    /// True for every category that belongs to the visible tool matrix.
    pub fn is_matrix(self) -> bool {
        !matches!(self, Category::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCategoryError(pub String);

impl fmt::Display for ParseCategoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category: {}", self.0)
    }
}

impl std::error::Error for ParseCategoryError {}

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseCategoryError(s.to_string()))
    }
}

/// Lifecycle state of a tool. `Free` is the only valid initial state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolState {
    #[default]
    Free,
    InUse,
}

impl ToolState {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolState::Free => "FREE",
            ToolState::InUse => "IN_USE",
        }
    }
}

impl fmt::Display for ToolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseToolStateError(pub String);

impl fmt::Display for ParseToolStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tool state: {}", self.0)
    }
}

impl std::error::Error for ParseToolStateError {}

impl FromStr for ToolState {
    type Err = ParseToolStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_uppercase().replace('-', "_");
        match norm.as_str() {
            "FREE" => Ok(ToolState::Free),
            "IN_USE" | "INUSE" => Ok(ToolState::InUse),
            _ => Err(ParseToolStateError(s.to_string())),
        }
    }
}

/// One usage fact attributed to a tool's family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Stable key used to deduplicate re-delivered records.
    pub event_id: String,

    /// Operational identifier as written by the machine-control software.
    pub tool_id: String,

    pub minutes: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Canonical registry entry for one physical tool type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Manufacturer code, including any `_<n>` variant suffix.
    pub matrix_code: String,

    /// Derived from `matrix_code`; the join key against usage data.
    pub family_code: String,

    /// Three-digit diameter variant taken from the tail of the code, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_life: Option<f64>,

    pub category: Category,

    #[serde(default)]
    pub tool_state: ToolState,

    /// Job currently holding the tool while `tool_state` is `IN_USE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_job: Option<String>,

    #[serde(default)]
    pub usage_history: Vec<UsageEvent>,

    #[serde(default)]
    pub usage_minutes: f64,

    #[serde(default)]
    pub projects: BTreeSet<String>,

    #[serde(default)]
    pub in_pool: u32,

    pub warning_threshold: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Set when the latest inventory snapshot no longer lists this tool.
    #[serde(default)]
    pub stale: bool,
}

impl Tool {
    /// A fresh record: `FREE`, no usage, empty pool.
    pub fn new(matrix_code: impl Into<String>, family_code: impl Into<String>) -> Self {
        Self {
            matrix_code: matrix_code.into(),
            family_code: family_code.into(),
            diameter_code: None,
            diameter: None,
            tool_life: None,
            category: Category::Other,
            tool_state: ToolState::Free,
            active_job: None,
            usage_history: Vec::new(),
            usage_minutes: 0.0,
            projects: BTreeSet::new(),
            in_pool: 0,
            warning_threshold: warning_threshold(0),
            image_url: None,
            stale: false,
        }
    }

    pub fn is_matrix(&self) -> bool {
        self.category.is_matrix()
    }

    /// Diameter in millimetres, 0 when the definitions table has none.
    pub fn diameter_mm(&self) -> f64 {
        self.diameter.unwrap_or(0.0)
    }

    /// Rated life in minutes, 0 when unknown.
    pub fn tool_life_minutes(&self) -> f64 {
        self.tool_life.unwrap_or(0.0)
    }

    /// Updates the stock count and keeps the threshold in step with it.
    pub fn set_in_pool(&mut self, in_pool: u32) {
        self.in_pool = in_pool;
        self.warning_threshold = warning_threshold(in_pool);
    }

    pub fn is_low_stock(&self) -> bool {
        self.in_pool <= self.warning_threshold
    }
}

/// `max(3, floor(in_pool * 0.3))`, computed in integers.
pub fn warning_threshold(in_pool: u32) -> u32 {
    let scaled = (u64::from(in_pool) * 3) / 10;
    scaled.max(3) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_threshold_floors_at_three() {
        assert_eq!(warning_threshold(0), 3);
        assert_eq!(warning_threshold(10), 3);
        assert_eq!(warning_threshold(13), 3);
        assert_eq!(warning_threshold(14), 4);
        assert_eq!(warning_threshold(100), 30);
    }

    #[test]
    fn set_in_pool_recomputes_threshold() {
        let mut tool = Tool::new("RT-8400300", "8400");
        tool.set_in_pool(40);
        assert_eq!(tool.warning_threshold, 12);
        tool.set_in_pool(2);
        assert_eq!(tool.warning_threshold, 3);
        assert!(tool.is_low_stock());
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("xfeed".parse::<Category>().unwrap(), Category::Xfeed);
        assert_eq!("ECUT".parse::<Category>().unwrap(), Category::Ecut);
        assert!("drill".parse::<Category>().is_err());
    }

    #[test]
    fn tool_state_parses_dashed_and_underscored() {
        assert_eq!("in-use".parse::<ToolState>().unwrap(), ToolState::InUse);
        assert_eq!("IN_USE".parse::<ToolState>().unwrap(), ToolState::InUse);
        assert_eq!("free".parse::<ToolState>().unwrap(), ToolState::Free);
    }

    #[test]
    fn unknown_measurements_read_as_zero() {
        let tool = Tool::new("RT-9999999", "9999");
        assert_eq!(tool.diameter_mm(), 0.0);
        assert_eq!(tool.tool_life_minutes(), 0.0);
    }
}
