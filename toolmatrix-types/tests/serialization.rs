use pretty_assertions::assert_eq;
use toolmatrix_types::report::{CycleReport, RegistryExport, RegistryStats};
use toolmatrix_types::tool::{Category, Tool, ToolState};

#[test]
fn category_serializes_uppercase() {
    let json = serde_json::to_string(&Category::Xfeed).unwrap();
    assert_eq!(json, "\"XFEED\"");
    let back: Category = serde_json::from_str("\"MFC\"").unwrap();
    assert_eq!(back, Category::Mfc);
}

#[test]
fn tool_state_serializes_screaming_snake_case() {
    assert_eq!(serde_json::to_string(&ToolState::InUse).unwrap(), "\"IN_USE\"");
    assert_eq!(serde_json::to_string(&ToolState::Free).unwrap(), "\"FREE\"");
}

#[test]
fn tool_omits_unknown_optionals() {
    let tool = Tool::new("RT-8400300", "8400");
    let value = serde_json::to_value(&tool).unwrap();
    assert!(value.get("diameter").is_none());
    assert!(value.get("tool_life").is_none());
    assert!(value.get("image_url").is_none());
    assert!(value.get("active_job").is_none());
    assert_eq!(value["tool_state"], "FREE");
    assert_eq!(value["warning_threshold"], 3);
}

#[test]
fn tool_deserializes_with_defaults() {
    let tool: Tool = serde_json::from_str(
        r#"{
            "matrix_code": "RT-8201500",
            "family_code": "8201",
            "category": "MFC",
            "warning_threshold": 3
        }"#,
    )
    .unwrap();
    assert_eq!(tool.tool_state, ToolState::Free);
    assert!(tool.usage_history.is_empty());
    assert_eq!(tool.usage_minutes, 0.0);
    assert!(!tool.stale);
}

#[test]
fn stats_category_keys_are_strings() {
    let mut stats = RegistryStats::default();
    stats.by_category.insert(Category::Ecut, 2);
    stats.by_category.insert(Category::Other, 1);
    let value = serde_json::to_value(&stats).unwrap();
    assert_eq!(value["by_category"]["ECUT"], 2);
    assert_eq!(value["by_category"]["OTHER"], 1);
}

#[test]
fn cycle_report_carries_schema_and_skips_empty_failures() {
    let report = CycleReport::new(7, chrono::Utc::now());
    assert_eq!(report.schema, toolmatrix_types::schema::TOOLMATRIX_CYCLE_V1);
    assert!(!report.is_partial());
    let value = serde_json::to_value(&report).unwrap();
    assert!(value.get("inputs_failed").is_none());
    assert_eq!(value["cycle"], 7);
}

#[test]
fn registry_export_sets_schema() {
    let export = RegistryExport::new(vec![], RegistryStats::default(), Some(1));
    assert_eq!(export.schema, toolmatrix_types::schema::TOOLMATRIX_REGISTRY_V1);
    assert_eq!(export.cycle, Some(1));
}
