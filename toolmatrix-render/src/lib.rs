//! Rendering helpers (markdown and plain text) for human-readable registry views.

use toolmatrix_types::report::{CycleReport, RegistryExport, RegistryStats};
use toolmatrix_types::tool::{Category, Tool};

pub fn render_registry_md(export: &RegistryExport) -> String {
    let mut out = String::new();
    out.push_str("# toolmatrix registry\n\n");
    if let Some(cycle) = export.cycle {
        out.push_str(&format!("- Cycle: {}\n", cycle));
    }
    out.push_str(&format!(
        "- Generated: {}\n",
        export.generated_at.to_rfc3339()
    ));
    push_stats_md(&mut out, &export.stats);

    out.push_str("\n## Tools\n\n");
    if export.tools.is_empty() {
        out.push_str("_No tools loaded._\n");
        return out;
    }

    out.push_str("| Matrix code | Family | Category | State | In pool | Threshold | Minutes | Flags |\n");
    out.push_str("|---|---|---|---|---:|---:|---:|---|\n");
    for t in &export.tools {
        out.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {} | {} | {} |\n",
            t.matrix_code,
            or_dash(&t.family_code),
            t.category,
            t.tool_state,
            t.in_pool,
            t.warning_threshold,
            fmt_minutes(t.usage_minutes),
            flags(t)
        ));
    }

    out
}

fn push_stats_md(out: &mut String, stats: &RegistryStats) {
    out.push_str(&format!(
        "- Tools: {} (matrix {}, free {}, in use {})\n",
        stats.total, stats.matrix, stats.free, stats.in_use
    ));
    out.push_str(&format!(
        "- Low stock: {}\n- Stale: {}\n",
        stats.low_stock, stats.stale
    ));
    let by_category = category_counts(stats);
    if !by_category.is_empty() {
        out.push_str(&format!("- By category: {}\n", by_category));
    }
}

pub fn render_cycle_md(report: &CycleReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# toolmatrix cycle {}\n\n", report.cycle));
    out.push_str(&format!(
        "- Started: {}\n- Finished: {}\n",
        report.started_at.to_rfc3339(),
        report.finished_at.to_rfc3339()
    ));
    if let Some(digest) = &report.inventory.digest {
        out.push_str(&format!("- Inventory sha256: `{}`\n", digest));
    }

    let inv = &report.inventory;
    out.push_str("\n## Inventory\n\n");
    out.push_str(&format!(
        "- Rows: {} (skipped {})\n- Created: {}\n- Refreshed: {}\n- Stale: {}\n",
        inv.rows, inv.rows_skipped, inv.tools_created, inv.tools_refreshed, inv.tools_stale
    ));

    let usage = &report.usage;
    out.push_str("\n## Usage\n\n");
    out.push_str(&format!(
        "- Records: {} (attributed {}, unattributed {}, non-positive {})\n",
        usage.records, usage.attributed, usage.unattributed, usage.non_positive
    ));
    out.push_str(&format!(
        "- Families: {}\n- Events appended: {}\n- Tools in use: {}\n",
        usage.families, usage.events_appended, usage.tools_in_use
    ));

    if !report.inputs_failed.is_empty() {
        out.push_str("\n## Failed inputs\n\n");
        for f in &report.inputs_failed {
            out.push_str(&format!("- `{}`: {}\n", f.path, f.reason));
        }
    }

    out
}

/// One line per tool, aligned columns. Used by `toolmatrix query`.
pub fn render_tools_text(tools: &[Tool]) -> String {
    if tools.is_empty() {
        return "no tools match\n".to_string();
    }

    let width = tools
        .iter()
        .map(|t| t.matrix_code.len())
        .max()
        .unwrap_or(0)
        .max("MATRIX CODE".len());

    let mut out = format!(
        "{:<width$}  {:<6}  {:<6}  {:<7}  {:>7}  {:>9}  FLAGS\n",
        "MATRIX CODE", "FAMILY", "CAT", "STATE", "IN POOL", "MINUTES"
    );
    for t in tools {
        out.push_str(&format!(
            "{:<width$}  {:<6}  {:<6}  {:<7}  {:>7}  {:>9}  {}\n",
            t.matrix_code,
            or_dash(&t.family_code),
            t.category.as_str(),
            t.tool_state.as_str(),
            t.in_pool,
            fmt_minutes(t.usage_minutes),
            flags(t)
        ));
    }
    out
}

/// Full detail for one tool. Used by `toolmatrix show`.
pub fn render_tool_text(tool: &Tool) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", tool.matrix_code));
    out.push_str(&format!("  family:       {}\n", or_dash(&tool.family_code)));
    out.push_str(&format!(
        "  diameter:     {} mm{}\n",
        tool.diameter_mm(),
        tool.diameter_code
            .as_deref()
            .map(|d| format!(" (variant {})", d))
            .unwrap_or_default()
    ));
    out.push_str(&format!("  tool life:    {} min\n", tool.tool_life_minutes()));
    out.push_str(&format!("  category:     {}\n", tool.category));
    out.push_str(&format!("  state:        {}\n", tool.tool_state));
    if let Some(job) = &tool.active_job {
        out.push_str(&format!("  active job:   {}\n", job));
    }
    out.push_str(&format!(
        "  in pool:      {} (warn at {})\n",
        tool.in_pool, tool.warning_threshold
    ));
    out.push_str(&format!("  usage:        {} min\n", fmt_minutes(tool.usage_minutes)));
    if !tool.projects.is_empty() {
        let projects: Vec<&str> = tool.projects.iter().map(String::as_str).collect();
        out.push_str(&format!("  projects:     {}\n", projects.join(", ")));
    }
    if let Some(url) = &tool.image_url {
        out.push_str(&format!("  image:        {}\n", url));
    }
    if tool.stale {
        out.push_str("  stale:        not in latest inventory snapshot\n");
    }
    out.push_str(&format!("  history:      {} event(s)\n", tool.usage_history.len()));
    out
}

pub fn render_stats_text(stats: &RegistryStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("tools:      {}\n", stats.total));
    out.push_str(&format!("matrix:     {}\n", stats.matrix));
    out.push_str(&format!("free:       {}\n", stats.free));
    out.push_str(&format!("in use:     {}\n", stats.in_use));
    out.push_str(&format!("low stock:  {}\n", stats.low_stock));
    out.push_str(&format!("stale:      {}\n", stats.stale));
    for category in Category::ALL {
        let n = stats.by_category.get(&category).copied().unwrap_or(0);
        out.push_str(&format!("{:<11} {}\n", format!("{}:", category), n));
    }
    out
}

fn category_counts(stats: &RegistryStats) -> String {
    stats
        .by_category
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(c, n)| format!("{} {}", c, n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn flags(t: &Tool) -> String {
    let mut flags = Vec::new();
    if t.is_low_stock() {
        flags.push("low");
    }
    if t.stale {
        flags.push("stale");
    }
    if flags.is_empty() {
        "-".to_string()
    } else {
        flags.join(",")
    }
}

fn fmt_minutes(m: f64) -> String {
    if m.fract() == 0.0 {
        format!("{:.0}", m)
    } else {
        format!("{:.1}", m)
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}
