//! Multi-provider comparison and report rendering

use super::benchmark::{evaluate, AggregateMetrics, BenchmarkOptions};
use super::dataset::BenchmarkItem;
use crate::error::Result;
use crate::execution_loop::TextToSqlPipeline;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

const HEADERS: [&str; 6] = ["Provider", "EM", "EX", "Syntax Err", "Logic Err", "Exec Err"];
const CSV_HEADERS: [&str; 6] = ["Provider", "EM", "EX", "SyntaxErr", "LogicErr", "ExecErr"];

/// Metrics per provider, ordered by provider name.
pub type ComparisonReport = BTreeMap<String, AggregateMetrics>;

/// Benchmark each provider in turn. Unavailable providers and failed runs are
/// logged and left out of the report.
pub fn run_multi_provider(
    items: &[BenchmarkItem],
    providers: &[String],
    opts: &BenchmarkOptions,
    pipeline: &TextToSqlPipeline,
) -> ComparisonReport {
    let mut report = ComparisonReport::new();

    for provider in providers {
        if !pipeline.registry().is_available(provider) {
            warn!("Skipping {} (not available)", provider);
            continue;
        }
        info!("Benchmarking {}", provider);
        match evaluate(items, provider, opts, pipeline) {
            Ok(metrics) => {
                report.insert(provider.clone(), metrics);
            }
            Err(e) => warn!("Benchmark for {} failed: {}", provider, e),
        }
    }

    report
}

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

fn display_rows(report: &ComparisonReport) -> Vec<[String; 6]> {
    report
        .iter()
        .map(|(provider, m)| {
            [
                provider.clone(),
                percent(m.em),
                percent(m.ex),
                percent(m.syntax_error_rate),
                percent(m.logic_error_rate),
                percent(m.execution_error_rate),
            ]
        })
        .collect()
}

fn column_widths(rows: &[[String; 6]]) -> [usize; 6] {
    let mut widths = HEADERS.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }
    widths
}

fn pad_cells<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize; 6]) -> Vec<String> {
    cells
        .zip(widths.iter())
        .map(|(cell, width)| format!("{:<width$}", cell, width = width))
        .collect()
}

/// GitHub-flavored Markdown table under a `# Benchmark Results` heading.
pub fn markdown_table(report: &ComparisonReport) -> String {
    if report.is_empty() {
        return "No results.".to_string();
    }

    let rows = display_rows(report);
    let widths = column_widths(&rows);
    let mut lines = vec![
        "# Benchmark Results".to_string(),
        String::new(),
        format!("| {} |", pad_cells(HEADERS.iter().copied(), &widths).join(" | ")),
        format!(
            "|{}|",
            widths.iter().map(|w| "-".repeat(w + 2)).collect::<Vec<_>>().join("|")
        ),
    ];
    for row in &rows {
        lines.push(format!(
            "| {} |",
            pad_cells(row.iter().map(String::as_str), &widths).join(" | ")
        ));
    }
    lines.join("\n")
}

/// Plain-text table for terminal output.
pub fn console_table(report: &ComparisonReport) -> String {
    if report.is_empty() {
        return "No results.".to_string();
    }

    let rows = display_rows(report);
    let widths = column_widths(&rows);
    let rule = format!(
        "+{}+",
        widths.iter().map(|w| "-".repeat(w + 2)).collect::<Vec<_>>().join("+")
    );
    let mut lines = vec![
        rule.clone(),
        format!("| {} |", pad_cells(HEADERS.iter().copied(), &widths).join(" | ")),
        rule.clone(),
    ];
    for row in &rows {
        lines.push(format!(
            "| {} |",
            pad_cells(row.iter().map(String::as_str), &widths).join(" | ")
        ));
    }
    lines.push(rule);
    lines.join("\n")
}

/// CSV with raw rates at 4 decimals.
pub fn csv_table(report: &ComparisonReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS).map_err(io::Error::from)?;
    for (provider, m) in report {
        writer
            .write_record([
                provider.clone(),
                format!("{:.4}", m.em),
                format!("{:.4}", m.ex),
                format!("{:.4}", m.syntax_error_rate),
                format!("{:.4}", m.logic_error_rate),
                format!("{:.4}", m.execution_error_rate),
            ])
            .map_err(io::Error::from)?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    let text = String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(text.trim_end().to_string())
}

/// Full per-item metrics for every provider as pretty JSON.
pub fn write_details(path: &Path, report: &ComparisonReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    info!("Saved details to {}", path.display());
    Ok(())
}
