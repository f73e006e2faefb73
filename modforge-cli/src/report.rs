//! Rendering of validation reports and mod listings.

use crate::config::OutputFormat;
use anyhow::{Context, Result};
use modforge_core::ValidationReport;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

/// One row of `modforge list`.
#[derive(Debug, Clone, Serialize)]
pub struct ListedMod {
    pub id: String,
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
    pub capabilities: Vec<String>,
    pub disabled: bool,
    pub source: PathBuf,
}

/// A manifest that could not be read.
#[derive(Debug, Clone, Serialize)]
pub struct Unreadable {
    pub source: PathBuf,
    pub error: String,
}

#[derive(Debug, Serialize)]
struct Listing<'a> {
    mods: &'a [ListedMod],
    unreadable: &'a [Unreadable],
}

pub fn render_report(report: &ValidationReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("Failed to serialize validation report")
        }
        OutputFormat::Text => Ok(report_text(report)),
    }
}

fn report_text(report: &ValidationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Checked {} mod(s) at {}",
        report.mod_count,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if report.is_valid {
        out.push_str("OK\n");
        if let Some(order) = &report.load_order {
            out.push_str(&order_text(order));
        }
        return out;
    }

    let _ = writeln!(out, "INVALID: {} problem(s)", report.errors.len());
    for error in &report.errors {
        let _ = writeln!(out, "  [{}] {}", error.kind, error.message);
        if !error.involved_mod_ids.is_empty() {
            let _ = writeln!(out, "      mods: {}", error.involved_mod_ids.join(", "));
        }
        for source in &error.sources {
            let _ = writeln!(out, "      at: {}", source.display());
        }
    }
    out
}

/// Numbered load order, one mod per line.
pub fn order_text(order: &[String]) -> String {
    let mut out = String::new();
    for (i, id) in order.iter().enumerate() {
        let _ = writeln!(out, "{:>4}. {}", i + 1, id);
    }
    out
}

pub fn render_listing(
    mods: &[ListedMod],
    unreadable: &[Unreadable],
    format: OutputFormat,
) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(&Listing { mods, unreadable })
            .context("Failed to serialize mod listing");
    }

    let mut out = String::new();
    for m in mods {
        let _ = write!(out, "{} {} ({})", m.id, m.version, m.name);
        if m.disabled {
            out.push_str(" [disabled]");
        }
        out.push('\n');
        if !m.dependencies.is_empty() {
            let _ = writeln!(out, "    requires: {}", m.dependencies.join(", "));
        }
        if !m.capabilities.is_empty() {
            let _ = writeln!(out, "    capabilities: {}", m.capabilities.join(", "));
        }
    }
    for u in unreadable {
        let _ = writeln!(out, "! {}: {}", u.source.display(), u.error);
    }
    if mods.is_empty() && unreadable.is_empty() {
        out.push_str("No mods found\n");
    }
    Ok(out)
}
