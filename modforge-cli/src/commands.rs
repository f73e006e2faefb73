//! Subcommand implementations.
//!
//! Each command writes its output to the given writer and never exits the
//! process itself; `main` maps the returned status to an exit code.

use crate::config::{Config, OutputFormat};
use crate::report::{self, ListedMod, Unreadable};
use anyhow::{Context, Result};
use modforge_core::{ValidationEngine, ValidationReport};
use modforge_manifest::{DirectorySource, ManifestSource};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of a command that checks a mod set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Valid,
    Invalid,
}

/// Resolve the mod root: explicit argument first, then the configured directory.
pub fn mod_root(path: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => config.mods_dir(),
    }
}

fn run_validation(root: &Path, config: &Config) -> ValidationReport {
    info!("Validating mods under {}", root.display());
    ValidationEngine::for_directories()
        .excluding(config.mods.disabled.iter().cloned())
        .validate(root)
}

/// `modforge validate`: full pre-flight report.
pub fn validate(
    root: &Path,
    config: &Config,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<Status> {
    let report = run_validation(root, config);
    let rendered = report::render_report(&report, format)?;
    writeln!(out, "{}", rendered.trim_end()).context("Failed to write report")?;
    Ok(status_of(&report))
}

/// `modforge order`: print only the load order, or the problems preventing one.
pub fn order(root: &Path, config: &Config, out: &mut impl Write) -> Result<Status> {
    let report = run_validation(root, config);
    let rendered = match &report.load_order {
        Some(order) => report::order_text(order),
        None => report::render_report(&report, OutputFormat::Text)?,
    };
    write!(out, "{}", rendered).context("Failed to write load order")?;
    Ok(status_of(&report))
}

/// `modforge list`: every discovered mod, disabled ones marked.
pub fn list(root: &Path, config: &Config, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let discovery = DirectorySource::new()
        .discover(root)
        .with_context(|| format!("Failed to discover mods in {}", root.display()))?;
    debug!(
        mods = discovery.mods.len(),
        failures = discovery.failures.len(),
        "Discovered mods"
    );

    let mut mods: Vec<ListedMod> = discovery
        .mods
        .iter()
        .map(|d| ListedMod {
            id: d.id().to_string(),
            name: d.manifest.name().to_string(),
            version: d.manifest.version().to_string(),
            dependencies: d
                .manifest
                .dependencies()
                .iter()
                .map(|dep| match (&dep.version_range, dep.optional) {
                    (Some(range), false) => format!("{} {}", dep.mod_id, range),
                    (Some(range), true) => format!("{} {} (optional)", dep.mod_id, range),
                    (None, false) => dep.mod_id.clone(),
                    (None, true) => format!("{} (optional)", dep.mod_id),
                })
                .collect(),
            capabilities: d.manifest.capabilities().names(),
            disabled: config.mods.disabled.iter().any(|id| id == d.id()),
            source: d.source.clone(),
        })
        .collect();
    mods.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.source.cmp(&b.source)));

    let unreadable: Vec<Unreadable> = discovery
        .failures
        .iter()
        .map(|(source, e)| Unreadable {
            source: source.clone(),
            error: e.to_string(),
        })
        .collect();

    let rendered = report::render_listing(&mods, &unreadable, format)?;
    write!(out, "{}", rendered).context("Failed to write mod listing")?;
    Ok(())
}

/// `modforge config`: where the configuration lives and what is in effect.
pub fn show_config(config: &Config, path: Option<&Path>, out: &mut impl Write) -> Result<()> {
    match path {
        Some(path) => writeln!(out, "# config file: {}", path.display())?,
        None => writeln!(out, "# built-in defaults (no config file loaded)")?,
    }
    let timeout = match config.lifecycle_config().init_timeout {
        Some(limit) => format!("{}ms", limit.as_millis()),
        None => "none".to_string(),
    };
    writeln!(out, "# effective mod root: {}", config.mods_dir()?.display())?;
    writeln!(out, "# effective init timeout: {}", timeout)?;

    let rendered = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    write!(out, "{}", rendered)?;
    Ok(())
}

fn status_of(report: &ValidationReport) -> Status {
    if report.is_valid {
        Status::Valid
    } else {
        Status::Invalid
    }
}
