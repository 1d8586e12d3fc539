//! APAR-FDD - Air Handling Unit fault detection
//!
//! Classifies every sample of an AHU trend log into an operating mode and
//! evaluates the APAR rule set gated by those modes.
//!
//! # Usage
//!
//! ```bash
//! # Analyze a trend export with default thresholds (SI units)
//! apar-fdd --csv data/ahu1.csv
//!
//! # Imperial data, two rules only, JSON summary on stdout
//! apar-fdd --csv data/ahu1.csv --units imperial --rules APAR13,APAR19 --json
//!
//! # Site-specific configuration
//! apar-fdd --csv data/ahu1.csv --config sites/building_a.toml
//! ```
//!
//! # Environment Variables
//!
//! - `APAR_CONFIG`: Path to the analysis TOML (when `--config` is not given)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use apar_fdd::config::AnalysisConfig;
use apar_fdd::pipeline::{AnalysisPipeline, AnalysisReport};
use apar_fdd::rules::RuleId;
use apar_fdd::sensors;
use apar_fdd::types::UnitSystem;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "apar-fdd")]
#[command(about = "APAR fault detection for air handling units")]
#[command(version)]
struct CliArgs {
    /// Path to the CSV trend log (timestamp first, one column per point)
    #[arg(long, value_name = "FILE")]
    csv: PathBuf,

    /// Analysis configuration TOML (overrides $APAR_CONFIG and ./apar_config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Unit system of the temperature columns
    #[arg(long, value_parser = parse_units)]
    units: Option<UnitSystem>,

    /// Comma-separated subset of rules to run, e.g. APAR13,APAR19
    #[arg(long, value_delimiter = ',', value_parser = parse_rule)]
    rules: Vec<RuleId>,

    /// Keep predicate sides and mode-change flags in the output
    #[arg(long)]
    troubleshoot: bool,

    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// With --json, include the per-sample table
    #[arg(long, requires = "json")]
    full: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, env = "APAR_LOG_JSON")]
    log_json: bool,

    /// Write the effective configuration to this TOML file and continue
    #[arg(long, value_name = "FILE")]
    write_config: Option<PathBuf>,
}

fn parse_units(s: &str) -> Result<UnitSystem, String> {
    UnitSystem::parse(s).ok_or_else(|| format!("unknown unit system '{s}' (expected si or imperial)"))
}

fn parse_rule(s: &str) -> Result<RuleId, String> {
    RuleId::parse(s).ok_or_else(|| format!("unknown rule '{s}'"))
}

// ============================================================================
// Output
// ============================================================================

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn print_report(report: &AnalysisReport) {
    println!("{RULE}");
    println!("  APAR analysis: {} ({})", report.name, report.unit_system);
    println!(
        "  Rows: {} input, {} analyzed",
        report.input_rows,
        report.series.len()
    );
    println!("{RULE}");

    println!();
    println!("Operating modes:");
    for share in &report.mode_summary {
        println!(
            "  {:<22} {:>7.2}%  ({} samples)",
            share.mode.to_string(),
            share.percentage,
            share.samples
        );
    }

    println!();
    println!("Rules:");
    for rule in &report.rule_summaries {
        let note = rule.note.as_deref().unwrap_or("");
        println!(
            "  {} {:<14} {:<8} {:>9}  {:>5}/{:<5} {}",
            rule.status.symbol(),
            rule.name,
            rule.status.to_string(),
            rule.fault_percentage.to_string(),
            rule.faulty_samples,
            rule.samples_in_mode,
            note
        );
    }
    for failure in &report.failures {
        println!("  ✗ {:<14} not evaluated: {}", failure.label, failure.error);
    }

    if let Some(precheck) = &report.precheck {
        println!();
        println!("Precheck: {}  ({})", precheck.symbol_strip(), precheck.overall());
        for check in &precheck.checks {
            println!("  {} {:<24} {}", check.status.symbol(), check.name, check.message);
        }
    }

    println!();
    println!("Overall: {}", report.overall());
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize logging (stderr, so --json output stays clean)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::load(),
    };
    if let Some(units) = args.units {
        config.analysis.unit_system = units;
    }
    if args.troubleshoot {
        config.analysis.troubleshoot = true;
    }
    if !args.rules.is_empty() {
        config
            .restrict_rules(&args.rules)
            .context("applying --rules")?;
    }
    config.validate().context("validating configuration")?;

    if let Some(path) = &args.write_config {
        config
            .save_to_file(path)
            .with_context(|| format!("writing config {}", path.display()))?;
    }

    info!(analysis = %config.analysis.name, csv = %args.csv.display(), "APAR-FDD starting");

    let series = sensors::read_csv(&args.csv)
        .with_context(|| format!("reading {}", args.csv.display()))?;
    let report = AnalysisPipeline::new(config)
        .run(&series)
        .context("running analysis")?;

    if args.json {
        let json = if args.full {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string_pretty(&report.summary())
        }
        .context("serializing report")?;
        println!("{json}");
    } else {
        print_report(&report);
    }

    Ok(())
}
