//! defect_report - rebuild a sheet's report from the defect log
//!
//! Reads the events already recorded for a sheet and rewrites its CSV report.
//! Read-only with respect to the defect log. `--json-output` additionally
//! exports the events as JSON.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use sheet_inspector::session::validate_sheet_id;
use sheet_inspector::{CsvReportBuilder, InspectorConfig, ReportBuilder, SqliteEventSink};

// Live status is only used by inspectord.
#[allow(dead_code)]
#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Sheet whose report should be rebuilt.
    #[arg(long)]
    sheet_id: String,
    /// Defect log database (defaults to the configured db_path).
    #[arg(long)]
    db_path: Option<String>,
    /// Report root directory (defaults to the configured report_dir).
    #[arg(long)]
    report_dir: Option<PathBuf>,
    /// Also export the sheet's events as a JSON array to this file.
    #[arg(long)]
    json_output: Option<PathBuf>,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto)]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());
    validate_sheet_id(&args.sheet_id)?;

    let cfg = InspectorConfig::load()?;
    let db_path = args.db_path.unwrap_or(cfg.db_path);
    let report_dir = args.report_dir.unwrap_or(cfg.report_dir);

    if !db_path.starts_with("file:") && !std::path::Path::new(&db_path).exists() {
        return Err(anyhow!("defect log {} does not exist", db_path));
    }

    let sink = {
        let _stage = ui.stage("Open defect log");
        SqliteEventSink::open(&db_path)?
    };
    let events = {
        let _stage = ui.stage("Load events");
        sink.events_for_sheet(&args.sheet_id)?
    };
    if events.is_empty() {
        log::warn!("no defects recorded for sheet {}", args.sheet_id);
    }
    let path = {
        let _stage = ui.stage("Write report");
        CsvReportBuilder::new(report_dir).build(&args.sheet_id, &events)?
    };
    if let Some(out) = &args.json_output {
        let _stage = ui.stage("Export events");
        let json = serde_json::to_vec_pretty(&events)?;
        std::fs::write(out, json)
            .map_err(|e| anyhow!("failed to write {}: {}", out.display(), e))?;
    }
    println!(
        "{} defects for sheet {}; report written to {}",
        events.len(),
        args.sheet_id,
        path.display()
    );
    Ok(())
}
