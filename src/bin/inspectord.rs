//! inspectord - steel sheet inspection daemon
//!
//! One invocation inspects one sheet:
//! 1. Loads configuration (file + environment)
//! 2. Opens the defect log, camera and detector
//! 3. Runs the detection session on a background thread until Ctrl+C or the
//!    camera stops delivering frames
//! 4. Writes the per-sheet report and records its events to the defect log;
//!    a sheet whose camera never opened keeps its previous report

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::time::Duration;

use sheet_inspector::{
    open_camera, open_detector, report_for_outcome, CsvReportBuilder, DetectionSession,
    InspectorConfig, LogAlertObserver, SessionEnd, SessionSettings, SqliteEventSink,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Identifier of the sheet being inspected.
    #[arg(long)]
    sheet_id: String,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto)]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());
    let cfg = InspectorConfig::load()?;

    let sink = SqliteEventSink::open(&cfg.db_path)?;
    let camera = open_camera(&cfg.camera)?;
    let detector = open_detector(&cfg.detector)?;

    let mut session = DetectionSession::new(
        SessionSettings::from_config(&cfg, &args.sheet_id),
        camera,
        detector,
        Box::new(sink),
    )?
    .with_observer(Box::new(LogAlertObserver::new()));

    let stop = session.stop_signal();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            log::warn!("stop requested");
            stop.request_stop();
        })?;
    }

    log::info!("inspectord writing defects to {}", cfg.db_path);
    log::info!(
        "belt_speed={} m/s, confidence_threshold={}, detector={}",
        cfg.belt_speed,
        cfg.confidence_threshold,
        cfg.detector.backend
    );

    let worker = std::thread::Builder::new()
        .name(format!("inspect-{}", args.sheet_id))
        .spawn(move || {
            let outcome = session.run();
            (session, outcome)
        })?;

    {
        let status = ui.live(&format!("Inspecting sheet {} (Ctrl+C to stop)", args.sheet_id));
        let mut announced = false;
        while !worker.is_finished() {
            if stop.is_requested() && !announced {
                status.update("stopping");
                announced = true;
            }
            std::thread::sleep(Duration::from_millis(200));
        }
    }

    let (mut session, outcome) = worker
        .join()
        .map_err(|_| anyhow!("detection thread panicked"))?;
    let outcome = outcome?;

    if outcome.end == SessionEnd::FrameReadFailure {
        log::warn!("camera stopped delivering frames; session ended early");
    }
    if session.persist_failures() > 0 {
        log::warn!(
            "{} defects were not written to the defect log during detection",
            session.persist_failures()
        );
    }

    if outcome.end == SessionEnd::CameraUnavailable {
        eprintln!(
            "camera {} unavailable; sheet {} was not inspected and its report was not touched",
            cfg.camera.uri, outcome.sheet_id
        );
        return Ok(());
    }

    let builder = CsvReportBuilder::new(&cfg.report_dir);
    let report = {
        let _stage = ui.stage("Write report");
        report_for_outcome(&builder, session.sink_mut(), &outcome)?
    };
    if let Some(path) = report {
        println!(
            "{} defects over {} frames; report written to {}",
            outcome.events.len(),
            outcome.frames_processed,
            path.display()
        );
    }
    Ok(())
}
