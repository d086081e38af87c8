use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use log::{info, warn};

use hwmon::core::cache::DetectionCache;
use hwmon::core::{MonitorRuntime, SamplerConfig};
use hwmon::probes::{baseline_check, default_probes};
use hwmon::recorder::CsvRecorder;
use hwmon::ui;

fn main() -> Result<()> {
    let matches = Command::new("hwmon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Real-time hardware telemetry monitor")
        .arg(
            Arg::new("graph")
                .short('g')
                .long("graph")
                .help("Show sparkline graphs instead of the text view")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("neofetch")
                .short('n')
                .long("neofetch")
                .help("Print a one-shot system summary and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Sample every source once, print the snapshot as JSON and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("record")
                .short('r')
                .long("record")
                .help("Record every snapshot to a CSV file until interrupted")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("CSV output path used with --record")
                .default_value("hw_metrics.csv"),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .value_name("MS")
                .help("Sampling interval in milliseconds")
                .default_value("1000")
                .value_parser(clap::value_parser!(u64).range(100..)),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("FILE")
                .help("Append log output to this file")
                .default_value("hw_monitor.log"),
        )
        .get_matches();

    let log_path = PathBuf::from(matches.get_one::<String>("log-file").unwrap());
    hwmon::init_logging(&log_path).context("failed to open log file")?;

    baseline_check()?;

    if matches.get_flag("neofetch") {
        return ui::neofetch::print();
    }

    if matches.get_flag("json") {
        return print_json_snapshot();
    }

    let interval_ms = *matches.get_one::<u64>("interval").unwrap();
    let tick = Duration::from_millis(interval_ms);
    let config = SamplerConfig {
        tick,
        // Leave the scheduler headroom to publish before the next beat.
        probe_budget: tick.mul_f64(0.9),
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("failed to install signal handler")?;
    }

    let cache = Arc::new(DetectionCache::new());
    let probes = default_probes(cache);
    info!("starting sampler: tick={}ms, {} probes", interval_ms, probes.len());
    let runtime = MonitorRuntime::new(probes, config)?;

    let result = if matches.get_flag("record") {
        let output = PathBuf::from(matches.get_one::<String>("output").unwrap());
        record_loop(&runtime, &output, &stop)
    } else if matches.get_flag("graph") {
        ui::graph::run(&runtime, Arc::clone(&stop))
    } else {
        ui::text::run(&runtime, Arc::clone(&stop))
    };

    runtime.shutdown();
    result
}

/// One synchronous pass over every probe, no sampler involved. Probes that
/// fail still appear in the output as unavailable entries.
fn print_json_snapshot() -> Result<()> {
    use hwmon::core::{MetricSample, Probe, Snapshot};

    let now = chrono::Utc::now().timestamp();
    let cache = Arc::new(DetectionCache::new());
    let samples = default_probes(cache)
        .into_iter()
        .map(|mut probe| {
            let source = probe.source();
            probe
                .sample()
                .unwrap_or_else(|_| MetricSample::unavailable(source, now))
        })
        .collect();
    let snapshot = Snapshot::new(now, samples);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Headless recording: write one CSV row per published snapshot. The header
/// is locked from the first snapshot; fields outside it never gain columns.
fn record_loop(
    runtime: &MonitorRuntime,
    output: &Path,
    stop: &Arc<AtomicBool>,
) -> Result<()> {
    let mut snapshot_rx = runtime.snapshot_rx.clone();

    // Skip the placeholder published before the first real tick.
    let mut recorder: Option<CsvRecorder> = None;
    let mut rows: u64 = 0;
    println!("Recording to {} (Ctrl+C to stop)", output.display());

    while !stop.load(Ordering::SeqCst) {
        if snapshot_rx.has_changed().unwrap_or(false) {
            let snapshot = Arc::clone(&snapshot_rx.borrow_and_update());
            if snapshot.samples.is_empty() {
                continue;
            }
            if recorder.is_none() {
                let created = CsvRecorder::create(output, &snapshot)
                    .with_context(|| format!("cannot create {}", output.display()))?;
                info!("csv header locked: {} columns", created.columns().len());
                recorder = Some(created);
            }
            if let Some(writer) = recorder.as_mut() {
                if let Err(err) = writer.record(&snapshot) {
                    warn!("csv row dropped: {err}");
                } else {
                    rows += 1;
                }
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("Recorded {rows} rows to {}", output.display());
    Ok(())
}
