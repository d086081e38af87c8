//! Live text view: one section per source, refreshed per published snapshot.

use std::io::{stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use colored::Colorize;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{self, Clear, ClearType},
};

use crate::core::metrics::{field, Availability, MetricSample, Snapshot, Source};
use crate::core::sampler::MonitorRuntime;
use crate::ui::{field_or_na, usage_bar};

const BAR_WIDTH: usize = 50;
const CORE_BAR_WIDTH: usize = 20;

/// Run the live text display until `q`, Esc, or Ctrl+C.
pub fn run(runtime: &MonitorRuntime, stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    let mut snapshot_rx = runtime.snapshot_rx.clone();

    terminal::enable_raw_mode()?;
    execute!(stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;
    let result = view_loop(&mut snapshot_rx, stop);
    execute!(stdout(), cursor::Show, terminal::LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    result
}

fn view_loop(
    snapshot_rx: &mut tokio::sync::watch::Receiver<Arc<Snapshot>>,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }

        let snapshot = snapshot_rx.borrow_and_update().clone();
        draw(&snapshot)?;

        // Key polling doubles as the refresh pacing.
        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                let ctrl_c = key.code == KeyCode::Char('c')
                    && key.modifiers.contains(KeyModifiers::CONTROL);
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) || ctrl_c {
                    return Ok(());
                }
            }
        }
    }
}

fn draw(snapshot: &Snapshot) -> anyhow::Result<()> {
    let mut out = stdout();
    execute!(out, Clear(ClearType::All), cursor::MoveTo(0, 0))?;

    let now = Local::now().format("%H:%M:%S");
    let mut lines = vec![format!(
        "{}",
        format!("Hardware Monitor - {now} (press 'q' to quit)").bold()
    )];
    lines.push(String::new());

    if snapshot.samples.is_empty() {
        lines.push("Waiting for first sample...".to_string());
    }

    for sample in &snapshot.samples {
        match sample.source {
            Source::Cpu => render_cpu(sample, &mut lines),
            Source::Memory => render_memory(sample, &mut lines),
            Source::Disk => render_disk(sample, &mut lines),
            Source::Gpu => render_gpu(sample, &mut lines),
        }
        lines.push(String::new());
    }

    for line in lines {
        write!(out, "{line}\r\n")?;
    }
    out.flush()?;
    Ok(())
}

fn render_utilization(sample: &MetricSample, lines: &mut Vec<String>) {
    if let Some(pct) = sample.get(field::UTILIZATION_PCT) {
        lines.push(format!(
            "Usage: {pct:5.1}% {}",
            usage_bar(pct, BAR_WIDTH)
        ));
    }
}

fn render_cpu(sample: &MetricSample, lines: &mut Vec<String>) {
    lines.push(format!("{}", "CPU".bold()));
    if let (Some(logical), Some(physical)) = (
        sample.get(field::CORE_COUNT),
        sample.get(field::PHYSICAL_CORE_COUNT),
    ) {
        lines.push(format!(
            "Cores: {} physical, {} logical",
            physical as u64, logical as u64
        ));
    }
    if let Some(freq) = sample.get(field::FREQUENCY_MHZ) {
        lines.push(format!("Frequency: {freq:.0} MHz"));
    }
    render_utilization(sample, lines);
    let mut idx = 0;
    while let Some(pct) = sample.get(&format!("core{idx}_utilization_pct")) {
        lines.push(format!(
            "Core {idx:>2}: {pct:5.1}% {}",
            usage_bar(pct, CORE_BAR_WIDTH)
        ));
        idx += 1;
    }
    if sample.get(field::TEMPERATURE_C).is_some() {
        lines.push(format!(
            "Temperature: {} °C",
            field_or_na(sample, field::TEMPERATURE_C)
        ));
    }
}

fn render_memory(sample: &MetricSample, lines: &mut Vec<String>) {
    lines.push(format!("{}", "MEMORY".bold()));
    if let (Some(used), Some(total)) = (
        sample.get(field::MEMORY_USED_MB),
        sample.get(field::MEMORY_TOTAL_MB),
    ) {
        lines.push(format!(
            "RAM: {:.1} GB / {:.1} GB",
            used / 1024.0,
            total / 1024.0
        ));
    }
    render_utilization(sample, lines);
}

fn render_disk(sample: &MetricSample, lines: &mut Vec<String>) {
    lines.push(format!("{}", "DISK".bold()));
    if let (Some(used), Some(total)) = (
        sample.get(field::DISK_USED_MB),
        sample.get(field::DISK_TOTAL_MB),
    ) {
        lines.push(format!(
            "Used: {:.1} GB / {:.1} GB",
            used / 1024.0,
            total / 1024.0
        ));
    }
    render_utilization(sample, lines);
    if let (Some(read), Some(write)) = (
        sample.get(field::DISK_READ_MB),
        sample.get(field::DISK_WRITE_MB),
    ) {
        lines.push(format!("I/O: {read:.1} MB read, {write:.1} MB written"));
    }
}

fn render_gpu(sample: &MetricSample, lines: &mut Vec<String>) {
    lines.push(format!("{}", "GPU".bold()));
    if sample.availability == Availability::Unavailable {
        lines.push("No supported GPU detected".to_string());
        return;
    }

    render_utilization(sample, lines);
    // Fields outside the detected capability are absent; skip rows instead
    // of inventing zeros.
    if let (Some(used), Some(total)) = (
        sample.get(field::MEMORY_USED_MB),
        sample.get(field::MEMORY_TOTAL_MB),
    ) {
        lines.push(format!("VRAM: {used:.0} MB / {total:.0} MB"));
    }
    if sample.get(field::TEMPERATURE_C).is_some() {
        lines.push(format!(
            "Temperature: {} °C",
            field_or_na(sample, field::TEMPERATURE_C)
        ));
    }
    if sample.get(field::POWER_W).is_some() {
        lines.push(format!("Power: {} W", field_or_na(sample, field::POWER_W)));
    }
}
