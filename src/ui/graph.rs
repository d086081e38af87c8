//! Graph view: 2-minute unicode sparklines fed by the history window.

use std::io::{stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use colored::{Color, Colorize};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{self, Clear, ClearType},
};

use crate::core::history::HistoryWindow;
use crate::core::sampler::MonitorRuntime;

const SPARKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Metrics tracked by the graph view, in display order. A metric with no
/// history (no GPU, say) simply has no panel.
const TRACKED: [(&str, &str, Color); 5] = [
    ("cpu.utilization_pct", "CPU Usage (%)", Color::Green),
    ("memory.utilization_pct", "Memory Usage (%)", Color::Cyan),
    ("gpu.utilization_pct", "GPU Utilization (%)", Color::Magenta),
    ("gpu.memory_util_pct", "GPU Memory (%)", Color::Blue),
    ("disk.utilization_pct", "Disk Usage (%)", Color::White),
];

/// Run the graph display until `q`, Esc, or Ctrl+C.
pub fn run(runtime: &MonitorRuntime, stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    let mut history_rx = runtime.history_rx.clone();

    terminal::enable_raw_mode()?;
    execute!(stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;
    let result = view_loop(&mut history_rx, stop);
    execute!(stdout(), cursor::Show, terminal::LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    result
}

fn view_loop(
    history_rx: &mut tokio::sync::watch::Receiver<Arc<HistoryWindow>>,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }

        let history = history_rx.borrow_and_update().clone();
        let (cols, _) = terminal::size().unwrap_or((100, 40));
        draw(&history, cols as usize)?;

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

fn draw(history: &HistoryWindow, cols: usize) -> anyhow::Result<()> {
    let mut out = stdout();
    execute!(out, Clear(ClearType::All), cursor::MoveTo(0, 0))?;

    let now = Local::now().format("%H:%M:%S");
    write!(
        out,
        "{}\r\n\r\n",
        format!("Hardware Monitor (graph) - {now} - last 2 minutes (press 'q' to quit)").bold()
    )?;

    let width = cols.saturating_sub(10).clamp(20, 120);
    for (metric, title, color) in TRACKED {
        let series = history.series(metric);
        if series.is_empty() {
            continue;
        }
        let latest = series.last().map(|&(_, v)| v).unwrap_or(0.0);
        write!(out, "{} {latest:5.1}%\r\n", title.bold())?;
        write!(out, "{}\r\n\r\n", sparkline(&series, width).color(color))?;
    }

    out.flush()?;
    Ok(())
}

/// Render the newest `width` points of a 0-100 series as sparkline glyphs.
fn sparkline(series: &[(i64, f64)], width: usize) -> String {
    let start = series.len().saturating_sub(width);
    series[start..]
        .iter()
        .map(|&(_, value)| {
            let bucket = ((value / 100.0) * (SPARKS.len() - 1) as f64)
                .round()
                .clamp(0.0, (SPARKS.len() - 1) as f64) as usize;
            SPARKS[bucket]
        })
        .collect()
}
