//! Terminal views consuming the pipeline's snapshots and history.
//!
//! Deliberately thin: everything here reads published `Snapshot`s and
//! `HistoryWindow`s and never feeds anything back into the sampler.

pub mod graph;
pub mod neofetch;
pub mod text;

use colored::{Color, Colorize};

use crate::core::metrics::MetricSample;

/// Usage thresholds shared by every view: green below 60, yellow below 85,
/// red above.
pub fn usage_color(pct: f64) -> Color {
    if pct < 60.0 {
        Color::Green
    } else if pct < 85.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// A `[####    ]` usage bar scaled to `width` characters.
pub fn usage_bar(pct: f64, width: usize) -> String {
    let filled = ((pct / 100.0) * width as f64).round().clamp(0.0, width as f64) as usize;
    let bar = format!("{}{}", "#".repeat(filled), " ".repeat(width - filled));
    format!("[{}]", bar.color(usage_color(pct)))
}

/// A field value with one decimal, or "N/A" when the field was not
/// measurable. Stale or zero placeholders are never shown.
pub fn field_or_na(sample: &MetricSample, name: &str) -> String {
    match sample.get(name) {
        Some(value) => format!("{value:.1}"),
        None => "N/A".to_string(),
    }
}
