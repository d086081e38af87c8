// hwmon library - public API

pub mod error;
pub use error::{ProbeError, Result};

pub mod core;
pub mod probes;
pub mod recorder;
pub mod ui;

pub use core::{HistoryWindow, MonitorRuntime, SamplerConfig, Snapshot};
pub use recorder::CsvRecorder;

use std::fs::OpenOptions;
use std::path::Path;

/// Initialize logging into an append-only file so log lines never tear
/// through the terminal views.
pub fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}
