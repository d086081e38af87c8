//! CSV recording of snapshots, one row per tick.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{TimeZone, Utc};

use crate::core::metrics::Snapshot;

/// Writes one header row and one data row per snapshot.
///
/// The column set is locked from the first snapshot (the sources and fields
/// that were measurable when recording started); fields that disappear later
/// become empty cells and fields that appear later are not retrofitted into
/// the header. Values use `f64`'s shortest round-trip formatting, so a
/// reparsed cell compares equal to the recorded value.
pub struct CsvRecorder {
    writer: BufWriter<File>,
    columns: Vec<(crate::core::metrics::Source, String)>,
}

impl CsvRecorder {
    /// Create the output file and write the header derived from `first`.
    pub fn create(path: &Path, first: &Snapshot) -> io::Result<Self> {
        let columns: Vec<_> = first
            .samples
            .iter()
            .flat_map(|sample| {
                sample
                    .fields
                    .keys()
                    .map(move |name| (sample.source, name.clone()))
            })
            .collect();

        let mut writer = BufWriter::new(File::create(path)?);
        let mut header = vec!["timestamp".to_string()];
        header.extend(
            columns
                .iter()
                .map(|(source, name)| format!("{source}.{name}")),
        );
        writeln!(writer, "{}", header.join(","))?;
        writer.flush()?;

        Ok(Self { writer, columns })
    }

    /// Append one row. Flushed immediately so a killed process loses at most
    /// the row in progress.
    pub fn record(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        let stamp = Utc
            .timestamp_opt(snapshot.timestamp, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| snapshot.timestamp.to_string());

        let mut row = vec![stamp];
        for (source, name) in &self.columns {
            let cell = snapshot
                .sample(*source)
                .and_then(|sample| sample.get(name))
                .map(|value| value.to_string())
                .unwrap_or_default();
            row.push(cell);
        }

        writeln!(self.writer, "{}", row.join(","))?;
        self.writer.flush()
    }

    /// Column names, `timestamp` excluded.
    pub fn columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|(source, name)| format!("{source}.{name}"))
            .collect()
    }
}
