use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Canonical metric field names shared by probes, views, and the recorder.
pub mod field {
    pub const UTILIZATION_PCT: &str = "utilization_pct";
    pub const FREQUENCY_MHZ: &str = "frequency_mhz";
    pub const CORE_COUNT: &str = "core_count";
    pub const PHYSICAL_CORE_COUNT: &str = "physical_core_count";
    pub const TEMPERATURE_C: &str = "temperature_c";
    pub const MEMORY_USED_MB: &str = "memory_used_mb";
    pub const MEMORY_TOTAL_MB: &str = "memory_total_mb";
    pub const MEMORY_AVAILABLE_MB: &str = "memory_available_mb";
    pub const MEMORY_UTIL_PCT: &str = "memory_util_pct";
    pub const SWAP_USED_MB: &str = "swap_used_mb";
    pub const SWAP_TOTAL_MB: &str = "swap_total_mb";
    pub const DISK_USED_MB: &str = "disk_used_mb";
    pub const DISK_TOTAL_MB: &str = "disk_total_mb";
    pub const DISK_READ_MB: &str = "disk_read_mb";
    pub const DISK_WRITE_MB: &str = "disk_write_mb";
    pub const POWER_W: &str = "power_w";
}

/// Hardware source a sample was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Source {
    Cpu,
    Memory,
    Disk,
    Gpu,
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Source::Cpu => "cpu",
            Source::Memory => "memory",
            Source::Disk => "disk",
            Source::Gpu => "gpu",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a source could be sampled at all, and how completely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Available,
    PartiallyAvailable,
    Unavailable,
}

/// One measurement from one source.
///
/// A field absent from `fields` means "not measurable on this hardware or
/// driver combination", which is distinct from a zero reading. Samples are
/// immutable after construction; downstream consumers only ever see them
/// by shared reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub source: Source,
    pub availability: Availability,
    pub fields: BTreeMap<String, f64>,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

impl MetricSample {
    pub fn new(source: Source, timestamp: i64) -> Self {
        Self {
            source,
            availability: Availability::Available,
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    /// A sample for a source that produced no data this tick.
    pub fn unavailable(source: Source, timestamp: i64) -> Self {
        Self {
            source,
            availability: Availability::Unavailable,
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }

    pub fn is_available(&self) -> bool {
        self.availability != Availability::Unavailable
    }
}

/// Immutable aggregate of one sample per configured source at one timestamp.
///
/// Built by the aggregator each tick and handed to consumers as
/// `Arc<Snapshot>`; never mutated after publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unix timestamp in seconds
    pub timestamp: i64,
    /// Exactly one entry per configured source, ordered by `Source`
    pub samples: Vec<MetricSample>,
}

impl Snapshot {
    pub fn new(timestamp: i64, mut samples: Vec<MetricSample>) -> Self {
        samples.sort_by_key(|s| s.source);
        Self { timestamp, samples }
    }

    pub fn sample(&self, source: Source) -> Option<&MetricSample> {
        self.samples.iter().find(|s| s.source == source)
    }

    pub fn sources(&self) -> impl Iterator<Item = Source> + '_ {
        self.samples.iter().map(|s| s.source)
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            timestamp: 0,
            samples: Vec::new(),
        }
    }
}
