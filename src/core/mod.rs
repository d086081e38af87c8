//! The metrics acquisition and normalization pipeline.
//!
//! Probes produce per-source samples; the sampler drives them at a fixed
//! cadence and the aggregator merges results into immutable snapshots and a
//! rolling history window.

pub mod cache;
pub mod history;
pub mod metrics;
pub mod probe;
pub mod sampler;

pub use cache::{Clock, DetectionCache, SystemClock};
pub use history::HistoryWindow;
pub use metrics::{field, Availability, MetricSample, Snapshot, Source};
pub use probe::Probe;
pub use sampler::{MonitorRuntime, SamplerConfig};
