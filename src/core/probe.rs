use crate::core::metrics::{Availability, MetricSample, Source};
use crate::error::Result;

/// A single-source metric collector.
///
/// Implementations must never panic across this boundary. `sample` returns
/// an explicit error kind so the sampler can distinguish "no data" from
/// "tool missing" from "permission denied"; the sampler is what collapses
/// errors into an `Unavailable` sample for the snapshot.
pub trait Probe: Send {
    /// The source this probe reports for.
    fn source(&self) -> Source;

    /// Cheap (or cached) answer to "can this source be sampled at all?".
    fn detect(&mut self) -> Availability;

    /// Take one measurement. A call that outlives the sampler's per-probe
    /// budget is cut off by its timeout.
    fn sample(&mut self) -> Result<MetricSample>;
}
