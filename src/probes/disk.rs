use sysinfo::Disks;

use crate::core::metrics::{field, Availability, MetricSample, Source};
use crate::core::probe::Probe;
use crate::error::{ProbeError, Result};

const MB: f64 = 1024.0 * 1024.0;

/// Disk usage probe for the primary mount, backed by `sysinfo`.
///
/// The primary mount is `/` when present, otherwise the first mount with a
/// non-zero capacity.
pub struct DiskProbe {
    disks: Disks,
}

impl DiskProbe {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for DiskProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for DiskProbe {
    fn source(&self) -> Source {
        Source::Disk
    }

    fn detect(&mut self) -> Availability {
        if self.disks.iter().any(|d| d.total_space() > 0) {
            Availability::Available
        } else {
            Availability::Unavailable
        }
    }

    fn sample(&mut self) -> Result<MetricSample> {
        self.disks.refresh(true);

        let primary = self
            .disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/") && d.total_space() > 0)
            .or_else(|| self.disks.iter().find(|d| d.total_space() > 0))
            .ok_or_else(|| ProbeError::device_absent("no mounted filesystem with capacity"))?;

        let total = primary.total_space();
        let used = total.saturating_sub(primary.available_space());

        let mut sample = MetricSample::new(Source::Disk, chrono::Utc::now().timestamp());
        sample.set(field::DISK_USED_MB, used as f64 / MB);
        sample.set(field::DISK_TOTAL_MB, total as f64 / MB);
        sample.set(field::UTILIZATION_PCT, (used as f64 / total as f64) * 100.0);

        // I/O moved since the previous refresh, so at the sampler's cadence
        // these are per-tick deltas.
        let io = primary.usage();
        sample.set(field::DISK_READ_MB, io.read_bytes as f64 / MB);
        sample.set(field::DISK_WRITE_MB, io.written_bytes as f64 / MB);

        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_reports_usage_and_io_deltas() {
        let mut probe = DiskProbe::new();
        // Containers can hide every mount; when one is visible the usage and
        // I/O fields must all be present.
        if let Ok(sample) = probe.sample() {
            assert_eq!(sample.source, Source::Disk);
            assert!(sample.get(field::DISK_TOTAL_MB).unwrap_or(0.0) > 0.0);
            assert!(sample.get(field::DISK_READ_MB).unwrap_or(-1.0) >= 0.0);
            assert!(sample.get(field::DISK_WRITE_MB).unwrap_or(-1.0) >= 0.0);
        }
    }
}
