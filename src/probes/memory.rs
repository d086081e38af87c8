use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::core::metrics::{field, Availability, MetricSample, Source};
use crate::core::probe::Probe;
use crate::error::Result;

const MB: f64 = 1024.0 * 1024.0;

/// System memory probe backed by `sysinfo`.
pub struct MemoryProbe {
    system: System,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self {
            system: System::new_with_specifics(
                RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
            ),
        }
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for MemoryProbe {
    fn source(&self) -> Source {
        Source::Memory
    }

    fn detect(&mut self) -> Availability {
        Availability::Available
    }

    fn sample(&mut self) -> Result<MetricSample> {
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let used = self.system.used_memory();

        let mut sample = MetricSample::new(Source::Memory, chrono::Utc::now().timestamp());
        sample.set(field::MEMORY_USED_MB, used as f64 / MB);
        sample.set(field::MEMORY_TOTAL_MB, total as f64 / MB);
        sample.set(
            field::MEMORY_AVAILABLE_MB,
            self.system.available_memory() as f64 / MB,
        );
        if total > 0 {
            sample.set(
                field::UTILIZATION_PCT,
                (used as f64 / total as f64) * 100.0,
            );
        }
        sample.set(field::SWAP_USED_MB, self.system.used_swap() as f64 / MB);
        sample.set(field::SWAP_TOTAL_MB, self.system.total_swap() as f64 / MB);

        Ok(sample)
    }
}
