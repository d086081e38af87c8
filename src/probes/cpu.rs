use sysinfo::{Components, CpuRefreshKind, RefreshKind, System};

use crate::core::metrics::{field, Availability, MetricSample, Source};
use crate::core::probe::Probe;
use crate::error::Result;

/// Sensor chips that report CPU package or core temperature.
const CPU_SENSOR_HINTS: [&str; 5] = ["cpu", "coretemp", "k10temp", "ryzen", "tctl"];

/// CPU probe backed by `sysinfo`. Always available; readings are cheap
/// enough that no detection caching is needed.
pub struct CpuProbe {
    system: System,
    components: Components,
}

impl CpuProbe {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()),
        );
        Self {
            system,
            components: Components::new_with_refreshed_list(),
        }
    }

    fn cpu_temperature(&self) -> Option<f64> {
        self.components.iter().find_map(|comp| {
            let label = comp.label().to_lowercase();
            if CPU_SENSOR_HINTS.iter().any(|hint| label.contains(hint)) {
                comp.temperature().map(f64::from)
            } else {
                None
            }
        })
    }
}

impl Default for CpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for CpuProbe {
    fn source(&self) -> Source {
        Source::Cpu
    }

    fn detect(&mut self) -> Availability {
        Availability::Available
    }

    fn sample(&mut self) -> Result<MetricSample> {
        self.system.refresh_cpu_all();
        self.components.refresh(true);

        let mut sample = MetricSample::new(Source::Cpu, chrono::Utc::now().timestamp());
        sample.set(field::UTILIZATION_PCT, self.system.global_cpu_usage() as f64);
        sample.set(field::CORE_COUNT, self.system.cpus().len() as f64);
        if let Some(physical) = System::physical_core_count() {
            sample.set(field::PHYSICAL_CORE_COUNT, physical as f64);
        }
        if let Some(cpu) = self.system.cpus().first() {
            sample.set(field::FREQUENCY_MHZ, cpu.frequency() as f64);
        }
        for (idx, cpu) in self.system.cpus().iter().enumerate() {
            sample.set(&format!("core{idx}_utilization_pct"), cpu.cpu_usage() as f64);
        }
        if let Some(temp) = self.cpu_temperature() {
            sample.set(field::TEMPERATURE_C, temp);
        }

        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_reports_core_count_and_utilization() {
        let mut probe = CpuProbe::new();
        // First refresh after construction; utilization may read zero but
        // the field must be present.
        let sample = probe.sample().unwrap();

        assert_eq!(sample.source, Source::Cpu);
        assert!(sample.get(field::UTILIZATION_PCT).is_some());
        assert!(sample.get(field::CORE_COUNT).unwrap_or(0.0) >= 1.0);
    }

    #[test]
    fn sample_reports_every_core() {
        let mut probe = CpuProbe::new();
        let sample = probe.sample().unwrap();

        let cores = sample.get(field::CORE_COUNT).unwrap() as usize;
        for idx in 0..cores {
            assert!(
                sample.get(&format!("core{idx}_utilization_pct")).is_some(),
                "missing per-core usage for core {idx}"
            );
        }
    }
}
