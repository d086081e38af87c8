use std::sync::Arc;

use crate::core::metrics::field;
use crate::error::{ProbeError, Result};
use crate::probes::tool::ToolRunner;

use super::{DetectionMethod, DeviceReading, GpuDescriptor, GpuVendor, MetricCapability};

const NVIDIA_SMI: &str = "nvidia-smi";
const QUERY: &str = "--query-gpu=name,temperature.gpu,utilization.gpu,utilization.memory,memory.used,memory.total,power.draw";
const FORMAT: &str = "--format=csv,noheader,nounits";

/// NVIDIA backend: both detection and sampling go through `nvidia-smi`.
pub struct NvidiaGpu {
    runner: Arc<dyn ToolRunner>,
}

impl NvidiaGpu {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    /// Detection succeeds iff the tool is invocable and returns a parseable
    /// device list.
    pub(crate) fn detect(&self) -> Option<Vec<GpuDescriptor>> {
        if !self.runner.invocable(NVIDIA_SMI) {
            return None;
        }
        let output = match self.runner.run(NVIDIA_SMI, &["--list-gpus"]) {
            Ok(output) => output,
            Err(err) => {
                log::debug!("nvidia-smi device list failed: {err}");
                return None;
            }
        };

        // Lines look like: "GPU 0: NVIDIA GeForce RTX 3080 (UUID: GPU-...)"
        let descriptors: Vec<GpuDescriptor> = output
            .lines()
            .filter_map(parse_list_line)
            .map(|(index, name)| GpuDescriptor {
                vendor: GpuVendor::Nvidia,
                index,
                name: Some(name),
                detection_method: DetectionMethod::ToolQuery,
                capability: MetricCapability::full(),
            })
            .collect();

        if descriptors.is_empty() {
            None
        } else {
            Some(descriptors)
        }
    }

    /// One reading per enumerated device, in device order. A cell that fails
    /// to parse nulls out only that field.
    pub(crate) fn sample(&self, descriptors: &[GpuDescriptor]) -> Result<Vec<DeviceReading>> {
        let output = self.runner.run(NVIDIA_SMI, &[QUERY, FORMAT])?;

        let mut readings = Vec::with_capacity(descriptors.len());
        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            readings.push(parse_query_line(line));
        }

        if readings.is_empty() {
            return Err(ProbeError::parse_failure("nvidia-smi returned no devices"));
        }
        Ok(readings)
    }
}

fn parse_list_line(line: &str) -> Option<(u32, String)> {
    let rest = line.strip_prefix("GPU ")?;
    let (index, rest) = rest.split_once(':')?;
    let index = index.trim().parse().ok()?;
    let name = match rest.split_once("(UUID") {
        Some((name, _)) => name,
        None => rest,
    };
    Some((index, name.trim().to_string()))
}

/// Parse one `--query-gpu` CSV line. The first cell is the device name,
/// which is not a metric; the remaining cells map positionally onto fields.
fn parse_query_line(line: &str) -> DeviceReading {
    const COLUMNS: [&str; 6] = [
        field::TEMPERATURE_C,
        field::UTILIZATION_PCT,
        field::MEMORY_UTIL_PCT,
        field::MEMORY_USED_MB,
        field::MEMORY_TOTAL_MB,
        field::POWER_W,
    ];

    let mut reading = DeviceReading::default();
    let cells: Vec<&str> = line.split(',').skip(1).map(str::trim).collect();

    for (i, name) in COLUMNS.iter().enumerate() {
        match cells.get(i).and_then(|cell| cell.parse::<f64>().ok()) {
            Some(value) => {
                reading.fields.insert(name.to_string(), value);
            }
            None => {
                // "[N/A]" and friends: drop this field, keep the rest.
                reading.degraded = true;
            }
        }
    }
    reading
}
