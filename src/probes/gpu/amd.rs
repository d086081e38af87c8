use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use crate::core::metrics::field;
use crate::error::Result;
use crate::probes::tool::ToolRunner;

use super::{DetectionMethod, DeviceReading, GpuDescriptor, GpuVendor, MetricCapability};

/// PCI vendor code for AMD/ATI.
const AMD_VENDOR_ID: &str = "0x1002";
const ROCM_SMI: &str = "rocm-smi";
const LSPCI: &str = "lspci";

/// Ordered stages of the AMD detection chain. First success wins and is
/// recorded on the descriptor; a stage's own I/O failure means "did not
/// match", never a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    VendorIdSysfs,
    LspciFallback,
    SysfsFallback,
    Exhausted,
}

/// AMD backend. Detection walks sysfs and falls back to `lspci`; metrics
/// come from `rocm-smi` when invocable, else raw sysfs hardware-monitor
/// paths (utilization and temperature only).
///
/// The sysfs roots are injectable so the chain can be exercised against a
/// fake tree.
pub struct AmdGpu {
    runner: Arc<dyn ToolRunner>,
    drm_root: PathBuf,
    hwmon_root: PathBuf,
}

impl AmdGpu {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self::with_roots(
            runner,
            PathBuf::from("/sys/class/drm"),
            PathBuf::from("/sys/class/hwmon"),
        )
    }

    pub fn with_roots(runner: Arc<dyn ToolRunner>, drm_root: PathBuf, hwmon_root: PathBuf) -> Self {
        Self {
            runner,
            drm_root,
            hwmon_root,
        }
    }

    /// Run the detection stages in order.
    pub(crate) fn detect(&self) -> Option<Vec<GpuDescriptor>> {
        let mut stage = Stage::VendorIdSysfs;
        loop {
            let (matched, next) = match stage {
                Stage::VendorIdSysfs => (self.match_vendor_id(), Stage::LspciFallback),
                Stage::LspciFallback => (self.match_lspci(), Stage::SysfsFallback),
                Stage::SysfsFallback => (self.match_sysfs_counters(), Stage::Exhausted),
                Stage::Exhausted => return None,
            };

            if let Some(mut descriptors) = matched {
                let capability = self.capability();
                let name = self.device_name();
                for descriptor in &mut descriptors {
                    descriptor.capability = capability;
                    descriptor.name = name.clone();
                }
                return Some(descriptors);
            }
            stage = next;
        }
    }

    /// Stage 1: `card*/device/vendor` matching the AMD vendor code.
    fn match_vendor_id(&self) -> Option<Vec<GpuDescriptor>> {
        let mut descriptors: Vec<GpuDescriptor> = self
            .card_indices()
            .into_iter()
            .filter(|&index| {
                let vendor_file = self.card_device(index).join("vendor");
                matches!(fs::read_to_string(&vendor_file), Ok(id) if id.trim() == AMD_VENDOR_ID)
            })
            .map(|index| self.descriptor(index, DetectionMethod::VendorIdSysfs))
            .collect();

        descriptors.sort_by_key(|d| d.index);
        if descriptors.is_empty() {
            None
        } else {
            Some(descriptors)
        }
    }

    /// Stage 2: `lspci` display-controller lines matching AMD/ATI.
    fn match_lspci(&self) -> Option<Vec<GpuDescriptor>> {
        if self.amd_lspci_line().is_some() {
            Some(vec![self.descriptor(0, DetectionMethod::LspciFallback)])
        } else {
            None
        }
    }

    /// Stage 3: a readable `gpu_busy_percent` alone proves a usable card.
    fn match_sysfs_counters(&self) -> Option<Vec<GpuDescriptor>> {
        let descriptors: Vec<GpuDescriptor> = self
            .card_indices()
            .into_iter()
            .filter(|&index| {
                fs::read_to_string(self.card_device(index).join("gpu_busy_percent")).is_ok()
            })
            .map(|index| self.descriptor(index, DetectionMethod::SysfsFallback))
            .collect();

        if descriptors.is_empty() {
            None
        } else {
            Some(descriptors)
        }
    }

    /// Metrics resolution is independent of which detection stage matched.
    fn capability(&self) -> MetricCapability {
        if self.runner.invocable(ROCM_SMI) {
            MetricCapability::full()
        } else {
            MetricCapability::sysfs_only()
        }
    }

    /// One reading per descriptor, in descriptor order.
    pub(crate) fn sample(&self, descriptors: &[GpuDescriptor]) -> Result<Vec<DeviceReading>> {
        let rocm_output = if descriptors.iter().any(|d| d.capability.is_full()) {
            match self
                .runner
                .run(ROCM_SMI, &["--showuse", "--showtemp", "--showpower", "--showmeminfo", "vram"])
            {
                Ok(output) => Some(output),
                Err(err) => {
                    log::warn!("rocm-smi failed, falling back to sysfs: {err}");
                    None
                }
            }
        } else {
            None
        };

        Ok(descriptors
            .iter()
            .map(|descriptor| match &rocm_output {
                Some(output) => {
                    let mut reading = rocm_reading(output, descriptor.index);
                    if reading.fields.is_empty() {
                        // Tool ran but told us nothing about this card.
                        reading = self.sysfs_reading(descriptor.index);
                        reading.degraded = true;
                    }
                    reading
                }
                None => {
                    let mut reading = self.sysfs_reading(descriptor.index);
                    // The tool was expected but did not deliver.
                    reading.degraded |= descriptor.capability.is_full();
                    reading
                }
            })
            .collect())
    }

    /// Utilization and temperature from raw sysfs; memory and power are
    /// absent here, not zero.
    fn sysfs_reading(&self, index: u32) -> DeviceReading {
        let mut reading = DeviceReading::default();
        let device = self.card_device(index);

        match fs::read_to_string(device.join("gpu_busy_percent")) {
            Ok(raw) => match raw.trim().parse::<f64>() {
                Ok(value) => {
                    reading.fields.insert(field::UTILIZATION_PCT.to_string(), value);
                }
                Err(_) => reading.degraded = true,
            },
            Err(err) => {
                log::debug!("gpu_busy_percent unreadable for card{index}: {err}");
                reading.degraded = true;
            }
        }

        match self.find_temp_input(&device).and_then(|path| read_millidegrees(&path)) {
            Some(celsius) => {
                reading.fields.insert(field::TEMPERATURE_C.to_string(), celsius);
            }
            None => reading.degraded = true,
        }

        reading
    }

    /// `card<idx>/device/hwmon/hwmon*/temp1_input`, falling back to the
    /// global hwmon class when the card exposes none.
    fn find_temp_input(&self, device: &Path) -> Option<PathBuf> {
        for root in [device.join("hwmon"), self.hwmon_root.clone()] {
            let entries = match fs::read_dir(&root) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                if !entry.file_name().to_string_lossy().starts_with("hwmon") {
                    continue;
                }
                let candidate = entry.path().join("temp1_input");
                if candidate.exists() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn amd_lspci_line(&self) -> Option<String> {
        if !self.runner.invocable(LSPCI) {
            return None;
        }
        let output = self.runner.run(LSPCI, &[]).ok()?;
        output
            .lines()
            .find(|line| {
                let lower = line.to_lowercase();
                (lower.contains("vga") || lower.contains("display") || lower.contains("3d"))
                    && (lower.contains("amd") || lower.contains("ati"))
            })
            .map(str::to_string)
    }

    /// Device name from the lspci display-controller line, when available.
    fn device_name(&self) -> Option<String> {
        let line = self.amd_lspci_line()?;
        line.rsplit_once(':').map(|(_, name)| name.trim().to_string())
    }

    /// Card numbers under the drm root, `cardN` exactly (connector entries
    /// like `card0-DP-1` are skipped).
    fn card_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = match fs::read_dir(&self.drm_root) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|entry| {
                    entry
                        .file_name()
                        .to_string_lossy()
                        .strip_prefix("card")?
                        .parse()
                        .ok()
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        indices.sort_unstable();
        indices
    }

    fn card_device(&self, index: u32) -> PathBuf {
        self.drm_root.join(format!("card{index}")).join("device")
    }

    fn descriptor(&self, index: u32, method: DetectionMethod) -> GpuDescriptor {
        GpuDescriptor {
            vendor: GpuVendor::Amd,
            index,
            name: None,
            detection_method: method,
            capability: MetricCapability::sysfs_only(),
        }
    }
}

/// Parse one card's metrics out of `rocm-smi` output. Lines are prefixed
/// with `GPU[<idx>]` on multi-card systems; single-card output is matched
/// as a whole.
fn rocm_reading(output: &str, index: u32) -> DeviceReading {
    let prefix = format!("GPU[{index}]");
    let scoped: String = output
        .lines()
        .filter(|line| line.starts_with(&prefix))
        .collect::<Vec<_>>()
        .join("\n");
    let text = if scoped.is_empty() { output } else { scoped.as_str() };

    let mut reading = DeviceReading::default();
    let mut put = |name: &str, value: Option<f64>| match value {
        Some(value) => {
            reading.fields.insert(name.to_string(), value);
        }
        None => reading.degraded = true,
    };

    put(field::UTILIZATION_PCT, capture_f64(r"GPU use \(%\):\s*([\d.]+)", text));
    put(
        field::TEMPERATURE_C,
        capture_f64(r"Temperature \(Sensor edge\) \(C\):\s*([\d.]+)", text),
    );
    put(
        field::POWER_W,
        capture_f64(
            r"(?:Average Graphics Package Power|Current Socket Graphics Package Power) \(W\):\s*([\d.]+)",
            text,
        ),
    );

    let total_b = capture_f64(r"VRAM Total Memory \(B\):\s*(\d+)", text);
    let used_b = capture_f64(r"VRAM Total Used Memory \(B\):\s*(\d+)", text);
    put(field::MEMORY_TOTAL_MB, total_b.map(|b| b / (1024.0 * 1024.0)));
    put(field::MEMORY_USED_MB, used_b.map(|b| b / (1024.0 * 1024.0)));
    if let (Some(total), Some(used)) = (total_b, used_b) {
        if total > 0.0 {
            reading
                .fields
                .insert(field::MEMORY_UTIL_PCT.to_string(), used / total * 100.0);
        }
    }

    reading
}

fn capture_f64(pattern: &str, text: &str) -> Option<f64> {
    Regex::new(pattern)
        .ok()?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

fn read_millidegrees(path: &Path) -> Option<f64> {
    let raw = fs::read_to_string(path).ok()?;
    raw.trim().parse::<i64>().ok().map(|milli| milli as f64 / 1000.0)
}
