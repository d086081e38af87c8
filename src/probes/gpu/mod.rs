//! GPU detection and sampling.
//!
//! NVIDIA is tried first (vendor tool query), then the AMD fallback chain.
//! Detection spawns external processes and walks sysfs, so the verdict is
//! held in the detection cache for [`DETECTION_TTL`]; a GPU plugged or
//! unplugged mid-run is picked up on the next re-detection.

mod amd;
mod nvidia;

pub use amd::AmdGpu;
pub use nvidia::NvidiaGpu;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::cache::DetectionCache;
use crate::core::metrics::{Availability, MetricSample, Source};
use crate::core::probe::Probe;
use crate::error::{ProbeError, Result};
use crate::probes::tool::{SystemTool, ToolRunner};

/// How long a GPU detection verdict stays valid. Bounds the cost of
/// re-spawning external tools against the staleness of hotplug events.
pub const DETECTION_TTL: Duration = Duration::from_secs(60);

const CACHE_KEY: &str = "gpu";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Unknown,
}

/// Which stage of the detection chain identified the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMethod {
    /// Vendor tool enumerated the device list.
    ToolQuery,
    /// Sysfs vendor-id file matched a known vendor code.
    VendorIdSysfs,
    /// `lspci` display-controller line matched.
    LspciFallback,
    /// Only raw sysfs counters proved a usable card.
    SysfsFallback,
}

/// Which fields the achieved metric source can supply. The rendering layer
/// hides unsupported fields instead of showing misleading zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCapability {
    pub utilization: bool,
    pub memory: bool,
    pub temperature: bool,
    pub power: bool,
}

impl MetricCapability {
    /// Everything the vendor's detailed-metrics tool can report.
    pub fn full() -> Self {
        Self {
            utilization: true,
            memory: true,
            temperature: true,
            power: true,
        }
    }

    /// What raw sysfs hardware-monitor paths can supply on their own.
    pub fn sysfs_only() -> Self {
        Self {
            utilization: true,
            memory: false,
            temperature: true,
            power: false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.utilization && self.memory && self.temperature && self.power
    }
}

/// One detected GPU. Re-created only when the cached detection verdict
/// expires and re-detection changes the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDescriptor {
    pub vendor: GpuVendor,
    pub index: u32,
    pub name: Option<String>,
    pub detection_method: DetectionMethod,
    pub capability: MetricCapability,
}

/// Authoritative verdict of the detection chain.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuResolution {
    /// Ordered by card index; card 0 first.
    Detected(Vec<GpuDescriptor>),
    Unavailable,
}

/// Raw per-device readings as produced by a vendor backend, before they are
/// merged into the source-level sample.
#[derive(Debug, Default)]
pub(crate) struct DeviceReading {
    pub fields: BTreeMap<String, f64>,
    /// An individual field failed to parse and was dropped.
    pub degraded: bool,
}

/// Orders and executes the NVIDIA then AMD detection chain.
pub struct GpuResolver {
    nvidia: NvidiaGpu,
    amd: AmdGpu,
}

impl GpuResolver {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            nvidia: NvidiaGpu::new(runner.clone()),
            amd: AmdGpu::new(runner),
        }
    }

    pub fn with_backends(nvidia: NvidiaGpu, amd: AmdGpu) -> Self {
        Self { nvidia, amd }
    }

    /// Run the chain once. Each stage's own failure means "did not match";
    /// only exhausting both vendors yields `Unavailable`.
    pub fn resolve(&self) -> GpuResolution {
        if let Some(descriptors) = self.nvidia.detect() {
            log::debug!("detected {} NVIDIA GPU(s) via tool query", descriptors.len());
            return GpuResolution::Detected(descriptors);
        }
        if let Some(descriptors) = self.amd.detect() {
            log::debug!(
                "detected {} AMD GPU(s) via {:?}",
                descriptors.len(),
                descriptors[0].detection_method
            );
            return GpuResolution::Detected(descriptors);
        }
        log::debug!("no supported GPU detected");
        GpuResolution::Unavailable
    }
}

/// GPU probe over the detection cache and the vendor backends.
pub struct GpuProbe {
    resolver: GpuResolver,
    cache: Arc<DetectionCache<GpuResolution>>,
    ttl: Duration,
}

impl GpuProbe {
    /// Probe against the real tools and sysfs roots.
    pub fn new(cache: Arc<DetectionCache<GpuResolution>>) -> Self {
        Self::with_resolver(GpuResolver::new(Arc::new(SystemTool)), cache)
    }

    pub fn with_resolver(resolver: GpuResolver, cache: Arc<DetectionCache<GpuResolution>>) -> Self {
        Self {
            resolver,
            cache,
            ttl: DETECTION_TTL,
        }
    }

    /// Current descriptors, going through the cache.
    pub fn resolution(&self) -> GpuResolution {
        self.cache
            .get_or_detect(CACHE_KEY, self.ttl, || self.resolver.resolve())
    }
}

impl Probe for GpuProbe {
    fn source(&self) -> Source {
        Source::Gpu
    }

    fn detect(&mut self) -> Availability {
        match self.resolution() {
            GpuResolution::Detected(descriptors) => {
                if descriptors.iter().all(|d| d.capability.is_full()) {
                    Availability::Available
                } else {
                    Availability::PartiallyAvailable
                }
            }
            GpuResolution::Unavailable => Availability::Unavailable,
        }
    }

    fn sample(&mut self) -> Result<MetricSample> {
        let descriptors = match self.resolution() {
            GpuResolution::Detected(descriptors) => descriptors,
            GpuResolution::Unavailable => {
                return Err(ProbeError::device_absent("no supported GPU"));
            }
        };

        let readings = match descriptors[0].vendor {
            GpuVendor::Nvidia => self.resolver.nvidia.sample(&descriptors)?,
            GpuVendor::Amd | GpuVendor::Unknown => self.resolver.amd.sample(&descriptors)?,
        };

        let mut sample = MetricSample::new(Source::Gpu, chrono::Utc::now().timestamp());
        let mut degraded = false;
        for (descriptor, reading) in descriptors.iter().zip(&readings) {
            degraded |= reading.degraded;
            for (name, &value) in &reading.fields {
                // Card 0 keeps canonical names so single-GPU consumers and
                // the recorder see stable columns; extra cards are prefixed.
                if descriptor.index == 0 {
                    sample.set(name, value);
                } else {
                    sample.set(&format!("gpu{}_{}", descriptor.index, name), value);
                }
            }
        }

        let full = descriptors.iter().all(|d| d.capability.is_full());
        sample.availability = if sample.fields.is_empty() {
            Availability::Unavailable
        } else if degraded || !full {
            Availability::PartiallyAvailable
        } else {
            Availability::Available
        };

        Ok(sample)
    }
}
