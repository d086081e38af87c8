//! Probe implementations, one per hardware source.

pub mod cpu;
pub mod disk;
pub mod gpu;
pub mod memory;
pub mod tool;

pub use cpu::CpuProbe;
pub use disk::DiskProbe;
pub use gpu::{GpuProbe, GpuResolution, GpuResolver};
pub use memory::MemoryProbe;
pub use tool::{SystemTool, ToolRunner};

use std::sync::Arc;

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use crate::core::cache::DetectionCache;
use crate::core::probe::Probe;

/// Verify the baseline OS counters are readable at all. This is the only
/// fatal-class check in the program: without CPU and memory counters there
/// is nothing to monitor, so it runs once at startup and a failure exits
/// with non-zero status.
pub fn baseline_check() -> anyhow::Result<()> {
    let system = System::new_with_specifics(
        RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything()),
    );

    if system.cpus().is_empty() {
        anyhow::bail!("cannot enumerate CPUs from the OS");
    }
    if system.total_memory() == 0 {
        anyhow::bail!("cannot read total memory from the OS");
    }
    Ok(())
}

/// The standard probe set: CPU, memory, primary disk, GPU. Missing GPU
/// support never blocks the others; the GPU probe just reports Unavailable.
pub fn default_probes(cache: Arc<DetectionCache<GpuResolution>>) -> Vec<Box<dyn Probe>> {
    vec![
        Box::new(CpuProbe::new()),
        Box::new(MemoryProbe::new()),
        Box::new(DiskProbe::new()),
        Box::new(GpuProbe::new(cache)),
    ]
}
