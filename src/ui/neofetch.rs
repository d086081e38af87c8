//! One-shot neofetch-style summary: static facts plus the current readings.

use std::sync::Arc;

use colored::Colorize;
use humansize::{format_size, BINARY};
use sysinfo::System;

use crate::core::cache::DetectionCache;
use crate::core::metrics::field;
use crate::core::probe::Probe;
use crate::probes::gpu::{GpuProbe, GpuResolution};
use crate::probes::{CpuProbe, DiskProbe, MemoryProbe};

const LOGO: [&str; 6] = [
    "  ██░██  ",
    "  ██░██  ",
    "  ░░░░░  ",
    "  ██░██  ",
    "  ██░██  ",
    "         ",
];

/// Print the summary and return; no runtime, no loop.
pub fn print() -> anyhow::Result<()> {
    let mut facts: Vec<(String, String)> = Vec::new();

    let host = System::host_name().unwrap_or_else(|| "unknown".to_string());
    facts.push(("Host".to_string(), host));
    facts.push((
        "OS".to_string(),
        System::long_os_version().unwrap_or_else(|| System::name().unwrap_or_default()),
    ));
    facts.push((
        "Kernel".to_string(),
        System::kernel_version().unwrap_or_default(),
    ));
    facts.push(("Uptime".to_string(), format_uptime(System::uptime())));

    let system = System::new_all();
    if let Some(cpu) = system.cpus().first() {
        facts.push((
            "CPU".to_string(),
            format!("{} ({} cores)", cpu.brand().trim(), system.cpus().len()),
        ));
    }

    // Current readings straight from the probes; a one-shot view does not
    // need the sampler.
    let mut memory = MemoryProbe::new();
    if let Ok(sample) = memory.sample() {
        if let (Some(used), Some(total)) = (
            sample.get(field::MEMORY_USED_MB),
            sample.get(field::MEMORY_TOTAL_MB),
        ) {
            facts.push((
                "Memory".to_string(),
                format!(
                    "{} / {}",
                    format_size((used * 1024.0 * 1024.0) as u64, BINARY),
                    format_size((total * 1024.0 * 1024.0) as u64, BINARY)
                ),
            ));
        }
    }

    let mut disk = DiskProbe::new();
    if let Ok(sample) = disk.sample() {
        if let Some(pct) = sample.get(field::UTILIZATION_PCT) {
            facts.push(("Disk".to_string(), format!("{pct:.1}% used")));
        }
    }

    let mut cpu_probe = CpuProbe::new();
    if let Ok(sample) = cpu_probe.sample() {
        if let Some(temp) = sample.get(field::TEMPERATURE_C) {
            facts.push(("CPU Temp".to_string(), format!("{temp:.1} °C")));
        }
    }

    let gpu = GpuProbe::new(Arc::new(DetectionCache::new()));
    match gpu.resolution() {
        GpuResolution::Detected(descriptors) => {
            for descriptor in &descriptors {
                let name = descriptor
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{:?} GPU", descriptor.vendor));
                facts.push((format!("GPU {}", descriptor.index), name));
            }
        }
        GpuResolution::Unavailable => {
            facts.push(("GPU".to_string(), "none detected".to_string()));
        }
    }

    let rows = LOGO.len().max(facts.len());
    for i in 0..rows {
        let logo = LOGO.get(i).copied().unwrap_or("         ");
        match facts.get(i) {
            Some((key, value)) => {
                println!("{}  {}: {}", logo.cyan(), key.bold().cyan(), value)
            }
            None => println!("{}", logo.cyan()),
        }
    }
    Ok(())
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
