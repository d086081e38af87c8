use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hwmon::core::{
    field, Availability, MetricSample, MonitorRuntime, Probe, SamplerConfig, Snapshot, Source,
};
use hwmon::error::{ProbeError, Result};

/// Reports a fixed utilization plus a call counter so tests can see how
/// often the sampler drove it.
struct CounterProbe {
    source: Source,
    value: f64,
    calls: Arc<AtomicU64>,
}

impl CounterProbe {
    fn new(source: Source, value: f64) -> (Self, Arc<AtomicU64>) {
        let calls = Arc::new(AtomicU64::new(0));
        let probe = Self {
            source,
            value,
            calls: Arc::clone(&calls),
        };
        (probe, calls)
    }
}

impl Probe for CounterProbe {
    fn source(&self) -> Source {
        self.source
    }

    fn detect(&mut self) -> Availability {
        Availability::Available
    }

    fn sample(&mut self) -> Result<MetricSample> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut sample = MetricSample::new(self.source, 0);
        sample.set(field::UTILIZATION_PCT, self.value);
        Ok(sample)
    }
}

struct BrokenProbe;

impl Probe for BrokenProbe {
    fn source(&self) -> Source {
        Source::Gpu
    }

    fn detect(&mut self) -> Availability {
        Availability::Unavailable
    }

    fn sample(&mut self) -> Result<MetricSample> {
        Err(ProbeError::device_absent("no device"))
    }
}

fn fast_config() -> SamplerConfig {
    SamplerConfig {
        tick: Duration::from_millis(50),
        probe_budget: Duration::from_millis(25),
    }
}

/// Block until a snapshot satisfying `pred` is published.
fn wait_for_snapshot(
    runtime: &MonitorRuntime,
    pred: impl Fn(&Snapshot) -> bool,
) -> Arc<Snapshot> {
    let mut rx = runtime.snapshot_rx.clone();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        {
            let snapshot = rx.borrow_and_update();
            if pred(&snapshot) {
                return Arc::clone(&snapshot);
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for snapshot");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn pipeline_publishes_one_sample_per_source() {
    let (cpu, _) = CounterProbe::new(Source::Cpu, 42.0);
    let (mem, _) = CounterProbe::new(Source::Memory, 61.5);
    let runtime =
        MonitorRuntime::new(vec![Box::new(cpu), Box::new(mem)], fast_config()).unwrap();

    let snapshot = wait_for_snapshot(&runtime, |s| s.samples.len() == 2);
    let sources: Vec<Source> = snapshot.sources().collect();
    assert_eq!(sources, vec![Source::Cpu, Source::Memory]);
    assert_eq!(
        snapshot
            .sample(Source::Cpu)
            .unwrap()
            .get(field::UTILIZATION_PCT),
        Some(42.0)
    );
    runtime.shutdown();
}

#[test]
fn failing_probe_does_not_block_healthy_ones() {
    let (cpu, _) = CounterProbe::new(Source::Cpu, 10.0);
    let runtime = MonitorRuntime::new(
        vec![Box::new(cpu), Box::new(BrokenProbe)],
        fast_config(),
    )
    .unwrap();

    let snapshot = wait_for_snapshot(&runtime, |s| s.samples.len() == 2);
    assert!(snapshot.sample(Source::Cpu).unwrap().is_available());
    let gpu = snapshot.sample(Source::Gpu).unwrap();
    assert_eq!(gpu.availability, Availability::Unavailable);
    assert!(gpu.fields.is_empty());
    runtime.shutdown();
}

#[test]
fn history_receives_every_published_field() {
    let (cpu, calls) = CounterProbe::new(Source::Cpu, 33.0);
    let runtime = MonitorRuntime::new(vec![Box::new(cpu)], fast_config()).unwrap();

    wait_for_snapshot(&runtime, |s| s.samples.len() == 1);
    // Let a few more ticks land so the series has depth.
    std::thread::sleep(Duration::from_millis(200));

    let history = Arc::clone(&runtime.history_rx.borrow());
    let series = history.series("cpu.utilization_pct");
    assert!(!series.is_empty());
    assert!(series.iter().all(|(_, v)| *v == 33.0));
    assert!(series.windows(2).all(|w| w[0].0 <= w[1].0));
    assert!(calls.load(Ordering::SeqCst) >= series.len() as u64);
    runtime.shutdown();
}

#[test]
fn shutdown_stops_sampling() {
    let (cpu, calls) = CounterProbe::new(Source::Cpu, 5.0);
    let runtime = MonitorRuntime::new(vec![Box::new(cpu)], fast_config()).unwrap();
    wait_for_snapshot(&runtime, |s| s.samples.len() == 1);
    runtime.shutdown();

    std::thread::sleep(Duration::from_millis(150));
    let settled = calls.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(calls.load(Ordering::SeqCst), settled);
}
