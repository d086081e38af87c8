//! Tokio runtime and task orchestration for the sampling pipeline.
//!
//! A scheduler task broadcasts a sequence-numbered tick at a fixed cadence.
//! Each probe runs in its own task and reports exactly once per tick; a probe
//! whose external tool hangs is cut off by a per-tick budget and reports
//! Unavailable until the straggling call returns. The aggregator groups
//! reports by tick sequence, builds one immutable snapshot per tick, feeds
//! the history window, and publishes both over watch channels.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::core::history::HistoryWindow;
use crate::core::metrics::{MetricSample, Snapshot, Source};
use crate::core::probe::Probe;
use crate::error::{ProbeError, Result};

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Polling cadence. One snapshot is published per tick.
    pub tick: Duration,
    /// Per-probe sampling budget within a tick. A probe that exceeds it is
    /// reported Unavailable for that tick only.
    pub probe_budget: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            probe_budget: Duration::from_millis(900),
        }
    }
}

/// One scheduler beat, fanned out to every probe task.
#[derive(Debug, Clone, Copy)]
struct Tick {
    seq: u64,
    /// Unix timestamp in seconds
    timestamp: i64,
}

/// One probe's answer for one tick.
struct ProbeReport {
    seq: u64,
    sample: MetricSample,
}

/// Owns the tokio runtime running the sampling pipeline and hands out
/// receivers for the published snapshots and history.
pub struct MonitorRuntime {
    pub snapshot_rx: watch::Receiver<Arc<Snapshot>>,
    pub history_rx: watch::Receiver<Arc<HistoryWindow>>,
    shutdown_tx: broadcast::Sender<()>,
    _runtime: tokio::runtime::Runtime,
}

impl MonitorRuntime {
    pub fn new(probes: Vec<Box<dyn Probe>>, config: SamplerConfig) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .thread_name("hwmon-sampler")
            .build()?;

        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Snapshot::default()));
        let (history_tx, history_rx) = watch::channel(Arc::new(HistoryWindow::new()));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let shutdown_for_spawn = shutdown_tx.clone();
        runtime.spawn(async move {
            spawn_pipeline(probes, config, snapshot_tx, history_tx, shutdown_for_spawn).await;
        });

        Ok(Self {
            snapshot_rx,
            history_rx,
            shutdown_tx,
            _runtime: runtime,
        })
    }

    /// Signal all tasks to stop. In-flight tool invocations are abandoned;
    /// the runtime shuts down when dropped.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn spawn_pipeline(
    probes: Vec<Box<dyn Probe>>,
    config: SamplerConfig,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    history_tx: watch::Sender<Arc<HistoryWindow>>,
    shutdown: broadcast::Sender<()>,
) {
    let sources: Vec<Source> = probes.iter().map(|p| p.source()).collect();

    let (tick_tx, _) = broadcast::channel::<Tick>(4);
    let (report_tx, report_rx) = mpsc::channel::<ProbeReport>(32);

    tokio::spawn(aggregator_task(
        sources,
        report_rx,
        tick_tx.subscribe(),
        snapshot_tx,
        history_tx,
        shutdown.subscribe(),
    ));

    for probe in probes {
        tokio::spawn(probe_task(
            probe,
            config.probe_budget,
            tick_tx.subscribe(),
            report_tx.clone(),
            shutdown.subscribe(),
        ));
    }

    scheduler_task(config.tick, tick_tx, shutdown.subscribe()).await;
}

/// Broadcasts the fixed-cadence tick that drives every probe.
async fn scheduler_task(
    tick: Duration,
    tick_tx: broadcast::Sender<Tick>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                seq += 1;
                let beat = Tick {
                    seq,
                    timestamp: chrono::Utc::now().timestamp(),
                };
                if tick_tx.send(beat).is_err() {
                    break;
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// What a probe task holds between ticks: either the probe itself, or the
/// join handle of a sampling call that blew its budget and is still running.
enum ProbeSlot {
    Ready(Box<dyn Probe>),
    InFlight(JoinHandle<(Box<dyn Probe>, Result<MetricSample>)>),
    /// The blocking task panicked and the probe is gone.
    Lost,
}

/// Runs one probe, reporting exactly once per tick.
///
/// Sampling happens on the blocking pool so a slow external tool (a hung
/// `nvidia-smi`) never stalls the scheduler. On budget overrun the tick is
/// reported Unavailable immediately and the straggler is left to finish in
/// the background; the probe is recovered on a later tick.
async fn probe_task(
    probe: Box<dyn Probe>,
    budget: Duration,
    mut tick_rx: broadcast::Receiver<Tick>,
    report_tx: mpsc::Sender<ProbeReport>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let source = probe.source();
    let mut slot = ProbeSlot::Ready(probe);

    loop {
        let beat = tokio::select! {
            beat = tick_rx.recv() => match beat {
                Ok(beat) => beat,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        };

        // Try to recover a straggler from an earlier tick without waiting.
        if let ProbeSlot::InFlight(handle) = &mut slot {
            if handle.is_finished() {
                slot = match std::mem::replace(&mut slot, ProbeSlot::Lost) {
                    ProbeSlot::InFlight(handle) => match handle.await {
                        Ok((probe, result)) => {
                            if let Err(err) = result {
                                log::debug!("{source} straggler finished with: {err}");
                            }
                            ProbeSlot::Ready(probe)
                        }
                        Err(join_err) => {
                            log::error!("{source} probe panicked: {join_err}");
                            ProbeSlot::Lost
                        }
                    },
                    other => other,
                };
            }
        }

        let sample = match std::mem::replace(&mut slot, ProbeSlot::Lost) {
            ProbeSlot::Ready(mut probe) => {
                let mut handle = tokio::task::spawn_blocking(move || {
                    let result = probe.sample();
                    (probe, result)
                });
                match timeout(budget, &mut handle).await {
                    Ok(Ok((probe, result))) => {
                        slot = ProbeSlot::Ready(probe);
                        match result {
                            Ok(mut sample) => {
                                sample.timestamp = beat.timestamp;
                                sample
                            }
                            Err(err) => {
                                log::warn!("{source} sample failed: {err}");
                                MetricSample::unavailable(source, beat.timestamp)
                            }
                        }
                    }
                    Ok(Err(join_err)) => {
                        log::error!("{source} probe panicked: {join_err}");
                        slot = ProbeSlot::Lost;
                        MetricSample::unavailable(source, beat.timestamp)
                    }
                    Err(_) => {
                        log::warn!(
                            "{source} sample failed: {}",
                            ProbeError::Timeout(budget)
                        );
                        slot = ProbeSlot::InFlight(handle);
                        MetricSample::unavailable(source, beat.timestamp)
                    }
                }
            }
            in_flight @ ProbeSlot::InFlight(_) => {
                slot = in_flight;
                MetricSample::unavailable(source, beat.timestamp)
            }
            ProbeSlot::Lost => MetricSample::unavailable(source, beat.timestamp),
        };

        if report_tx
            .send(ProbeReport {
                seq: beat.seq,
                sample,
            })
            .await
            .is_err()
        {
            break;
        }
    }
}

/// Merges per-probe reports into one snapshot per tick and maintains the
/// history window. The history is mutated only here.
async fn aggregator_task(
    sources: Vec<Source>,
    mut report_rx: mpsc::Receiver<ProbeReport>,
    mut tick_rx: broadcast::Receiver<Tick>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    history_tx: watch::Sender<Arc<HistoryWindow>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut pending: BTreeMap<u64, Vec<MetricSample>> = BTreeMap::new();
    let mut history = HistoryWindow::new();
    let mut last_published: u64 = 0;

    loop {
        tokio::select! {
            Some(report) = report_rx.recv() => {
                if report.seq <= last_published {
                    // Late report for an already-published tick.
                    continue;
                }
                let samples = pending.entry(report.seq).or_default();
                samples.push(report.sample);
                if samples.len() == sources.len() {
                    let samples = pending.remove(&report.seq).unwrap_or_default();
                    publish(
                        report.seq,
                        samples,
                        &sources,
                        &mut history,
                        &snapshot_tx,
                        &history_tx,
                        &mut last_published,
                    );
                }
            }
            beat = tick_rx.recv() => {
                let beat = match beat {
                    Ok(beat) => beat,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                // A tick that is two beats old will not receive further
                // reports from live probe tasks; flush it with gaps marked
                // Unavailable so a dead task cannot stall publication.
                let stale: Vec<u64> = pending
                    .keys()
                    .copied()
                    .filter(|&seq| seq + 2 <= beat.seq)
                    .collect();
                for seq in stale {
                    let samples = pending.remove(&seq).unwrap_or_default();
                    // A newer tick may have completed and published while
                    // this one sat incomplete; publishing it now would walk
                    // the snapshot and history backwards in time.
                    if seq <= last_published {
                        continue;
                    }
                    publish(
                        seq,
                        samples,
                        &sources,
                        &mut history,
                        &snapshot_tx,
                        &history_tx,
                        &mut last_published,
                    );
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

fn publish(
    seq: u64,
    mut samples: Vec<MetricSample>,
    sources: &[Source],
    history: &mut HistoryWindow,
    snapshot_tx: &watch::Sender<Arc<Snapshot>>,
    history_tx: &watch::Sender<Arc<HistoryWindow>>,
    last_published: &mut u64,
) {
    // Publication is strictly forward in tick order; anything older than
    // the last published tick is dropped so the watch channel and history
    // never move backwards in time.
    if seq <= *last_published {
        return;
    }

    let timestamp = samples
        .iter()
        .map(|s| s.timestamp)
        .max()
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    for &source in sources {
        if !samples.iter().any(|s| s.source == source) {
            samples.push(MetricSample::unavailable(source, timestamp));
        }
    }

    let snapshot = Snapshot::new(timestamp, samples);
    for sample in &snapshot.samples {
        for (name, &value) in &sample.fields {
            history.push(&format!("{}.{}", sample.source, name), timestamp, value);
        }
    }

    *last_published = seq;
    let _ = snapshot_tx.send(Arc::new(snapshot));
    let _ = history_tx.send(Arc::new(history.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::{field, Availability};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc as StdArc;

    struct SteadyProbe {
        source: Source,
        value: f64,
    }

    impl Probe for SteadyProbe {
        fn source(&self) -> Source {
            self.source
        }
        fn detect(&mut self) -> Availability {
            Availability::Available
        }
        fn sample(&mut self) -> Result<MetricSample> {
            let mut sample = MetricSample::new(self.source, 0);
            sample.set(field::UTILIZATION_PCT, self.value);
            Ok(sample)
        }
    }

    struct FailingProbe;

    impl Probe for FailingProbe {
        fn source(&self) -> Source {
            Source::Gpu
        }
        fn detect(&mut self) -> Availability {
            Availability::Unavailable
        }
        fn sample(&mut self) -> Result<MetricSample> {
            Err(ProbeError::tool_unavailable("nvidia-smi not found"))
        }
    }

    /// Sleeps past the budget on the first call only.
    struct SlowOnceProbe {
        calls: StdArc<AtomicU32>,
        delay: Duration,
    }

    impl Probe for SlowOnceProbe {
        fn source(&self) -> Source {
            Source::Disk
        }
        fn detect(&mut self) -> Availability {
            Availability::Available
        }
        fn sample(&mut self) -> Result<MetricSample> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(self.delay);
            }
            let mut sample = MetricSample::new(Source::Disk, 0);
            sample.set(field::UTILIZATION_PCT, 55.0);
            Ok(sample)
        }
    }

    fn wait_for_snapshot<F>(
        rx: &mut watch::Receiver<Arc<Snapshot>>,
        deadline: Duration,
        pred: F,
    ) -> Option<Arc<Snapshot>>
    where
        F: Fn(&Snapshot) -> bool,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            {
                let snapshot = rx.borrow_and_update();
                if pred(&snapshot) {
                    return Some(snapshot.clone());
                }
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    fn fast_config() -> SamplerConfig {
        SamplerConfig {
            tick: Duration::from_millis(50),
            probe_budget: Duration::from_millis(25),
        }
    }

    #[test]
    fn snapshot_has_one_sample_per_probe() {
        let probes: Vec<Box<dyn Probe>> = vec![
            Box::new(SteadyProbe {
                source: Source::Cpu,
                value: 10.0,
            }),
            Box::new(SteadyProbe {
                source: Source::Memory,
                value: 20.0,
            }),
            Box::new(FailingProbe),
        ];

        let runtime = MonitorRuntime::new(probes, fast_config()).unwrap();
        let snapshot = wait_for_snapshot(&mut runtime.snapshot_rx.clone(), Duration::from_secs(3), |s| {
            !s.samples.is_empty()
        })
        .expect("no snapshot published");

        assert_eq!(snapshot.samples.len(), 3);
        for source in [Source::Cpu, Source::Memory, Source::Gpu] {
            assert_eq!(
                snapshot.samples.iter().filter(|s| s.source == source).count(),
                1
            );
        }
        runtime.shutdown();
    }

    #[test]
    fn failing_probe_does_not_block_others() {
        let probes: Vec<Box<dyn Probe>> = vec![
            Box::new(SteadyProbe {
                source: Source::Cpu,
                value: 33.0,
            }),
            Box::new(FailingProbe),
        ];

        let runtime = MonitorRuntime::new(probes, fast_config()).unwrap();
        let snapshot = wait_for_snapshot(&mut runtime.snapshot_rx.clone(), Duration::from_secs(3), |s| {
            !s.samples.is_empty()
        })
        .expect("no snapshot published");

        let cpu = snapshot.sample(Source::Cpu).unwrap();
        assert_eq!(cpu.availability, Availability::Available);
        assert_eq!(cpu.get(field::UTILIZATION_PCT), Some(33.0));

        let gpu = snapshot.sample(Source::Gpu).unwrap();
        assert_eq!(gpu.availability, Availability::Unavailable);
        assert!(gpu.fields.is_empty());
        runtime.shutdown();
    }

    #[test]
    fn budget_overrun_degrades_one_tick_then_recovers() {
        let calls = StdArc::new(AtomicU32::new(0));
        let probes: Vec<Box<dyn Probe>> = vec![
            Box::new(SteadyProbe {
                source: Source::Cpu,
                value: 1.0,
            }),
            Box::new(SlowOnceProbe {
                calls: calls.clone(),
                delay: Duration::from_millis(120),
            }),
        ];

        let runtime = MonitorRuntime::new(probes, fast_config()).unwrap();
        let mut rx = runtime.snapshot_rx.clone();

        let degraded = wait_for_snapshot(&mut rx, Duration::from_secs(3), |s| {
            s.sample(Source::Disk)
                .map(|d| d.availability == Availability::Unavailable)
                .unwrap_or(false)
        })
        .expect("slow probe never reported Unavailable");
        // CPU keeps reporting while the disk probe is over budget.
        assert_eq!(
            degraded.sample(Source::Cpu).unwrap().availability,
            Availability::Available
        );

        let recovered = wait_for_snapshot(&mut rx, Duration::from_secs(5), |s| {
            s.sample(Source::Disk)
                .map(|d| d.availability == Availability::Available)
                .unwrap_or(false)
        })
        .expect("slow probe never recovered");
        assert_eq!(
            recovered.sample(Source::Disk).unwrap().get(field::UTILIZATION_PCT),
            Some(55.0)
        );
        runtime.shutdown();
    }

    #[test]
    fn late_tick_never_overwrites_a_newer_publication() {
        let sources = vec![Source::Cpu];
        let (snapshot_tx, mut snapshot_rx) = watch::channel(Arc::new(Snapshot::default()));
        let (history_tx, _history_rx) = watch::channel(Arc::new(HistoryWindow::new()));
        let mut history = HistoryWindow::new();
        let mut last_published: u64 = 0;

        let mut newer = MetricSample::new(Source::Cpu, 100);
        newer.set(field::UTILIZATION_PCT, 1.0);
        publish(
            5,
            vec![newer],
            &sources,
            &mut history,
            &snapshot_tx,
            &history_tx,
            &mut last_published,
        );

        // A tick that sat incomplete while seq 5 completed must be dropped,
        // not published behind it.
        let mut older = MetricSample::new(Source::Cpu, 90);
        older.set(field::UTILIZATION_PCT, 2.0);
        publish(
            4,
            vec![older],
            &sources,
            &mut history,
            &snapshot_tx,
            &history_tx,
            &mut last_published,
        );

        assert_eq!(last_published, 5);
        assert_eq!(snapshot_rx.borrow_and_update().timestamp, 100);
        let series = history.series("cpu.utilization_pct");
        assert_eq!(series, vec![(100, 1.0)]);
        assert!(series.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn history_receives_published_fields() {
        let probes: Vec<Box<dyn Probe>> = vec![Box::new(SteadyProbe {
            source: Source::Cpu,
            value: 75.0,
        })];

        let runtime = MonitorRuntime::new(probes, fast_config()).unwrap();
        let mut history_rx = runtime.history_rx.clone();

        let start = std::time::Instant::now();
        let mut found = false;
        while start.elapsed() < Duration::from_secs(3) {
            let history = history_rx.borrow_and_update().clone();
            if history.latest("cpu.utilization_pct") == Some(75.0) {
                found = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(found, "history never saw the cpu series");
        runtime.shutdown();
    }
}
