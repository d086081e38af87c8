use std::fs;

use hwmon::core::{field, MetricSample, Snapshot, Source};
use hwmon::recorder::CsvRecorder;
use tempfile::TempDir;

fn snapshot(ts: i64, cpu_util: f64, mem_used: f64) -> Snapshot {
    let mut cpu = MetricSample::new(Source::Cpu, ts);
    cpu.set(field::UTILIZATION_PCT, cpu_util);
    let mut mem = MetricSample::new(Source::Memory, ts);
    mem.set(field::MEMORY_USED_MB, mem_used);
    Snapshot::new(ts, vec![cpu, mem])
}

#[test]
fn writes_header_then_one_row_per_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.csv");

    let first = snapshot(1_700_000_000, 12.5, 2048.0);
    let mut recorder = CsvRecorder::create(&path, &first).unwrap();
    recorder.record(&first).unwrap();
    recorder.record(&snapshot(1_700_000_001, 99.875, 4096.0)).unwrap();
    drop(recorder);

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "timestamp,cpu.utilization_pct,memory.memory_used_mb");
    assert!(lines[1].starts_with("2023-11-14 22:13:20,"));
    assert!(lines[2].ends_with(",99.875,4096"));
}

#[test]
fn values_reparse_to_identical_floats() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.csv");

    let value = 33.333_333_333_333_336_f64;
    let first = snapshot(0, value, 0.1 + 0.2);
    let mut recorder = CsvRecorder::create(&path, &first).unwrap();
    recorder.record(&first).unwrap();
    drop(recorder);

    let contents = fs::read_to_string(&path).unwrap();
    let row: Vec<&str> = contents.lines().nth(1).unwrap().split(',').collect();
    assert_eq!(row[1].parse::<f64>().unwrap(), value);
    assert_eq!(row[2].parse::<f64>().unwrap(), 0.1 + 0.2);
}

#[test]
fn columns_are_locked_to_the_first_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.csv");

    let first = snapshot(10, 1.0, 1.0);
    let mut recorder = CsvRecorder::create(&path, &first).unwrap();

    // A source that appears later gets no column; a field that disappears
    // leaves its cell empty.
    let mut cpu = MetricSample::new(Source::Cpu, 11);
    cpu.set(field::UTILIZATION_PCT, 2.0);
    let mut gpu = MetricSample::new(Source::Gpu, 11);
    gpu.set(field::TEMPERATURE_C, 70.0);
    let wider = Snapshot::new(11, vec![cpu, gpu]);
    recorder.record(&wider).unwrap();
    drop(recorder);

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "timestamp,cpu.utilization_pct,memory.memory_used_mb");
    let row: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(row.len(), 3);
    assert_eq!(row[1], "2");
    assert_eq!(row[2], "");
}
