// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tempfile::tempdir;

use super::*;

#[test]
fn parse_cpulist_handles_ranges_and_singletons() {
    assert_eq!(parse_cpulist("0-3,8,10-11"), vec![0, 1, 2, 3, 8, 10, 11]);
    assert_eq!(parse_cpulist(""), Vec::<u32>::new());
}

#[test]
fn parse_node_meminfo_extracts_kb_as_bytes() {
    let text = "Node 0 MemTotal:       16384000 kB\nNode 0 MemFree: 1000 kB\n";
    assert_eq!(parse_node_meminfo(text), Some(16384000 * 1024));
}

#[test]
fn scan_numa_topology_reads_fixture_directory() {
    let dir = tempdir().expect("tempdir");
    let node0 = dir.path().join("node0");
    std::fs::create_dir_all(&node0).expect("mkdir");
    std::fs::write(node0.join("cpulist"), "0-3\n").expect("write cpulist");
    std::fs::write(node0.join("meminfo"), "Node 0 MemTotal: 1024 kB\n").expect("write meminfo");

    let node1 = dir.path().join("node1");
    std::fs::create_dir_all(&node1).expect("mkdir");
    std::fs::write(node1.join("cpulist"), "4-7\n").expect("write cpulist");
    std::fs::write(node1.join("meminfo"), "Node 1 MemTotal: 2048 kB\n").expect("write meminfo");

    let domains = scan_numa_topology(dir.path()).expect("scan");
    assert_eq!(domains.len(), 2);
    assert_eq!(domains[0].numa_id, 0);
    assert_eq!(domains[0].cores, vec![0, 1, 2, 3]);
    assert_eq!(domains[1].memory_bytes, 2048 * 1024);
}

#[test]
fn scan_numa_topology_on_missing_root_is_empty() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("does-not-exist");
    assert!(scan_numa_topology(&missing).expect("scan").is_empty());
}

#[test]
fn parse_nvidia_smi_line_round_trips_csv_row() {
    let line = "0, NVIDIA A100, 535.104.05, 81920, 12, 2048, 45, 120.50";
    let gpu = parse_nvidia_smi_line(line).expect("parsed");
    assert_eq!(gpu.gpu_id, GpuId(0));
    assert_eq!(gpu.model, "NVIDIA A100");
    assert_eq!(gpu.total_memory_bytes, 81920 * 1024 * 1024);
    assert_eq!(gpu.telemetry.utilization_pct, 12.0);
}
