//! Microbenchmarks for per-record work: pseudonym derivation,
//! classification and wire-record construction.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use presence_scanner::report::Report;
use presence_scanner::{DeviceCategory, DiscoveredDevice, MacAddress, Source, pseudonymize};

const MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

fn sample_device() -> DiscoveredDevice {
    DiscoveredDevice {
        mac: MAC,
        name: Some("Pixel 7".to_string()),
        rssi: Some(-52),
        device_class: Some(0x5A020C),
        source: Source::Classic,
    }
}

fn bench_pseudonymize(c: &mut Criterion) {
    let mut group = c.benchmark_group("pseudonymize");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_address", |b| {
        b.iter(|| pseudonymize(black_box(MAC), black_box("s3cr3t")))
    });

    group.bench_function("distinct_addresses", |b| {
        let macs: Vec<MacAddress> = (0..64u8)
            .map(|i| MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, i]))
            .collect();
        b.iter(|| {
            for mac in &macs {
                black_box(pseudonymize(*mac, "s3cr3t"));
            }
        })
    });

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(1));

    group.bench_function("known_major_class", |b| {
        b.iter(|| DeviceCategory::from_bitmask(black_box(0x0200)))
    });

    group.bench_function("unknown_major_class", |b| {
        b.iter(|| DeviceCategory::from_bitmask(black_box(0xFFFF)))
    });

    group.finish();
}

fn bench_report_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("report_build");
    group.throughput(Throughput::Elements(1));

    let device = sample_device();
    group.bench_function("from_device", |b| {
        b.iter(|| Report::from_device(black_box(&device), "s3cr3t", "Room_B"))
    });

    group.bench_function("from_device_and_serialize", |b| {
        b.iter(|| {
            let report = Report::from_device(black_box(&device), "s3cr3t", "Room_B");
            serde_json::to_string(&report).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_pseudonymize, bench_classify, bench_report_build);
criterion_main!(benches);
