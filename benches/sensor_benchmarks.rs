use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sensor_hub::{
    config::SensorSpec,
    sensors::{dht22::decode_frame, simulated::SIMULATED_TYPE},
    ReadPolicy, SensorHub, SensorRegistry,
};
use std::sync::Arc;

fn hub_with(count: usize) -> SensorHub {
    let specs: Vec<SensorSpec> = (0..count)
        .map(|i| SensorSpec::new(format!("sim_{}", i), SIMULATED_TYPE))
        .collect();
    let registry = SensorRegistry::build(&specs).expect("Should build registry");
    SensorHub::new(registry, ReadPolicy::default())
}

/// Benchmark DHT22 frame validation and conversion
fn bench_frame_decoding(c: &mut Criterion) {
    let frame = [0x02, 0x8c, 0x01, 0x5f, 0xee];

    c.bench_function("dht22_decode_frame", |b| {
        b.iter(|| decode_frame(frame).expect("Should decode"))
    });
}

/// Benchmark registry construction from specs
fn bench_registry_build(c: &mut Criterion) {
    let specs: Vec<SensorSpec> = (0..32)
        .map(|i| SensorSpec::new(format!("sim_{}", i), SIMULATED_TYPE))
        .collect();

    c.bench_function("registry_build_32", |b| {
        b.iter(|| SensorRegistry::build(&specs).expect("Should build registry"))
    });
}

/// Benchmark a coordinated read on a sensor that needs no hardware
fn bench_coordinated_read(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let hub = Arc::new(hub_with(1));

    c.bench_function("coordinated_read", |b| {
        b.to_async(&rt).iter(|| {
            let hub = hub.clone();
            async move { hub.read_sensor("sim_0").await.expect("Should read") }
        })
    });
}

/// Benchmark health aggregation over a growing number of sensors
fn bench_health_aggregation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");

    for count in [1, 4, 16].iter() {
        let hub = Arc::new(hub_with(*count));
        c.bench_with_input(
            BenchmarkId::new("health_aggregate", count),
            count,
            |b, _| {
                b.to_async(&rt).iter(|| {
                    let hub = hub.clone();
                    async move { hub.health().await }
                })
            },
        );
    }
}

/// Benchmark JSON serialization of sensor listings
fn bench_listing_serialization(c: &mut Criterion) {
    let hub = hub_with(8);
    let listing = hub.list_sensors();

    c.bench_function("listing_json_serialization", |b| {
        b.iter(|| serde_json::to_string(&listing).expect("Should serialize"))
    });
}

criterion_group!(
    benches,
    bench_frame_decoding,
    bench_registry_build,
    bench_coordinated_read,
    bench_health_aggregation,
    bench_listing_serialization
);
criterion_main!(benches);
