//! Object stream benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pagestore::index::{IndexFactory, KeyProjection};
use pagestore::serialization::FixedWidthSerializer;
use pagestore::{Endianness, ObjectStream, StoreConfig};
use tempfile::tempdir;

fn config() -> StoreConfig {
    StoreConfig::builder()
        .page_size(4096)
        .max_memory(64 * 4096)
        .reserved_streams(2)
        .build()
        .unwrap()
}

fn add_fixed_benchmark(c: &mut Criterion) {
    c.bench_function("add_fixed_1000", |b| {
        b.iter(|| {
            let dir = tempdir().unwrap();
            let mut stream: ObjectStream<u64> =
                ObjectStream::open(dir.path().join("bench.db"), config(), FixedWidthSerializer::new(Endianness::Little))
                    .unwrap();
            for i in 0..1000u64 {
                stream.add(&i).unwrap();
            }
            black_box(stream.count())
        })
    });
}

fn load_variable_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut stream: ObjectStream<String> = ObjectStream::open_default(dir.path().join("bench.db"), config()).unwrap();
    for i in 0..1000 {
        stream.add(&format!("record number {}", i)).unwrap();
    }

    c.bench_function("load_variable_1000", |b| {
        b.iter(|| {
            for i in 0..1000 {
                black_box(stream.load_item(i).unwrap());
            }
        })
    });
}

fn unique_lookup_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut stream: ObjectStream<String> = ObjectStream::open_default(dir.path().join("bench.db"), config()).unwrap();
    let index =
        IndexFactory::unique_key_checksum_index(&mut stream, 0, KeyProjection::new("text", |s: &String| s.clone()))
            .unwrap();
    let keys: Vec<String> = (0..1000).map(|i| format!("key-{}", i)).collect();
    for key in &keys {
        stream.add(key).unwrap();
    }

    c.bench_function("unique_checksum_find_1000", |b| {
        b.iter(|| {
            let mut lookup = index.lookup(&mut stream).unwrap();
            for key in &keys {
                black_box(lookup.find(key).unwrap());
            }
        })
    });
}

criterion_group!(
    benches,
    add_fixed_benchmark,
    load_variable_benchmark,
    unique_lookup_benchmark
);
criterion_main!(benches);
