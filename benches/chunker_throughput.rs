use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use orbit_upload::core::Chunker;
use orbit_upload::protocol::MemoryStore;
use orbit_upload::{upload, UploadConfig, UploadSource};
use rand::RngCore;
use std::hint::black_box;
use std::io::Cursor;
use std::sync::Arc;

fn random_payload(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    rand::rng().fill_bytes(&mut data);
    data
}

fn benchmark_chunker(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunker_throughput");
    let runtime = tokio::runtime::Runtime::new().expect("runtime");

    let size = 32 * 1024 * 1024; // 32MB
    let data = random_payload(size);
    group.throughput(Throughput::Bytes(size as u64));

    for part_size in [1024 * 1024u64, 8 * 1024 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("split", part_size),
            &part_size,
            |b, &part_size| {
                b.iter(|| {
                    runtime.block_on(async {
                        let mut chunker =
                            Chunker::new(Cursor::new(&data[..]), size as u64, part_size).unwrap();
                        while let Some(part) = chunker.next_part().await.unwrap() {
                            black_box(part);
                        }
                    })
                });
            },
        );
    }

    group.finish();
}

fn benchmark_memory_upload(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_upload");
    let runtime = tokio::runtime::Runtime::new().expect("runtime");

    let size = 16 * 1024 * 1024; // 16MB
    let data = bytes::Bytes::from(random_payload(size));
    group.throughput(Throughput::Bytes(size as u64));

    for concurrency in [1usize, 4, 8] {
        let config = UploadConfig {
            part_size: 1024 * 1024,
            multipart_threshold: 1024 * 1024,
            max_concurrency: concurrency,
            ..Default::default()
        };

        group.bench_with_input(
            BenchmarkId::new("multipart", concurrency),
            &config,
            |b, config| {
                b.iter(|| {
                    runtime.block_on(async {
                        let store = Arc::new(MemoryStore::new().with_bucket("bench"));
                        let source = UploadSource::from_bytes(data.clone());
                        let outcome = upload(store, source, "bench", "object", config)
                            .await
                            .unwrap();
                        black_box(outcome);
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_chunker, benchmark_memory_upload);
criterion_main!(benches);
