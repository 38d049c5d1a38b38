//! Benchmarks for key hashing and partition routing.
//!
//! These measure the per-operation cost of finding the server that owns a key.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docstore_client::core::{Crc32Hasher, PartitionHasher};
use docstore_client::{Topology, TopologyDocument};

fn topology(partitions: usize, servers: usize) -> Topology {
    let server_list: Vec<String> = (0..servers).map(|i| format!("10.0.0.{i}:11210")).collect();
    let map: Vec<[i16; 2]> = (0..partitions)
        .map(|p| {
            let primary = (p % servers) as i16;
            [primary, ((p + 1) % servers) as i16]
        })
        .collect();
    let json = serde_json::json!({
        "rev": 1,
        "name": "bench",
        "nodeLocator": "vbucket",
        "vBucketServerMap": {
            "hashAlgorithm": "CRC",
            "numReplicas": 1,
            "serverList": server_list,
            "vBucketMap": map,
        }
    });
    let document = TopologyDocument::from_json(json.to_string().as_bytes(), None).unwrap();
    Topology::from_document(document).unwrap()
}

fn benchmark_key_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_hash");
    group.throughput(Throughput::Elements(1));

    for key_len in [8, 64, 250] {
        let key = "k".repeat(key_len);
        group.bench_with_input(BenchmarkId::new("key_len", key_len), &key, |b, key| {
            b.iter(|| black_box(Crc32Hasher.partition(black_box(key.as_bytes()))))
        });
    }

    group.finish();
}

fn benchmark_locate_primary(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate_primary");
    group.throughput(Throughput::Elements(1));

    for servers in [1, 4, 16] {
        let topology = topology(1024, servers);
        let keys: Vec<String> = (0..1000).map(|i| format!("user::{i}")).collect();

        group.bench_with_input(BenchmarkId::new("servers", servers), &keys, |b, keys| {
            let map = topology.map().unwrap();
            let resolver = topology.resolver().unwrap();
            let mut i = 0usize;
            b.iter(|| {
                let key = &keys[i % keys.len()];
                i += 1;
                let entry = map.map_key(key.as_bytes());
                black_box(resolver.locate_primary(entry))
            })
        });
    }

    group.finish();
}

fn benchmark_topology_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("topology_build");

    for partitions in [64, 1024] {
        group.bench_with_input(
            BenchmarkId::new("partitions", partitions),
            &partitions,
            |b, &partitions| b.iter(|| black_box(topology(partitions, 4))),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_key_hash,
    benchmark_locate_primary,
    benchmark_topology_build
);
criterion_main!(benches);
