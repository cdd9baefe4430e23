//! Micro benchmarks for the binding index B-tree and the lookups built on it.
#![forbid(unsafe_code)]
#![allow(missing_docs)]

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use pdom::pdom::linkage::Linkage;
use pdom::pdom::symbol::{Symbol, SymbolKind};
use pdom::query::find_binding::find_binding;
use pdom::query::BindingCollector;
use pdom::types::{LinkageId, RecPtr};
use pdom::{Pdom, PdomOptions};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const INSERT_COUNT: u64 = 8_192;
const LOOKUP_SAMPLES: usize = 2_048;
const PREFIXES: usize = 64;

fn symbol_name(i: u64) -> String {
    format!("sym_{i:06}")
}

fn micro_btree(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/btree");
    group.sample_size(20);

    let sequential: Vec<String> = (0..INSERT_COUNT).map(symbol_name).collect();
    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("sequential_insert", |b| {
        b.iter_batched(
            FreshIndex::new,
            |index| {
                index.insert(&sequential);
                black_box(index.pdom.db().chunk_count());
            },
            BatchSize::SmallInput,
        );
    });

    let mut shuffled = sequential.clone();
    shuffled.shuffle(&mut ChaCha8Rng::seed_from_u64(0xBEEF_F00D));
    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("random_insert", |b| {
        b.iter_batched(
            FreshIndex::new,
            |index| {
                index.insert(&shuffled);
                black_box(index.pdom.db().chunk_count());
            },
            BatchSize::SmallInput,
        );
    });

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("delete_random", |b| {
        b.iter_batched(
            || {
                let index = FreshIndex::new();
                index.insert(&sequential);
                index
            },
            |index| index.delete(&shuffled),
            BatchSize::SmallInput,
        );
    });

    let mut loaded = LoadedIndex::new(INSERT_COUNT, PdomOptions::default().binding_cache_capacity(0));
    group.throughput(Throughput::Elements(LOOKUP_SAMPLES as u64));
    group.bench_function(BenchmarkId::new("exact_lookup", LOOKUP_SAMPLES), |b| {
        b.iter(|| loaded.exact_lookup(LOOKUP_SAMPLES));
    });

    group.throughput(Throughput::Elements(PREFIXES as u64));
    group.bench_function(BenchmarkId::new("prefix_scan", PREFIXES), |b| {
        b.iter(|| loaded.prefix_scan(PREFIXES));
    });

    let mut cached = LoadedIndex::new(INSERT_COUNT, PdomOptions::default());
    group.throughput(Throughput::Elements(LOOKUP_SAMPLES as u64));
    group.bench_function(BenchmarkId::new("cached_lookup", LOOKUP_SAMPLES), |b| {
        b.iter(|| cached.cached_lookup(LOOKUP_SAMPLES));
    });

    group.finish();
}

struct FreshIndex {
    pdom: Pdom,
    linkage: Linkage,
}

impl FreshIndex {
    fn new() -> Self {
        Self::with_options(PdomOptions::default())
    }

    fn with_options(options: PdomOptions) -> Self {
        let pdom = Pdom::in_memory(options).expect("index");
        let linkage = pdom.create_linkage(LinkageId::C).expect("linkage");
        Self { pdom, linkage }
    }

    fn insert(&self, names: &[String]) {
        for name in names {
            let symbol = Symbol::new(SymbolKind::Variable, name.as_str());
            self.linkage.add_binding(&self.pdom, &symbol).expect("insert");
        }
    }

    fn delete(&self, names: &[String]) {
        for name in names {
            let binding = find_binding(&self.pdom, &self.linkage, name, &[], RecPtr::NULL)
                .expect("lookup")
                .expect("present");
            self.linkage.delete_binding(&self.pdom, &binding).expect("delete");
        }
    }
}

struct LoadedIndex {
    index: FreshIndex,
    max_key: u64,
    rng: ChaCha8Rng,
}

impl LoadedIndex {
    fn new(count: u64, options: PdomOptions) -> Self {
        let index = FreshIndex::with_options(options);
        let names: Vec<String> = (0..count).map(symbol_name).collect();
        index.insert(&names);
        Self {
            index,
            max_key: count,
            rng: ChaCha8Rng::seed_from_u64(0xFEED_FACE),
        }
    }

    fn exact_lookup(&mut self, samples: usize) {
        for _ in 0..samples {
            let name = symbol_name(self.rng.gen_range(0..self.max_key));
            black_box(
                find_binding(&self.index.pdom, &self.index.linkage, &name, &[], RecPtr::NULL)
                    .expect("lookup"),
            );
        }
    }

    fn prefix_scan(&mut self, prefixes: usize) {
        for _ in 0..prefixes {
            let stem = symbol_name(self.rng.gen_range(0..self.max_key));
            let mut collector = BindingCollector::prefix(&stem[..stem.len() - 2]);
            collector
                .search(&self.index.pdom, &self.index.linkage)
                .expect("search");
            black_box(collector.records().len());
        }
    }

    fn cached_lookup(&mut self, samples: usize) {
        for _ in 0..samples {
            let name = symbol_name(self.rng.gen_range(0..256));
            black_box(
                self.index
                    .linkage
                    .get_bindings_via_cache(&self.index.pdom, name.as_bytes(), true)
                    .expect("lookup"),
            );
        }
    }
}

criterion_group!(benches, micro_btree);
criterion_main!(benches);
