//! Benchmarks for the interpretation search
//!
//! Tests search performance with:
//! - Conflict chains of various lengths (sparse, linker-realistic)
//! - Small conflict cliques (the worst case for branching)
//! - Cache reuse across repeated searches

#![allow(clippy::expect_used)] // Fine in benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lattica_core::{
	run_search, ActivationId, Candidate, ConflictIndex, EngineConfig, Interval, NodeActivation,
	NodeId,
};
use rand::Rng;

/// Generate candidates over random intervals with random weights.
fn generate_candidates(count: u32) -> Vec<Candidate> {
	let mut rng = rand::thread_rng();
	let mut candidates: Vec<Candidate> = (0..count)
		.map(|i| {
			let begin = rng.gen_range(0..1000u32);
			let end = begin + rng.gen_range(1..20u32);
			let activation = NodeActivation::new(
				ActivationId(i),
				NodeId(0),
				Interval::new(begin, end),
				rng.gen_range(0.1..5.0),
				i,
			);
			Candidate::new(&activation, None)
		})
		.collect();
	candidates.sort_by(|a, b| a.key.cmp(&b.key));
	candidates
}

/// Conflicts between successive candidates only.
fn chain_conflicts(count: u32) -> ConflictIndex {
	let mut conflicts = ConflictIndex::new();
	for i in 1..count {
		conflicts.add(ActivationId(i - 1), ActivationId(i));
	}
	conflicts
}

/// Every candidate conflicts with every other one.
fn clique_conflicts(count: u32) -> ConflictIndex {
	let mut conflicts = ConflictIndex::new();
	for i in 0..count {
		for j in (i + 1)..count {
			conflicts.add(ActivationId(i), ActivationId(j));
		}
	}
	conflicts
}

fn bench_search_chain(c: &mut Criterion) {
	let mut group = c.benchmark_group("search_chain");
	let config = EngineConfig {
		cache_enabled: false,
		..EngineConfig::default()
	};

	for count in &[10u32, 50, 100, 200] {
		let candidates = generate_candidates(*count);
		let conflicts = chain_conflicts(*count);

		let _ = group.throughput(Throughput::Elements(u64::from(*count)));
		let _ = group.bench_with_input(BenchmarkId::new("candidates", count), count, |bench, _| {
			bench.iter(|| {
				let mut candidates = candidates.clone();
				run_search(black_box(&mut candidates), black_box(&conflicts), &config)
					.expect("chain search within budget")
			});
		});
	}

	group.finish();
}

fn bench_search_clique(c: &mut Criterion) {
	let mut group = c.benchmark_group("search_clique");
	let config = EngineConfig {
		cache_enabled: false,
		..EngineConfig::default()
	};

	for count in &[2u32, 4, 6, 8] {
		let candidates = generate_candidates(*count);
		let conflicts = clique_conflicts(*count);

		let _ = group.bench_with_input(BenchmarkId::new("clique", count), count, |bench, _| {
			bench.iter(|| {
				let mut candidates = candidates.clone();
				run_search(black_box(&mut candidates), black_box(&conflicts), &config)
					.expect("clique search within budget")
			});
		});
	}

	group.finish();
}

fn bench_search_cached(c: &mut Criterion) {
	let mut group = c.benchmark_group("search_cached");
	let config = EngineConfig::default();

	for count in &[50u32, 200] {
		let mut candidates = generate_candidates(*count);
		let conflicts = chain_conflicts(*count);
		// Warm the decision cache once; the measured runs reuse it.
		let _ = run_search(&mut candidates, &conflicts, &config).expect("warmup within budget");

		let _ = group.bench_with_input(BenchmarkId::new("candidates", count), count, |bench, _| {
			bench.iter(|| {
				run_search(black_box(&mut candidates), black_box(&conflicts), &config)
					.expect("cached search within budget")
			});
		});
	}

	group.finish();
}

criterion_group!(
	benches,
	bench_search_chain,
	bench_search_clique,
	bench_search_cached,
);

criterion_main!(benches);
