//! Benchmarks for activation linking
//!
//! Tests linking performance with:
//! - Range-index selection against growing activation sets
//! - End-to-end document processing: evidence entry, linking, propagation

#![allow(clippy::expect_used)] // Fine in benchmarks

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lattica_core::{
	ActivationId, ConceptSpec, Document, EngineConfig, Interval, IntervalRelation, MemoryStore,
	Network, NodeArena, OutputMapping, RangeIndex, RelationConstraint, RelationSet, Side,
	SynapseSpec,
};
use rand::Rng;

/// Generate random intervals over a document of `length` characters.
fn generate_intervals(count: u32, length: u32) -> Vec<Interval> {
	let mut rng = rand::thread_rng();
	(0..count)
		.map(|_| {
			let begin = rng.gen_range(0..length);
			Interval::new(begin, begin + rng.gen_range(1..16u32))
		})
		.collect()
}

fn bench_range_index_select(c: &mut Criterion) {
	let mut group = c.benchmark_group("range_index_select");

	for count in &[100u32, 1000, 10_000] {
		let intervals = generate_intervals(*count, 10_000);
		let mut index = RangeIndex::new();
		for (i, interval) in intervals.iter().enumerate() {
			index.insert(
				ActivationId(u32::try_from(i).expect("activation count fits u32")),
				*interval,
			);
		}
		let probe = Interval::new(5000, 5010);

		let _ = group.throughput(Throughput::Elements(u64::from(*count)));
		let _ = group.bench_with_input(
			BenchmarkId::new("begin_equals", count),
			count,
			|bench, _| {
				bench.iter(|| {
					index.select(
						black_box(RelationConstraint::Interval(IntervalRelation::BeginEquals)),
						black_box(probe),
						Side::PartnerFirst,
					)
				});
			},
		);
		let _ = group.bench_with_input(BenchmarkId::new("overlaps", count), count, |bench, _| {
			bench.iter(|| {
				index.select(
					black_box(RelationConstraint::Interval(IntervalRelation::Overlaps)),
					black_box(probe),
					Side::PartnerFirst,
				)
			});
		});
	}

	group.finish();
}

fn bench_document_processing(c: &mut Criterion) {
	let mut group = c.benchmark_group("document_processing");

	for count in &[50u32, 200, 500] {
		let arena = NodeArena::new(Arc::new(MemoryStore::new()));
		let mut network = Network::new();
		let atom = network.declare_atom(&arena);
		let (_, concept) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
		let relations = RelationSet::new(&[
			RelationConstraint::Interval(IntervalRelation::BeginEquals),
			RelationConstraint::Interval(IntervalRelation::EndEquals),
		])
		.expect("non-empty relation set");
		let _ = network
			.add_synapse(
				&arena,
				SynapseSpec {
					from: atom,
					to: concept,
					relations,
					negative: false,
					recurrent: false,
					mapping: OutputMapping::identity(),
				},
			)
			.expect("synapse endpoints resolve");
		let intervals = generate_intervals(*count, 2000);

		let _ = group.throughput(Throughput::Elements(u64::from(*count)));
		let _ = group.bench_with_input(BenchmarkId::new("evidence", count), count, |bench, _| {
			bench.iter(|| {
				let mut doc = Document::new(&arena, &network, EngineConfig::default());
				for interval in &intervals {
					let _ = doc
						.add_input_activation(atom, *interval, 1.0)
						.expect("atom resolves");
				}
				doc.process().expect("propagation succeeds");
				black_box(doc.activations().len())
			});
		});
	}

	group.finish();
}

criterion_group!(benches, bench_range_index_select, bench_document_processing);

criterion_main!(benches);
