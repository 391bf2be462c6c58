//! Activation Linking
//!
//! Instantiates the declared synapses between concrete activations. When an
//! activation is created, the linker finds every partner activation whose
//! interval satisfies the synapse's relational constraints and adds the
//! corresponding links, in both directions: the new activation as the input
//! of its outgoing synapses and as the output of its incoming ones.
//!
//! Partner retrieval picks a scan strategy per synapse: small partner sets
//! are filtered linearly; larger ones drive the range index through the
//! synapse's cheapest equality constraint, falling back to the flat set when
//! the index result does not narrow the active set enough to pay for itself.
//! Structural constraints (ancestry) cannot be expressed over intervals and
//! are applied last, by generation-stamped walks over the input-link graph.

use std::collections::HashSet;

use tracing::trace;

use crate::activation::Link;
use crate::document::Document;
use crate::error::Result;
use crate::ids::{ActivationId, NodeId, SynapseId};
use crate::interval::{Interval, RelationConstraint};
use crate::model::SynapseSpec;
use crate::selector::Side;

impl Document<'_> {
	/// Link a new activation to every matching partner, in both synapse
	/// directions. Returns the partners that gained a link, so the caller
	/// can re-derive their conflicts.
	pub(crate) fn link_activation(&mut self, id: ActivationId) -> Result<Vec<ActivationId>> {
		let node = self.activations[id.index()].node;
		let interval = self.activations[id.index()].interval;
		let mut touched = Vec::new();

		// As input of its outgoing synapses.
		let outgoing: Vec<SynapseId> = self.network.outputs_of(node).to_vec();
		for synapse in outgoing {
			let spec = self.network.synapse(synapse).clone();
			let partners = self.select_partners(&spec, spec.to, id, interval, Side::ProbeFirst);
			for partner in partners {
				if self.add_link(id, partner, synapse) {
					touched.push(partner);
				}
			}
		}

		// As output of its incoming synapses.
		let incoming: Vec<SynapseId> = self.network.inputs_of(node).to_vec();
		for synapse in incoming {
			let spec = self.network.synapse(synapse).clone();
			let partners = self.select_partners(&spec, spec.from, id, interval, Side::PartnerFirst);
			for partner in partners {
				if self.add_link(partner, id, synapse) {
					touched.push(partner);
				}
			}
		}
		Ok(touched)
	}

	/// Add one link, deduplicating on (input, synapse). Positive
	/// non-recurrent links aggregate the input's weight into the output.
	/// Returns whether the link was new.
	pub(crate) fn add_link(
		&mut self,
		from: ActivationId,
		to: ActivationId,
		synapse: SynapseId,
	) -> bool {
		if from == to || self.activations[to.index()].has_input_link(from, synapse) {
			return false;
		}
		let link = Link { from, to, synapse };
		self.activations[from.index()].output_links.push(link);
		self.activations[to.index()].input_links.push(link);
		let spec = self.network.synapse(synapse);
		if !spec.negative && !spec.recurrent {
			let weight = self.activations[from.index()].weight;
			self.activations[to.index()].weight += weight;
		}
		trace!(?from, ?to, ?synapse, "link added");
		true
	}

	/// Partner activations on `partner_node` satisfying all of the synapse's
	/// constraints against the probe interval.
	pub(crate) fn select_partners(
		&mut self,
		spec: &SynapseSpec,
		partner_node: NodeId,
		probe_id: ActivationId,
		probe: Interval,
		side: Side,
	) -> Vec<ActivationId> {
		let candidates = {
			let Some(state) = self.states.get(&partner_node) else {
				return Vec::new();
			};
			let total = state.active.len();
			if total < self.config.relation_threshold {
				state.active.clone()
			} else if let Some(driver) = spec.relations.indexable() {
				let scanned = state.index.select(driver, probe, side);
				// Each index candidate costs a factor more than a flat
				// check; keep the index result only when it narrows enough.
				if scanned.len() * self.config.active_concept_cost > total {
					state.active.clone()
				} else {
					scanned
				}
			} else {
				state.active.clone()
			}
		};

		let mut verified: Vec<ActivationId> = Vec::new();
		for partner in candidates {
			if partner == probe_id {
				continue;
			}
			let partner_interval = self.activations[partner.index()].interval;
			let holds = spec
				.relations
				.constraints()
				.iter()
				.all(|&constraint| constraint_holds(constraint, probe, partner_interval, side));
			if holds {
				verified.push(partner);
			}
		}

		let post: Vec<RelationConstraint> = spec.relations.post_filters().collect();
		if post.is_empty() {
			return verified;
		}
		verified
			.into_iter()
			.filter(|&partner| {
				post.iter().all(|&constraint| match constraint {
					RelationConstraint::AncestorOf => match side {
						Side::ProbeFirst => self.is_input_ancestor(probe_id, partner),
						Side::PartnerFirst => self.is_input_ancestor(partner, probe_id),
					},
					RelationConstraint::CommonAncestor => {
						self.has_common_input_ancestor(probe_id, partner)
					}
					_ => true,
				})
			})
			.collect()
	}

	/// Stamp every activation reachable from `root` through non-recurrent
	/// input links with a fresh generation; visited state never needs
	/// resetting.
	fn stamp_input_ancestry(&mut self, root: ActivationId) -> u64 {
		self.generation += 1;
		let generation = self.generation;
		let mut stack = vec![root];
		while let Some(id) = stack.pop() {
			if self.activations[id.index()].visited == generation {
				continue;
			}
			self.activations[id.index()].visited = generation;
			let inputs: Vec<ActivationId> = self.activations[id.index()]
				.input_links
				.iter()
				.filter(|l| !self.network.synapse(l.synapse).recurrent)
				.map(|l| l.from)
				.collect();
			stack.extend(inputs);
		}
		generation
	}

	/// Whether `ancestor` is reachable from `descendant` through
	/// non-recurrent input links.
	fn is_input_ancestor(&mut self, ancestor: ActivationId, descendant: ActivationId) -> bool {
		if ancestor == descendant {
			return false;
		}
		let generation = self.stamp_input_ancestry(descendant);
		self.activations[ancestor.index()].visited == generation
	}

	/// Whether the two activations share a non-recurrent input ancestor.
	/// Either activation counts as its own ancestor here, so shared direct
	/// evidence qualifies.
	fn has_common_input_ancestor(&mut self, a: ActivationId, b: ActivationId) -> bool {
		let generation = self.stamp_input_ancestry(a);
		let mut stack = vec![b];
		let mut seen: HashSet<ActivationId> = HashSet::new();
		while let Some(id) = stack.pop() {
			if !seen.insert(id) {
				continue;
			}
			if self.activations[id.index()].visited == generation {
				return true;
			}
			for link in &self.activations[id.index()].input_links {
				if !self.network.synapse(link.synapse).recurrent {
					stack.push(link.from);
				}
			}
		}
		false
	}
}

fn constraint_holds(
	constraint: RelationConstraint,
	probe: Interval,
	partner: Interval,
	side: Side,
) -> bool {
	match constraint {
		RelationConstraint::Interval(relation) => match side {
			Side::PartnerFirst => relation.holds(partner, probe),
			Side::ProbeFirst => relation.holds(probe, partner),
		},
		RelationConstraint::AtDocumentStart => partner.begin == 0,
		// Structural constraints are applied after interval verification.
		RelationConstraint::AncestorOf | RelationConstraint::CommonAncestor => true,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::arena::NodeArena;
	use crate::config::EngineConfig;
	use crate::interval::{IntervalRelation, OutputMapping, RelationSet};
	use crate::model::{ConceptSpec, MemoryStore, Network};
	use std::sync::Arc;

	fn setup() -> (NodeArena, Network) {
		(
			NodeArena::new(Arc::new(MemoryStore::new())),
			Network::new(),
		)
	}

	fn relations(constraints: &[RelationConstraint]) -> RelationSet {
		RelationSet::new(constraints).unwrap()
	}

	fn same_interval() -> RelationSet {
		relations(&[
			RelationConstraint::Interval(IntervalRelation::BeginEquals),
			RelationConstraint::Interval(IntervalRelation::EndEquals),
		])
	}

	fn positive(from: NodeId, to: NodeId, relations: RelationSet) -> SynapseSpec {
		SynapseSpec {
			from,
			to,
			relations,
			negative: false,
			recurrent: false,
			mapping: OutputMapping::identity(),
		}
	}

	#[test]
	fn test_links_are_mirrored() {
		let (arena, mut network) = setup();
		let atom = network.declare_atom(&arena);
		let (_, concept) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
		let synapse = network
			.add_synapse(&arena, positive(atom, concept, same_interval()))
			.unwrap();

		let mut doc = Document::new(&arena, &network, EngineConfig::default());
		let input = doc
			.add_input_activation(atom, Interval::new(0, 4), 1.0)
			.unwrap();
		doc.process().unwrap();

		let output = doc
			.activations()
			.iter()
			.find(|a| a.node == concept)
			.map(|a| a.id)
			.unwrap();
		let input_act = doc.activation(input).unwrap();
		let output_act = doc.activation(output).unwrap();
		assert!(input_act
			.output_links
			.iter()
			.any(|l| l.to == output && l.synapse == synapse));
		assert!(output_act.has_input_link(input, synapse));
	}

	#[test]
	fn test_partner_selection_respects_side() {
		// "Before" constrains the input relative to the output: an input
		// ending after the output's begin must not link.
		let (arena, mut network) = setup();
		let atom = network.declare_atom(&arena);
		let (_, concept) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
		let before = relations(&[RelationConstraint::Interval(IntervalRelation::Before)]);
		let spec = SynapseSpec {
			from: atom,
			to: concept,
			relations: before,
			negative: false,
			recurrent: false,
			mapping: OutputMapping::none(),
		};

		let mut doc = Document::new(&arena, &network, EngineConfig::default());
		let early = doc
			.add_input_activation(atom, Interval::new(0, 3), 1.0)
			.unwrap();
		let late = doc
			.add_input_activation(atom, Interval::new(5, 9), 1.0)
			.unwrap();

		// Probe as output over [3, 6): only the early input is before it.
		let partners = doc.select_partners(
			&spec,
			atom,
			ActivationId(u32::MAX),
			Interval::new(3, 6),
			Side::PartnerFirst,
		);
		assert_eq!(partners, vec![early]);

		// Probe as input over [0, 3): it ends before the late partner
		// begins, so the reversed orientation selects the late one.
		let partners = doc.select_partners(
			&spec,
			atom,
			early,
			Interval::new(0, 3),
			Side::ProbeFirst,
		);
		assert_eq!(partners, vec![late]);
	}

	#[test]
	fn test_index_driven_scan_matches_linear() {
		// Above the relation threshold the equality driver takes over; the
		// result must match what a linear filter finds.
		let (arena, mut network) = setup();
		let atom = network.declare_atom(&arena);
		let (_, concept) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
		let spec = positive(atom, concept, relations(&[RelationConstraint::Interval(
			IntervalRelation::BeginEquals,
		)]));

		let config = EngineConfig {
			relation_threshold: 4,
			..EngineConfig::default()
		};
		let mut doc = Document::new(&arena, &network, config);
		let mut matching = Vec::new();
		for i in 0..12u32 {
			let begin = if i % 3 == 0 { 7 } else { i };
			let id = doc
				.add_input_activation(atom, Interval::new(begin, begin + 2), 1.0)
				.unwrap();
			if begin == 7 {
				matching.push(id);
			}
		}

		let mut partners = doc.select_partners(
			&spec,
			atom,
			ActivationId(u32::MAX),
			Interval::new(7, 20),
			Side::PartnerFirst,
		);
		partners.sort_unstable();
		matching.sort_unstable();
		assert_eq!(partners, matching);
	}

	#[test]
	fn test_scan_strategy_choice_is_transparent() {
		// The cost factor only picks between the index result and the flat
		// set; either way the selected partners are identical.
		let (arena, mut network) = setup();
		let atom = network.declare_atom(&arena);
		let (_, concept) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
		let spec = positive(atom, concept, relations(&[RelationConstraint::Interval(
			IntervalRelation::BeginEquals,
		)]));

		// Cost 0 always keeps the index result; a huge cost always falls
		// back to the flat set.
		let mut outcomes = Vec::new();
		for cost in [0, 1000] {
			let config = EngineConfig {
				relation_threshold: 2,
				active_concept_cost: cost,
				..EngineConfig::default()
			};
			let mut doc = Document::new(&arena, &network, config);
			for i in 0..8u32 {
				let begin = if i % 2 == 0 { 7 } else { 20 + i };
				let _ = doc
					.add_input_activation(atom, Interval::new(begin, begin + 2), 1.0)
					.unwrap();
			}
			let mut partners = doc.select_partners(
				&spec,
				atom,
				ActivationId(u32::MAX),
				Interval::new(7, 20),
				Side::PartnerFirst,
			);
			partners.sort_unstable();
			assert_eq!(partners.len(), 4);
			outcomes.push(partners);
		}
		assert_eq!(outcomes[0], outcomes[1]);
	}

	#[test]
	fn test_common_ancestor_post_filter() {
		// P and Q both derive from the same evidence atom; a P -> Q synapse
		// requiring a common ancestor links. R derives from unrelated
		// evidence and must not link into Q.
		let (arena, mut network) = setup();
		let shared = network.declare_atom(&arena);
		let unrelated = network.declare_atom(&arena);
		let (_, p) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
		let (_, q) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
		let (_, r) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });

		let _ = network
			.add_synapse(&arena, positive(shared, p, same_interval()))
			.unwrap();
		let _ = network
			.add_synapse(&arena, positive(shared, q, same_interval()))
			.unwrap();
		let _ = network
			.add_synapse(&arena, positive(unrelated, r, same_interval()))
			.unwrap();
		let guarded = relations(&[
			RelationConstraint::Interval(IntervalRelation::BeginEquals),
			RelationConstraint::Interval(IntervalRelation::EndEquals),
			RelationConstraint::CommonAncestor,
		]);
		let p_to_q = network
			.add_synapse(
				&arena,
				SynapseSpec {
					from: p,
					to: q,
					relations: guarded.clone(),
					negative: false,
					recurrent: false,
					mapping: OutputMapping::none(),
				},
			)
			.unwrap();
		let r_to_q = network
			.add_synapse(
				&arena,
				SynapseSpec {
					from: r,
					to: q,
					relations: guarded,
					negative: false,
					recurrent: false,
					mapping: OutputMapping::none(),
				},
			)
			.unwrap();

		let mut doc = Document::new(&arena, &network, EngineConfig::default());
		let _ = doc
			.add_input_activation(unrelated, Interval::new(0, 5), 1.0)
			.unwrap();
		let _ = doc
			.add_input_activation(shared, Interval::new(0, 5), 1.0)
			.unwrap();
		doc.process().unwrap();

		let act_of = |node: NodeId| {
			doc.activations()
				.iter()
				.find(|a| a.node == node)
				.map(|a| a.id)
				.unwrap()
		};
		let act_p = act_of(p);
		let act_q = act_of(q);
		let act_q = doc.activation(act_q).unwrap();
		assert!(act_q.has_input_link(act_p, p_to_q));
		assert!(!act_q.has_input_link(act_of(r), r_to_q));
	}

	#[test]
	fn test_duplicate_link_not_added() {
		let (arena, mut network) = setup();
		let atom = network.declare_atom(&arena);
		let (_, concept) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
		let _ = network
			.add_synapse(&arena, positive(atom, concept, same_interval()))
			.unwrap();

		let mut doc = Document::new(&arena, &network, EngineConfig::default());
		let _ = doc
			.add_input_activation(atom, Interval::new(0, 4), 1.5)
			.unwrap();
		doc.process().unwrap();
		// Reprocessing the same evidence must not duplicate links or weight.
		doc.process().unwrap();

		let output = doc
			.activations()
			.iter()
			.find(|a| a.node == concept)
			.unwrap();
		assert_eq!(output.input_links.len(), 1);
		assert!((output.weight - 1.5).abs() < 1e-12);
	}
}
