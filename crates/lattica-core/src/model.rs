//! External Model Contracts
//!
//! The engine does not own neurons, weights, or learning. It consumes a
//! declared network shape: concepts (genuine or inhibitory), the lattice
//! nodes backing them, and synapses carrying relational constraints,
//! negative/recurrent flags, and output interval-mapping rules.
//!
//! Persistence is likewise a collaborator: the [`NodeStore`] trait exchanges
//! opaque [`NodeSnapshot`] values so lattice nodes can be suspended and
//! reactivated without the algorithms here depending on any byte layout.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::arena::NodeArena;
use crate::error::{LatticeError, Result};
use crate::ids::{ConceptId, NodeId, SynapseId};
use crate::interval::{OutputMapping, RelationSet};
use crate::node::{LatticeNode, NodeKind, RefValue, Refinement};

/// A concept declared by the neuron model.
///
/// Inhibitory concepts are aggregators; they never appear as first-class
/// conflicting parties in the conflict index.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ConceptSpec {
	/// Whether the concept aggregates rather than asserts evidence
	pub inhibitory: bool,
}

/// A synapse declared by the neuron model.
#[derive(Clone, Debug)]
pub struct SynapseSpec {
	/// Input node
	pub from: NodeId,
	/// Output node
	pub to: NodeId,
	/// Relational constraints between input and output activation intervals
	pub relations: RelationSet,
	/// Negative (inhibiting) synapse
	pub negative: bool,
	/// Recurrent synapse (feedback edge)
	pub recurrent: bool,
	/// Output interval-mapping rules applied at disjunction nodes
	pub mapping: OutputMapping,
}

impl SynapseSpec {
	/// Whether this synapse expresses a negative-feedback relationship, the
	/// source of mutual exclusion between activations.
	#[must_use]
	pub const fn is_conflict_edge(&self) -> bool {
		self.negative && self.recurrent
	}
}

/// The declared network shape: concepts, their lattice nodes, and synapses.
#[derive(Default)]
pub struct Network {
	concepts: HashMap<ConceptId, ConceptSpec>,
	synapses: Vec<SynapseSpec>,
	by_input: HashMap<NodeId, Vec<SynapseId>>,
	by_output: HashMap<NodeId, Vec<SynapseId>>,
	node_concept: HashMap<NodeId, ConceptId>,
	next_concept: u32,
}

impl Network {
	/// Empty network.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Declare a concept and create its disjunction (output) node.
	pub fn declare_concept(&mut self, arena: &NodeArena, spec: ConceptSpec) -> (ConceptId, NodeId) {
		let concept = ConceptId(self.next_concept);
		self.next_concept += 1;
		let node = arena.alloc(|id| LatticeNode::disjunction(id, concept));
		let _ = self.concepts.insert(concept, spec);
		let _ = self.node_concept.insert(node, concept);
		(concept, node)
	}

	/// Declare an atom node wrapping one elementary input.
	pub fn declare_atom(&mut self, arena: &NodeArena) -> NodeId {
		arena.alloc(LatticeNode::atom)
	}

	/// Register a synapse. When the output node is a disjunction, the input
	/// node gains a disjunction membership and a reference.
	///
	/// # Errors
	///
	/// Returns [`LatticeError::UnknownNode`] when either endpoint does not
	/// resolve.
	pub fn add_synapse(&mut self, arena: &NodeArena, spec: SynapseSpec) -> Result<SynapseId> {
		let id = SynapseId(u32::try_from(self.synapses.len()).unwrap_or(u32::MAX));
		let to = arena.get(spec.to)?;
		let to_is_disjunction = matches!(to.read().kind, NodeKind::Disjunction { .. });
		if to_is_disjunction {
			let from = arena.get(spec.from)?;
			let mut from = from.write();
			from.add_membership(spec.to);
			from.acquire();
		}
		self.by_input.entry(spec.from).or_default().push(id);
		self.by_output.entry(spec.to).or_default().push(id);
		self.synapses.push(spec);
		Ok(id)
	}

	/// Synapse by id.
	#[must_use]
	pub fn synapse(&self, id: SynapseId) -> &SynapseSpec {
		&self.synapses[id.0 as usize]
	}

	/// Synapses whose input is `node`.
	#[must_use]
	pub fn outputs_of(&self, node: NodeId) -> &[SynapseId] {
		self.by_input.get(&node).map_or(&[], Vec::as_slice)
	}

	/// Synapses whose output is `node`.
	#[must_use]
	pub fn inputs_of(&self, node: NodeId) -> &[SynapseId] {
		self.by_output.get(&node).map_or(&[], Vec::as_slice)
	}

	/// The concept owning `node`, if it is a concept output node.
	#[must_use]
	pub fn concept_of(&self, node: NodeId) -> Option<ConceptId> {
		self.node_concept.get(&node).copied()
	}

	/// Whether `concept` was declared inhibitory.
	#[must_use]
	pub fn is_inhibitory(&self, concept: ConceptId) -> bool {
		self.concepts.get(&concept).is_some_and(|c| c.inhibitory)
	}

	/// Total number of registered synapses.
	#[must_use]
	pub fn synapse_count(&self) -> usize {
		self.synapses.len()
	}
}

/// Value-level snapshot of a lattice node for the persistence contract:
/// kind tag, level, children, reference count. No byte layout is implied.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSnapshot {
	/// Node kind tag
	pub kind: NodeKind,
	/// Conjunction size (sentinel level for disjunctions)
	pub level: i32,
	/// Constituent atoms in canonical order
	pub atoms: SmallVec<[NodeId; 4]>,
	/// Child map entries
	pub children: Vec<(Refinement, RefValue)>,
	/// Ancestors that contributed a refinement
	pub ancestors: SmallVec<[NodeId; 2]>,
	/// Disjunction memberships
	pub memberships: Vec<NodeId>,
	/// Reference count at suspension time
	pub ref_count: u32,
	/// Discovered flag at suspension time
	pub discovered: bool,
}

/// Persistence collaborator: write and read node snapshots by id.
///
/// Implementations may suspend and reactivate individual nodes transparently
/// to the algorithms above.
pub trait NodeStore: Send + Sync {
	/// Persist a snapshot for `id`.
	///
	/// # Errors
	///
	/// Returns [`LatticeError::Store`] on storage failure.
	fn write_node(&self, id: NodeId, snapshot: &NodeSnapshot) -> Result<()>;

	/// Load the snapshot for `id`, or `None` when the store has never seen it.
	///
	/// # Errors
	///
	/// Returns [`LatticeError::Store`] on storage failure.
	fn read_node(&self, id: NodeId) -> Result<Option<NodeSnapshot>>;
}

/// In-memory [`NodeStore`] used by tests and as a default backend.
#[derive(Default)]
pub struct MemoryStore {
	nodes: Mutex<HashMap<NodeId, NodeSnapshot>>,
}

impl MemoryStore {
	/// Empty store.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored snapshots.
	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.lock().len()
	}

	/// Whether the store holds no snapshots.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.nodes.lock().is_empty()
	}
}

impl NodeStore for MemoryStore {
	fn write_node(&self, id: NodeId, snapshot: &NodeSnapshot) -> Result<()> {
		let _ = self.nodes.lock().insert(id, snapshot.clone());
		Ok(())
	}

	fn read_node(&self, id: NodeId) -> Result<Option<NodeSnapshot>> {
		Ok(self.nodes.lock().get(&id).cloned())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::interval::{IntervalRelation, RelationConstraint};

	fn relation_set() -> RelationSet {
		RelationSet::new(&[RelationConstraint::Interval(IntervalRelation::BeginEquals)])
			.unwrap()
	}

	#[test]
	fn test_declare_concept_creates_disjunction() {
		let arena = NodeArena::new(std::sync::Arc::new(MemoryStore::new()));
		let mut network = Network::new();
		let (concept, node) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
		assert_eq!(network.concept_of(node), Some(concept));
		assert!(!network.is_inhibitory(concept));
	}

	#[test]
	fn test_add_synapse_registers_membership() {
		let arena = NodeArena::new(std::sync::Arc::new(MemoryStore::new()));
		let mut network = Network::new();
		let atom = network.declare_atom(&arena);
		let (_, disj) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
		let synapse = network
			.add_synapse(
				&arena,
				SynapseSpec {
					from: atom,
					to: disj,
					relations: relation_set(),
					negative: false,
					recurrent: false,
					mapping: OutputMapping::identity(),
				},
			)
			.unwrap();
		assert_eq!(network.outputs_of(atom), &[synapse]);
		assert_eq!(network.inputs_of(disj), &[synapse]);
		let node = arena.get(atom).unwrap();
		assert!(node.read().memberships().contains(&disj));
		assert_eq!(node.read().ref_count(), 1);
	}
}
