//! Stable Identifiers
//!
//! All cross-references between lattice nodes, activations, concepts, and
//! synapses are stored as ids rather than pointers. Nodes may be suspended
//! to the persistence store and reactivated later; an id stays valid across
//! that round trip.

use serde::{Deserialize, Serialize};

/// Identity of a lattice node, stable across suspend/reactivate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Identity of an activation within one document, monotonic by creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivationId(pub u32);

impl ActivationId {
	/// The activation's index into the document's activation table.
	#[must_use]
	pub const fn index(self) -> usize {
		self.0 as usize
	}
}

/// Identity of a concept in the external neuron model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConceptId(pub u32);

/// Identity of a synapse in the external neuron model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SynapseId(pub u32);
