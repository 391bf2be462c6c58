//! Node Activations
//!
//! An activation is evidence that a lattice node holds over a specific
//! document interval. Activations carry the links that produced them, an
//! epoch stamp making reprocessing idempotent, and a generation stamp used
//! by the linker's reachability walks so visited state never needs
//! resetting.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::ids::{ActivationId, NodeId, SynapseId};
use crate::interval::Interval;

/// A directed link between two activations, created by the linker for one
/// synapse of the declared network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
	/// Input-side activation
	pub from: ActivationId,
	/// Output-side activation
	pub to: ActivationId,
	/// The synapse this link instantiates
	pub synapse: SynapseId,
}

/// Evidence that one lattice node holds over one document interval.
#[derive(Clone, Debug)]
pub struct NodeActivation {
	/// Monotonic identity within the document
	pub id: ActivationId,
	/// Owning lattice node
	pub node: NodeId,
	/// Document-relative interval
	pub interval: Interval,
	/// Per-position input activations that produced this activation;
	/// empty for atom activations
	pub positions: SmallVec<[ActivationId; 4]>,
	/// Incoming links (input side)
	pub input_links: Vec<Link>,
	/// Outgoing links (output side)
	pub output_links: Vec<Link>,
	/// Contribution weight: supplied by the neuron model for atom
	/// activations, aggregated from positive non-recurrent inputs for
	/// concept outputs
	pub weight: f64,
	/// Epoch stamp: an activation already rebuilt in the current epoch is
	/// not rebuilt again
	pub epoch: u64,
	/// Generation stamp for reachability walks
	pub visited: u64,
	/// Discovery sequence, part of the deterministic candidate order
	pub seq: u32,
}

impl NodeActivation {
	/// New activation with no links yet.
	#[must_use]
	pub fn new(id: ActivationId, node: NodeId, interval: Interval, weight: f64, seq: u32) -> Self {
		Self {
			id,
			node,
			interval,
			positions: SmallVec::new(),
			input_links: Vec::new(),
			output_links: Vec::new(),
			weight,
			epoch: 0,
			visited: 0,
			seq,
		}
	}

	/// Whether this activation already carries an input link for `synapse`
	/// from `from`.
	#[must_use]
	pub fn has_input_link(&self, from: ActivationId, synapse: SynapseId) -> bool {
		self.input_links
			.iter()
			.any(|l| l.from == from && l.synapse == synapse)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_has_input_link() {
		let mut activation = NodeActivation::new(
			ActivationId(1),
			NodeId(0),
			Interval::new(0, 5),
			1.0,
			0,
		);
		assert!(!activation.has_input_link(ActivationId(0), SynapseId(0)));
		activation.input_links.push(Link {
			from: ActivationId(0),
			to: ActivationId(1),
			synapse: SynapseId(0),
		});
		assert!(activation.has_input_link(ActivationId(0), SynapseId(0)));
		assert!(!activation.has_input_link(ActivationId(0), SynapseId(1)));
	}
}
