//! Conflict Index
//!
//! Records symmetric mutual-exclusion relationships between activations,
//! derived by walking negative-recurrent links. For an activation, the
//! *primary* set holds activations it excludes and the *secondary* set holds
//! activations excluding it; adding `(A excludes B)` updates both A's
//! primary and B's secondary sets. Conflicts are irreflexive.

use std::collections::{BTreeSet, HashMap};

use crate::activation::NodeActivation;
use crate::ids::ActivationId;
use crate::model::Network;

/// Primary/secondary conflict sets for one activation.
#[derive(Clone, Debug, Default)]
pub struct ConflictEntry {
	/// Activations this one excludes
	pub primary: BTreeSet<ActivationId>,
	/// Activations excluding this one
	pub secondary: BTreeSet<ActivationId>,
}

/// Symmetric conflict relation over a document's activations.
#[derive(Debug, Default)]
pub struct ConflictIndex {
	entries: HashMap<ActivationId, ConflictEntry>,
}

impl ConflictIndex {
	/// Empty index.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Record `a` excludes `b`. Irreflexive: `a == b` is ignored.
	pub fn add(&mut self, a: ActivationId, b: ActivationId) {
		if a == b {
			return;
		}
		let _ = self.entries.entry(a).or_default().primary.insert(b);
		let _ = self.entries.entry(b).or_default().secondary.insert(a);
	}

	/// Conflict entry for an activation, if it has any conflicts.
	#[must_use]
	pub fn entry(&self, id: ActivationId) -> Option<&ConflictEntry> {
		self.entries.get(&id)
	}

	/// Whether the activation participates in any conflict.
	#[must_use]
	pub fn has_conflicts(&self, id: ActivationId) -> bool {
		self.entries
			.get(&id)
			.is_some_and(|e| !e.primary.is_empty() || !e.secondary.is_empty())
	}

	/// Both directions of the conflict relation for an activation.
	pub fn conflicts_of(&self, id: ActivationId) -> impl Iterator<Item = ActivationId> + '_ {
		self.entries
			.get(&id)
			.into_iter()
			.flat_map(|e| e.primary.iter().chain(e.secondary.iter()).copied())
	}

	/// All activations with at least one conflict, in id order.
	#[must_use]
	pub fn conflicting_activations(&self) -> Vec<ActivationId> {
		let mut ids: Vec<ActivationId> = self
			.entries
			.iter()
			.filter(|(_, e)| !e.primary.is_empty() || !e.secondary.is_empty())
			.map(|(&id, _)| id)
			.collect();
		ids.sort_unstable();
		ids
	}

	/// Number of activations with conflict entries.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Whether no conflicts are recorded.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Derive conflicts for a just-linked activation.
///
/// For every negative, recurrent link into `activation`, walk from the
/// output back toward the input: an input belonging to a genuine
/// (non-inhibitory) concept is recorded as a direct conflict; an input
/// belonging to an inhibitory concept is an aggregator, so the walk recurses
/// through *its* non-recurrent inputs instead.
pub fn derive_conflicts(
	index: &mut ConflictIndex,
	activations: &[NodeActivation],
	network: &Network,
	activation: ActivationId,
) {
	let links: Vec<_> = activations[activation.index()]
		.input_links
		.iter()
		.filter(|l| network.synapse(l.synapse).is_conflict_edge())
		.map(|l| l.from)
		.collect();
	for input in links {
		record_party(index, activations, network, activation, input, 0);
	}
}

fn record_party(
	index: &mut ConflictIndex,
	activations: &[NodeActivation],
	network: &Network,
	output: ActivationId,
	input: ActivationId,
	depth: usize,
) {
	// Inhibitory chains are shallow in practice; the bound only guards
	// against malformed cyclic declarations.
	if depth > 16 {
		return;
	}
	let input_activation = &activations[input.index()];
	let inhibitory = network
		.concept_of(input_activation.node)
		.is_some_and(|c| network.is_inhibitory(c));
	if inhibitory {
		let inner: Vec<_> = input_activation
			.input_links
			.iter()
			.filter(|l| !network.synapse(l.synapse).recurrent)
			.map(|l| l.from)
			.collect();
		for party in inner {
			record_party(index, activations, network, output, party, depth + 1);
		}
	} else {
		index.add(output, input);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_symmetry() {
		let mut index = ConflictIndex::new();
		index.add(ActivationId(1), ActivationId(2));

		let one = index.entry(ActivationId(1)).unwrap();
		let two = index.entry(ActivationId(2)).unwrap();
		assert!(one.primary.contains(&ActivationId(2)));
		assert!(two.secondary.contains(&ActivationId(1)));
	}

	#[test]
	fn test_irreflexive() {
		let mut index = ConflictIndex::new();
		index.add(ActivationId(3), ActivationId(3));
		assert!(index.is_empty());
	}

	#[test]
	fn test_conflicts_of_covers_both_directions() {
		let mut index = ConflictIndex::new();
		index.add(ActivationId(1), ActivationId(2));
		index.add(ActivationId(3), ActivationId(1));

		let mut conflicts: Vec<_> = index.conflicts_of(ActivationId(1)).collect();
		conflicts.sort_unstable();
		assert_eq!(conflicts, vec![ActivationId(2), ActivationId(3)]);
	}
}
