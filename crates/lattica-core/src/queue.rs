//! Node Work Queue
//!
//! A per-document ordered work list deferring and batching node
//! reprocessing. Entries are keyed by (level, node id); disjunction nodes
//! carry the sentinel level and therefore drain ahead of anything that
//! depends on them. Processing is strictly single-threaded and cooperative:
//! a node is dequeued, unmarked, and fully reprocessed before the next
//! dequeue.

use std::collections::BTreeSet;

use crate::ids::NodeId;

/// Ordered, deduplicating work list of lattice nodes.
#[derive(Debug, Default)]
pub struct NodeQueue {
	entries: BTreeSet<(i32, NodeId)>,
}

impl NodeQueue {
	/// Empty queue.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Enqueue a node at its level. Idempotent: re-enqueueing a queued node
	/// is a no-op. Returns whether the node was newly queued.
	pub fn enqueue(&mut self, level: i32, node: NodeId) -> bool {
		self.entries.insert((level, node))
	}

	/// Dequeue the lowest-level node and mark it not-queued.
	pub fn dequeue(&mut self) -> Option<NodeId> {
		self.entries.pop_first().map(|(_, node)| node)
	}

	/// Whether nothing is queued.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Queued entry count.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}
}
