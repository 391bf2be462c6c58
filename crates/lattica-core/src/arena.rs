//! Node Arena
//!
//! Lattice nodes reference each other cyclically (children point back at the
//! ancestors that contributed a refinement, activations back-reference their
//! node). All of those references are stable integer ids resolved through
//! this arena; a separate resident table maps id to the in-memory node, and
//! an absent entry means "suspended". Reactivation goes through the
//! [`NodeStore`] persistence collaborator transparently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{LatticeError, Result};
use crate::ids::NodeId;
use crate::model::{NodeStore, NodeSnapshot};
use crate::node::LatticeNode;

/// Shared handle to one resident lattice node.
pub type NodeHandle = Arc<RwLock<LatticeNode>>;

/// Arena of lattice nodes addressed by stable [`NodeId`].
pub struct NodeArena {
	resident: RwLock<HashMap<NodeId, NodeHandle>>,
	store: Arc<dyn NodeStore>,
	next_id: AtomicU32,
}

impl NodeArena {
	/// Arena backed by the given persistence store.
	#[must_use]
	pub fn new(store: Arc<dyn NodeStore>) -> Self {
		Self {
			resident: RwLock::new(HashMap::new()),
			store,
			next_id: AtomicU32::new(0),
		}
	}

	/// Allocate a fresh node. The builder receives the assigned id.
	pub fn alloc(&self, build: impl FnOnce(NodeId) -> LatticeNode) -> NodeId {
		let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let node = build(id);
		let _ = self.resident.write().insert(id, Arc::new(RwLock::new(node)));
		id
	}

	/// Resolve a node handle, reactivating a suspended node through the
	/// store when necessary.
	///
	/// # Errors
	///
	/// Returns [`LatticeError::UnknownNode`] when the id is neither resident
	/// nor known to the store.
	pub fn get(&self, id: NodeId) -> Result<NodeHandle> {
		if let Some(handle) = self.resident.read().get(&id) {
			return Ok(Arc::clone(handle));
		}
		let snapshot = self
			.store
			.read_node(id)?
			.ok_or(LatticeError::UnknownNode(id))?;
		let mut resident = self.resident.write();
		// Lost the race: someone else reactivated it first.
		if let Some(handle) = resident.get(&id) {
			return Ok(Arc::clone(handle));
		}
		let handle = Arc::new(RwLock::new(LatticeNode::from_snapshot(id, snapshot)));
		let _ = resident.insert(id, Arc::clone(&handle));
		Ok(handle)
	}

	/// Write a node's snapshot to the store and drop it from the resident
	/// table. The id stays valid; the next [`Self::get`] reactivates it.
	///
	/// # Errors
	///
	/// Returns [`LatticeError::UnknownNode`] when the id does not resolve,
	/// or [`LatticeError::Store`] when the store rejects the write.
	pub fn suspend(&self, id: NodeId) -> Result<()> {
		let handle = self.get(id)?;
		{
			let mut node = handle.write();
			self.store.write_node(id, &node.to_snapshot())?;
			node.clear_modified();
		}
		let _ = self.resident.write().remove(&id);
		Ok(())
	}

	/// Drop a node from the resident table without persisting it. Used when
	/// a freshly allocated node loses a creation race or is removed.
	pub fn discard(&self, id: NodeId) {
		let _ = self.resident.write().remove(&id);
	}

	/// Number of resident (non-suspended) nodes.
	#[must_use]
	pub fn resident_count(&self) -> usize {
		self.resident.read().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::MemoryStore;

	#[test]
	fn test_alloc_and_get() {
		let arena = NodeArena::new(Arc::new(MemoryStore::new()));
		let id = arena.alloc(LatticeNode::atom);
		let handle = arena.get(id).unwrap();
		assert_eq!(handle.read().id, id);
		assert_eq!(arena.resident_count(), 1);
	}

	#[test]
	fn test_unknown_node() {
		let arena = NodeArena::new(Arc::new(MemoryStore::new()));
		assert!(matches!(
			arena.get(NodeId(42)),
			Err(LatticeError::UnknownNode(NodeId(42)))
		));
	}

	#[test]
	fn test_suspend_and_reactivate() {
		let arena = NodeArena::new(Arc::new(MemoryStore::new()));
		let id = arena.alloc(LatticeNode::atom);
		arena.get(id).unwrap().write().acquire();

		arena.suspend(id).unwrap();
		assert_eq!(arena.resident_count(), 0);

		// Reactivation restores state through the store.
		let handle = arena.get(id).unwrap();
		assert_eq!(handle.read().ref_count(), 1);
		assert_eq!(arena.resident_count(), 1);
	}
}
