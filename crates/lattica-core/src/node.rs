//! The Pattern Lattice
//!
//! Atoms, their conjunctions (refinements), and the disjunctions that
//! represent a concept's final output form an incrementally maintained
//! boolean lattice. Nodes form a DAG strictly layered by level; a node is
//! eligible for removal only when its reference count is zero and it is not
//! flagged discovered.
//!
//! Every node owns a read-write lock (held through [`NodeArena`] handles).
//! Operations that must lock more than one node always acquire the locks in
//! ascending id order, which makes deadlock impossible.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::arena::NodeArena;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::ids::{ConceptId, NodeId};
use crate::interval::{IntervalRelation, RelationConstraint};
use crate::model::NodeSnapshot;

/// Sentinel level ordering disjunction nodes ahead of everything that
/// depends on them in the work queue.
pub const DISJUNCTION_LEVEL: i32 = -1;

/// Sentinel position marking "comes from the refinement atom" in a
/// [`RefValue`]'s reverse offsets.
pub const NO_POSITION: u8 = u8::MAX;

/// Closed set of lattice node kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
	/// Leaf node wrapping one elementary input
	Atom,
	/// AND of an existing conjunction/atom plus one more atom
	Conjunction,
	/// OR aggregating conjunctions/atoms into one concept's output
	Disjunction {
		/// Owning concept
		concept: ConceptId,
	},
}

/// Ordered, comparable key describing how a child conjunction extends a
/// parent: the new atom plus a multiset of interval relations between the
/// new atom and each existing position.
///
/// Two refinements are equal iff their relation multisets and referenced
/// atom are equal; the total order supports binary range scans over the
/// child map.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Refinement {
	relations: SmallVec<[(u8, IntervalRelation); 4]>,
	atom: NodeId,
}

impl Refinement {
	/// Convert a constraint list into a refinement key.
	///
	/// Returns `None` when the list is empty or contains a constraint that
	/// cannot be represented positionally (structural post-filters).
	/// Callers treat `None` as "pattern growth stops here".
	#[must_use]
	pub fn try_new(constraints: &[(u8, RelationConstraint)], atom: NodeId) -> Option<Self> {
		if constraints.is_empty() {
			return None;
		}
		let mut relations: SmallVec<[(u8, IntervalRelation); 4]> = SmallVec::new();
		for &(position, constraint) in constraints {
			match constraint {
				RelationConstraint::Interval(relation) => relations.push((position, relation)),
				_ => return None,
			}
		}
		relations.sort_unstable();
		Some(Self { relations, atom })
	}

	/// The relation multiset, sorted by (position, relation).
	#[must_use]
	pub fn relations(&self) -> &[(u8, IntervalRelation)] {
		&self.relations
	}

	/// The added atom node.
	#[must_use]
	pub const fn atom(&self) -> NodeId {
		self.atom
	}

	/// The same relation multiset keyed against the parent, used to link the
	/// new child under the refinement's atom node as well.
	pub(crate) fn mirrored(&self, parent: NodeId) -> Self {
		Self {
			relations: self.relations.clone(),
			atom: parent,
		}
	}
}

/// Binds a refinement to its child node and records the positional
/// remapping so activations at the child can be decomposed back into
/// per-position input activations regardless of insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefValue {
	/// The child conjunction node
	pub child: NodeId,
	/// Parent position → child position
	pub offsets: SmallVec<[u8; 4]>,
	/// Child position → parent position, [`NO_POSITION`] for the slot
	/// filled by the refinement atom
	pub reverse_offsets: SmallVec<[u8; 4]>,
	/// Whether this entry lives on the refinement atom rather than the
	/// parent; offsets stay parent-relative on both sides
	pub atom_side: bool,
}

impl RefValue {
	/// The child position taken by the refinement atom.
	#[must_use]
	pub fn atom_position(&self) -> u8 {
		self.reverse_offsets
			.iter()
			.position(|&p| p == NO_POSITION)
			.map_or(NO_POSITION, |i| u8::try_from(i).unwrap_or(NO_POSITION))
	}
}

/// One node of the pattern lattice.
pub struct LatticeNode {
	/// Stable identity
	pub id: NodeId,
	/// Node kind tag
	pub kind: NodeKind,
	/// Conjunction size; [`DISJUNCTION_LEVEL`] for disjunctions
	pub level: i32,
	/// Constituent atoms in canonical (sorted) order; `[self]` for atoms
	pub atoms: SmallVec<[NodeId; 4]>,
	children: BTreeMap<Refinement, RefValue>,
	ancestors: SmallVec<[NodeId; 2]>,
	memberships: BTreeSet<NodeId>,
	ref_count: u32,
	discovered: bool,
	removed: bool,
	modified: bool,
}

impl LatticeNode {
	/// New atom node.
	#[must_use]
	pub fn atom(id: NodeId) -> Self {
		Self {
			id,
			kind: NodeKind::Atom,
			level: 1,
			atoms: SmallVec::from_slice(&[id]),
			children: BTreeMap::new(),
			ancestors: SmallVec::new(),
			memberships: BTreeSet::new(),
			ref_count: 0,
			discovered: true,
			removed: false,
			modified: true,
		}
	}

	/// New conjunction node at `level` over `atoms`.
	#[must_use]
	pub fn conjunction(
		id: NodeId,
		level: i32,
		atoms: SmallVec<[NodeId; 4]>,
		ancestors: SmallVec<[NodeId; 2]>,
	) -> Self {
		Self {
			id,
			kind: NodeKind::Conjunction,
			level,
			atoms,
			children: BTreeMap::new(),
			ancestors,
			memberships: BTreeSet::new(),
			ref_count: 0,
			discovered: true,
			removed: false,
			modified: true,
		}
	}

	/// New disjunction (concept output) node.
	#[must_use]
	pub fn disjunction(id: NodeId, concept: ConceptId) -> Self {
		Self {
			id,
			kind: NodeKind::Disjunction { concept },
			level: DISJUNCTION_LEVEL,
			atoms: SmallVec::new(),
			children: BTreeMap::new(),
			ancestors: SmallVec::new(),
			memberships: BTreeSet::new(),
			ref_count: 0,
			discovered: true,
			removed: false,
			modified: true,
		}
	}

	/// Rebuild a node from a persisted snapshot.
	#[must_use]
	pub fn from_snapshot(id: NodeId, snapshot: NodeSnapshot) -> Self {
		Self {
			id,
			kind: snapshot.kind,
			level: snapshot.level,
			atoms: snapshot.atoms,
			children: snapshot.children.into_iter().collect(),
			ancestors: snapshot.ancestors,
			memberships: snapshot.memberships.into_iter().collect(),
			ref_count: snapshot.ref_count,
			discovered: snapshot.discovered,
			removed: false,
			modified: false,
		}
	}

	/// Snapshot for the persistence contract.
	#[must_use]
	pub fn to_snapshot(&self) -> NodeSnapshot {
		NodeSnapshot {
			kind: self.kind,
			level: self.level,
			atoms: self.atoms.clone(),
			children: self
				.children
				.iter()
				.map(|(r, v)| (r.clone(), v.clone()))
				.collect(),
			ancestors: self.ancestors.clone(),
			memberships: self.memberships.iter().copied().collect(),
			ref_count: self.ref_count,
			discovered: self.discovered,
		}
	}

	/// Child map, ordered by refinement.
	#[must_use]
	pub const fn children(&self) -> &BTreeMap<Refinement, RefValue> {
		&self.children
	}

	/// Existing child for a refinement, if any.
	#[must_use]
	pub fn child(&self, refinement: &Refinement) -> Option<&RefValue> {
		self.children.get(refinement)
	}

	/// Disjunction memberships (parents).
	#[must_use]
	pub const fn memberships(&self) -> &BTreeSet<NodeId> {
		&self.memberships
	}

	/// Ancestors that contributed a refinement to this node.
	#[must_use]
	pub fn ancestors(&self) -> &[NodeId] {
		&self.ancestors
	}

	/// Current reference count.
	#[must_use]
	pub const fn ref_count(&self) -> u32 {
		self.ref_count
	}

	/// Whether the node has been removed from the lattice.
	#[must_use]
	pub const fn is_removed(&self) -> bool {
		self.removed
	}

	/// Whether the node is flagged discovered (protected from cleanup).
	#[must_use]
	pub const fn is_discovered(&self) -> bool {
		self.discovered
	}

	/// Set or clear the discovered flag. The training collaborator clears it
	/// once a pattern has been judged uninteresting.
	pub fn set_discovered(&mut self, discovered: bool) {
		self.discovered = discovered;
		self.modified = true;
	}

	/// Take a reference to this node.
	pub fn acquire(&mut self) {
		self.ref_count += 1;
		self.modified = true;
	}

	/// Drop `count` references.
	pub fn release(&mut self, count: u32) {
		self.ref_count = self.ref_count.saturating_sub(count);
		self.modified = true;
	}

	/// Whether the node changed since the last snapshot write.
	#[must_use]
	pub const fn is_modified(&self) -> bool {
		self.modified
	}

	pub(crate) fn clear_modified(&mut self) {
		self.modified = false;
	}

	pub(crate) fn add_child(&mut self, refinement: Refinement, value: RefValue) {
		let _ = self.children.insert(refinement, value);
		self.modified = true;
	}

	pub(crate) fn add_membership(&mut self, disjunction: NodeId) {
		let _ = self.memberships.insert(disjunction);
		self.modified = true;
	}

	/// Remove every child entry pointing at `child`; returns how many were
	/// removed.
	pub(crate) fn detach_child(&mut self, child: NodeId) -> u32 {
		let before = self.children.len();
		self.children.retain(|_, v| v.child != child);
		let removed = before - self.children.len();
		if removed > 0 {
			self.modified = true;
		}
		u32::try_from(removed).unwrap_or(u32::MAX)
	}

	pub(crate) fn mark_removed(&mut self) {
		self.removed = true;
		self.modified = true;
	}

	pub(crate) fn take_children(&mut self) -> BTreeMap<Refinement, RefValue> {
		self.modified = true;
		std::mem::take(&mut self.children)
	}

	pub(crate) fn take_memberships(&mut self) -> BTreeSet<NodeId> {
		self.modified = true;
		std::mem::take(&mut self.memberships)
	}
}

/// Return the existing child for `refinement`, or construct a new
/// conjunction node one level deeper.
///
/// Construction write-locks every ancestor gaining the new child (the parent
/// and the refinement's atom node) in ascending id order, links the child
/// under each, and marks each ancestor modified.
///
/// Returns `Ok(None)` when the parent is removed or the conjunction size cap
/// is reached; growth stops on that path.
///
/// # Errors
///
/// Returns [`crate::error::LatticeError::UnknownNode`] when a referenced
/// node does not resolve.
pub fn extend(
	arena: &NodeArena,
	config: &EngineConfig,
	parent_id: NodeId,
	refinement: &Refinement,
) -> Result<Option<NodeId>> {
	let parent_handle = arena.get(parent_id)?;
	let (parent_level, parent_atoms) = {
		let parent = parent_handle.read();
		if parent.is_removed() {
			return Ok(None);
		}
		if let Some(value) = parent.child(refinement) {
			return Ok(Some(value.child));
		}
		(parent.level, parent.atoms.clone())
	};

	let child_level = parent_level + 1;
	if child_level > i32::try_from(config.max_conjunction_level).unwrap_or(i32::MAX) {
		return Ok(None);
	}

	// Canonical child positions: constituent atoms in sorted order.
	let atom_id = refinement.atom();
	let insert_at = parent_atoms.partition_point(|&a| a <= atom_id);
	let mut child_atoms = parent_atoms.clone();
	child_atoms.insert(insert_at, atom_id);

	let atom_position = u8::try_from(insert_at).unwrap_or(NO_POSITION);
	let offsets: SmallVec<[u8; 4]> = (0..parent_atoms.len())
		.map(|i| {
			let i = u8::try_from(i).unwrap_or(NO_POSITION);
			if i < atom_position {
				i
			} else {
				i + 1
			}
		})
		.collect();
	let reverse_offsets: SmallVec<[u8; 4]> = (0..child_atoms.len())
		.map(|i| {
			let i = u8::try_from(i).unwrap_or(NO_POSITION);
			if i == atom_position {
				NO_POSITION
			} else if i < atom_position {
				i
			} else {
				i - 1
			}
		})
		.collect();

	let mut ancestors: SmallVec<[NodeId; 2]> = SmallVec::from_slice(&[parent_id]);
	if atom_id != parent_id {
		ancestors.push(atom_id);
	}

	let child_id = arena.alloc(|id| {
		LatticeNode::conjunction(id, child_level, child_atoms, ancestors.clone())
	});

	// Lock all ancestors gaining the child in ascending id order.
	let mut lock_order: SmallVec<[NodeId; 2]> = ancestors.clone();
	lock_order.sort_unstable();
	let handles = lock_order
		.iter()
		.map(|&id| arena.get(id))
		.collect::<Result<Vec<_>>>()?;
	let mut guards: Vec<_> = handles.iter().map(|h| h.write()).collect();

	// Re-check under the write lock: a concurrent extension may have won.
	if let Some(existing) = guards
		.iter()
		.find(|g| g.id == parent_id)
		.and_then(|g| g.child(refinement))
		.map(|v| v.child)
	{
		drop(guards);
		arena.discard(child_id);
		return Ok(Some(existing));
	}

	for guard in &mut guards {
		let atom_side = guard.id != parent_id;
		let key = if atom_side {
			refinement.mirrored(parent_id)
		} else {
			refinement.clone()
		};
		guard.add_child(
			key,
			RefValue {
				child: child_id,
				offsets: offsets.clone(),
				reverse_offsets: reverse_offsets.clone(),
				atom_side,
			},
		);
		guard.acquire();
	}
	drop(guards);

	debug!(?parent_id, ?child_id, level = child_level, "extended lattice");
	Ok(Some(child_id))
}

/// Remove a node and, recursively, all of its child conjunctions and
/// disjunction memberships. Idempotent: a node already removed is skipped.
///
/// # Errors
///
/// Returns [`crate::error::LatticeError::UnknownNode`] when a referenced
/// node does not resolve.
pub fn remove(arena: &NodeArena, id: NodeId) -> Result<()> {
	let mut stack = vec![id];
	while let Some(node_id) = stack.pop() {
		let handle = arena.get(node_id)?;
		let (children, ancestors) = {
			let mut node = handle.write();
			if node.is_removed() {
				continue;
			}
			node.mark_removed();
			let children: Vec<NodeId> =
				node.take_children().values().map(|v| v.child).collect();
			let _ = node.take_memberships();
			(children, node.ancestors.clone())
		};
		for ancestor_id in ancestors {
			let ancestor = arena.get(ancestor_id)?;
			let mut ancestor = ancestor.write();
			let detached = ancestor.detach_child(node_id);
			ancestor.release(detached);
		}
		stack.extend(children);
	}
	Ok(())
}

/// Try to remove a conjunction whose reference count reached zero and which
/// is not flagged discovered, then retry every ancestor that contributed a
/// refinement to it.
///
/// # Errors
///
/// Returns [`crate::error::LatticeError::UnknownNode`] when a referenced
/// node does not resolve.
pub fn cleanup(arena: &NodeArena, id: NodeId) -> Result<()> {
	let mut stack = vec![id];
	while let Some(node_id) = stack.pop() {
		let handle = arena.get(node_id)?;
		let (eligible, ancestors) = {
			let node = handle.read();
			(
				matches!(node.kind, NodeKind::Conjunction)
					&& node.ref_count() == 0
					&& !node.is_discovered()
					&& !node.is_removed(),
				node.ancestors.clone(),
			)
		};
		if !eligible {
			continue;
		}
		remove(arena, node_id)?;
		stack.extend(ancestors);
	}
	Ok(())
}
