//! Per-Document Processing
//!
//! A document owns its activations, per-node thread states, the work queue,
//! the conflict index, and the candidate list. Atomic evidence enters
//! through [`Document::add_input_activation`]; [`Document::process`] drains
//! the queue and propagates activations up the lattice and into concept
//! outputs; [`Document::search`] resolves conflicts into the final
//! interpretation.
//!
//! One document is processed on one logical thread. Multiple documents may
//! run concurrently against the same shared lattice; only node structure
//! (under the per-node locks) is shared, never activations or candidates.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;
use tracing::debug;

use crate::activation::NodeActivation;
use crate::arena::NodeArena;
use crate::config::EngineConfig;
use crate::conflicts::{derive_conflicts, ConflictIndex};
use crate::error::{LatticeError, Result};
use crate::ids::{ActivationId, NodeId, SynapseId};
use crate::interval::Interval;
use crate::model::Network;
use crate::node::{NodeKind, RefValue, Refinement};
use crate::queue::NodeQueue;
use crate::search::{run_search, Candidate, Decision, Weight};
use crate::selector::RangeIndex;

/// Per-node, per-document activation state.
#[derive(Debug, Default)]
pub struct ThreadState {
	/// Activations awaiting propagation
	pub pending: Vec<ActivationId>,
	/// All live activations of the node in this document
	pub active: Vec<ActivationId>,
	/// Range index over the active activations
	pub index: RangeIndex,
}

/// The document's final, conflict-free interpretation.
#[derive(Clone, Debug)]
pub struct Interpretation {
	/// Selected activations (everything not excluded by the search)
	pub selected: Vec<ActivationId>,
	/// Accumulated weight of the winning search path
	pub weight: Weight,
	/// Search nodes created while resolving conflicts
	pub steps: usize,
}

/// One document being processed against the shared lattice.
pub struct Document<'a> {
	pub(crate) arena: &'a NodeArena,
	pub(crate) network: &'a Network,
	pub(crate) config: EngineConfig,
	pub(crate) activations: Vec<NodeActivation>,
	pub(crate) states: HashMap<NodeId, ThreadState>,
	pub(crate) queue: NodeQueue,
	pub(crate) conflicts: ConflictIndex,
	pub(crate) candidates: Vec<Candidate>,
	pub(crate) epoch: u64,
	pub(crate) generation: u64,
	next_seq: u32,
}

impl<'a> Document<'a> {
	/// New empty document against a shared lattice and network.
	#[must_use]
	pub fn new(arena: &'a NodeArena, network: &'a Network, config: EngineConfig) -> Self {
		Self {
			arena,
			network,
			config,
			activations: Vec::new(),
			states: HashMap::new(),
			queue: NodeQueue::new(),
			conflicts: ConflictIndex::new(),
			candidates: Vec::new(),
			epoch: 0,
			generation: 0,
			next_seq: 0,
		}
	}

	/// All activations created so far, in creation order. Read-only surface
	/// for the debugger collaborator.
	#[must_use]
	pub fn activations(&self) -> &[NodeActivation] {
		&self.activations
	}

	/// The activation with the given id.
	///
	/// # Errors
	///
	/// Returns [`LatticeError::UnknownActivation`] for ids this document
	/// never created.
	pub fn activation(&self, id: ActivationId) -> Result<&NodeActivation> {
		self.activations
			.get(id.index())
			.ok_or(LatticeError::UnknownActivation(id))
	}

	/// The document's conflict index.
	#[must_use]
	pub const fn conflicts(&self) -> &ConflictIndex {
		&self.conflicts
	}

	/// Final decision per conflict-prone activation. Read-only surface for
	/// the training collaborator.
	pub fn decisions(&self) -> impl Iterator<Item = (ActivationId, Decision)> + '_ {
		self.candidates.iter().map(|c| (c.activation, c.decision))
	}

	/// Per-activation weight contribution on the winning path, consumed by
	/// external learning.
	pub fn contributions(&self) -> impl Iterator<Item = (ActivationId, Weight)> + '_ {
		self.candidates.iter().map(|c| {
			let weight = match c.decision {
				Decision::Selected => Weight { w: c.weight, n: 1.0 },
				Decision::Excluded => Weight { w: 0.0, n: 1.0 },
				Decision::Unknown => Weight::NONE,
			};
			(c.activation, weight)
		})
	}

	/// Force a candidate decision from an external collaborator.
	pub fn force_decision(&mut self, activation: ActivationId, decision: Decision) {
		if let Some(candidate) = self
			.candidates
			.iter_mut()
			.find(|c| c.activation == activation)
		{
			candidate.forced = Some(decision);
		}
	}

	/// Enter one atomic evidence activation and link it into the network.
	///
	/// # Errors
	///
	/// Propagates node-resolution failures from the shared lattice.
	pub fn add_input_activation(
		&mut self,
		node: NodeId,
		interval: Interval,
		weight: f64,
	) -> Result<ActivationId> {
		let id = self.create_activation(node, interval, SmallVec::new(), weight)?;
		self.link_and_derive(id)?;
		Ok(id)
	}

	/// Drain the work queue, propagating every pending activation. Nodes
	/// are dequeued lowest level first, disjunctions ahead of everything.
	///
	/// # Errors
	///
	/// Propagates node-resolution failures from the shared lattice.
	pub fn process(&mut self) -> Result<()> {
		self.epoch += 1;
		while let Some(node) = self.queue.dequeue() {
			self.propagate_node(node)?;
		}
		Ok(())
	}

	/// Resolve all conflicts and return the document's interpretation.
	///
	/// On step exhaustion the error carries the dumped decision path and no
	/// partial selection is published.
	///
	/// # Errors
	///
	/// Returns [`LatticeError::StepLimitExceeded`] when the search exceeds
	/// its budget.
	pub fn search(&mut self) -> Result<Interpretation> {
		self.build_candidates();
		let outcome = run_search(&mut self.candidates, &self.conflicts, &self.config)?;
		let excluded: HashSet<ActivationId> = self
			.candidates
			.iter()
			.filter(|c| c.decision == Decision::Excluded)
			.map(|c| c.activation)
			.collect();
		let selected = self
			.activations
			.iter()
			.map(|a| a.id)
			.filter(|id| !excluded.contains(id))
			.collect();
		Ok(Interpretation {
			selected,
			weight: outcome.weight,
			steps: outcome.steps,
		})
	}

	/// Clear a candidate's cached decision and propagate the invalidation
	/// forward along non-negative output links and to all recorded
	/// conflicting activations. Runs automatically whenever new links or
	/// conflicts touch an activation; public so external collaborators can
	/// invalidate after mutating weights or overrides.
	pub fn invalidate_decision(&mut self, activation: ActivationId) {
		let mut stack = vec![activation];
		let mut seen: HashSet<ActivationId> = HashSet::new();
		while let Some(id) = stack.pop() {
			if !seen.insert(id) {
				continue;
			}
			self.clear_cached(id);
			for partner in self.conflicts.conflicts_of(id) {
				if let Some(candidate) = self
					.candidates
					.iter_mut()
					.find(|c| c.activation == partner)
				{
					candidate.cached_decision = Decision::Unknown;
				}
			}
			if let Some(act) = self.activations.get(id.index()) {
				for link in &act.output_links {
					if !self.network.synapse(link.synapse).negative {
						stack.push(link.to);
					}
				}
			}
		}
	}

	fn clear_cached(&mut self, activation: ActivationId) {
		if let Some(candidate) = self
			.candidates
			.iter_mut()
			.find(|c| c.activation == activation)
		{
			candidate.cached_decision = Decision::Unknown;
		}
	}

	fn build_candidates(&mut self) {
		let wrapped: HashSet<ActivationId> =
			self.candidates.iter().map(|c| c.activation).collect();
		for id in self.conflicts.conflicting_activations() {
			if wrapped.contains(&id) {
				continue;
			}
			let activation = &self.activations[id.index()];
			let concept = self.network.concept_of(activation.node);
			self.candidates.push(Candidate::new(activation, concept));
		}
		self.candidates.sort_by(|a, b| a.key.cmp(&b.key));
	}

	pub(crate) fn create_activation(
		&mut self,
		node: NodeId,
		interval: Interval,
		positions: SmallVec<[ActivationId; 4]>,
		weight: f64,
	) -> Result<ActivationId> {
		let id = ActivationId(u32::try_from(self.activations.len()).unwrap_or(u32::MAX));
		let seq = self.next_seq;
		self.next_seq += 1;
		let mut activation = NodeActivation::new(id, node, interval, weight, seq);
		activation.positions = positions;
		self.activations.push(activation);

		let state = self.states.entry(node).or_default();
		state.index.insert(id, interval);
		state.active.push(id);
		state.pending.push(id);

		let level = self.arena.get(node)?.read().level;
		let _ = self.queue.enqueue(level, node);
		debug!(?node, ?id, ?interval, "activation created");
		Ok(id)
	}

	/// Link a fresh activation and derive conflicts for it and every
	/// partner the linking touched. New links and conflicts make any
	/// previously cached decisions on the touched activations stale.
	pub(crate) fn link_and_derive(&mut self, id: ActivationId) -> Result<()> {
		let touched = self.link_activation(id)?;
		derive_conflicts(&mut self.conflicts, &self.activations, self.network, id);
		for &partner in &touched {
			derive_conflicts(&mut self.conflicts, &self.activations, self.network, partner);
		}
		self.invalidate_decision(id);
		for partner in touched {
			self.invalidate_decision(partner);
		}
		Ok(())
	}

	fn propagate_node(&mut self, node_id: NodeId) -> Result<()> {
		let handle = self.arena.get(node_id)?;
		let (kind, children, memberships) = {
			let node = handle.read();
			let children: Vec<(Refinement, RefValue)> = node
				.children()
				.iter()
				.map(|(r, v)| (r.clone(), v.clone()))
				.collect();
			let memberships: Vec<NodeId> = node.memberships().iter().copied().collect();
			(node.kind, children, memberships)
		};
		let pending = self
			.states
			.get_mut(&node_id)
			.map(|s| std::mem::take(&mut s.pending))
			.unwrap_or_default();

		for id in pending {
			if self.activations[id.index()].epoch == self.epoch {
				continue;
			}
			self.activations[id.index()].epoch = self.epoch;
			// Disjunction activations have no refinements to combine, but
			// they still feed downstream disjunction memberships.
			if !matches!(kind, NodeKind::Disjunction { .. }) {
				for (refinement, value) in &children {
					self.combine(id, refinement, value)?;
				}
			}
			for &disjunction in &memberships {
				let synapses: Vec<SynapseId> = self
					.network
					.inputs_of(disjunction)
					.iter()
					.copied()
					.filter(|&s| self.network.synapse(s).from == node_id)
					.collect();
				for synapse in synapses {
					let _ = self.add_disjunction_input(disjunction, id, synapse)?;
				}
			}
		}
		Ok(())
	}

	/// Combine one activation with sibling activations matching a child
	/// refinement, producing activations of the child conjunction.
	fn combine(&mut self, id: ActivationId, refinement: &Refinement, value: &RefValue) -> Result<()> {
		let partner_node = refinement.atom();
		let partners: Vec<ActivationId> = self
			.states
			.get(&partner_node)
			.map(|s| s.active.clone())
			.unwrap_or_default();
		let self_interval = self.activations[id.index()].interval;

		for partner in partners {
			if partner == id {
				continue;
			}
			let partner_interval = self.activations[partner.index()].interval;
			// The refinement's relations hold between the added atom and
			// each existing parent position.
			let satisfied = refinement.relations().iter().all(|&(position, relation)| {
				let (atom_interval, parent) = if value.atom_side {
					(self_interval, partner)
				} else {
					(partner_interval, id)
				};
				self.position_interval(parent, position)
					.is_some_and(|position_interval| relation.holds(atom_interval, position_interval))
			});
			if !satisfied {
				continue;
			}
			let (parent_act, atom_act) = if value.atom_side {
				(partner, id)
			} else {
				(id, partner)
			};
			self.create_child_activation(value, parent_act, atom_act)?;
		}
		Ok(())
	}

	fn position_inputs(&self, id: ActivationId) -> SmallVec<[ActivationId; 4]> {
		let activation = &self.activations[id.index()];
		if activation.positions.is_empty() {
			SmallVec::from_slice(&[id])
		} else {
			activation.positions.clone()
		}
	}

	fn position_interval(&self, id: ActivationId, position: u8) -> Option<Interval> {
		let inputs = self.position_inputs(id);
		inputs
			.get(position as usize)
			.map(|input| self.activations[input.index()].interval)
	}

	fn create_child_activation(
		&mut self,
		value: &RefValue,
		parent_act: ActivationId,
		atom_act: ActivationId,
	) -> Result<()> {
		let parent_inputs = self.position_inputs(parent_act);
		if parent_inputs.len() != value.offsets.len() {
			return Ok(());
		}
		let atom_position = value.atom_position() as usize;
		let mut positions: SmallVec<[ActivationId; 4]> =
			SmallVec::from_elem(ActivationId(u32::MAX), value.reverse_offsets.len());
		for (i, &input) in parent_inputs.iter().enumerate() {
			positions[value.offsets[i] as usize] = input;
		}
		positions[atom_position] = atom_act;

		// Idempotent: the same decomposition yields the same child
		// activation no matter which constituent arrived last.
		let duplicate = self
			.states
			.get(&value.child)
			.is_some_and(|s| {
				s.active
					.iter()
					.any(|&a| self.activations[a.index()].positions == positions)
			});
		if duplicate {
			return Ok(());
		}

		let interval = self.activations[parent_act.index()]
			.interval
			.span(self.activations[atom_act.index()].interval);
		let id = self.create_activation(value.child, interval, positions, 0.0)?;
		self.link_and_derive(id)?;
		Ok(())
	}

	/// Feed one contributing activation into a disjunction, computing the
	/// concept-level output interval from the synapse's mapping rules. An
	/// interval with an unresolved bound suppresses output. An existing
	/// output activation over the exact interval is merged into rather than
	/// duplicated.
	pub(crate) fn add_disjunction_input(
		&mut self,
		disjunction: NodeId,
		input: ActivationId,
		synapse: SynapseId,
	) -> Result<Option<ActivationId>> {
		let spec = self.network.synapse(synapse);
		let input_interval = self.activations[input.index()].interval;
		let Some(interval) = spec.mapping.apply(input_interval) else {
			return Ok(None);
		};

		let existing = self.states.get(&disjunction).and_then(|s| {
			s.active
				.iter()
				.copied()
				.find(|&a| self.activations[a.index()].interval == interval)
		});

		let output = match existing {
			Some(output) => output,
			None => {
				let output =
					self.create_activation(disjunction, interval, SmallVec::new(), 0.0)?;
				self.link_and_derive(output)?;
				output
			}
		};

		if self.add_link(input, output, synapse) {
			derive_conflicts(&mut self.conflicts, &self.activations, self.network, output);
			self.invalidate_decision(output);
		}
		Ok(Some(output))
	}
}
