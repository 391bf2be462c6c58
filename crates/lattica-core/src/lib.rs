//! # Lattica Core
//!
//! Incremental pattern-lattice and interpretation-search engine: the core of
//! a neuro-symbolic text processor.
//!
//! ## Why a Pattern Lattice?
//!
//! Classifying text bottom-up produces ambiguity at every level: the same
//! characters support several words, the same words several phrases. Instead
//! of committing early, this engine keeps every reading alive as an
//! *activation* and defers the commitment to a global search:
//!
//! - **Atoms** wrap elementary evidence anchored to a document interval
//! - **Conjunctions** grow incrementally from co-occurring atoms, forming a
//!   lattice layered by pattern size
//! - **Disjunctions** aggregate lattice nodes into a concept's output
//! - **Conflicts** between mutually exclusive readings are resolved by a
//!   depth-first search maximizing the normalized evidence weight
//!
//! The lattice is shared across documents and grows as documents are
//! processed; per-document state (activations, links, conflicts, decisions)
//! stays private to one [`Document`].
//!
//! ## Collaborators
//!
//! The engine owns no neurons and no learning. A declared [`Network`] supplies
//! concepts, synapses, relational constraints, and interval mappings; a
//! [`NodeStore`] supplies persistence for suspended lattice nodes; weights on
//! atom activations come from the caller. Decisions and per-activation
//! contributions flow back out through read-only surfaces.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use lattica_core::{
//!     ConceptSpec, Document, EngineConfig, Interval, IntervalRelation, MemoryStore,
//!     Network, NodeArena, OutputMapping, RelationConstraint, RelationSet, SynapseSpec,
//! };
//!
//! let arena = NodeArena::new(Arc::new(MemoryStore::new()));
//! let mut network = Network::new();
//!
//! // One atom feeding one concept over the same interval.
//! let atom = network.declare_atom(&arena);
//! let (_, concept) = network.declare_concept(&arena, ConceptSpec { inhibitory: false });
//! let relations = RelationSet::new(&[
//!     RelationConstraint::Interval(IntervalRelation::BeginEquals),
//!     RelationConstraint::Interval(IntervalRelation::EndEquals),
//! ])
//! .unwrap();
//! network
//!     .add_synapse(
//!         &arena,
//!         SynapseSpec {
//!             from: atom,
//!             to: concept,
//!             relations,
//!             negative: false,
//!             recurrent: false,
//!             mapping: OutputMapping::identity(),
//!         },
//!     )
//!     .unwrap();
//!
//! // Process one document.
//! let mut doc = Document::new(&arena, &network, EngineConfig::default());
//! doc.add_input_activation(atom, Interval::new(0, 5), 1.0).unwrap();
//! doc.process().unwrap();
//!
//! let interpretation = doc.search().unwrap();
//! // No conflicts: every activation is part of the interpretation.
//! assert_eq!(interpretation.selected.len(), doc.activations().len());
//! ```
//!
//! ## Performance
//!
//! The engine is designed for incremental, single-pass document processing:
//!
//! - Pure Rust implementation
//! - Per-node read-write locks; multi-node locking in ascending id order
//! - Binary range scans over interval-sorted activation indexes
//! - Epoch and generation stamps instead of visited-set resets

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::needless_return)]

pub mod activation;
pub mod arena;
pub mod config;
pub mod conflicts;
pub mod document;
pub mod error;
pub mod ids;
pub mod interval;
pub mod linker;
pub mod model;
pub mod node;
pub mod queue;
pub mod search;
pub mod selector;

pub use activation::{Link, NodeActivation};
pub use arena::{NodeArena, NodeHandle};
pub use config::EngineConfig;
pub use conflicts::{ConflictEntry, ConflictIndex};
pub use document::{Document, Interpretation, ThreadState};
pub use error::{LatticeError, Result};
pub use ids::{ActivationId, ConceptId, NodeId, SynapseId};
pub use interval::{
	BoundKind, BoundRule, Interval, IntervalRelation, OutputMapping, RelationConstraint,
	RelationGroup, RelationSet,
};
pub use model::{ConceptSpec, MemoryStore, Network, NodeSnapshot, NodeStore, SynapseSpec};
pub use node::{
	cleanup, extend, remove, LatticeNode, NodeKind, RefValue, Refinement, DISJUNCTION_LEVEL,
	NO_POSITION,
};
pub use queue::NodeQueue;
pub use search::{run_search, Candidate, CandidateKey, Decision, SearchOutcome, Weight};
pub use selector::{RangeIndex, Side};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
