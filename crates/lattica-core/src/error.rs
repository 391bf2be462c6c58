//! Engine Errors
//!
//! The engine distinguishes fatal per-document failures (search step
//! exhaustion) from structural misuse caught at construction time. A
//! refinement that cannot be converted is *not* an error; callers receive
//! `None` and pattern growth simply stops there.

use thiserror::Error;

use crate::ids::{ActivationId, NodeId};

/// All errors produced by the lattice engine.
#[derive(Debug, Error)]
pub enum LatticeError {
	/// The interpretation search exceeded the configured step budget.
	/// Fatal for the document; no partial selection is published.
	#[error("search aborted after {steps} steps (limit {limit}); path: {path}")]
	StepLimitExceeded {
		/// Steps consumed before the abort
		steps: usize,
		/// Configured step budget
		limit: usize,
		/// Dump of the decision path at the point of the abort
		path: String,
	},

	/// A relational constraint set was empty at construction.
	#[error("relation set must contain at least one constraint")]
	EmptyRelationSet,

	/// A node id did not resolve, neither resident nor in the store.
	#[error("unknown lattice node {0:?}")]
	UnknownNode(NodeId),

	/// An activation id did not resolve within the current document.
	#[error("unknown activation {0:?}")]
	UnknownActivation(ActivationId),

	/// The persistence collaborator failed to read or write a node.
	#[error("node store: {0}")]
	Store(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LatticeError>;
