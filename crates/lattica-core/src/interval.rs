//! Document Intervals and Relational Constraints
//!
//! Every piece of evidence is anchored to a half-open character interval
//! `[begin, end)` of the input document. Constraints between two intervals
//! drive both the linker's range joins and the refinement keys of the
//! lattice.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{LatticeError, Result};

/// A half-open interval `[begin, end)` over document character positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
	/// Inclusive begin position
	pub begin: u32,
	/// Exclusive end position
	pub end: u32,
}

impl Interval {
	/// Create an interval. `begin` and `end` are not required to be ordered;
	/// degenerate intervals are meaningful for punctuation-like atoms.
	#[must_use]
	pub const fn new(begin: u32, end: u32) -> Self {
		Self { begin, end }
	}

	/// The requested bound of this interval.
	#[must_use]
	pub const fn bound(self, kind: BoundKind) -> u32 {
		match kind {
			BoundKind::Begin => self.begin,
			BoundKind::End => self.end,
		}
	}

	/// Smallest interval covering both inputs.
	#[must_use]
	pub fn span(self, other: Self) -> Self {
		Self {
			begin: self.begin.min(other.begin),
			end: self.end.max(other.end),
		}
	}
}

/// One of the two bounds of an interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BoundKind {
	/// The begin position
	Begin,
	/// The end position
	End,
}

/// A relational constraint between two intervals, `a` relative to `b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntervalRelation {
	/// `a.begin == b.begin`
	BeginEquals,
	/// `a.end == b.end`
	EndEquals,
	/// `a` contains `b`
	Contains,
	/// `a` ends before `b` begins
	Before,
	/// `a` begins after `b` ends
	After,
	/// `a` and `b` share at least one position
	Overlaps,
}

impl IntervalRelation {
	/// Test whether the relation holds for `a` relative to `b`.
	#[inline]
	#[must_use]
	pub const fn holds(self, a: Interval, b: Interval) -> bool {
		match self {
			Self::BeginEquals => a.begin == b.begin,
			Self::EndEquals => a.end == b.end,
			Self::Contains => a.begin <= b.begin && a.end >= b.end,
			Self::Before => a.end <= b.begin,
			Self::After => a.begin >= b.end,
			Self::Overlaps => a.begin < b.end && b.begin < a.end,
		}
	}
}

/// Scan-strategy group for a relational constraint.
///
/// Equality constraints on a single bound permit a binary range scan over an
/// index sorted by that bound; everything else needs a linear filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationGroup {
	/// `a.begin == b.begin` — range scan on the begin-sorted index
	BeginEquals,
	/// `a.end == b.end` — range scan on the end-sorted index
	EndEquals,
	/// Anchored to document position zero — range scan at key 0
	ZeroPosition,
	/// No index applies — linear filter
	Other,
}

/// A declared constraint between a synapse's input and output activation.
///
/// Interval relations are evaluated against the range index; `AncestorOf`
/// and `CommonAncestor` are structural post-filters evaluated by a
/// generation-stamped walk over the input-link graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationConstraint {
	/// An interval relation between the two activations
	Interval(IntervalRelation),
	/// The partner's begin is anchored at document position zero
	AtDocumentStart,
	/// The input activation must be reachable from the output through
	/// non-recurrent input links
	AncestorOf,
	/// Both activations must share a non-recurrent input ancestor
	CommonAncestor,
}

impl RelationConstraint {
	/// Scan group for the linker's strategy choice.
	#[must_use]
	pub const fn group(self) -> RelationGroup {
		match self {
			Self::Interval(IntervalRelation::BeginEquals) => RelationGroup::BeginEquals,
			Self::Interval(IntervalRelation::EndEquals) => RelationGroup::EndEquals,
			Self::AtDocumentStart => RelationGroup::ZeroPosition,
			Self::Interval(_) | Self::AncestorOf | Self::CommonAncestor => RelationGroup::Other,
		}
	}

	/// Whether this constraint can only be checked after linking, by a
	/// reachability walk.
	#[must_use]
	pub const fn is_post_filter(self) -> bool {
		matches!(self, Self::AncestorOf | Self::CommonAncestor)
	}

	/// Whether this constraint can be expressed positionally inside a
	/// refinement key. Post-filters cannot.
	#[must_use]
	pub const fn is_convertible(self) -> bool {
		!self.is_post_filter()
	}
}

/// A non-empty, ordered set of relational constraints.
///
/// Rejects the empty set at construction; a synapse with no declared
/// relation is malformed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSet {
	constraints: SmallVec<[RelationConstraint; 2]>,
}

impl RelationSet {
	/// Build a relation set from at least one constraint.
	///
	/// # Errors
	///
	/// Returns [`LatticeError::EmptyRelationSet`] when `constraints` is empty.
	pub fn new(constraints: &[RelationConstraint]) -> Result<Self> {
		if constraints.is_empty() {
			return Err(LatticeError::EmptyRelationSet);
		}
		let mut constraints: SmallVec<[RelationConstraint; 2]> =
			constraints.iter().copied().collect();
		constraints.sort_unstable();
		Ok(Self { constraints })
	}

	/// All constraints, sorted.
	#[must_use]
	pub fn constraints(&self) -> &[RelationConstraint] {
		&self.constraints
	}

	/// Interval constraints only (the ones the range index can evaluate).
	pub fn interval_constraints(&self) -> impl Iterator<Item = RelationConstraint> + '_ {
		self.constraints.iter().copied().filter(|c| !c.is_post_filter())
	}

	/// Structural post-filters only.
	pub fn post_filters(&self) -> impl Iterator<Item = RelationConstraint> + '_ {
		self.constraints.iter().copied().filter(|c| c.is_post_filter())
	}

	/// The first constraint permitting a binary range scan, if any.
	#[must_use]
	pub fn indexable(&self) -> Option<RelationConstraint> {
		self.constraints
			.iter()
			.copied()
			.find(|c| c.group() != RelationGroup::Other && !c.is_post_filter())
	}
}

/// One bound-mapping rule: the output interval takes `output` from the
/// input interval's `input` bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundRule {
	/// Which output bound this rule resolves
	pub output: BoundKind,
	/// Which input bound it is taken from
	pub input: BoundKind,
}

/// Per-synapse interval-mapping rules for disjunction output computation.
///
/// An output bound with no matching rule stays unresolved; an unresolved
/// bound suppresses the output activation entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMapping {
	/// Declared rules, applied in order; the first rule per output bound wins
	pub rules: SmallVec<[BoundRule; 2]>,
}

impl OutputMapping {
	/// Mapping that copies the input interval through unchanged.
	#[must_use]
	pub fn identity() -> Self {
		Self {
			rules: SmallVec::from_slice(&[
				BoundRule {
					output: BoundKind::Begin,
					input: BoundKind::Begin,
				},
				BoundRule {
					output: BoundKind::End,
					input: BoundKind::End,
				},
			]),
		}
	}

	/// Mapping with no rules; never produces an output interval.
	#[must_use]
	pub const fn none() -> Self {
		Self {
			rules: SmallVec::new_const(),
		}
	}

	/// Apply the rules to an input interval. Returns the fully resolved
	/// output interval, or `None` when either bound has no rule.
	#[must_use]
	pub fn apply(&self, input: Interval) -> Option<Interval> {
		let mut begin = None;
		let mut end = None;
		for rule in &self.rules {
			let value = input.bound(rule.input);
			match rule.output {
				BoundKind::Begin => begin = begin.or(Some(value)),
				BoundKind::End => end = end.or(Some(value)),
			}
		}
		match (begin, end) {
			(Some(begin), Some(end)) => Some(Interval { begin, end }),
			_ => None,
		}
	}
}
