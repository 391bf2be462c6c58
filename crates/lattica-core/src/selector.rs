//! Selector — Range-Indexed Activation Lookup
//!
//! Per-node index of activations sorted by interval begin and by interval
//! end. Equality constraints on one bound resolve with a binary range scan;
//! every other constraint falls back to a linear filter over the index.

use std::collections::BTreeSet;

use crate::ids::ActivationId;
use crate::interval::{Interval, IntervalRelation, RelationConstraint};

/// Which side of a relational constraint the indexed partner occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
	/// The relation is evaluated as `holds(partner, probe)`
	PartnerFirst,
	/// The relation is evaluated as `holds(probe, partner)`
	ProbeFirst,
}

/// Sorted-by-range index over one node's activations.
#[derive(Debug, Default)]
pub struct RangeIndex {
	// (begin, end, id) and (end, begin, id)
	by_begin: BTreeSet<(u32, u32, ActivationId)>,
	by_end: BTreeSet<(u32, u32, ActivationId)>,
}

impl RangeIndex {
	/// Empty index.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Register an activation's interval.
	pub fn insert(&mut self, id: ActivationId, interval: Interval) {
		let _ = self.by_begin.insert((interval.begin, interval.end, id));
		let _ = self.by_end.insert((interval.end, interval.begin, id));
	}

	/// Drop an activation's interval.
	pub fn remove(&mut self, id: ActivationId, interval: Interval) {
		let _ = self.by_begin.remove(&(interval.begin, interval.end, id));
		let _ = self.by_end.remove(&(interval.end, interval.begin, id));
	}

	/// Number of indexed activations.
	#[must_use]
	pub fn len(&self) -> usize {
		self.by_begin.len()
	}

	/// Whether the index is empty.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.by_begin.is_empty()
	}

	/// All indexed activations in begin order.
	pub fn iter(&self) -> impl Iterator<Item = ActivationId> + '_ {
		self.by_begin.iter().map(|&(_, _, id)| id)
	}

	/// Activations satisfying `constraint` against `probe`.
	///
	/// Begin-equals, end-equals and zero-position constraints use a binary
	/// range scan; the rest filter linearly. Structural post-filters are not
	/// the selector's concern and match everything here.
	#[must_use]
	pub fn select(
		&self,
		constraint: RelationConstraint,
		probe: Interval,
		side: Side,
	) -> Vec<ActivationId> {
		match constraint {
			RelationConstraint::Interval(IntervalRelation::BeginEquals) => {
				self.begin_range(probe.begin)
			}
			RelationConstraint::Interval(IntervalRelation::EndEquals) => self.end_range(probe.end),
			RelationConstraint::AtDocumentStart => self.begin_range(0),
			RelationConstraint::Interval(relation) => self
				.by_begin
				.iter()
				.filter(|&&(begin, end, _)| {
					let partner = Interval::new(begin, end);
					match side {
						Side::PartnerFirst => relation.holds(partner, probe),
						Side::ProbeFirst => relation.holds(probe, partner),
					}
				})
				.map(|&(_, _, id)| id)
				.collect(),
			RelationConstraint::AncestorOf | RelationConstraint::CommonAncestor => {
				self.iter().collect()
			}
		}
	}

	fn begin_range(&self, begin: u32) -> Vec<ActivationId> {
		self.by_begin
			.range((begin, 0, ActivationId(0))..=(begin, u32::MAX, ActivationId(u32::MAX)))
			.map(|&(_, _, id)| id)
			.collect()
	}

	fn end_range(&self, end: u32) -> Vec<ActivationId> {
		self.by_end
			.range((end, 0, ActivationId(0))..=(end, u32::MAX, ActivationId(u32::MAX)))
			.map(|&(_, _, id)| id)
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn index() -> RangeIndex {
		let mut index = RangeIndex::new();
		index.insert(ActivationId(0), Interval::new(0, 5));
		index.insert(ActivationId(1), Interval::new(0, 8));
		index.insert(ActivationId(2), Interval::new(3, 8));
		index.insert(ActivationId(3), Interval::new(9, 12));
		index
	}

	#[test]
	fn test_begin_equals_range_scan() {
		let index = index();
		let found = index.select(
			RelationConstraint::Interval(IntervalRelation::BeginEquals),
			Interval::new(0, 99),
			Side::PartnerFirst,
		);
		assert_eq!(found, vec![ActivationId(0), ActivationId(1)]);
	}

	#[test]
	fn test_end_equals_range_scan() {
		let index = index();
		let found = index.select(
			RelationConstraint::Interval(IntervalRelation::EndEquals),
			Interval::new(99, 8),
			Side::PartnerFirst,
		);
		assert_eq!(found, vec![ActivationId(1), ActivationId(2)]);
	}

	#[test]
	fn test_equals_scan_matches_linear_scan() {
		// Range-join correctness: the indexed scan agrees with a full
		// linear filter.
		let index = index();
		let probe = Interval::new(0, 7);
		let scanned = index.select(
			RelationConstraint::Interval(IntervalRelation::BeginEquals),
			probe,
			Side::PartnerFirst,
		);
		let mut linear: Vec<ActivationId> = index
			.select(
				RelationConstraint::Interval(IntervalRelation::Overlaps),
				Interval::new(0, u32::MAX),
				Side::PartnerFirst,
			)
			.into_iter()
			.filter(|id| {
				let interval = match id.0 {
					0 => Interval::new(0, 5),
					1 => Interval::new(0, 8),
					2 => Interval::new(3, 8),
					_ => Interval::new(9, 12),
				};
				IntervalRelation::BeginEquals.holds(interval, probe)
			})
			.collect();
		linear.sort_unstable();
		let mut scanned_sorted = scanned;
		scanned_sorted.sort_unstable();
		assert_eq!(scanned_sorted, linear);
	}

	#[test]
	fn test_linear_filter_respects_side() {
		let index = index();
		// Partner before probe: partner.end <= probe.begin.
		let before = index.select(
			RelationConstraint::Interval(IntervalRelation::Before),
			Interval::new(8, 10),
			Side::PartnerFirst,
		);
		assert_eq!(before, vec![ActivationId(0), ActivationId(1), ActivationId(2)]);
		// Probe before partner: probe.end <= partner.begin.
		let after = index.select(
			RelationConstraint::Interval(IntervalRelation::Before),
			Interval::new(0, 9),
			Side::ProbeFirst,
		);
		assert_eq!(after, vec![ActivationId(3)]);
	}

	#[test]
	fn test_remove() {
		let mut index = index();
		index.remove(ActivationId(1), Interval::new(0, 8));
		assert_eq!(index.len(), 3);
		let found = index.select(
			RelationConstraint::Interval(IntervalRelation::BeginEquals),
			Interval::new(0, 0),
			Side::PartnerFirst,
		);
		assert_eq!(found, vec![ActivationId(0)]);
	}
}
