//! Interpretation Search
//!
//! Chooses, for every activation that participates in at least one conflict,
//! whether it is *selected* or *excluded*, maximizing the normalized
//! accumulated weight such that no two mutually conflicting activations are
//! both selected.
//!
//! The search tree is binary (select/exclude per candidate) and is walked
//! iteratively with an explicit frame stack, never call-stack recursion, so
//! arbitrarily deep trees cannot exhaust the stack and the step budget can
//! be enforced at every node creation.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::activation::NodeActivation;
use crate::config::EngineConfig;
use crate::conflicts::ConflictIndex;
use crate::error::{LatticeError, Result};
use crate::ids::{ActivationId, ConceptId};

/// Accumulated search weight: a `(w, n)` pair with componentwise
/// addition/subtraction. The additive identity is the "no change" sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weight {
	/// Aggregated per-activation contribution deltas
	pub w: f64,
	/// Aggregated normalizing count
	pub n: f64,
}

impl Weight {
	/// The "no change" sentinel.
	pub const NONE: Self = Self { w: 0.0, n: 0.0 };

	/// `w / n`, or `0` when `n` is zero.
	#[must_use]
	pub fn normalized(self) -> f64 {
		if self.n == 0.0 {
			0.0
		} else {
			self.w / self.n
		}
	}

	/// Whether this is the sentinel.
	#[must_use]
	pub fn is_none(self) -> bool {
		self.w == 0.0 && self.n == 0.0
	}
}

impl Add for Weight {
	type Output = Self;
	fn add(self, rhs: Self) -> Self {
		Self {
			w: self.w + rhs.w,
			n: self.n + rhs.n,
		}
	}
}

impl AddAssign for Weight {
	fn add_assign(&mut self, rhs: Self) {
		self.w += rhs.w;
		self.n += rhs.n;
	}
}

impl Sub for Weight {
	type Output = Self;
	fn sub(self, rhs: Self) -> Self {
		Self {
			w: self.w - rhs.w,
			n: self.n - rhs.n,
		}
	}
}

/// Per-candidate decision state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
	/// Not yet decided
	#[default]
	Unknown,
	/// Part of the interpretation
	Selected,
	/// Suppressed by the interpretation
	Excluded,
}

/// Deterministic document-wide candidate ordering key: interval begin,
/// interval end, discovery sequence, optional owning concept, activation id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateKey {
	/// Interval begin
	pub begin: u32,
	/// Interval end
	pub end: u32,
	/// Discovery sequence
	pub seq: u32,
	/// Owning concept, when the activation's node is a concept output
	pub concept: Option<u32>,
	/// Activation id, the final tiebreaker
	pub id: ActivationId,
}

/// One conflict-prone activation under consideration by the search.
#[derive(Clone, Debug)]
pub struct Candidate {
	/// The wrapped activation
	pub activation: ActivationId,
	/// Deterministic ordering key
	pub key: CandidateKey,
	/// Contribution weight of the wrapped activation
	pub weight: f64,
	/// Working decision on the current search path
	pub decision: Decision,
	/// Last resolved decision, persisted across searches
	pub cached_decision: Decision,
	/// Best known subtree weight below this candidate
	pub cached_weight: Weight,
	/// External override from a collaborator, forcing one branch
	pub forced: Option<Decision>,
}

impl Candidate {
	/// Wrap one activation.
	#[must_use]
	pub fn new(activation: &NodeActivation, concept: Option<ConceptId>) -> Self {
		Self {
			activation: activation.id,
			key: CandidateKey {
				begin: activation.interval.begin,
				end: activation.interval.end,
				seq: activation.seq,
				concept: concept.map(|c| c.0),
				id: activation.id,
			},
			weight: activation.weight,
			decision: Decision::Unknown,
			cached_decision: Decision::Unknown,
			cached_weight: Weight::NONE,
			forced: None,
		}
	}
}

/// Outcome of one document search.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
	/// Final decision per candidate, in candidate order
	pub decisions: Vec<Decision>,
	/// Accumulated weight of the winning path
	pub weight: Weight,
	/// Depth (candidate level) the winning path reached
	pub depth: usize,
	/// Search nodes created
	pub steps: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
	Init,
	PrepareSelect,
	PostSelect,
	PrepareExclude,
	PostExclude,
	Final,
}

struct Frame {
	index: usize,
	step: Step,
	accumulated: Weight,
	selected_weight: Option<Weight>,
	excluded_weight: Option<Weight>,
	applied: Option<Decision>,
	forced: Option<Decision>,
}

impl Frame {
	const fn new(index: usize, accumulated: Weight) -> Self {
		Self {
			index,
			step: Step::Init,
			accumulated,
			selected_weight: None,
			excluded_weight: None,
			applied: None,
			forced: None,
		}
	}
}

struct Best {
	depth: usize,
	weight: Weight,
	decisions: Vec<Decision>,
}

/// Run the interpretation search over `candidates` (already sorted by
/// [`CandidateKey`]).
///
/// On success every candidate carries its final decision and, when caching
/// is enabled, an updated decision cache. On step exhaustion no partial
/// selection is published: decisions are left `Unknown`.
///
/// # Errors
///
/// Returns [`LatticeError::StepLimitExceeded`] when more search nodes would
/// be created than the configured budget allows.
pub fn run_search(
	candidates: &mut [Candidate],
	conflicts: &ConflictIndex,
	config: &EngineConfig,
) -> Result<SearchOutcome> {
	for candidate in candidates.iter_mut() {
		candidate.decision = Decision::Unknown;
	}
	let by_activation: HashMap<ActivationId, usize> = candidates
		.iter()
		.enumerate()
		.map(|(i, c)| (c.activation, i))
		.collect();

	let mut stack: Vec<Frame> = vec![Frame::new(0, Weight::NONE)];
	let mut steps: usize = 1;
	let mut best: Option<Best> = None;
	let mut last_result = Weight::NONE;

	while !stack.is_empty() {
		let top = stack.len() - 1;
		let index = stack[top].index;
		match stack[top].step {
			Step::Init => {
				if index == candidates.len() {
					// Leaf: a complete path. A strictly deeper path wins
					// outright; at equal depth the higher normalized weight
					// wins.
					let accumulated = stack[top].accumulated;
					let replace = best.as_ref().map_or(true, |b| {
						index > b.depth
							|| (index == b.depth
								&& accumulated.normalized() > b.weight.normalized())
					});
					if replace {
						best = Some(Best {
							depth: index,
							weight: accumulated,
							decisions: candidates.iter().map(|c| c.decision).collect(),
						});
					}
					last_result = Weight::NONE;
					let _ = stack.pop();
					continue;
				}
				let forced =
					forced_decision(candidates, &by_activation, conflicts, index, config);
				let frame = &mut stack[top];
				frame.forced = forced;
				frame.step = Step::PrepareSelect;
			}
			Step::PrepareSelect => {
				if stack[top].forced == Some(Decision::Excluded) {
					stack[top].step = Step::PrepareExclude;
					continue;
				}
				candidates[index].decision = Decision::Selected;
				let delta = Weight {
					w: candidates[index].weight,
					n: 1.0,
				};
				let accumulated = stack[top].accumulated;
				stack[top].applied = Some(Decision::Selected);
				stack[top].step = Step::PostSelect;
				steps += 1;
				if steps > config.max_search_steps {
					let err = abort(candidates, &stack, steps, config);
					reset_decisions(candidates);
					return Err(err);
				}
				stack.push(Frame::new(index + 1, accumulated + delta));
			}
			Step::PostSelect => {
				let delta = Weight {
					w: candidates[index].weight,
					n: 1.0,
				};
				candidates[index].decision = Decision::Unknown;
				let frame = &mut stack[top];
				frame.selected_weight = Some(last_result + delta);
				frame.applied = None;
				frame.step = Step::PrepareExclude;
			}
			Step::PrepareExclude => {
				if stack[top].forced == Some(Decision::Selected) {
					stack[top].step = Step::Final;
					continue;
				}
				candidates[index].decision = Decision::Excluded;
				let accumulated = stack[top].accumulated;
				stack[top].applied = Some(Decision::Excluded);
				stack[top].step = Step::PostExclude;
				steps += 1;
				if steps > config.max_search_steps {
					let err = abort(candidates, &stack, steps, config);
					reset_decisions(candidates);
					return Err(err);
				}
				stack.push(Frame::new(index + 1, accumulated + Weight { w: 0.0, n: 1.0 }));
			}
			Step::PostExclude => {
				candidates[index].decision = Decision::Unknown;
				let frame = &mut stack[top];
				frame.excluded_weight = Some(last_result + Weight { w: 0.0, n: 1.0 });
				frame.applied = None;
				frame.step = Step::Final;
			}
			Step::Final => {
				// Ties between viable branches go to Select.
				let frame = &stack[top];
				let result = match (frame.selected_weight, frame.excluded_weight) {
					(Some(s), Some(e)) => {
						if s.normalized() >= e.normalized() {
							s
						} else {
							e
						}
					}
					(Some(s), None) => s,
					(None, Some(e)) => e,
					(None, None) => Weight::NONE,
				};
				candidates[index].cached_weight = result;
				last_result = result;
				let _ = stack.pop();
			}
		}
	}

	let best = best.unwrap_or(Best {
		depth: 0,
		weight: Weight::NONE,
		decisions: Vec::new(),
	});
	for (candidate, &decision) in candidates.iter_mut().zip(best.decisions.iter()) {
		candidate.decision = decision;
	}
	if config.verify_cache {
		verify_cached_decisions(candidates);
	}
	if config.cache_enabled {
		cache_decisions(candidates, conflicts, &by_activation);
	}
	Ok(SearchOutcome {
		decisions: best.decisions,
		weight: best.weight,
		depth: best.depth,
		steps,
	})
}

/// Decision rules 1–3 and 6: forced exclusion (override or conflict with a
/// selected sibling), forced selection (override or no live conflict left),
/// then the cross-search decision cache.
fn forced_decision(
	candidates: &[Candidate],
	by_activation: &HashMap<ActivationId, usize>,
	conflicts: &ConflictIndex,
	index: usize,
	config: &EngineConfig,
) -> Option<Decision> {
	let candidate = &candidates[index];
	if let Some(forced) = candidate.forced {
		return Some(forced);
	}

	let mut any_undecided = false;
	for partner in conflicts.conflicts_of(candidate.activation) {
		match by_activation
			.get(&partner)
			.map_or(Decision::Unknown, |&i| candidates[i].decision)
		{
			Decision::Selected => return Some(Decision::Excluded),
			Decision::Unknown => any_undecided = true,
			Decision::Excluded => {}
		}
	}
	if !any_undecided {
		// Every conflicting partner is already excluded; nothing requires
		// search here.
		return Some(Decision::Selected);
	}

	if config.cache_enabled
		&& !config.verify_cache
		&& candidate.cached_decision != Decision::Unknown
	{
		return Some(candidate.cached_decision);
	}
	// Verification mode ignores the cache here and explores both branches;
	// the recomputed path is compared against the cache after the search.
	None
}

/// Compare cached decisions against the freshly recomputed winning path.
/// Any disagreement dumps both paths at `warn`; the fresh result stands.
fn verify_cached_decisions(candidates: &[Candidate]) {
	let stale = candidates.iter().any(|c| {
		c.cached_decision != Decision::Unknown
			&& c.decision != Decision::Unknown
			&& c.cached_decision != c.decision
	});
	if !stale {
		return;
	}
	let cached_path = decision_path(candidates, |c| c.cached_decision);
	let recomputed_path = decision_path(candidates, |c| c.decision);
	warn!(%cached_path, %recomputed_path, "cached decisions disagree with recomputation");
}

fn decision_path(candidates: &[Candidate], decision: impl Fn(&Candidate) -> Decision) -> String {
	let mut path = String::new();
	for candidate in candidates {
		let mark = match decision(candidate) {
			Decision::Selected => 'S',
			Decision::Excluded => 'E',
			Decision::Unknown => '?',
		};
		let _ = write!(path, "{}:{mark} ", candidate.activation.0);
	}
	path.trim_end().to_owned()
}

/// Persist resolved decisions into the per-candidate cache. An excluded
/// candidate still conflicting with a selected partner is contingent on that
/// partner and is not cached.
fn cache_decisions(
	candidates: &mut [Candidate],
	conflicts: &ConflictIndex,
	by_activation: &HashMap<ActivationId, usize>,
) {
	let decisions: Vec<Decision> = candidates.iter().map(|c| c.decision).collect();
	for i in 0..candidates.len() {
		let decision = decisions[i];
		if decision == Decision::Unknown {
			continue;
		}
		let contingent = decision == Decision::Excluded
			&& conflicts
				.conflicts_of(candidates[i].activation)
				.any(|partner| {
					by_activation
						.get(&partner)
						.is_some_and(|&j| decisions[j] == Decision::Selected)
				});
		if !contingent {
			candidates[i].cached_decision = decision;
		}
	}
}

fn reset_decisions(candidates: &mut [Candidate]) {
	for candidate in candidates {
		candidate.decision = Decision::Unknown;
	}
}

fn abort(
	candidates: &[Candidate],
	stack: &[Frame],
	steps: usize,
	config: &EngineConfig,
) -> LatticeError {
	let mut path = String::new();
	for frame in stack {
		if frame.index >= candidates.len() {
			continue;
		}
		let mark = match frame.applied {
			Some(Decision::Selected) => 'S',
			Some(Decision::Excluded) => 'E',
			Some(Decision::Unknown) | None => '?',
		};
		let _ = write!(path, "{}:{mark} ", candidates[frame.index].activation.0);
	}
	let path = path.trim_end().to_owned();
	error!(steps, limit = config.max_search_steps, %path, "search step budget exhausted");
	LatticeError::StepLimitExceeded {
		steps,
		limit: config.max_search_steps,
		path,
	}
}
