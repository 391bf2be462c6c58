//! Engine Configuration
//!
//! All tunable limits in one place. The defaults are sized for documents of
//! a few thousand activations; the search step budget is the only limit
//! whose exhaustion is fatal for a document.

use serde::{Deserialize, Serialize};

/// Configuration for the lattice and interpretation search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
	/// Maximum conjunction size. Extending past this level returns no child
	/// and pattern growth stops on that path.
	pub max_conjunction_level: u32,
	/// Hard budget on search-node creations per document. Exceeding it
	/// aborts the document with a full path dump.
	pub max_search_steps: usize,
	/// Below this relation count the linker skips the scan-strategy
	/// optimization and always does a plain linear scan.
	pub relation_threshold: usize,
	/// Cost factor weighing index-driven candidates against the flat active
	/// set: the index result is kept only when the scanned candidate count
	/// times this factor stays below the active count; otherwise the flat
	/// set is cheaper to filter.
	pub active_concept_cost: usize,
	/// Reuse cached candidate decisions across searches.
	pub cache_enabled: bool,
	/// Recompute cached subtrees and log any mismatch instead of trusting
	/// the cache.
	pub verify_cache: bool,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			max_conjunction_level: 10,
			max_search_steps: 1_000_000,
			relation_threshold: 10,
			active_concept_cost: 20,
			cache_enabled: true,
			verify_cache: false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_are_sane() {
		let config = EngineConfig::default();
		assert!(config.max_conjunction_level > 1);
		assert!(config.max_search_steps > 0);
		assert!(config.cache_enabled);
		assert!(!config.verify_cache);
	}
}
