//! Tag consolidation for memory-polish.
//!
//! Three ranked proposal sources feed one merge decision list:
//!
//! 1. synonym rules from config (confidence 1.0),
//! 2. mechanical string similarity (Levenshtein plus containment /
//!    abbreviation / common-prefix bonuses),
//! 3. optional semantic similarity over cached embeddings.
//!
//! The embedding backend is a capability: absent or failing providers
//! degrade the run to mechanical scoring with a warning, never an error.

pub mod cache;
pub mod canonical;
pub mod engine;
pub mod provider;

pub use cache::EmbeddingCache;
pub use canonical::{CanonicalEntry, CanonicalMap};
pub use engine::{
    should_skip_pair, MergeMethod, MergeProposal, SimilarityEngine, SimilarityMethod,
    SimilarityOutcome,
};
pub use provider::{EmbeddingProvider, OllamaProvider, ProviderError};
