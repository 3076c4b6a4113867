//! The async boundary of the classifier: opaque oracles that propose names,
//! categories, and consolidation patterns. The core never depends on what
//! sits behind these traits — a language model, a lookup table, or a test
//! mock — and never requires an oracle answer for correctness; a human can
//! always override.

use async_trait::async_trait;
use thiserror::Error;

pub mod pool;

pub use pool::{propose_all, DEFAULT_CONCURRENCY};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SuggestError {
    #[error("suggestion backend error: {0}")]
    Backend(String),

    #[error("suggestion is missing required field {0:?}")]
    MissingField(&'static str),
}

/// A proposed default for one payee row. Advisory only.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub clean_name: String,
    pub category: Option<String>,
}

#[async_trait]
pub trait ProposalSource: Send + Sync {
    async fn propose(&self, raw_payee: &str) -> Result<Proposal, SuggestError>;
}

/// One consolidation group, as handed to the suggestion oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupInput {
    pub target_name: String,
    pub match_patterns: Vec<String>,
}

/// The oracle's proposed single replacement pattern for a group. Only the
/// structural fields are validated here; whether the pattern genuinely
/// subsumes the originals is checked where a human can see it.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSuggestion {
    pub target_name: String,
    pub suggested_pattern: String,
    pub reason: String,
}

impl GroupSuggestion {
    pub fn validate(&self) -> Result<(), SuggestError> {
        if self.target_name.trim().is_empty() {
            return Err(SuggestError::MissingField("target_name"));
        }
        if self.suggested_pattern.trim().is_empty() {
            return Err(SuggestError::MissingField("suggested_pattern"));
        }
        Ok(())
    }
}

#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn suggest(&self, groups: &[GroupInput]) -> Result<Vec<GroupSuggestion>, SuggestError>;
}
