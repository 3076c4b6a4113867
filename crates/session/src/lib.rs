//! Session-scoped review model: raw payees grouped by match pattern into
//! rows, human edits applied as commands over value state, and the final
//! conversion of decisions into durable vetted rules.

use thiserror::Error;

use rulevet_core::MIN_PATTERN_LEN;
use rulevet_store::StoreError;
use rulevet_suggest::SuggestError;

pub mod command;
pub mod review;
pub mod row;

pub use command::{apply_command, RowCommand, RowOutcome, Suggestion};
pub use review::{commit_rows, consolidation_proposals, ConsolidationProposal};
pub use row::{group_rows, PayeeRow};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("row index {0} is out of range")]
    RowOutOfRange(usize),

    #[error("raw payee {payee:?} is not part of row {pattern:?}")]
    PayeeNotInRow { payee: String, pattern: String },

    #[error("split pattern {pattern:?} is shorter than {MIN_PATTERN_LEN} characters")]
    SplitPatternTooShort { pattern: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Suggest(#[from] SuggestError),
}
