pub mod coverage;
pub mod matcher;
pub mod normalize;
pub mod transfer;

pub use coverage::{categorize_targets_entity, classify_coverage, CoverageReport};
pub use matcher::{condition_matches, find_first_match, rule_matches, MatchError, Subject};
pub use normalize::Normalizer;
pub use transfer::{find_transfer_pairs, TransferPair, TRANSFER_DATE_TOLERANCE_DAYS};
