pub mod consolidate;
pub mod store;

pub use consolidate::{candidate_groups, ConsolidationGroup, GroupedRule};
pub use store::{StoreError, VettedRuleStore};
