pub mod money;
pub mod rule;
pub mod transaction;

pub use money::Money;
pub use rule::{
    Action, Combinator, Condition, ConditionField, ConditionOp, Rule, RuleKey, RuleStage,
    ValueKind, VettedRule, MIN_PATTERN_LEN,
};
pub use transaction::{AccountId, RawTransaction, TxId};
