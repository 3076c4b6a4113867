use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum length of a pre-stage match pattern. Anything shorter would match
/// far too many unrelated payees.
pub const MIN_PATTERN_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionOp {
    Contains,
    Is,
    StartsWith,
    EndsWith,
    Matches,
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionOp::Contains => write!(f, "contains"),
            ConditionOp::Is => write!(f, "is"),
            ConditionOp::StartsWith => write!(f, "starts-with"),
            ConditionOp::EndsWith => write!(f, "ends-with"),
            ConditionOp::Matches => write!(f, "matches"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionField {
    RawPayee,
    CleanPayee,
    Notes,
    Amount,
}

impl fmt::Display for ConditionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionField::RawPayee => write!(f, "raw-payee"),
            ConditionField::CleanPayee => write!(f, "clean-payee"),
            ConditionField::Notes => write!(f, "notes"),
            ConditionField::Amount => write!(f, "amount"),
        }
    }
}

/// Whether a condition value is a plain string or an opaque id assigned by
/// the external system. Rules written by this tool always use `ExternalId`;
/// rules authored in the external UI use `Literal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    #[default]
    Literal,
    ExternalId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub op: ConditionOp,
    pub field: ConditionField,
    pub value: String,
    #[serde(default)]
    pub value_kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStage {
    Pre,
    Categorize,
    Post,
}

impl fmt::Display for RuleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleStage::Pre => write!(f, "pre"),
            RuleStage::Categorize => write!(f, "categorize"),
            RuleStage::Post => write!(f, "post"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

/// A rule as sourced from the external system. The `external_id` is carried
/// for display and API calls only; it churns across syncs and must never be
/// persisted as a primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub stage: RuleStage,
    #[serde(default)]
    pub combinator: Combinator,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

impl Rule {
    /// Content-addressed key, derived from the first condition and first
    /// action only. Rules that differ only in `conditions[1..]` collide;
    /// that is a known limitation kept for key stability, not a bug.
    pub fn content_key(&self) -> Option<RuleKey> {
        let cond = self.conditions.first()?;
        let action = self.actions.first()?;
        Some(RuleKey::derive(
            self.stage,
            cond.field,
            cond.op,
            &cond.value,
            &action.field,
            &action.value,
        ))
    }
}

/// Identifier derived entirely from a rule's meaning. Survives external id
/// churn: two syncs of the same rule always produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleKey(String);

impl RuleKey {
    pub fn derive(
        stage: RuleStage,
        field: ConditionField,
        op: ConditionOp,
        value: &str,
        action_field: &str,
        action_value: &str,
    ) -> Self {
        RuleKey(format!(
            "{stage}|{field}|{op}|{value}|{action_field}|{action_value}"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A locally approved rule. Created only by the vetted store's `approve`,
/// destroyed only by its `remove`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VettedRule {
    pub key: RuleKey,
    pub stage: RuleStage,
    pub match_field: ConditionField,
    pub match_op: ConditionOp,
    pub match_value: String,
    pub action_field: String,
    pub action_value: String,
    pub vetted_at: DateTime<Utc>,
}

impl VettedRule {
    pub fn new(
        stage: RuleStage,
        match_field: ConditionField,
        match_op: ConditionOp,
        match_value: impl Into<String>,
        action_field: impl Into<String>,
        action_value: impl Into<String>,
    ) -> Self {
        let match_value = match_value.into();
        let action_field = action_field.into();
        let action_value = action_value.into();
        VettedRule {
            key: RuleKey::derive(
                stage,
                match_field,
                match_op,
                &match_value,
                &action_field,
                &action_value,
            ),
            stage,
            match_field,
            match_op,
            match_value,
            action_field,
            action_value,
            vetted_at: Utc::now(),
        }
    }
}
