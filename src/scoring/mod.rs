//! # Bonus Scoring
//!
//! Pure XP previews for activity drafts. Each activity kind owns a static
//! [`RuleSet`]: a base XP value plus an ordered list of [`BonusRule`]s. Every
//! rule whose predicate holds contributes its signed value, in declaration
//! order, to the [`ScoreResult`].
//!
//! ```text
//! CompetencyDraft { initial: 1, target: 4, evidences: [a, b, c] }
//!   → base 100
//!   → "Target above initial level"  +40
//!   → "Level gap of two or more"     +50
//!   → "Evidence attached"            +30
//!   → "Three or more evidences"      +30
//!   = 250
//! ```
//!
//! Scoring never clamps: a regression bonus may push the total below the
//! base, or below zero. Submission validity is a separate concern, see
//! [`Validate`].

pub mod drafts;
pub mod rules;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use drafts::{
    CertificationDraft, CompetencyDraft, CompetencyUpdateDraft, GoalDraft, GoalType,
    GoalUpdateDraft, MentoringDraft, OneOnOneDraft, SuccessCriterion,
};
pub use rules::Scored;

/// Activity a draft records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    GoalCreation,
    GoalUpdate,
    CompetencyCreation,
    CompetencyUpdate,
    Mentoring,
    Certification,
    OneOnOne,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::GoalCreation => "goal_creation",
            ActivityKind::GoalUpdate => "goal_update",
            ActivityKind::CompetencyCreation => "competency_creation",
            ActivityKind::CompetencyUpdate => "competency_update",
            ActivityKind::Mentoring => "mentoring",
            ActivityKind::Certification => "certification",
            ActivityKind::OneOnOne => "one_on_one",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate over a draft.
pub type Predicate<D> = fn(&D) -> bool;

/// A named, conditionally applied, signed XP adjustment.
pub struct BonusRule<D> {
    /// Label shown in the XP breakdown
    pub label: &'static str,
    /// Whether the bonus applies to a draft
    pub predicate: Predicate<D>,
    /// Signed XP value; negative for penalties
    pub value: i64,
}

impl<D> BonusRule<D> {
    pub fn new(label: &'static str, value: i64, predicate: Predicate<D>) -> Self {
        Self {
            label,
            predicate,
            value,
        }
    }

    pub fn applies(&self, draft: &D) -> bool {
        (self.predicate)(draft)
    }
}

impl<D> fmt::Debug for BonusRule<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BonusRule")
            .field("label", &self.label)
            .field("value", &self.value)
            .finish()
    }
}

/// Base XP plus the ordered bonus rules for one activity kind.
#[derive(Debug)]
pub struct RuleSet<D> {
    pub kind: ActivityKind,
    pub base_xp: i64,
    /// Evaluated in order; order only affects the breakdown, not the total
    pub rules: Vec<BonusRule<D>>,
}

impl<D> RuleSet<D> {
    pub fn new(kind: ActivityKind, base_xp: i64) -> Self {
        Self {
            kind,
            base_xp,
            rules: Vec::new(),
        }
    }

    /// Append a rule (builder style).
    pub fn with_rule(mut self, label: &'static str, value: i64, predicate: Predicate<D>) -> Self {
        self.rules.push(BonusRule::new(label, value, predicate));
        self
    }

    /// Score `draft` against this rule set.
    pub fn score(&self, draft: &D) -> ScoreResult {
        score(draft, self)
    }

    /// Highest total reachable if every positive bonus applies.
    pub fn max_xp(&self) -> i64 {
        self.base_xp
            + self
                .rules
                .iter()
                .map(|r| r.value)
                .filter(|v| *v > 0)
                .sum::<i64>()
    }
}

/// One applied bonus in a [`ScoreResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bonus {
    pub label: &'static str,
    pub value: i64,
}

/// XP preview for a draft. `total == base_xp + Σ bonuses[i].value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    #[serde(rename = "baseXP")]
    pub base_xp: i64,
    pub bonuses: Vec<Bonus>,
    pub total: i64,
}

impl ScoreResult {
    /// Sum of the applied bonuses.
    pub fn bonus_xp(&self) -> i64 {
        self.total - self.base_xp
    }
}

/// Evaluate every rule against `draft` and collect the matching bonuses.
///
/// Pure and cheap enough to run on every keystroke.
pub fn score<D>(draft: &D, rule_set: &RuleSet<D>) -> ScoreResult {
    let bonuses: Vec<Bonus> = rule_set
        .rules
        .iter()
        .filter(|rule| rule.applies(draft))
        .map(|rule| Bonus {
            label: rule.label,
            value: rule.value,
        })
        .collect();
    let total = rule_set.base_xp + bonuses.iter().map(|b| b.value).sum::<i64>();
    ScoreResult {
        base_xp: rule_set.base_xp,
        bonuses,
        total,
    }
}

/// Whether a draft may be submitted. Independent of its score.
pub trait Validate {
    fn is_valid(&self) -> bool;
}

/// Length in Unicode scalar values.
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Non-empty after trimming.
pub(crate) fn filled(s: &str) -> bool {
    !s.trim().is_empty()
}
