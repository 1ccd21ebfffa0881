//! Draft records scored by the rule sets, with their submission checks.
//!
//! All drafts deserialize from camelCase JSON with every field optional, the
//! shape a form produces while it is still being filled in.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{filled, Validate};

/// Direction of a goal's success criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Increase,
    Decrease,
    Percentage,
    Binary,
}

impl GoalType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, GoalType::Binary)
    }
}

/// Measurable target of a goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuccessCriterion {
    pub current_value: Option<f64>,
    pub target_value: Option<f64>,
    pub unit: String,
}

impl SuccessCriterion {
    /// Both ends of the range are set.
    pub fn values(&self) -> Option<(f64, f64)> {
        Some((self.current_value?, self.target_value?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoalDraft {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub goal_type: Option<GoalType>,
    pub success_criterion: Option<SuccessCriterion>,
}

impl GoalDraft {
    /// Criterion values present and internally consistent for the goal type.
    pub fn criterion_is_valid(&self) -> bool {
        let (Some(goal_type), Some(criterion)) = (self.goal_type, &self.success_criterion) else {
            return false;
        };
        if goal_type == GoalType::Binary {
            return true;
        }
        let Some((current, target)) = criterion.values() else {
            return false;
        };
        if !filled(&criterion.unit) {
            return false;
        }
        match goal_type {
            GoalType::Increase => current < target,
            GoalType::Decrease => current > target,
            GoalType::Percentage => {
                (0.0..=100.0).contains(&current) && (0.0..=100.0).contains(&target)
            }
            GoalType::Binary => true,
        }
    }
}

impl Validate for GoalDraft {
    fn is_valid(&self) -> bool {
        filled(&self.title) && filled(&self.description) && self.criterion_is_valid()
    }
}

/// Progress report against an existing goal. Progress is a percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoalUpdateDraft {
    pub goal_title: String,
    pub current_progress: f64,
    pub new_progress: f64,
    pub note: String,
}

impl Validate for GoalUpdateDraft {
    fn is_valid(&self) -> bool {
        filled(&self.goal_title)
            && (0.0..=100.0).contains(&self.new_progress)
            && self.new_progress != self.current_progress
    }
}

/// New competency to develop. Levels run from 1 to 5.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompetencyDraft {
    pub name: String,
    pub category: String,
    pub description: String,
    pub initial_level: u8,
    pub target_level: u8,
    pub evidences: Vec<String>,
}

impl CompetencyDraft {
    pub const MIN_LEVEL: u8 = 1;
    pub const MAX_LEVEL: u8 = 5;

    pub fn level_gap(&self) -> i32 {
        i32::from(self.target_level) - i32::from(self.initial_level)
    }
}

impl Validate for CompetencyDraft {
    fn is_valid(&self) -> bool {
        let levels = Self::MIN_LEVEL..=Self::MAX_LEVEL;
        filled(&self.name)
            && filled(&self.category)
            && levels.contains(&self.initial_level)
            && levels.contains(&self.target_level)
            && self.target_level >= self.initial_level
    }
}

/// Progress report against an existing competency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompetencyUpdateDraft {
    pub competency_name: String,
    pub current_progress: f64,
    pub new_progress: f64,
    pub note: String,
}

impl Validate for CompetencyUpdateDraft {
    fn is_valid(&self) -> bool {
        filled(&self.competency_name)
            && (0.0..=100.0).contains(&self.new_progress)
            && self.new_progress != self.current_progress
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MentoringDraft {
    pub mentee: String,
    pub date: Option<NaiveDate>,
    pub topic: String,
    pub current_level: Option<u8>,
    pub target_level: Option<u8>,
    pub progress_notes: String,
    pub achievements: Vec<String>,
    pub challenges: Vec<String>,
    pub next_steps: Vec<String>,
}

impl Validate for MentoringDraft {
    fn is_valid(&self) -> bool {
        filled(&self.mentee)
            && self.date.is_some()
            && filled(&self.topic)
            && self.current_level.is_some()
            && self.target_level.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertificationDraft {
    pub title: String,
    pub issuer: String,
    pub date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub credential_id: Option<String>,
    pub competencies: Vec<String>,
    pub learnings: Vec<String>,
    pub applications: Vec<String>,
}

impl CertificationDraft {
    /// Issuers whose certifications earn the prestige bonus (substring match).
    pub const PRESTIGIOUS_ISSUERS: [&'static str; 6] = [
        "AWS",
        "Google",
        "Microsoft",
        "Oracle",
        "RedHat",
        "Linux Foundation",
    ];

    pub fn is_prestigious(&self) -> bool {
        Self::PRESTIGIOUS_ISSUERS
            .iter()
            .any(|issuer| self.issuer.contains(issuer))
    }
}

impl Validate for CertificationDraft {
    fn is_valid(&self) -> bool {
        filled(&self.title) && filled(&self.issuer) && self.date.is_some()
    }
}

/// Record of a one-on-one meeting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OneOnOneDraft {
    pub participant: String,
    pub date: Option<NaiveDate>,
    pub working_on: Vec<String>,
    pub positive_points: Vec<String>,
    pub improvement_points: Vec<String>,
    pub next_steps: Vec<String>,
    pub general_notes: String,
}

impl Validate for OneOnOneDraft {
    fn is_valid(&self) -> bool {
        filled(&self.participant) && self.date.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(current: f64, target: f64) -> Option<SuccessCriterion> {
        Some(SuccessCriterion {
            current_value: Some(current),
            target_value: Some(target),
            unit: "tickets".into(),
        })
    }

    fn goal(goal_type: GoalType, current: f64, target: f64) -> GoalDraft {
        GoalDraft {
            title: "Close backlog".into(),
            description: "Reduce open tickets".into(),
            goal_type: Some(goal_type),
            success_criterion: criterion(current, target),
        }
    }

    #[test]
    fn test_goal_direction_validation() {
        assert!(goal(GoalType::Increase, 10.0, 20.0).is_valid());
        assert!(!goal(GoalType::Increase, 20.0, 10.0).is_valid());
        assert!(goal(GoalType::Decrease, 20.0, 10.0).is_valid());
        assert!(!goal(GoalType::Decrease, 10.0, 10.0).is_valid());
        assert!(goal(GoalType::Percentage, 40.0, 100.0).is_valid());
        assert!(!goal(GoalType::Percentage, 40.0, 120.0).is_valid());
    }

    #[test]
    fn test_goal_binary_needs_no_values() {
        let draft = GoalDraft {
            title: "Ship".into(),
            description: "Ship v2".into(),
            goal_type: Some(GoalType::Binary),
            success_criterion: Some(SuccessCriterion::default()),
        };
        assert!(draft.is_valid());
    }

    #[test]
    fn test_goal_blank_title_invalid() {
        let mut draft = goal(GoalType::Increase, 1.0, 2.0);
        draft.title = "   ".into();
        assert!(!draft.is_valid());
    }

    #[test]
    fn test_goal_missing_unit_invalid() {
        let mut draft = goal(GoalType::Increase, 1.0, 2.0);
        if let Some(c) = draft.success_criterion.as_mut() {
            c.unit.clear();
        }
        assert!(!draft.is_valid());
    }

    #[test]
    fn test_competency_levels() {
        let mut draft = CompetencyDraft {
            name: "Rust".into(),
            category: "technical".into(),
            initial_level: 2,
            target_level: 4,
            ..Default::default()
        };
        assert!(draft.is_valid());
        assert_eq!(draft.level_gap(), 2);
        draft.target_level = 6;
        assert!(!draft.is_valid());
        draft.target_level = 1;
        assert!(!draft.is_valid());
    }

    #[test]
    fn test_update_requires_change() {
        let draft = GoalUpdateDraft {
            goal_title: "Close backlog".into(),
            current_progress: 40.0,
            new_progress: 40.0,
            note: String::new(),
        };
        assert!(!draft.is_valid());
    }

    #[test]
    fn test_prestigious_issuer_substring() {
        let draft = CertificationDraft {
            issuer: "AWS Training".into(),
            ..Default::default()
        };
        assert!(draft.is_prestigious());
        assert!(!CertificationDraft::default().is_prestigious());
    }

    #[test]
    fn test_drafts_deserialize_partial_json() {
        let draft: GoalDraft = serde_json::from_str(
            r#"{"title":"T","type":"percentage","successCriterion":{"currentValue":10}}"#,
        )
        .unwrap();
        assert_eq!(draft.goal_type, Some(GoalType::Percentage));
        assert!(!draft.is_valid());

        let mentoring: MentoringDraft =
            serde_json::from_str(r#"{"mentee":"Ana","date":"2024-03-01","topic":"APIs","currentLevel":2,"targetLevel":3}"#)
                .unwrap();
        assert!(mentoring.is_valid());
    }
}
