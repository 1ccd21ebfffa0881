//! Static rule sets, one per activity kind.

use once_cell::sync::Lazy;

use super::drafts::{
    CertificationDraft, CompetencyDraft, CompetencyUpdateDraft, GoalDraft, GoalType,
    GoalUpdateDraft, MentoringDraft, OneOnOneDraft,
};
use super::{char_len, ActivityKind, RuleSet, ScoreResult};

/// Text longer than this many characters counts as "detailed".
pub const DETAILED_TEXT_CHARS: usize = 100;

/// A progress jump of at least this many percentage points is "significant".
pub const SIGNIFICANT_PROGRESS_POINTS: f64 = 20.0;

/// A draft type with a static rule set.
pub trait Scored: Sized + 'static {
    fn rule_set() -> &'static RuleSet<Self>;

    /// Live XP preview of this draft.
    fn preview(&self) -> ScoreResult {
        Self::rule_set().score(self)
    }
}

fn detailed(text: &str) -> bool {
    char_len(text) > DETAILED_TEXT_CHARS
}

fn progress_jump(current: f64, new: f64) -> bool {
    new - current >= SIGNIFICANT_PROGRESS_POINTS
}

fn completes(current: f64, new: f64) -> bool {
    current < 100.0 && new == 100.0
}

fn regresses(current: f64, new: f64) -> bool {
    new < current
}

fn goal_has_good_criterion(d: &GoalDraft) -> bool {
    match (&d.success_criterion, d.goal_type) {
        (None, _) => false,
        (Some(c), Some(t)) if t.is_numeric() => c.values().is_some(),
        (Some(_), _) => true,
    }
}

fn goal_ambitious_change(d: &GoalDraft) -> bool {
    if !matches!(d.goal_type, Some(GoalType::Increase | GoalType::Decrease)) {
        return false;
    }
    match d.success_criterion.as_ref().and_then(|c| c.values()) {
        Some((current, target)) if current > 0.0 => {
            ((target - current) / current * 100.0).abs() >= 50.0
        }
        _ => false,
    }
}

fn goal_ambitious_percentage(d: &GoalDraft) -> bool {
    if d.goal_type != Some(GoalType::Percentage) {
        return false;
    }
    d.success_criterion
        .as_ref()
        .and_then(|c| c.values())
        .is_some_and(|(current, target)| target - current >= 20.0)
}

pub static GOAL_CREATION: Lazy<RuleSet<GoalDraft>> = Lazy::new(|| {
    RuleSet::<GoalDraft>::new(ActivityKind::GoalCreation, 40)
        .with_rule("Detailed description", 8, |d| detailed(&d.description))
        .with_rule("Well-defined criterion", 12, goal_has_good_criterion)
        .with_rule("Ambitious goal (≥50%)", 15, goal_ambitious_change)
        .with_rule("Ambitious goal (+20 points)", 15, goal_ambitious_percentage)
});

pub static GOAL_UPDATE: Lazy<RuleSet<GoalUpdateDraft>> = Lazy::new(|| {
    RuleSet::<GoalUpdateDraft>::new(ActivityKind::GoalUpdate, 20)
        .with_rule("Significant progress", 15, |d| {
            progress_jump(d.current_progress, d.new_progress)
        })
        .with_rule("Goal completed", 50, |d| {
            completes(d.current_progress, d.new_progress)
        })
        .with_rule("Detailed note", 15, |d| detailed(&d.note))
        .with_rule("Regression recorded", -5, |d| {
            regresses(d.current_progress, d.new_progress)
        })
});

pub static COMPETENCY_CREATION: Lazy<RuleSet<CompetencyDraft>> = Lazy::new(|| {
    RuleSet::<CompetencyDraft>::new(ActivityKind::CompetencyCreation, 100)
        .with_rule("Target above initial level", 40, |d| d.level_gap() > 0)
        .with_rule("Level gap of two or more", 50, |d| d.level_gap() >= 2)
        .with_rule("Detailed description", 15, |d| detailed(&d.description))
        .with_rule("Evidence attached", 30, |d| !d.evidences.is_empty())
        .with_rule("Three or more evidences", 30, |d| d.evidences.len() >= 3)
});

pub static COMPETENCY_UPDATE: Lazy<RuleSet<CompetencyUpdateDraft>> = Lazy::new(|| {
    RuleSet::<CompetencyUpdateDraft>::new(ActivityKind::CompetencyUpdate, 25)
        .with_rule("Significant progress", 15, |d| {
            progress_jump(d.current_progress, d.new_progress)
        })
        .with_rule("Level achieved", 40, |d| {
            completes(d.current_progress, d.new_progress)
        })
        .with_rule("Regression recorded", -5, |d| {
            regresses(d.current_progress, d.new_progress)
        })
});

pub static MENTORING: Lazy<RuleSet<MentoringDraft>> = Lazy::new(|| {
    RuleSet::<MentoringDraft>::new(ActivityKind::Mentoring, 35)
        .with_rule("Significant progress", 5, |d| {
            matches!((d.current_level, d.target_level), (Some(c), Some(t)) if t > c)
        })
        .with_rule("Detailed notes", 8, |d| detailed(&d.progress_notes))
        .with_rule("Actionable outcomes", 10, |d| {
            d.achievements.len() >= 2 && d.next_steps.len() >= 2
        })
        .with_rule("Challenges identified", 7, |d| !d.challenges.is_empty())
});

pub static CERTIFICATION: Lazy<RuleSet<CertificationDraft>> = Lazy::new(|| {
    RuleSet::<CertificationDraft>::new(ActivityKind::Certification, 50)
        .with_rule("Prestigious certification", 20, CertificationDraft::is_prestigious)
        .with_rule("Competencies mapped", 10, |d| d.competencies.len() >= 3)
        .with_rule("Learnings documented", 8, |d| d.learnings.len() >= 2)
        .with_rule("Application plan", 12, |d| d.applications.len() >= 2)
});

pub static ONE_ON_ONE: Lazy<RuleSet<OneOnOneDraft>> = Lazy::new(|| {
    RuleSet::<OneOnOneDraft>::new(ActivityKind::OneOnOne, 300)
        .with_rule("Working on", 50, |d| !d.working_on.is_empty())
        .with_rule("Positive points", 50, |d| !d.positive_points.is_empty())
        .with_rule("Improvement points", 50, |d| !d.improvement_points.is_empty())
        .with_rule("Next steps", 50, |d| !d.next_steps.is_empty())
        .with_rule("General notes", 50, |d| char_len(&d.general_notes) > 50)
});

macro_rules! scored {
    ($($draft:ty => $rules:ident),* $(,)?) => {
        $(
            impl Scored for $draft {
                fn rule_set() -> &'static RuleSet<Self> {
                    &$rules
                }
            }
        )*
    };
}

scored! {
    GoalDraft => GOAL_CREATION,
    GoalUpdateDraft => GOAL_UPDATE,
    CompetencyDraft => COMPETENCY_CREATION,
    CompetencyUpdateDraft => COMPETENCY_UPDATE,
    MentoringDraft => MENTORING,
    CertificationDraft => CERTIFICATION,
    OneOnOneDraft => ONE_ON_ONE,
}
