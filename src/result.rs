//! Result tree: the per-submission scored mirror of the criteria tree.
//! Built fresh by the [`crate::grader::Grader`] for every submission.

use serde::{Deserialize, Serialize};

use crate::template::Params;

/// One test invocation's outcome, attached to its owning subject for
/// feedback/focus rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResultNode {
    pub test_name: String,
    pub subject_name: Option<String>,
    pub score: f64,
    pub report: String,
    pub parameters: Params,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectResultNode {
    pub subject_name: String,
    pub weight: f64,
    pub score: f64,
    pub children: ResultChildren,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResultNode {
    pub weight: f64,
    pub score: f64,
    pub children: ResultChildren,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultChildren {
    Subjects(Vec<SubjectResultNode>),
    Tests(Vec<TestResultNode>),
    Mixed {
        subjects: Vec<SubjectResultNode>,
        tests: Vec<TestResultNode>,
        subjects_factor: f64,
    },
}

/// The finished, scored tree, isomorphic to the [`crate::criteria::CriteriaTree`]
/// it was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultTree {
    pub base: CategoryResultNode,
    pub bonus: Option<CategoryResultNode>,
    pub penalty: Option<CategoryResultNode>,
    pub final_score: f64,
}

impl ResultTree {
    /// Root scoring policy: base plus an additive bonus contribution,
    /// minus a subtractive penalty contribution, clamped to `[0, 100]`.
    /// `bonus`/`penalty` weights here are declared maxima, not fractions;
    /// their absence contributes 0.
    pub fn calculate_final_score(
        base_score: f64,
        bonus: Option<&CategoryResultNode>,
        penalty: Option<&CategoryResultNode>,
    ) -> f64 {
        let bonus_points = bonus.map(|b| (b.score / 100.0) * b.weight).unwrap_or(0.0);
        let penalty_points = penalty.map(|p| (p.score / 100.0) * p.weight).unwrap_or(0.0);
        (base_score + bonus_points - penalty_points).clamp(0.0, 100.0)
    }
}

/// Weighted average of a holder's children on a 0-100 scale, honoring the
/// asymmetric subjects/tests split where a holder mixes both.
pub fn weighted_child_score(children: &ResultChildren) -> f64 {
    match children {
        ResultChildren::Subjects(subjects) => {
            subjects.iter().map(|s| s.score * s.weight / 100.0).sum()
        }
        ResultChildren::Tests(tests) => tests.iter().map(|t| t.score * t.weight / 100.0).sum(),
        ResultChildren::Mixed { subjects, tests, subjects_factor } => {
            let subjects_score: f64 = subjects.iter().map(|s| s.score * s.weight / 100.0).sum();
            let tests_score: f64 = tests.iter().map(|t| t.score * t.weight / 100.0).sum();
            subjects_score * subjects_factor + tests_score * (1.0 - subjects_factor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(score: f64, weight: f64) -> CategoryResultNode {
        CategoryResultNode {
            weight,
            score,
            children: ResultChildren::Tests(vec![]),
        }
    }

    #[test]
    fn weighted_base_only() {
        let score = ResultTree::calculate_final_score(60.0, None, None);
        assert!((score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn additive_bonus() {
        let bonus = category(50.0, 20.0);
        let score = ResultTree::calculate_final_score(60.0, Some(&bonus), None);
        assert!((score - 70.0).abs() < 1e-9);
    }

    #[test]
    fn subtractive_penalty_clamped() {
        let bonus = category(50.0, 20.0);
        let penalty = category(100.0, 30.0);
        let score = ResultTree::calculate_final_score(60.0, Some(&bonus), Some(&penalty));
        assert!((score - 40.0).abs() < 1e-9);
    }

    #[test]
    fn final_score_never_exceeds_bounds() {
        let bonus = category(100.0, 100.0);
        let score = ResultTree::calculate_final_score(100.0, Some(&bonus), None);
        assert_eq!(score, 100.0);

        let penalty = category(100.0, 100.0);
        let score = ResultTree::calculate_final_score(0.0, None, Some(&penalty));
        assert_eq!(score, 0.0);
    }
}
