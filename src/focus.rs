//! Focus service: ranks individual tests by their impact on the final
//! root score. Purely derivative — never mutates the result tree.

use crate::result::{CategoryResultNode, ResultChildren, ResultTree, SubjectResultNode, TestResultNode};

/// One test's ranked contribution to a category's final score.
#[derive(Debug, Clone)]
pub struct FocusEntry {
    pub test_name: String,
    pub subject_path: Vec<String>,
    pub score: f64,
    pub impact: f64,
}

/// The three ranked lists produced for one result tree.
#[derive(Debug, Clone, Default)]
pub struct FocusReport {
    pub base: Vec<FocusEntry>,
    pub bonus: Vec<FocusEntry>,
    pub penalty: Vec<FocusEntry>,
}

/// Computes impact for every leaf across `result` and returns each
/// category's tests ranked descending by impact.
///
/// `impact = (100 - test.score) * cumulative_weight_multiplier`, where the
/// multiplier is the product of `weight/100` along the path from the
/// category root to the test, honoring `subjects_weight` splits at mixed
/// holders exactly as the grader's own aggregation does.
pub fn compute_focus(result: &ResultTree) -> FocusReport {
    FocusReport {
        base: ranked(&result.base, 1.0),
        bonus: result.bonus.as_ref().map(|c| ranked(c, 1.0)).unwrap_or_default(),
        penalty: result.penalty.as_ref().map(|c| ranked(c, 1.0)).unwrap_or_default(),
    }
}

fn ranked(category: &CategoryResultNode, inherited_multiplier: f64) -> Vec<FocusEntry> {
    let mut entries = Vec::new();
    walk_children(&category.children, inherited_multiplier * (category.weight / 100.0), &mut Vec::new(), &mut entries);
    entries.sort_by(|a, b| b.impact.partial_cmp(&a.impact).unwrap_or(std::cmp::Ordering::Equal));
    entries
}

fn walk_children(
    children: &ResultChildren,
    multiplier: f64,
    path: &mut Vec<String>,
    out: &mut Vec<FocusEntry>,
) {
    match children {
        ResultChildren::Subjects(subjects) => {
            for s in subjects {
                walk_subject(s, multiplier, path, out);
            }
        }
        ResultChildren::Tests(tests) => {
            for t in tests {
                push_test(t, multiplier, path, out);
            }
        }
        ResultChildren::Mixed { subjects, tests, subjects_factor } => {
            let subjects_multiplier = multiplier * subjects_factor;
            let tests_multiplier = multiplier * (1.0 - subjects_factor);
            for s in subjects {
                walk_subject(s, subjects_multiplier, path, out);
            }
            for t in tests {
                push_test(t, tests_multiplier, path, out);
            }
        }
    }
}

fn walk_subject(subject: &SubjectResultNode, multiplier: f64, path: &mut Vec<String>, out: &mut Vec<FocusEntry>) {
    path.push(subject.subject_name.clone());
    walk_children(&subject.children, multiplier * (subject.weight / 100.0), path, out);
    path.pop();
}

fn push_test(test: &TestResultNode, multiplier: f64, path: &[String], out: &mut Vec<FocusEntry>) {
    let cumulative = multiplier * (test.weight / 100.0);
    out.push(FocusEntry {
        test_name: test.test_name.clone(),
        subject_path: path.to_vec(),
        score: test.score,
        impact: (100.0 - test.score) * cumulative,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(name: &str, score: f64, weight: f64) -> TestResultNode {
        TestResultNode {
            test_name: name.to_string(),
            subject_name: None,
            score,
            report: String::new(),
            parameters: Default::default(),
            weight,
        }
    }

    #[test]
    fn ranks_worse_tests_higher_within_equal_weights() {
        let category = CategoryResultNode {
            weight: 100.0,
            score: 50.0,
            children: ResultChildren::Tests(vec![test_node("good", 90.0, 50.0), test_node("bad", 10.0, 50.0)]),
        };
        let report = ranked(&category, 1.0);
        assert_eq!(report[0].test_name, "bad");
        assert_eq!(report[1].test_name, "good");
    }

    #[test]
    fn zero_score_test_has_maximal_impact_at_full_weight() {
        let category = CategoryResultNode {
            weight: 100.0,
            score: 0.0,
            children: ResultChildren::Tests(vec![test_node("t", 0.0, 100.0)]),
        };
        let report = ranked(&category, 1.0);
        assert!((report[0].impact - 100.0).abs() < 1e-9);
    }

    #[test]
    fn mixed_holder_splits_multiplier_by_subjects_factor() {
        let subject = SubjectResultNode {
            subject_name: "core".to_string(),
            weight: 100.0,
            score: 0.0,
            children: ResultChildren::Tests(vec![test_node("in_subject", 0.0, 100.0)]),
        };
        let category = CategoryResultNode {
            weight: 100.0,
            score: 0.0,
            children: ResultChildren::Mixed {
                subjects: vec![subject],
                tests: vec![test_node("direct", 0.0, 100.0)],
                subjects_factor: 0.7,
            },
        };
        let report = ranked(&category, 1.0);
        assert_eq!(report[0].test_name, "in_subject");
        assert_eq!(report[1].test_name, "direct");
        assert!((report[0].impact - 70.0).abs() < 1e-9);
        assert!((report[1].impact - 30.0).abs() < 1e-9);
    }
}
