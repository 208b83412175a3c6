//! Grader: walks a [`CriteriaTree`] against a [`Submission`], invoking
//! each test function and assembling the [`ResultTree`].

use crate::criteria::{CategoryNode, CriteriaTree, FileTargetResolved, HolderChildren, SubjectNode, TestNode};
use crate::result::{CategoryResultNode, ResultChildren, ResultTree, SubjectResultNode, TestResultNode};
use crate::sandbox::Sandbox;
use crate::submission::Submission;
use crate::template::Template;

/// Grades one submission against one tree. Stateless beyond the
/// borrowed tree/template/submission/sandbox for the duration of a single
/// `grade` call; safe to construct per pipeline execution and discard.
pub struct Grader<'a> {
    pub tree: &'a CriteriaTree,
    pub template: &'a dyn Template,
    pub submission: &'a Submission,
    pub sandbox: Option<&'a dyn Sandbox>,
}

impl<'a> Grader<'a> {
    pub fn new(
        tree: &'a CriteriaTree,
        template: &'a dyn Template,
        submission: &'a Submission,
        sandbox: Option<&'a dyn Sandbox>,
    ) -> Self {
        Self { tree, template, submission, sandbox }
    }

    pub async fn grade(&self) -> ResultTree {
        let base = self.grade_category(&self.tree.base).await;
        let bonus = match &self.tree.bonus {
            Some(c) => Some(self.grade_category(c).await),
            None => None,
        };
        let penalty = match &self.tree.penalty {
            Some(c) => Some(self.grade_category(c).await),
            None => None,
        };
        let final_score = ResultTree::calculate_final_score(base.score, bonus.as_ref(), penalty.as_ref());
        ResultTree { base, bonus, penalty, final_score }
    }

    async fn grade_category(&self, node: &CategoryNode) -> CategoryResultNode {
        let (children, score) = self.grade_children(&node.children).await;
        CategoryResultNode { weight: node.weight, score, children }
    }

    async fn grade_subject(&self, node: &SubjectNode) -> SubjectResultNode {
        let (children, score) = self.grade_children(&node.children).await;
        SubjectResultNode {
            subject_name: node.subject_name.clone(),
            weight: node.weight,
            score,
            children,
        }
    }

    /// Grades a holder's children and combines them into the holder's own
    /// score in one pass, so a mixed holder's `subjects_factor` is
    /// available at the point it's needed: an asymmetric `subjects_factor`
    /// / `tests_factor = 1 - subjects_factor` split, not a single factor
    /// reused for both groups.
    fn grade_children<'b>(
        &'b self,
        children: &'b HolderChildren,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = (ResultChildren, f64)> + 'b>> {
        Box::pin(async move {
            match children {
                HolderChildren::Subjects(subjects) => {
                    let mut out = Vec::with_capacity(subjects.len());
                    for s in subjects {
                        out.push(self.grade_subject(s).await);
                    }
                    let score = weighted_sum(out.iter().map(|s| (s.score, s.weight)));
                    (ResultChildren::Subjects(rebalance_subjects(out)), score)
                }
                HolderChildren::Tests(tests) => {
                    let mut out = Vec::with_capacity(tests.len());
                    for t in tests {
                        out.push(self.grade_test(t).await);
                    }
                    let score = weighted_sum(out.iter().map(|t| (t.score, t.weight)));
                    (ResultChildren::Tests(rebalance_tests(out)), score)
                }
                HolderChildren::Mixed { subjects, tests, subjects_factor } => {
                    let mut s_out = Vec::with_capacity(subjects.len());
                    for s in subjects {
                        s_out.push(self.grade_subject(s).await);
                    }
                    let mut t_out = Vec::with_capacity(tests.len());
                    for t in tests {
                        t_out.push(self.grade_test(t).await);
                    }
                    let subjects_score = weighted_sum(s_out.iter().map(|s| (s.score, s.weight)));
                    let tests_score = weighted_sum(t_out.iter().map(|t| (t.score, t.weight)));
                    let score = subjects_score * subjects_factor + tests_score * (1.0 - subjects_factor);
                    (
                        ResultChildren::Mixed {
                            subjects: rebalance_subjects(s_out),
                            tests: rebalance_tests(t_out),
                            subjects_factor: *subjects_factor,
                        },
                        score,
                    )
                }
            }
        })
    }

    async fn grade_test(&self, node: &TestNode) -> TestResultNode {
        let files = self.resolve_files(node);
        let file_refs: Option<Vec<(&str, &str)>> = files
            .as_ref()
            .map(|v| v.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect());

        let sandbox = if self.template.requires_sandbox() { self.sandbox } else { None };

        match node.function.execute(file_refs.as_deref(), sandbox, &node.params).await {
            Ok(result) => TestResultNode {
                test_name: node.test_name.clone(),
                subject_name: None,
                score: result.score,
                report: result.report,
                parameters: result.parameters,
                weight: node.weight,
            },
            Err(e) => TestResultNode {
                test_name: node.test_name.clone(),
                subject_name: None,
                score: 0.0,
                report: format!("test execution error: {e}"),
                parameters: node.params.clone(),
                weight: node.weight,
            },
        }
    }

    /// Resolves a test's `file_target` against the submission's files.
    /// `All` returns every file; a missing named file is dropped (not an
    /// error) — the test function decides how to react to its absence via
    /// a zero-ish score, matching the rule that a missing file produces a
    /// zero-score result with a clear report rather than aborting, for the
    /// case where *no* named files resolve.
    fn resolve_files(&self, node: &TestNode) -> Option<Vec<(String, String)>> {
        match &node.file_target {
            None => None,
            Some(FileTargetResolved::All) => Some(
                self.submission
                    .files
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            Some(FileTargetResolved::Named(names)) => {
                let found: Vec<(String, String)> = names
                    .iter()
                    .filter_map(|n| self.submission.files.get(n).map(|content| (n.clone(), content.clone())))
                    .collect();
                Some(found)
            }
        }
    }
}

fn weighted_sum(items: impl Iterator<Item = (f64, f64)>) -> f64 {
    items.map(|(score, weight)| score * weight / 100.0).sum()
}

/// If every child in a group produced a result, weights are already
/// normalized at build time and nothing to do. This hook exists so a
/// holder whose child test genuinely could not run could be rebalanced
/// post-hoc; the current template contract always returns a
/// `TestResultNode` (failures become zero-score results), so there is
/// currently nothing to drop — kept as a pass-through for that rarer
/// path.
fn rebalance_subjects(subjects: Vec<SubjectResultNode>) -> Vec<SubjectResultNode> {
    subjects
}

fn rebalance_tests(tests: Vec<TestResultNode>) -> Vec<TestResultNode> {
    tests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::build_tree;
    use crate::criteria::config::{CategoryConfig, CriteriaConfig, SubjectConfig, TestConfig};
    use crate::submission::Language;
    use crate::template::fixtures::fixture_template;

    fn test_config(name: &str) -> TestConfig {
        TestConfig { name: name.to_string(), file_target: None, parameters: None }
    }

    #[tokio::test]
    async fn two_subjects_weighted_60_40() {
        let template = fixture_template();
        let config = CriteriaConfig {
            test_library: None,
            base: CategoryConfig {
                weight: 100.0,
                subjects_weight: None,
                subjects: Some(vec![
                    SubjectConfig {
                        subject_name: "a".to_string(),
                        weight: 60.0,
                        subjects_weight: None,
                        subjects: None,
                        tests: Some(vec![test_config("t_pass")]),
                    },
                    SubjectConfig {
                        subject_name: "b".to_string(),
                        weight: 40.0,
                        subjects_weight: None,
                        subjects: None,
                        tests: Some(vec![test_config("t_fail")]),
                    },
                ]),
                tests: None,
            },
            bonus: None,
            penalty: None,
        };
        let tree = build_tree(&config, &template).unwrap();
        let submission = Submission::new("ada", 1, 1, Language::None);
        let grader = Grader::new(&tree, &template, &submission, None);
        let result = grader.grade().await;
        assert!((result.final_score - 60.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn additive_bonus_raises_final_score() {
        let template = fixture_template();
        let config = CriteriaConfig {
            test_library: None,
            base: CategoryConfig {
                weight: 100.0,
                subjects_weight: None,
                subjects: Some(vec![
                    SubjectConfig {
                        subject_name: "a".to_string(),
                        weight: 60.0,
                        subjects_weight: None,
                        subjects: None,
                        tests: Some(vec![test_config("t_pass")]),
                    },
                    SubjectConfig {
                        subject_name: "b".to_string(),
                        weight: 40.0,
                        subjects_weight: None,
                        subjects: None,
                        tests: Some(vec![test_config("t_fail")]),
                    },
                ]),
                tests: None,
            },
            bonus: Some(CategoryConfig {
                weight: 20.0,
                subjects_weight: None,
                subjects: None,
                tests: Some(vec![test_config("t_partial_50")]),
            }),
            penalty: None,
        };
        let tree = build_tree(&config, &template).unwrap();
        let submission = Submission::new("ada", 1, 1, Language::None);
        let grader = Grader::new(&tree, &template, &submission, None);
        let result = grader.grade().await;
        assert!((result.final_score - 70.0).abs() < 1e-9);
    }
}
