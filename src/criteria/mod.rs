//! Criteria tree: the normalized, weighted rubric bound to test functions.
//! Built once per criteria config and shared (`Arc`) across concurrent
//! graders.

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;

use config::{CategoryConfig, CriteriaConfig, FileTarget, NameValue, ParametersConfig, SubjectConfig, TestConfig};
use serde_json::Value;

use crate::template::{Params, Template};

/// Errors raised while building a criteria tree from its raw config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("holder '{holder}' declares both 'subjects' and 'tests'")]
    MixedChildKinds { holder: String },

    #[error("holder '{holder}' has neither 'subjects' nor 'tests'")]
    EmptyHolder { holder: String },

    #[error("holder '{holder}' mixes subjects and tests but has no subjects_weight")]
    MissingSubjectsWeight { holder: String },

    #[error("holder '{holder}' has subjects_weight {value} outside [0, 100]")]
    SubjectsWeightOutOfRange { holder: String, value: f64 },

    #[error("unknown test '{name}' in holder '{holder}': not exposed by the loaded template")]
    UnknownTest { holder: String, name: String },

    #[error("category weight must be non-negative, got {value} in '{holder}'")]
    NegativeWeight { holder: String, value: f64 },
}

/// One of `base`/`bonus`/`penalty` at the top of the tree.
pub struct CategoryNode {
    pub weight: f64,
    pub children: HolderChildren,
}

/// A subject: a named grouping of tests or further subjects.
pub struct SubjectNode {
    pub subject_name: String,
    pub weight: f64,
    pub children: HolderChildren,
}

/// A leaf: a bound, ready-to-invoke test.
pub struct TestNode {
    pub test_name: String,
    pub weight: f64,
    pub file_target: Option<FileTargetResolved>,
    pub params: Params,
    pub function: Arc<dyn crate::template::TestFunction>,
}

/// Resolved file-target selector for a test node.
#[derive(Debug, Clone)]
pub enum FileTargetResolved {
    All,
    Named(Vec<String>),
}

/// Either a holder's subjects, its tests, or a weighted split of both
/// (when `subjects_weight` is present).
pub enum HolderChildren {
    Subjects(Vec<SubjectNode>),
    Tests(Vec<TestNode>),
    Mixed {
        subjects: Vec<SubjectNode>,
        tests: Vec<TestNode>,
        /// `subjects_weight / 100`, used for an asymmetric subjects/tests
        /// split when a holder mixes both kinds of children.
        subjects_factor: f64,
    },
}

/// The whole normalized tree: one mandatory `base`, optional `bonus` and
/// `penalty`.
pub struct CriteriaTree {
    pub base: CategoryNode,
    pub bonus: Option<CategoryNode>,
    pub penalty: Option<CategoryNode>,
}

/// Builds a [`CriteriaTree`] from raw config, resolving test names against
/// `template` and normalizing every sibling-weight group to sum to 100.
pub fn build_tree(config: &CriteriaConfig, template: &dyn Template) -> Result<CriteriaTree, ConfigError> {
    let base = build_category(&config.base, "base", template)?;
    let bonus = config
        .bonus
        .as_ref()
        .map(|c| build_category(c, "bonus", template))
        .transpose()?;
    let penalty = config
        .penalty
        .as_ref()
        .map(|c| build_category(c, "penalty", template))
        .transpose()?;
    Ok(CriteriaTree { base, bonus, penalty })
}

fn build_category(config: &CategoryConfig, holder: &str, template: &dyn Template) -> Result<CategoryNode, ConfigError> {
    if config.weight < 0.0 {
        return Err(ConfigError::NegativeWeight {
            holder: holder.to_string(),
            value: config.weight,
        });
    }
    let children = build_children(
        holder,
        config.subjects.as_deref(),
        config.tests.as_deref(),
        config.subjects_weight,
        template,
    )?;
    Ok(CategoryNode {
        weight: config.weight,
        children,
    })
}

fn build_subject(config: &SubjectConfig, parent_path: &str, template: &dyn Template) -> Result<SubjectNode, ConfigError> {
    let holder = format!("{parent_path}/{}", config.subject_name);
    let children = build_children(
        &holder,
        config.subjects.as_deref(),
        config.tests.as_deref(),
        config.subjects_weight,
        template,
    )?;
    Ok(SubjectNode {
        subject_name: config.subject_name.clone(),
        weight: config.weight,
        children,
    })
}

fn build_children(
    holder: &str,
    subjects: Option<&[SubjectConfig]>,
    tests: Option<&[TestConfig]>,
    subjects_weight: Option<f64>,
    template: &dyn Template,
) -> Result<HolderChildren, ConfigError> {
    let has_subjects = subjects.is_some_and(|s| !s.is_empty());
    let has_tests = tests.is_some_and(|t| !t.is_empty());

    match (has_subjects, has_tests) {
        (true, true) => {
            let sw = subjects_weight.ok_or_else(|| ConfigError::MissingSubjectsWeight {
                holder: holder.to_string(),
            })?;
            if !(0.0..=100.0).contains(&sw) {
                return Err(ConfigError::SubjectsWeightOutOfRange {
                    holder: holder.to_string(),
                    value: sw,
                });
            }
            let subjects = build_subjects(subjects.unwrap(), holder, template)?;
            let tests = build_tests(tests.unwrap(), holder, template)?;
            Ok(HolderChildren::Mixed {
                subjects,
                tests,
                subjects_factor: sw / 100.0,
            })
        }
        (true, false) => Ok(HolderChildren::Subjects(build_subjects(subjects.unwrap(), holder, template)?)),
        (false, true) => Ok(HolderChildren::Tests(build_tests(tests.unwrap(), holder, template)?)),
        (false, false) => Err(ConfigError::EmptyHolder {
            holder: holder.to_string(),
        }),
    }
}

fn build_subjects(configs: &[SubjectConfig], holder: &str, template: &dyn Template) -> Result<Vec<SubjectNode>, ConfigError> {
    let mut nodes = configs
        .iter()
        .map(|c| build_subject(c, holder, template))
        .collect::<Result<Vec<_>, _>>()?;
    normalize_weights(nodes.iter_mut().map(|n| &mut n.weight));
    Ok(nodes)
}

fn build_tests(configs: &[TestConfig], holder: &str, template: &dyn Template) -> Result<Vec<TestNode>, ConfigError> {
    let mut nodes = configs
        .iter()
        .map(|c| build_test(c, holder, template))
        .collect::<Result<Vec<_>, _>>()?;
    normalize_weights(nodes.iter_mut().map(|n| &mut n.weight));
    Ok(nodes)
}

fn build_test(config: &TestConfig, holder: &str, template: &dyn Template) -> Result<TestNode, ConfigError> {
    let function = template
        .get_test(&config.name)
        .ok_or_else(|| ConfigError::UnknownTest {
            holder: holder.to_string(),
            name: config.name.clone(),
        })?;

    let file_target = config.file_target.as_ref().map(|ft| {
        if ft.is_all() {
            FileTargetResolved::All
        } else {
            FileTargetResolved::Named(ft.names())
        }
    });

    Ok(TestNode {
        test_name: config.name.clone(),
        // Tests don't carry their own declared weight; they inherit equal
        // standing among siblings and are normalized the same way subjects
        // are.
        weight: 1.0,
        file_target,
        params: normalize_params(config.parameters.as_ref()),
        function,
    })
}

/// Sibling-weight normalization: rescale siblings to sum to 100, or split
/// evenly if the declared sum is 0.
fn normalize_weights<'a>(weights: impl Iterator<Item = &'a mut f64>) {
    let weights: Vec<&mut f64> = weights.collect();
    let n = weights.len();
    if n == 0 {
        return;
    }
    let sum: f64 = weights.iter().map(|w| **w).sum();
    if sum == 0.0 {
        let even = 100.0 / n as f64;
        for w in weights {
            *w = even;
        }
    } else {
        let scale = 100.0 / sum;
        for w in weights {
            *w *= scale;
        }
    }
}

/// Collapses the three parameter shapes to a named mapping.
fn normalize_params(config: Option<&ParametersConfig>) -> Params {
    match config {
        None => Params::new(),
        Some(ParametersConfig::Named(map)) => map.clone(),
        Some(ParametersConfig::NameValuePairs(pairs)) => {
            pairs.iter().map(|NameValue { name, value }| (name.clone(), value.clone())).collect()
        }
        Some(ParametersConfig::Positional(values)) => values
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("arg{i}"), v.clone()))
            .collect::<HashMap<String, Value>>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::fixtures::fixture_template;

    fn test_config(name: &str) -> TestConfig {
        TestConfig {
            name: name.to_string(),
            file_target: None,
            parameters: None,
        }
    }

    #[test]
    fn rejects_mixed_subjects_and_tests_without_split() {
        let template = fixture_template();
        let config = CriteriaConfig {
            test_library: None,
            base: CategoryConfig {
                weight: 100.0,
                subjects_weight: None,
                subjects: Some(vec![SubjectConfig {
                    subject_name: "a".to_string(),
                    weight: 50.0,
                    subjects_weight: None,
                    subjects: None,
                    tests: Some(vec![test_config("t_pass")]),
                }]),
                tests: Some(vec![test_config("t_fail")]),
            },
            bonus: None,
            penalty: None,
        };
        let err = build_tree(&config, &template).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSubjectsWeight { .. }));
    }

    #[test]
    fn unknown_test_name_is_rejected() {
        let template = fixture_template();
        let config = CriteriaConfig {
            test_library: None,
            base: CategoryConfig {
                weight: 100.0,
                subjects_weight: None,
                subjects: None,
                tests: Some(vec![test_config("t_does_not_exist")]),
            },
            bonus: None,
            penalty: None,
        };
        let err = build_tree(&config, &template).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTest { .. }));
    }

    #[test]
    fn unbalanced_weights_normalize_to_100() {
        let template = fixture_template();
        let config = CriteriaConfig {
            test_library: None,
            base: CategoryConfig {
                weight: 100.0,
                subjects_weight: None,
                subjects: Some(vec![
                    SubjectConfig {
                        subject_name: "a".to_string(),
                        weight: 10.0,
                        subjects_weight: None,
                        subjects: None,
                        tests: Some(vec![test_config("t_pass")]),
                    },
                    SubjectConfig {
                        subject_name: "b".to_string(),
                        weight: 30.0,
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
        let HolderChildren::Subjects(subjects) = tree.base.children else {
            panic!("expected subjects")
        };
        assert_eq!(subjects.len(), 2);
        assert!((subjects[0].weight - 25.0).abs() < 1e-9);
        assert!((subjects[1].weight - 75.0).abs() < 1e-9);
    }

    #[test]
    fn all_zero_weights_split_evenly() {
        let template = fixture_template();
        let config = CriteriaConfig {
            test_library: None,
            base: CategoryConfig {
                weight: 100.0,
                subjects_weight: None,
                subjects: None,
                tests: Some(vec![test_config("t_pass"), test_config("t_fail"), test_config("t_partial_50")]),
            },
            bonus: None,
            penalty: None,
        };
        let tree = build_tree(&config, &template).unwrap();
        let HolderChildren::Tests(tests) = tree.base.children else {
            panic!("expected tests")
        };
        for t in &tests {
            assert!((t.weight - 100.0 / 3.0).abs() < 1e-9);
        }
    }
}
