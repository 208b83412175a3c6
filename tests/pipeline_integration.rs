//! End-to-end pipeline runs against the data-driven fixtures in
//! `autograder-fixtures`, exercised without a sandbox (`Language::None`)
//! so these don't need a live Docker daemon.

use std::sync::Arc;

use async_trait::async_trait;

use autograder_core::criteria::config::CriteriaConfig;
use autograder_core::pipeline::steps::standard_steps;
use autograder_core::pipeline::{run_pipeline, synthesize_result, PipelineContext};
use autograder_core::sandbox::Sandbox;
use autograder_core::submission::{Language, Submission};
use autograder_core::template::{Params, RegistryTemplate, TestFunction, TestResult};

struct FixedScoreTest {
    name: &'static str,
    score: f64,
}

#[async_trait]
impl TestFunction for FixedScoreTest {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        _files: Option<&[(&str, &str)]>,
        _sandbox: Option<&dyn Sandbox>,
        _params: &Params,
    ) -> anyhow::Result<TestResult> {
        Ok(TestResult::new(self.score, format!("fixed score {}", self.score)))
    }
}

fn fixture_template() -> Arc<RegistryTemplate> {
    Arc::new(
        RegistryTemplate::new("integration-fixtures", "fixed-score test functions", false)
            .with_test(Arc::new(FixedScoreTest { name: "t_pass", score: 100.0 }))
            .with_test(Arc::new(FixedScoreTest { name: "t_fail", score: 0.0 }))
            .with_test(Arc::new(FixedScoreTest { name: "t_partial_50", score: 50.0 })),
    )
}

fn local_submission() -> Submission {
    let mut submission = Submission::new("ada", 1, 1, Language::None);
    for (name, content) in autograder_fixtures::SAMPLE_SUBMISSION_FILES {
        submission = submission.with_file(*name, *content);
    }
    submission
}

#[tokio::test]
async fn minimal_criteria_fixture_grades_to_the_flat_average() {
    let criteria_config: CriteriaConfig =
        toml::from_str(autograder_fixtures::MINIMAL_CRITERIA_TOML).expect("fixture parses");

    let mut ctx = PipelineContext::new(local_submission(), criteria_config, fixture_template());
    let execution = run_pipeline(&standard_steps(), &mut ctx).await;

    assert!(execution.failure().is_none(), "pipeline failed: {:?}", execution.failure());
    let result = synthesize_result(&ctx).expect("successful run synthesizes a result");
    assert!((result.result_tree.final_score - 75.0).abs() < 1e-9);
}

#[tokio::test]
async fn mixed_subjects_fixture_applies_the_asymmetric_split_and_bonus_penalty() {
    let criteria_config: CriteriaConfig =
        toml::from_str(autograder_fixtures::MIXED_SUBJECTS_CRITERIA_TOML).expect("fixture parses");

    let mut ctx = PipelineContext::new(local_submission(), criteria_config, fixture_template());
    let execution = run_pipeline(&standard_steps(), &mut ctx).await;

    assert!(execution.failure().is_none(), "pipeline failed: {:?}", execution.failure());
    let result = synthesize_result(&ctx).expect("successful run synthesizes a result");
    assert!((result.result_tree.final_score - 95.0).abs() < 1e-9);
}
