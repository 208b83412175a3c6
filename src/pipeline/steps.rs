//! Concrete step implementations, one per ordered pipeline identity.

use async_trait::async_trait;

use crate::criteria::build_tree;
use crate::external::GradingResult;
use crate::focus::compute_focus;
use crate::grader::Grader;
use crate::preflight::PreflightService;
use crate::submission::Language;

use super::{PipelineContext, Step, StepName, StepOutcome};

/// Always the first step: records that the raw submission was accepted
/// into the pipeline. Never fails on its own — a submission already
/// constructed a [`PipelineContext`] around itself.
pub struct BootstrapStep;

#[async_trait]
impl Step for BootstrapStep {
    fn name(&self) -> StepName {
        StepName::Bootstrap
    }

    async fn execute(&self, _ctx: &mut PipelineContext) -> StepOutcome {
        Ok(())
    }
}

/// Acquires a sandbox for the submission's language, stages its files,
/// and runs the two preflight phases. Skipped entirely for
/// [`Language::None`] submissions, which never touch a sandbox.
pub struct PreFlightStep;

#[async_trait]
impl Step for PreFlightStep {
    fn name(&self) -> StepName {
        StepName::PreFlight
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StepOutcome {
        if ctx.submission.language == Language::None {
            return Ok(());
        }
        let manager = ctx
            .sandbox_manager
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no sandbox manager configured for a sandboxed submission"))?;

        let sandbox = manager.get_sandbox(ctx.submission.language).await?;

        let files: Vec<(String, String)> = ctx.submission.files.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        if let Err(e) = sandbox.prepare_workdir(&files).await {
            manager.release_sandbox(ctx.submission.language, sandbox).await;
            return Err(anyhow::Error::from(e).context("failed to stage submission workdir"));
        }

        let service = PreflightService::new(&ctx.preflight_config);
        if let Err(e) = service.check_required_files(&ctx.submission) {
            manager.release_sandbox(ctx.submission.language, sandbox).await;
            return Err(e.into());
        }
        if let Err(e) = service.run_setup_commands(&ctx.submission, sandbox.as_ref()).await {
            manager.release_sandbox(ctx.submission.language, sandbox).await;
            return Err(e.into());
        }

        ctx.sandbox = Some(sandbox);
        Ok(())
    }
}

/// Confirms a template was supplied; the template itself is a build-time
/// registered bundle handed to the pipeline at construction, not loaded
/// dynamically.
pub struct LoadTemplateStep;

#[async_trait]
impl Step for LoadTemplateStep {
    fn name(&self) -> StepName {
        StepName::LoadTemplate
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StepOutcome {
        if ctx.template.name().is_empty() {
            return Err(anyhow::anyhow!("template has no name; refusing to grade against it"));
        }
        Ok(())
    }
}

/// Builds the normalized criteria tree against the loaded template.
pub struct BuildTreeStep;

#[async_trait]
impl Step for BuildTreeStep {
    fn name(&self) -> StepName {
        StepName::BuildTree
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let tree = build_tree(&ctx.criteria_config, ctx.template.as_ref())?;
        ctx.tree = Some(tree);
        Ok(())
    }
}

/// Walks the criteria tree against the submission, producing the result
/// tree.
pub struct GradeStep;

#[async_trait]
impl Step for GradeStep {
    fn name(&self) -> StepName {
        StepName::Grade
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let tree = ctx.tree.as_ref().ok_or_else(|| anyhow::anyhow!("no criteria tree built before grading"))?;
        let sandbox_ref = ctx.sandbox.as_deref();
        let grader = Grader::new(tree, ctx.template.as_ref(), &ctx.submission, sandbox_ref);
        ctx.result_tree = Some(grader.grade().await);
        Ok(())
    }
}

/// Renders human feedback text from the result tree, when a generator was
/// configured. A missing generator is not a failure — feedback is
/// optional.
pub struct FeedbackStep;

#[async_trait]
impl Step for FeedbackStep {
    fn name(&self) -> StepName {
        StepName::Feedback
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let Some(generator) = ctx.feedback_generator.clone() else {
            return Ok(());
        };
        let result_tree = ctx
            .result_tree
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no result tree to generate feedback from"))?;
        let feedback = generator.generate(result_tree, &ctx.feedback_preferences).await?;
        ctx.feedback = Some(feedback);
        Ok(())
    }
}

/// Ranks tests by impact on the final score.
pub struct FocusStep;

#[async_trait]
impl Step for FocusStep {
    fn name(&self) -> StepName {
        StepName::Focus
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let result_tree = ctx.result_tree.as_ref().ok_or_else(|| anyhow::anyhow!("no result tree to focus on"))?;
        ctx.focus = Some(compute_focus(result_tree));
        Ok(())
    }
}

/// Ships the finished [`GradingResult`] onward, when an exporter was
/// configured.
pub struct ExportStep;

#[async_trait]
impl Step for ExportStep {
    fn name(&self) -> StepName {
        StepName::Export
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StepOutcome {
        let Some(exporter) = ctx.exporter.clone() else {
            return Ok(());
        };
        let result_tree = ctx.result_tree.clone().ok_or_else(|| anyhow::anyhow!("no result tree to export"))?;
        let result = GradingResult { result_tree, feedback: ctx.feedback.clone() };
        exporter.export(&result).await
    }
}

/// The standard step order: every identity, in sequence.
pub fn standard_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(BootstrapStep),
        Box::new(PreFlightStep),
        Box::new(LoadTemplateStep),
        Box::new(BuildTreeStep),
        Box::new(GradeStep),
        Box::new(FeedbackStep),
        Box::new(FocusStep),
        Box::new(ExportStep),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::criteria::config::{CategoryConfig, CriteriaConfig, TestConfig};
    use crate::external::fakes::{InMemoryExporter, StaticFeedbackGenerator};
    use crate::pipeline::{run_pipeline, synthesize_result, PipelineContext, PipelineStatus};
    use crate::submission::Submission;
    use crate::template::fixtures::fixture_template;

    fn test_config(name: &str) -> TestConfig {
        TestConfig { name: name.to_string(), file_target: None, parameters: None }
    }

    fn passing_config() -> CriteriaConfig {
        CriteriaConfig {
            test_library: None,
            base: CategoryConfig {
                weight: 100.0,
                subjects_weight: None,
                subjects: None,
                tests: Some(vec![test_config("t_pass")]),
            },
            bonus: None,
            penalty: None,
        }
    }

    #[tokio::test]
    async fn scenario_successful_run_synthesizes_result() {
        let template = Arc::new(fixture_template());
        let submission = Submission::new("ada", 1, 1, Language::None);
        let mut ctx = PipelineContext::new(submission, passing_config(), template);
        ctx.feedback_generator = Some(Arc::new(StaticFeedbackGenerator("nice work".to_string())));
        ctx.exporter = Some(Arc::new(InMemoryExporter::default()));

        let execution = run_pipeline(&standard_steps(), &mut ctx).await;
        assert_eq!(execution.status, PipelineStatus::Success);

        let result = synthesize_result(&ctx).expect("result should be synthesized on success");
        assert!((result.result_tree.final_score - 100.0).abs() < 1e-9);
        assert_eq!(result.feedback.as_deref(), Some("nice work"));
    }

    #[tokio::test]
    async fn successful_run_stops_the_template_once() {
        use crate::template::fixtures::CountingStopTemplate;
        use std::sync::atomic::Ordering;

        let template = Arc::new(CountingStopTemplate::new());
        let submission = Submission::new("ada", 1, 1, Language::None);
        let mut ctx = PipelineContext::new(submission, passing_config(), template.clone());

        let execution = run_pipeline(&standard_steps(), &mut ctx).await;
        assert_eq!(execution.status, PipelineStatus::Success);
        assert_eq!(template.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn build_tree_failure_short_circuits_and_records_step() {
        let template = Arc::new(fixture_template());
        let mut bad_config = passing_config();
        bad_config.base.tests = Some(vec![test_config("does_not_exist")]);
        let submission = Submission::new("ada", 1, 1, Language::None);
        let mut ctx = PipelineContext::new(submission, bad_config, template);

        let execution = run_pipeline(&standard_steps(), &mut ctx).await;
        assert_eq!(execution.status, PipelineStatus::Failed);
        let (step, _) = execution.failure().expect("expected a recorded failure");
        assert_eq!(step, StepName::BuildTree);
        assert!(synthesize_result(&ctx).is_none());
    }
}
