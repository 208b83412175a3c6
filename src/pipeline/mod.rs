//! Grading pipeline: an ordered list of [`Step`]s, each a morphism over a
//! shared [`PipelineContext`], appending one [`StepResult`] to a
//! [`PipelineExecution`] log. The first failure short-circuits the
//! remaining steps but the execution is still finalized and returned.

pub mod steps;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::criteria::CriteriaTree;
use crate::criteria::config::CriteriaConfig;
use crate::external::{Exporter, FeedbackGenerator, FeedbackPreferences, GradingResult};
use crate::focus::FocusReport;
use crate::preflight::PreflightConfig;
use crate::result::ResultTree;
use crate::sandbox::Sandbox;
use crate::sandbox::manager::SandboxManager;
use crate::submission::Submission;
use crate::template::Template;

/// Ordered step identities. `PreFlight`, `Feedback`, `Focus`, and `Export`
/// are optional in the sense that a caller may build a pipeline without
/// them; the executor itself treats every configured step the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepName {
    Bootstrap,
    PreFlight,
    LoadTemplate,
    BuildTree,
    Grade,
    Feedback,
    Focus,
    Export,
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

/// One step's recorded outcome, appended to the execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepName,
    pub status: StepStatus,
    pub error: Option<String>,
}

/// What a step reports back to the executor. A step's `Err` is caught by
/// the executor exactly like an explicit `Failed` — the two shapes merge
/// into one [`StepResult`]. Kept as `anyhow::Error` rather than a
/// pre-formatted string so the concrete error kind (`PreflightError`,
/// `SandboxError`, `ConfigError`, ...) survives to the executor, which can
/// `downcast_ref` on it before flattening to the execution log's
/// `String` — distinguishing a preflight failure from a sandbox
/// failure that both surface at PRE_FLIGHT.
pub type StepOutcome = Result<(), anyhow::Error>;

/// Status of the pipeline execution as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Empty,
    Running,
    Success,
    Failed,
    Interrupted,
}

/// The append-only log of step outcomes for one submission's run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub status: PipelineStatus,
    pub results: Vec<StepResult>,
}

impl PipelineExecution {
    fn new() -> Self {
        Self { status: PipelineStatus::Empty, results: Vec::new() }
    }

    fn record(&mut self, step: StepName, outcome: &StepOutcome) {
        let status = if outcome.is_ok() { StepStatus::Success } else { StepStatus::Failed };
        let error = outcome.as_ref().err().map(|e| {
            if let Some(e) = e.downcast_ref::<crate::preflight::PreflightError>() {
                tracing::error!(step = %step, kind = "preflight", "{e}");
            } else if let Some(e) = e.downcast_ref::<crate::sandbox::SandboxError>() {
                tracing::error!(step = %step, kind = "sandbox", "{e}");
            } else if let Some(e) = e.downcast_ref::<crate::sandbox::pool::PoolError>() {
                tracing::error!(step = %step, kind = "pool", "{e}");
            } else if let Some(e) = e.downcast_ref::<crate::sandbox::manager::ManagerError>() {
                tracing::error!(step = %step, kind = "manager", "{e}");
            } else if let Some(e) = e.downcast_ref::<crate::criteria::ConfigError>() {
                tracing::error!(step = %step, kind = "config", "{e}");
            } else {
                tracing::error!(step = %step, kind = "internal", "{e}");
            }
            e.to_string()
        });
        self.results.push(StepResult { step, status, error });
    }

    /// The identity and message of the step that failed, if any.
    pub fn failure(&self) -> Option<(StepName, &str)> {
        self.results
            .iter()
            .find(|r| r.status == StepStatus::Failed)
            .map(|r| (r.step, r.error.as_deref().unwrap_or("")))
    }
}

/// Mutable state threaded through every step. Steps read prior steps'
/// outputs directly off this struct rather than through a dynamic
/// name-keyed lookup — a step that needs another step's output simply
/// borrows the matching field.
pub struct PipelineContext {
    pub submission: Submission,
    pub criteria_config: CriteriaConfig,
    pub preflight_config: PreflightConfig,
    pub template: Arc<dyn Template>,
    pub sandbox_manager: Option<Arc<SandboxManager>>,
    pub feedback_generator: Option<Arc<dyn FeedbackGenerator>>,
    pub feedback_preferences: FeedbackPreferences,
    pub exporter: Option<Arc<dyn Exporter>>,

    pub sandbox: Option<Arc<dyn Sandbox>>,
    pub tree: Option<CriteriaTree>,
    pub result_tree: Option<ResultTree>,
    pub feedback: Option<String>,
    pub focus: Option<FocusReport>,
}

impl PipelineContext {
    pub fn new(submission: Submission, criteria_config: CriteriaConfig, template: Arc<dyn Template>) -> Self {
        Self {
            submission,
            criteria_config,
            preflight_config: PreflightConfig::default(),
            template,
            sandbox_manager: None,
            feedback_generator: None,
            feedback_preferences: serde_json::Value::Null,
            exporter: None,
            sandbox: None,
            tree: None,
            result_tree: None,
            feedback: None,
            focus: None,
        }
    }
}

/// One unit of pipeline work.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> StepName;

    async fn execute(&self, ctx: &mut PipelineContext) -> StepOutcome;
}

/// Runs `pipeline_steps` in order against `ctx`, short-circuiting on the
/// first failure. The sandbox bound to `ctx` (by a preflight step) is
/// always released back to its pool on exit, success or failure, so a
/// step further down the line can never leak it.
pub async fn run_pipeline(pipeline_steps: &[Box<dyn Step>], ctx: &mut PipelineContext) -> PipelineExecution {
    let mut execution = PipelineExecution::new();
    execution.status = PipelineStatus::Running;

    for step in pipeline_steps {
        let outcome = step.execute(ctx).await;
        let failed = outcome.is_err();
        execution.record(step.name(), &outcome);
        if failed {
            execution.status = PipelineStatus::Failed;
            break;
        }
    }

    if execution.status == PipelineStatus::Running {
        execution.status = PipelineStatus::Success;
    }

    if ctx.result_tree.is_some() {
        if let Err(e) = ctx.template.stop().await {
            tracing::error!(template = ctx.template.name(), "template stop failed: {e}");
        }
    }

    if let (Some(manager), Some(sandbox)) = (&ctx.sandbox_manager, ctx.sandbox.take()) {
        manager.release_sandbox(ctx.submission.language, sandbox).await;
    }

    execution
}

/// Synthesizes the final grading result from a successfully completed
/// execution's context. Returns `None` if the pipeline did not finish the
/// GRADE step (i.e. it failed before reaching it).
pub fn synthesize_result(ctx: &PipelineContext) -> Option<GradingResult> {
    ctx.result_tree.clone().map(|result_tree| GradingResult {
        result_tree,
        feedback: ctx.feedback.clone(),
    })
}
