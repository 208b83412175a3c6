//! autograder CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use autograder_core::config::{self, Config};
use autograder_core::criteria::build_tree;
use autograder_core::criteria::config::CriteriaConfig;
use autograder_core::command_resolver::{parse_command_spec, resolve_command};
use autograder_core::pipeline::{PipelineContext, run_pipeline, steps::standard_steps, synthesize_result};
use autograder_core::sandbox::docker::{DockerSandboxConfig, DockerSandboxProvider};
use autograder_core::sandbox::manager::SandboxManager;
use autograder_core::sandbox::{ExecCommand, Sandbox};
use autograder_core::submission::{Language, Submission};
use autograder_core::template::{Params, RegistryTemplate, TestFunction, TestResult};

#[derive(Parser)]
#[command(name = "autograder")]
#[command(about = "Sandboxed rubric grading engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "autograder.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a submission staged as a local directory of files
    Grade {
        /// Directory containing the submission's files
        submission_dir: PathBuf,

        /// Target language of the submission
        #[arg(short, long)]
        language: String,

        /// Username to attribute the submission to
        #[arg(short, long, default_value = "local")]
        username: String,
    },

    /// Validate a criteria config file against the built-in template
    ValidateCriteria {
        /// Path to the criteria TOML/JSON document
        criteria_path: PathBuf,
    },

    /// Print each configured language pool's idle/active counts
    PoolStatus,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Grade { submission_dir, language, username } => {
            grade(&cli.config, &submission_dir, &language, &username).await
        }
        Commands::ValidateCriteria { criteria_path } => validate_criteria(&criteria_path),
        Commands::PoolStatus => pool_status(&cli.config).await,
    }
}

async fn grade(config_path: &PathBuf, submission_dir: &PathBuf, language: &str, username: &str) -> Result<()> {
    let config = config::load_config(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let language = Language::from_key(language).ok_or_else(|| anyhow::anyhow!("unknown language: {language}"))?;
    let submission = load_submission(submission_dir, username, language)?;

    let criteria_config = load_criteria_config(&config.grading.criteria_path)?;
    let template = Arc::new(builtin_template());

    let mut ctx = PipelineContext::new(submission, criteria_config, template);
    ctx.preflight_config = config.preflight.clone();

    let manager = if language == Language::None {
        None
    } else {
        let provider: Arc<dyn autograder_core::sandbox::SandboxProvider> = Arc::new(DockerSandboxProvider::new(DockerSandboxConfig::default())?);
        let manager = Arc::new(SandboxManager::new(config.sandbox_pools.clone(), provider.clone()));
        manager.start(provider.as_ref()).await;
        Some(manager)
    };
    ctx.sandbox_manager = manager.clone();

    let execution = run_pipeline(&standard_steps(), &mut ctx).await;

    if let Some(manager) = &manager {
        manager.shutdown().await;
    }

    match execution.failure() {
        Some((step, error)) => {
            eprintln!("grading failed at step {step}: {error}");
            std::process::exit(1);
        }
        None => {
            let result = synthesize_result(&ctx).context("pipeline succeeded but produced no result")?;
            let rendered = if config.report.pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            println!("{rendered}");
            info!(final_score = result.result_tree.final_score, "grading complete");
            Ok(())
        }
    }
}

fn validate_criteria(criteria_path: &PathBuf) -> Result<()> {
    let criteria_config = load_criteria_config(criteria_path)?;
    let template = builtin_template();
    match build_tree(&criteria_config, &template) {
        Ok(_) => {
            println!("criteria config is valid");
            Ok(())
        }
        Err(e) => {
            eprintln!("criteria config is invalid: {e}");
            std::process::exit(1);
        }
    }
}

async fn pool_status(config_path: &PathBuf) -> Result<()> {
    let config = config::load_config(config_path)?;
    let provider: Arc<dyn autograder_core::sandbox::SandboxProvider> = Arc::new(DockerSandboxProvider::new(DockerSandboxConfig::default())?);
    let manager = Arc::new(SandboxManager::new(config.sandbox_pools.clone(), provider.clone()));
    manager.start(provider.as_ref()).await;

    for pool_config in &config.sandbox_pools {
        if let Some(pool) = manager.pool(pool_config.language) {
            println!("{}: idle={} active={}", pool_config.language, pool.idle_len().await, pool.active_len().await);
        }
    }

    manager.shutdown().await;
    Ok(())
}

fn load_submission(dir: &PathBuf, username: &str, language: Language) -> Result<Submission> {
    let mut submission = Submission::new(username, 0, 0, language);
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read submission dir {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let content = std::fs::read_to_string(entry.path())
            .with_context(|| format!("failed to read submission file {name}"))?;
        submission = submission.with_file(name, content);
    }
    Ok(submission)
}

fn load_criteria_config(path: &PathBuf) -> Result<CriteriaConfig> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read criteria file {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).context("failed to parse criteria JSON"),
        _ => toml::from_str(&content).context("failed to parse criteria TOML"),
    }
}

/// The CLI's own built-in template: one generic test function that
/// resolves the submission's `program_command` and checks that it exits
/// successfully, for exercising the pipeline end-to-end without a
/// plugin-loading layer.
fn builtin_template() -> RegistryTemplate {
    RegistryTemplate::new(
        "builtin",
        "resolves and runs a submission's program command, scoring on exit success",
        true,
    )
    .with_test(ProgramRunsTest::new())
}

struct ProgramRunsTest;

impl ProgramRunsTest {
    fn new() -> Arc<dyn TestFunction> {
        Arc::new(Self)
    }
}

#[async_trait]
impl TestFunction for ProgramRunsTest {
    fn name(&self) -> &str {
        "program_runs"
    }

    async fn execute(
        &self,
        files: Option<&[(&str, &str)]>,
        sandbox: Option<&dyn Sandbox>,
        params: &Params,
    ) -> anyhow::Result<TestResult> {
        let sandbox = sandbox.ok_or_else(|| anyhow::anyhow!("program_runs requires a sandbox"))?;

        let command_value = params
            .get("program_command")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::String("CMD".to_string()));
        let spec = parse_command_spec(&command_value).ok_or_else(|| anyhow::anyhow!("invalid program_command"))?;

        let filename = files.and_then(|f| f.first()).map(|(name, _)| *name);
        let command = resolve_command(&spec, sandbox.language(), filename)
            .ok_or_else(|| anyhow::anyhow!("no command resolved for language {:?}", sandbox.language()))?;

        let response = sandbox.run_command(&ExecCommand::new(command)).await?;
        if response.is_success() {
            Ok(TestResult::pass())
        } else {
            Ok(TestResult::fail(format!(
                "program exited with category {:?}, exit_code={}\nstderr:\n{}",
                response.category, response.exit_code, response.stderr
            )))
        }
    }
}
