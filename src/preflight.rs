//! Preflight service: required-file presence check, then setup-command
//! execution, against a freshly acquired sandbox.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sandbox::{ExecCommand, ResponseCategory, Sandbox};
use crate::submission::Submission;

/// One setup command, either a bare string or a named record (for nicer
/// error messages when it fails).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SetupCommand {
    Bare(String),
    Named { name: String, command: String },
}

impl SetupCommand {
    pub fn command(&self) -> &str {
        match self {
            SetupCommand::Bare(c) => c,
            SetupCommand::Named { command, .. } => command,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SetupCommand::Bare(c) => c,
            SetupCommand::Named { name, .. } => name,
        }
    }
}

/// Per-language required files and setup commands. Languages absent from
/// the config default to empty lists.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LanguagePreflightConfig {
    #[serde(default)]
    pub required_files: Vec<String>,
    #[serde(default)]
    pub setup_commands: Vec<SetupCommand>,
}

/// The full preflight config: a mapping keyed by the language's config key
/// (`"python"`, `"java"`, ...).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PreflightConfig {
    #[serde(flatten)]
    pub languages: HashMap<String, LanguagePreflightConfig>,
}

impl PreflightConfig {
    pub fn for_language(&self, language: crate::submission::Language) -> LanguagePreflightConfig {
        self.languages.get(language.key()).cloned().unwrap_or_default()
    }
}

/// Errors raised during preflight.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("missing required file(s): {}", .missing.join(", "))]
    MissingFiles { missing: Vec<String> },

    #[error("setup command '{name}' failed: exit_code={exit_code:?} category={category:?}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    SetupCommandFailed {
        name: String,
        exit_code: i32,
        category: ResponseCategory,
        stdout: String,
        stderr: String,
    },

    #[error(transparent)]
    Sandbox(#[from] crate::sandbox::SandboxError),
}

/// Runs the two preflight phases against an already-staged sandbox.
pub struct PreflightService<'a> {
    pub config: &'a PreflightConfig,
}

impl<'a> PreflightService<'a> {
    pub fn new(config: &'a PreflightConfig) -> Self {
        Self { config }
    }

    /// Phase 1: every path in the language's `required_files` must be
    /// present in `submission.files`. Collects all missing paths before
    /// reporting failure.
    pub fn check_required_files(&self, submission: &Submission) -> Result<(), PreflightError> {
        let lang_config = self.config.for_language(submission.language);
        let missing: Vec<String> = lang_config
            .required_files
            .iter()
            .filter(|f| !submission.has_file(f))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PreflightError::MissingFiles { missing })
        }
    }

    /// Phase 2: run every setup command in order; a non-SUCCESS
    /// classification is a preflight failure, with stdout/stderr/exit_code
    /// attached for diagnostics.
    pub async fn run_setup_commands(
        &self,
        submission: &Submission,
        sandbox: &dyn Sandbox,
    ) -> Result<(), PreflightError> {
        let lang_config = self.config.for_language(submission.language);
        for setup in &lang_config.setup_commands {
            let cmd = ExecCommand::new(setup.command().to_string()).timeout(Duration::from_secs(60));
            let response = sandbox.run_command(&cmd).await?;
            if !response.is_success() {
                return Err(PreflightError::SetupCommandFailed {
                    name: setup.name().to_string(),
                    exit_code: response.exit_code,
                    category: response.category,
                    stdout: response.stdout,
                    stderr: response.stderr,
                });
            }
        }
        Ok(())
    }
}
