//! Configuration schema definitions.
//!
//! This module defines every type deserializable from a TOML config file.
//!
//! ```text
//! Config (root)
//! ├── GradingConfig       - criteria config path and grading knobs
//! ├── sandbox_pools       - per-language pool tuning
//! ├── PreflightConfig     - required files + setup commands per language
//! └── ReportConfig        - where/how grading results are written out
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::preflight::PreflightConfig;
use crate::sandbox::manager::SandboxPoolConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub grading: GradingConfig,

    /// One entry per sandboxed language; a language with no entry gets no
    /// pool and any submission in it fails preflight with
    /// `ManagerError::NoPoolForLanguage`.
    #[serde(default)]
    pub sandbox_pools: Vec<SandboxPoolConfig>,

    #[serde(default)]
    pub preflight: PreflightConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// Core grading settings: where the criteria rubric lives and how
/// permissive the pipeline is about sandboxing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GradingConfig {
    /// Path to the criteria TOML/JSON document describing the rubric.
    pub criteria_path: PathBuf,

    /// Name of the template to load test functions from.
    pub template_name: String,

    /// Overall timeout for one submission's pipeline run.
    #[serde(default = "default_submission_timeout_secs")]
    pub submission_timeout_secs: u64,
}

fn default_submission_timeout_secs() -> u64 {
    300
}

/// Where and how a finished grading result is written out, for the CLI's
/// own reporting (separate from the `Exporter` trait, which external
/// binaries use to ship results elsewhere).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Directory where per-submission result JSON files are written.
    ///
    /// Default: `"grading-results"`
    #[serde(default = "default_report_dir")]
    pub output_dir: PathBuf,

    /// Pretty-print the written JSON result files.
    ///
    /// Default: `true`
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_report_dir(),
            pretty: default_pretty(),
        }
    }
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("grading-results")
}

fn default_pretty() -> bool {
    true
}
