//! The template interface consumed by the grader (see `grader.rs`).
//!
//! A template is a named, build-time-registered bundle of test functions.
//! Test functions are opaque to the core: only their returned [`TestResult`]
//! matters. Production templates are provided out-of-band by whatever binary
//! links this crate — no reflection-loaded scripts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sandbox::Sandbox;

/// A parameter binding normalized to a named mapping, per the criteria
/// builder's rule 5 (ordered list / named mapping / `{name,value}` array
/// all collapse to this before binding).
pub type Params = HashMap<String, Value>;

/// The outcome of invoking a single test function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub score: f64,
    pub report: String,
    #[serde(default)]
    pub parameters: Params,
}

impl TestResult {
    pub fn new(score: f64, report: impl Into<String>) -> Self {
        Self {
            score: score.clamp(0.0, 100.0),
            report: report.into(),
            parameters: Params::new(),
        }
    }

    pub fn pass() -> Self {
        Self::new(100.0, "passed")
    }

    pub fn fail(report: impl Into<String>) -> Self {
        Self::new(0.0, report)
    }
}

/// An opaque, stateless unit of grading logic exposed by a [`Template`].
///
/// `files` is the content of the file(s) named by the test's `file_target`
/// (resolved by the grader before the call); `sandbox` is present only when
/// [`Template::requires_sandbox`] is true.
#[async_trait]
pub trait TestFunction: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        files: Option<&[(&str, &str)]>,
        sandbox: Option<&dyn Sandbox>,
        params: &Params,
    ) -> anyhow::Result<TestResult>;
}

/// A named, build-time-registered bundle of test functions.
///
/// `stop()` is invoked once, after grading completes, so templates that
/// batch work across test calls (e.g. an AI-backed test function buffering
/// requests) can flush before the pipeline finishes.
#[async_trait]
pub trait Template: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Whether this template's test functions expect a sandbox argument.
    fn requires_sandbox(&self) -> bool;

    fn get_test(&self, name: &str) -> Option<Arc<dyn TestFunction>>;

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An in-memory template used by the crate's own tests and by any binary
/// that wants to register test functions without a plugin-loading layer.
pub struct RegistryTemplate {
    name: String,
    description: String,
    requires_sandbox: bool,
    tests: HashMap<String, Arc<dyn TestFunction>>,
}

impl RegistryTemplate {
    pub fn new(name: impl Into<String>, description: impl Into<String>, requires_sandbox: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            requires_sandbox,
            tests: HashMap::new(),
        }
    }

    pub fn with_test(mut self, test: Arc<dyn TestFunction>) -> Self {
        self.tests.insert(test.name().to_string(), test);
        self
    }
}

#[async_trait]
impl Template for RegistryTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn requires_sandbox(&self) -> bool {
        self.requires_sandbox
    }

    fn get_test(&self, name: &str) -> Option<Arc<dyn TestFunction>> {
        self.tests.get(name).cloned()
    }
}
