//! Sandbox containers: one isolated OS-level execution environment per
//! submission, plus the pool/manager machinery that owns their lifecycle.
//!
//! See [`pool::LanguagePool`] and [`manager::SandboxManager`] for the
//! acquire/release/TTL/orphan-sweep machinery built on top of [`Sandbox`].

pub mod classify;
pub mod docker;
pub mod manager;
pub mod pool;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use classify::{classify_output, ResponseCategory};

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors raised by sandbox creation, staging, or execution.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to create sandbox: {0}")]
    CreateFailed(String),

    #[error("failed to stage workdir: {0}")]
    StagingFailed(String),

    #[error("failed to execute command: {0}")]
    ExecFailed(String),

    #[error("sandbox has no exposed port configured")]
    NoPortConfigured,

    #[error("sandbox not found: {0}")]
    NotFound(String),

    #[error("sandbox runtime connection error: {0}")]
    Connection(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Lifecycle state of a sandbox: a sandbox is idle xor busy for as long as
/// it exists; there is no third "stopped" state here — a stopped sandbox
/// is simply removed from both pool sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Idle,
    Busy,
}

/// A single command to run inside a sandbox, built fluently.
#[derive(Debug, Clone)]
pub struct ExecCommand {
    pub program_command: String,
    pub workdir: String,
    pub timeout: Duration,
}

impl ExecCommand {
    pub fn new(program_command: impl Into<String>) -> Self {
        Self {
            program_command: program_command.into(),
            workdir: "/app".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = dir.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Output of running a command in a sandbox, classified by exit status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub elapsed: Duration,
    pub category: ResponseCategory,
}

impl CommandResponse {
    pub fn is_success(&self) -> bool {
        self.category == ResponseCategory::Success
    }
}

/// HTTP method for [`Sandbox::make_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

/// Response from a [`Sandbox::make_request`] call against a containerized
/// application listening on the sandbox's exposed port.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

/// One isolated OS-level execution environment for untrusted code.
///
/// Operations are `async fn`s (the transport to the container runtime is
/// async) but each call awaits completion before returning rather than
/// streaming results — synchronous from the caller's point of view.
/// Concurrent calls on the *same* sandbox are forbidden by caller
/// discipline; the trait does not enforce it with an internal lock.
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn id(&self) -> &str;

    fn language(&self) -> crate::submission::Language;

    fn created_at(&self) -> chrono::DateTime<chrono::Utc>;

    /// Timestamp of the most recent `acquire`/pickup; used by the pool's
    /// TTL sweep to detect stuck active sandboxes.
    fn last_picked_at(&self) -> chrono::DateTime<chrono::Utc>;

    fn mark_picked_up(&self);

    fn workdir_prepared(&self) -> bool;

    /// Places each `(path, content)` pair at its relative path inside the
    /// sandbox's work directory, creating parent directories as needed.
    async fn prepare_workdir(&self, files: &[(String, String)]) -> SandboxResult<()>;

    /// Runs a single shell command as the non-root sandbox user.
    async fn run_command(&self, cmd: &ExecCommand) -> SandboxResult<CommandResponse>;

    /// Feeds `inputs` (joined by newlines) to `program_command`'s stdin via
    /// one shell invocation. Intended for interactive programs that read a
    /// fixed input script. Does not run the output classifier — unlike
    /// `run_command`, the caller typically interprets stdout directly.
    async fn run_commands(
        &self,
        inputs: &[String],
        program_command: &str,
        workdir: &str,
        timeout: Duration,
    ) -> SandboxResult<CommandResponse>;

    /// Performs an HTTP request against `localhost:port+path` inside the
    /// sandbox, when the sandbox was created with an exposed port.
    async fn make_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&str>,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> SandboxResult<HttpResponse>;

    /// Uploads a local file tree into the sandbox (used by providers that
    /// stage more than inline file content, e.g. prebuilt fixture dirs).
    async fn upload(&self, local: &Path, remote: &Path) -> SandboxResult<()>;

    async fn terminate(&self) -> SandboxResult<()>;
}

/// Labels attached to every sandbox container for orphan-sweep discovery
/// by the manager on startup.
#[derive(Debug, Clone)]
pub struct SandboxLabels {
    pub app: String,
    pub version: String,
    pub language: String,
    pub pool_id: String,
    pub created_at: String,
}

impl SandboxLabels {
    pub const APP_KEY: &'static str = "autograder.sandbox.app";
    pub const VERSION_KEY: &'static str = "autograder.sandbox.version";
    pub const LANGUAGE_KEY: &'static str = "autograder.sandbox.language";
    pub const POOL_ID_KEY: &'static str = "autograder.sandbox.pool_id";
    pub const CREATED_AT_KEY: &'static str = "autograder.sandbox.created_at";

    pub const APP_VALUE: &'static str = "autograder-core";

    pub fn to_map(&self) -> std::collections::HashMap<String, String> {
        std::collections::HashMap::from([
            (Self::APP_KEY.to_string(), self.app.clone()),
            (Self::VERSION_KEY.to_string(), self.version.clone()),
            (Self::LANGUAGE_KEY.to_string(), self.language.clone()),
            (Self::POOL_ID_KEY.to_string(), self.pool_id.clone()),
            (Self::CREATED_AT_KEY.to_string(), self.created_at.clone()),
        ])
    }
}

/// Factory for creating sandboxes of a given language; implemented by
/// [`docker::DockerSandboxProvider`] and by in-memory fakes in tests.
///
/// Returns `Arc<dyn Sandbox>` rather than `Box<dyn Sandbox>` so a pool can
/// retain a handle to an active sandbox (for TTL enforcement) while the
/// caller holds its own clone of the same handle.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create_sandbox(
        &self,
        language: crate::submission::Language,
        pool_id: &str,
    ) -> SandboxResult<Arc<dyn Sandbox>>;

    /// Sweeps the underlying runtime for containers bearing
    /// [`SandboxLabels::APP_KEY`] left over from a prior process and
    /// destroys them. Returns the number of orphans destroyed.
    async fn sweep_orphans(&self) -> SandboxResult<usize>;
}
