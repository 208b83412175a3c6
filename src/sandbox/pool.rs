//! Per-language sandbox pool: a bounded set of pre-warmed containers with
//! an idle/active split, a FIFO idle queue, TTL enforcement, and
//! replenishment after release.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{Sandbox, SandboxError, SandboxProvider};
use crate::submission::Language;

/// Tuning for one language's pool, loaded from this crate's TOML config.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_scale_limit")]
    pub scale_limit: usize,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_running_timeout")]
    pub running_timeout_secs: u64,
}

fn default_pool_size() -> usize {
    2
}
fn default_scale_limit() -> usize {
    5
}
fn default_idle_timeout() -> u64 {
    300
}
fn default_running_timeout() -> u64 {
    60
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            scale_limit: default_scale_limit(),
            idle_timeout_secs: default_idle_timeout(),
            running_timeout_secs: default_running_timeout(),
        }
    }
}

/// Errors specific to pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no idle sandbox available for {0}")]
    PoolExhausted(Language),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

struct PoolState {
    idle: VecDeque<Arc<dyn Sandbox>>,
    active: Vec<Arc<dyn Sandbox>>,
}

impl PoolState {
    fn total(&self) -> usize {
        self.idle.len() + self.active.len()
    }
}

/// A bounded set of pre-warmed containers for one language.
///
/// Sandboxes are held as `Arc<dyn Sandbox>`: the pool keeps a clone in
/// `active` for TTL enforcement while the caller holds its own clone. All
/// mutation of `idle`/`active` happens under `state`'s lock; container
/// destruction is always performed outside the lock, bounding the
/// critical-section length to in-memory bookkeeping only.
pub struct LanguagePool {
    pub language: Language,
    pub pool_id: String,
    config: PoolConfig,
    provider: Arc<dyn SandboxProvider>,
    state: Mutex<PoolState>,
}

impl LanguagePool {
    pub fn new(language: Language, config: PoolConfig, provider: Arc<dyn SandboxProvider>) -> Self {
        Self {
            language,
            pool_id: uuid::Uuid::new_v4().to_string(),
            config,
            provider,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                active: Vec::new(),
            }),
        }
    }

    /// Pops the head of the idle FIFO queue, marks it busy, and records it
    /// in `active`. Fails with [`PoolError::PoolExhausted`] if idle is
    /// empty; the caller is expected to retry or surface the error rather
    /// than block.
    pub async fn acquire(&self) -> Result<Arc<dyn Sandbox>, PoolError> {
        let mut state = self.state.lock().await;
        let sandbox = state
            .idle
            .pop_front()
            .ok_or(PoolError::PoolExhausted(self.language))?;
        sandbox.mark_picked_up();
        state.active.push(sandbox.clone());
        Ok(sandbox)
    }

    /// Wraps [`Self::acquire`] in a guard whose `Drop` schedules release if
    /// the caller never calls [`SandboxHandle::release`] explicitly.
    pub async fn acquire_tracked(&self) -> Result<SandboxHandle, PoolError> {
        let sandbox = self.acquire().await?;
        Ok(SandboxHandle {
            sandbox: Some(sandbox),
        })
    }

    /// Removes `sandbox` from `active` bookkeeping, destroys the container
    /// (never reused — isolation is guaranteed by destruction), then
    /// replenishes. The lock is released before the destroy call. A
    /// sandbox not found in `active` (already reclaimed by the TTL sweep)
    /// is destroyed anyway, since double-destroy is harmless and the
    /// caller's reference must not leak a running container.
    pub async fn release(&self, sandbox: Arc<dyn Sandbox>) {
        let id = sandbox.id().to_string();
        {
            let mut state = self.state.lock().await;
            state.active.retain(|s| s.id() != id);
        }

        tracing::debug!(sandbox_id = %id, language = %self.language, "releasing sandbox");
        if let Err(e) = sandbox.terminate().await {
            tracing::warn!(sandbox_id = %id, error = %e, "failed to destroy released sandbox");
        }

        self.replenish().await;
    }

    /// While `|idle| < pool_size` and `|idle| + |active| < scale_limit`,
    /// creates a fresh container and appends it to idle. Creation errors
    /// are logged and stop replenishment for this call; they never
    /// propagate to the caller.
    pub async fn replenish(&self) {
        loop {
            let should_create = {
                let state = self.state.lock().await;
                state.idle.len() < self.config.pool_size && state.total() < self.config.scale_limit
            };
            if !should_create {
                break;
            }

            match self.provider.create_sandbox(self.language, &self.pool_id).await {
                Ok(sandbox) => {
                    let mut state = self.state.lock().await;
                    state.idle.push_back(sandbox);
                }
                Err(e) => {
                    tracing::warn!(language = %self.language, error = %e, "failed to create replenishment sandbox");
                    break;
                }
            }
        }
    }

    /// TTL sweep: forcibly reclaims active sandboxes older than
    /// `running_timeout`, and destroys idle sandboxes older than
    /// `idle_timeout` beyond the `pool_size` floor. Then replenishes.
    pub async fn monitor(&self) {
        self.check_ttls().await;
        self.replenish().await;
    }

    async fn check_ttls(&self) {
        let now = chrono::Utc::now();
        let running_timeout = chrono::Duration::seconds(self.config.running_timeout_secs as i64);
        let idle_timeout = chrono::Duration::seconds(self.config.idle_timeout_secs as i64);

        let stuck: Vec<Arc<dyn Sandbox>> = {
            let mut state = self.state.lock().await;
            let mut stuck = Vec::new();
            let mut i = 0;
            while i < state.active.len() {
                if now - state.active[i].last_picked_at() > running_timeout {
                    stuck.push(state.active.remove(i));
                } else {
                    i += 1;
                }
            }
            stuck
        };
        for sandbox in stuck {
            tracing::warn!(sandbox_id = %sandbox.id(), "active sandbox exceeded running_timeout, reclaiming");
            if let Err(e) = sandbox.terminate().await {
                tracing::warn!(error = %e, "failed to destroy reclaimed sandbox");
            }
        }

        let stale: Vec<Arc<dyn Sandbox>> = {
            let mut state = self.state.lock().await;
            let mut stale = Vec::new();
            while state.idle.len() > self.config.pool_size {
                let age_ok = state
                    .idle
                    .front()
                    .map(|s| now - s.created_at() <= idle_timeout)
                    .unwrap_or(true);
                if age_ok {
                    break;
                }
                match state.idle.pop_front() {
                    Some(s) => stale.push(s),
                    None => break,
                }
            }
            stale
        };
        for sandbox in stale {
            tracing::debug!(sandbox_id = %sandbox.id(), "idle sandbox exceeded idle_timeout beyond floor, destroying");
            if let Err(e) = sandbox.terminate().await {
                tracing::warn!(error = %e, "failed to destroy stale idle sandbox");
            }
        }
    }

    /// Drains both sets and destroys every container. Idempotent: calling
    /// this on an already-empty pool is a no-op.
    pub async fn shutdown(&self) {
        let (idle, active) = {
            let mut state = self.state.lock().await;
            (
                std::mem::take(&mut state.idle).into_iter().collect::<Vec<_>>(),
                std::mem::take(&mut state.active),
            )
        };
        for sandbox in idle.into_iter().chain(active.into_iter()) {
            if let Err(e) = sandbox.terminate().await {
                tracing::warn!(sandbox_id = %sandbox.id(), error = %e, "failed to destroy sandbox during shutdown");
            }
        }
    }

    pub async fn idle_len(&self) -> usize {
        self.state.lock().await.idle.len()
    }

    pub async fn active_len(&self) -> usize {
        self.state.lock().await.active.len()
    }
}

/// RAII handle returned by [`LanguagePool::acquire_tracked`]: releasing
/// back to the pool is explicit via [`Self::release`] but also happens on
/// drop (spawned onto the runtime, since `Drop` cannot `.await`) so a
/// sandbox is never leaked on early return or panic unwinding.
pub struct SandboxHandle {
    sandbox: Option<Arc<dyn Sandbox>>,
}

impl SandboxHandle {
    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        self.sandbox.as_ref().expect("sandbox handle used after release")
    }

    /// Releases the sandbox back to `pool`, consuming the handle so it
    /// cannot be double-released by `Drop`.
    pub async fn release(mut self, pool: &LanguagePool) {
        if let Some(sandbox) = self.sandbox.take() {
            pool.release(sandbox).await;
        }
    }
}

impl Drop for SandboxHandle {
    fn drop(&mut self) {
        if let Some(sandbox) = self.sandbox.take() {
            tokio::spawn(async move {
                if let Err(e) = sandbox.terminate().await {
                    tracing::warn!(error = %e, "failed to destroy sandbox dropped without explicit release");
                }
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fakes for pool tests: a provider that hands out fake
    //! sandboxes immediately, with no real container runtime involved.

    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::sandbox::{CommandResponse, ExecCommand, HttpMethod, HttpResponse, SandboxResult};

    pub struct FakeSandbox {
        id: String,
        language: Language,
        created_at: chrono::DateTime<chrono::Utc>,
        last_picked_at: AtomicI64,
        workdir_prepared: AtomicBool,
    }

    #[async_trait]
    impl Sandbox for FakeSandbox {
        fn id(&self) -> &str {
            &self.id
        }

        fn language(&self) -> Language {
            self.language
        }

        fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
            self.created_at
        }

        fn last_picked_at(&self) -> chrono::DateTime<chrono::Utc> {
            chrono::DateTime::from_timestamp(self.last_picked_at.load(Ordering::SeqCst), 0)
                .unwrap_or(self.created_at)
        }

        fn mark_picked_up(&self) {
            self.last_picked_at
                .store(chrono::Utc::now().timestamp(), Ordering::SeqCst);
        }

        fn workdir_prepared(&self) -> bool {
            self.workdir_prepared.load(Ordering::SeqCst)
        }

        async fn prepare_workdir(&self, _files: &[(String, String)]) -> SandboxResult<()> {
            self.workdir_prepared.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn run_command(&self, _cmd: &ExecCommand) -> SandboxResult<CommandResponse> {
            Ok(CommandResponse {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
                elapsed: Duration::from_millis(1),
                category: crate::sandbox::ResponseCategory::Success,
            })
        }

        async fn run_commands(
            &self,
            _inputs: &[String],
            _program_command: &str,
            _workdir: &str,
            _timeout: Duration,
        ) -> SandboxResult<CommandResponse> {
            self.run_command(&ExecCommand::new("")).await
        }

        async fn make_request(
            &self,
            _method: HttpMethod,
            _path: &str,
            _body: Option<&str>,
            _headers: &[(String, String)],
            _timeout: Duration,
        ) -> SandboxResult<HttpResponse> {
            Ok(HttpResponse {
                status_code: 200,
                headers: Vec::new(),
                body: String::new(),
            })
        }

        async fn upload(&self, _local: &std::path::Path, _remote: &std::path::Path) -> SandboxResult<()> {
            Ok(())
        }

        async fn terminate(&self) -> SandboxResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeSandboxProvider;

    #[async_trait]
    impl SandboxProvider for FakeSandboxProvider {
        async fn create_sandbox(
            &self,
            language: Language,
            _pool_id: &str,
        ) -> SandboxResult<Arc<dyn Sandbox>> {
            let created_at = chrono::Utc::now();
            Ok(Arc::new(FakeSandbox {
                id: uuid::Uuid::new_v4().to_string(),
                language,
                created_at,
                last_picked_at: AtomicI64::new(created_at.timestamp()),
                workdir_prepared: AtomicBool::new(false),
            }))
        }

        async fn sweep_orphans(&self) -> SandboxResult<usize> {
            Ok(0)
        }
    }
}
