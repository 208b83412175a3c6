//! Docker-backed sandbox implementation, with a stricter resource posture
//! (dropped capabilities, no network, a pid/memory/cpu cap, tmpfs-backed
//! scratch space) than a generic container runner needs, plus the staged
//! file upload, stdin-driven `run_commands`, and `make_request` operations
//! a grading sandbox requires.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use bollard::Docker;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, ListContainersOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{HostConfig, Ulimit};
use futures::StreamExt;

use super::{
    CommandResponse, ExecCommand, HttpMethod, HttpResponse, ResponseCategory, Sandbox,
    SandboxError, SandboxLabels, SandboxProvider, SandboxResult, classify_output,
};
use crate::submission::Language;

/// Container resource posture: a tight memory/CPU/process cap, dropped
/// capabilities, no network, and a non-root user.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub pids_limit: i64,
    pub tmp_scratch_size_mb: u32,
    pub workdir_size_mb: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 128 * 1024 * 1024,
            nano_cpus: 500_000_000, // 0.5 CPU
            pids_limit: 64,
            tmp_scratch_size_mb: 32,
            workdir_size_mb: 64,
        }
    }
}

/// Configuration for the Docker-backed provider.
#[derive(Debug, Clone)]
pub struct DockerSandboxConfig {
    pub docker_host: Option<String>,
    pub resources: ResourceLimits,
    /// Preferred gVisor runtime name; falls back to the Docker default
    /// runtime if the daemon rejects it.
    pub preferred_runtime: Option<String>,
    pub app_version: String,
}

impl Default for DockerSandboxConfig {
    fn default() -> Self {
        Self {
            docker_host: None,
            resources: ResourceLimits::default(),
            preferred_runtime: Some("runsc".to_string()),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Factory creating Docker-backed [`Sandbox`] instances for one language
/// pool at a time (one provider instance is shared across all pools; the
/// `pool_id` is supplied per call).
pub struct DockerSandboxProvider {
    docker: Docker,
    config: DockerSandboxConfig,
}

impl DockerSandboxProvider {
    pub fn new(config: DockerSandboxConfig) -> SandboxResult<Self> {
        let docker = if let Some(host) = &config.docker_host {
            Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| SandboxError::Connection(e.to_string()))?
        } else {
            Docker::connect_with_local_defaults()
                .map_err(|e| SandboxError::Connection(e.to_string()))?
        };
        Ok(Self { docker, config })
    }

    fn host_config(&self, runtime: Option<&str>) -> HostConfig {
        let r = &self.config.resources;
        HostConfig {
            runtime: runtime.map(str::to_string),
            cpu_period: Some(100_000),
            cpu_quota: Some((r.nano_cpus / 1_000_000_000) as i64 * 100_000
                + ((r.nano_cpus % 1_000_000_000) * 100_000 / 1_000_000_000)),
            memory: Some(r.memory_bytes),
            memory_swap: Some(r.memory_bytes),
            pids_limit: Some(r.pids_limit),
            network_mode: Some("none".to_string()),
            cap_drop: Some(vec!["ALL".to_string()]),
            tmpfs: Some(std::collections::HashMap::from([
                (
                    "/tmp".to_string(),
                    format!("rw,size={}m,noexec", r.tmp_scratch_size_mb),
                ),
                (
                    "/app".to_string(),
                    format!("rw,size={}m,exec", r.workdir_size_mb),
                ),
            ])),
            ulimits: Some(vec![Ulimit {
                name: Some("fsize".to_string()),
                soft: Some(10_000_000),
                hard: Some(10_000_000),
            }]),
            ..Default::default()
        }
    }

    async fn create_container(
        &self,
        language: Language,
        labels: &SandboxLabels,
        container_name: &str,
    ) -> SandboxResult<String> {
        let image = language.image();

        let try_with_runtime = self.config.preferred_runtime.as_deref();
        match self
            .create_container_with_runtime(image, labels, container_name, try_with_runtime)
            .await
        {
            Ok(id) => Ok(id),
            Err(e) if try_with_runtime.is_some() && is_unknown_runtime_error(&e) => {
                tracing::warn!(
                    error = %e,
                    runtime = ?try_with_runtime,
                    "preferred sandbox runtime unavailable, falling back to default runtime"
                );
                self.create_container_with_runtime(image, labels, container_name, None)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn create_container_with_runtime(
        &self,
        image: &str,
        labels: &SandboxLabels,
        container_name: &str,
        runtime: Option<&str>,
    ) -> SandboxResult<String> {
        let container_config = ContainerConfig {
            image: Some(image.to_string()),
            labels: Some(labels.to_map()),
            user: Some("sandbox".to_string()),
            host_config: Some(self.host_config(runtime)),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            tty: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: container_name,
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| SandboxError::CreateFailed(e.to_string()))?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::CreateFailed(e.to_string()))?;

        Ok(response.id)
    }
}

fn is_unknown_runtime_error(err: &SandboxError) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("unknown or invalid runtime name") || msg.contains("runsc")
}

#[async_trait]
impl SandboxProvider for DockerSandboxProvider {
    async fn create_sandbox(
        &self,
        language: Language,
        pool_id: &str,
    ) -> SandboxResult<Arc<dyn Sandbox>> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now();
        let labels = SandboxLabels {
            app: SandboxLabels::APP_VALUE.to_string(),
            version: self.config.app_version.clone(),
            language: language.key().to_string(),
            pool_id: pool_id.to_string(),
            created_at: created_at.to_rfc3339(),
        };

        let container_name = format!("autograder-sandbox-{id}");
        let container_id = self
            .create_container(language, &labels, &container_name)
            .await?;

        Ok(Arc::new(DockerSandbox {
            id,
            container_id,
            docker: self.docker.clone(),
            language,
            created_at,
            last_picked_at: AtomicI64::new(created_at.timestamp()),
            workdir_prepared: std::sync::atomic::AtomicBool::new(false),
            port: None,
        }))
    }

    async fn sweep_orphans(&self) -> SandboxResult<usize> {
        let mut filters = std::collections::HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!(
                "{}={}",
                SandboxLabels::APP_KEY,
                SandboxLabels::APP_VALUE
            )],
        );
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| SandboxError::Connection(e.to_string()))?;

        let mut destroyed = 0;
        for container in containers {
            let Some(id) = container.id else { continue };
            match self
                .docker
                .remove_container(
                    &id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
            {
                Ok(()) => destroyed += 1,
                Err(e) => tracing::warn!(container_id = %id, error = %e, "failed to remove orphaned sandbox"),
            }
        }
        Ok(destroyed)
    }
}

/// A sandbox backed by one Docker container.
pub struct DockerSandbox {
    id: String,
    container_id: String,
    docker: Docker,
    language: Language,
    created_at: chrono::DateTime<chrono::Utc>,
    last_picked_at: AtomicI64,
    workdir_prepared: std::sync::atomic::AtomicBool,
    port: Option<u16>,
}

impl DockerSandbox {
    async fn exec_raw(
        &self,
        shell_command: &str,
        workdir: &str,
        timeout: Duration,
    ) -> SandboxResult<(String, String, i32, Duration)> {
        let start = Instant::now();
        let exec_options = CreateExecOptions {
            cmd: Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                shell_command.to_string(),
            ]),
            working_dir: Some(workdir.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(&self.container_id, exec_options)
            .await
            .map_err(|e| SandboxError::ExecFailed(e.to_string()))?;

        let run = async {
            let output = self
                .docker
                .start_exec(&exec.id, None)
                .await
                .map_err(|e| SandboxError::ExecFailed(e.to_string()))?;

            let mut stdout = String::new();
            let mut stderr = String::new();
            if let StartExecResults::Attached { mut output, .. } = output {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message))
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message))
                        }
                        _ => {}
                    }
                }
            }
            Ok::<_, SandboxError>((stdout, stderr))
        };

        let (stdout, stderr) = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| SandboxError::ExecFailed("command timed out".to_string()))??;

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| SandboxError::ExecFailed(e.to_string()))?;
        let exit_code = inspect.exit_code.unwrap_or(-1) as i32;

        Ok((stdout, stderr, exit_code, start.elapsed()))
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
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

    async fn prepare_workdir(&self, files: &[(String, String)]) -> SandboxResult<()> {
        for (path, content) in files {
            let dir_path = Path::new(path)
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .filter(|p| !p.is_empty());

            if let Some(dir) = &dir_path {
                let (_, stderr, exit_code, _) = self
                    .exec_raw(&format!("mkdir -p '/app/{dir}'"), "/app", Duration::from_secs(10))
                    .await?;
                if exit_code != 0 {
                    return Err(SandboxError::StagingFailed(format!(
                        "mkdir -p /app/{dir} failed: {stderr}"
                    )));
                }
            }

            let encoded = base64::engine::general_purpose::STANDARD.encode(content.as_bytes());
            let command = format!("echo '{encoded}' | base64 -d > '/app/{path}'");
            let (_, stderr, exit_code, _) = self
                .exec_raw(&command, "/app", Duration::from_secs(10))
                .await?;
            if exit_code != 0 {
                return Err(SandboxError::StagingFailed(format!(
                    "writing {path} failed: {stderr}"
                )));
            }
        }
        self.workdir_prepared.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn run_command(&self, cmd: &ExecCommand) -> SandboxResult<CommandResponse> {
        let (stdout, stderr, exit_code, elapsed) = self
            .exec_raw(&cmd.program_command, &cmd.workdir, cmd.timeout)
            .await?;
        let category = classify_output(&stdout, &stderr, exit_code, self.language);
        Ok(CommandResponse {
            stdout,
            stderr,
            exit_code,
            elapsed,
            category,
        })
    }

    async fn run_commands(
        &self,
        inputs: &[String],
        program_command: &str,
        workdir: &str,
        timeout: Duration,
    ) -> SandboxResult<CommandResponse> {
        let stdin_input = inputs.join("\n").replace('\'', "'\\''");
        let command = if program_command.is_empty() {
            format!("echo '{stdin_input}'")
        } else {
            format!("echo '{stdin_input}' | {program_command}")
        };
        let (stdout, stderr, exit_code, elapsed) =
            self.exec_raw(&command, workdir, timeout).await?;
        // Unlike run_command, a non-zero exit here doesn't imply the
        // program under test failed — it may just mean it expected more
        // stdin than we gave it, so only classify the failure case.
        let category = if exit_code == 0 {
            ResponseCategory::Success
        } else {
            classify_output(&stdout, &stderr, exit_code, self.language)
        };
        Ok(CommandResponse {
            stdout,
            stderr,
            exit_code,
            elapsed,
            category,
        })
    }

    async fn make_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&str>,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> SandboxResult<HttpResponse> {
        let port = self.port.ok_or(SandboxError::NoPortConfigured)?;
        let url = format!("http://localhost:{port}{path}");
        let method_str = match method {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        };

        let mut command = format!(
            "curl -s -w '\\n%{{http_code}}' -X {method_str} --max-time {}",
            timeout.as_secs().max(1)
        );
        for (k, v) in headers {
            command.push_str(&format!(" -H '{k}: {v}'"));
        }
        if let Some(body) = body {
            let escaped = body.replace('\'', "'\\''");
            command.push_str(&format!(" -d '{escaped}'"));
        }
        command.push_str(&format!(" '{url}'"));

        let (stdout, stderr, exit_code, _) =
            self.exec_raw(&command, "/app", timeout + Duration::from_secs(2)).await?;
        if exit_code != 0 {
            return Err(SandboxError::ExecFailed(format!(
                "make_request failed: {stderr}"
            )));
        }

        let (body_text, status_code) = stdout
            .rsplit_once('\n')
            .map(|(body, code)| (body.to_string(), code.trim().parse().unwrap_or(0)))
            .unwrap_or((stdout.clone(), 0));

        Ok(HttpResponse {
            status_code,
            headers: Vec::new(),
            body: body_text,
        })
    }

    async fn upload(&self, local: &Path, remote: &Path) -> SandboxResult<()> {
        let tar_data = create_tar_archive(local).map_err(SandboxError::Io)?;
        let remote_dir = remote.parent().unwrap_or(Path::new("/"));
        self.docker
            .upload_to_container(
                &self.container_id,
                Some(bollard::container::UploadToContainerOptions {
                    path: remote_dir.to_string_lossy().to_string(),
                    ..Default::default()
                }),
                tar_data.into(),
            )
            .await
            .map_err(|e| SandboxError::Other(e.into()))?;
        Ok(())
    }

    async fn terminate(&self) -> SandboxResult<()> {
        self.docker
            .remove_container(
                &self.container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| SandboxError::Other(e.into()))?;
        Ok(())
    }
}

fn create_tar_archive(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    if path.is_dir() {
        archive.append_dir_all(path.file_name().unwrap_or_default(), path)?;
    } else {
        let mut file = std::fs::File::open(path)?;
        archive.append_file(path.file_name().unwrap_or_default(), &mut file)?;
    }
    archive.into_inner()
}
