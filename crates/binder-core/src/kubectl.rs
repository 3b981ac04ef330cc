//! `ClusterApi` backed by the `kubectl` and `kubectl-argo-rollouts` binaries.
//!
//! Every query is a child process. Output is drained on reader threads and
//! the wait runs on a waiter thread with `recv_timeout`, so a hung CLI is
//! killed once the rollout timeout plus a grace period has passed.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BinderError, Result};
use crate::gate::{ClusterApi, Existence, StepStatus, WorkloadKind, WorkloadRef};
use crate::quota::PodList;

/// Extra wall-clock time allowed past the CLI's own `--timeout`.
const KILL_GRACE: Duration = Duration::from_secs(10);

/// Deadline for one-shot queries (`get`).
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Cap on captured output kept for error messages.
const MAX_OUTPUT: usize = 4 * 1024;

// ---------------------------------------------------------------------------
// KubectlConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubectlConfig {
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    #[serde(default = "default_argo")]
    pub argo_rollouts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_argo() -> String {
    "kubectl-argo-rollouts".to_string()
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            argo_rollouts: default_argo(),
            namespace: None,
            context: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Kubectl
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Kubectl {
    kubectl: PathBuf,
    argo_rollouts: PathBuf,
    namespace: Option<String>,
    context: Option<String>,
}

impl Kubectl {
    /// Resolve both binaries on `PATH` (or as given paths).
    ///
    /// `kubectl-argo-rollouts` is only needed for rollout-kind workloads, so
    /// a missing plugin is reported when it is first used, not here.
    pub fn new(config: &KubectlConfig) -> Result<Self> {
        let kubectl = which::which(&config.kubectl)
            .map_err(|_| BinderError::CommandNotFound(config.kubectl.clone()))?;
        let argo_rollouts = which::which(&config.argo_rollouts)
            .unwrap_or_else(|_| PathBuf::from(&config.argo_rollouts));
        tracing::debug!(kubectl = %kubectl.display(), argo = %argo_rollouts.display(), "resolved cluster tools");
        Ok(Self {
            kubectl,
            argo_rollouts,
            namespace: config.namespace.clone(),
            context: config.context.clone(),
        })
    }

    fn kubectl_command(&self) -> Command {
        let mut cmd = Command::new(&self.kubectl);
        if let Some(ctx) = &self.context {
            cmd.arg("--context").arg(ctx);
        }
        if let Some(ns) = &self.namespace {
            cmd.arg("--namespace").arg(ns);
        }
        cmd
    }

    fn argo_command(&self) -> Command {
        let mut cmd = Command::new(&self.argo_rollouts);
        if let Some(ctx) = &self.context {
            cmd.arg("--context").arg(ctx);
        }
        if let Some(ns) = &self.namespace {
            cmd.arg("--namespace").arg(ns);
        }
        cmd
    }

    fn resource_name(workload: &WorkloadRef) -> String {
        match workload.kind {
            WorkloadKind::Deployment => format!("deployment/{}", workload.name),
            WorkloadKind::Rollout => format!("rollouts.argoproj.io/{}", workload.name),
        }
    }

    /// List pods matching a label selector.
    pub fn list_pods(&self, selector: &str) -> Result<PodList> {
        let mut cmd = self.kubectl_command();
        cmd.args(["get", "pods", "-l", selector, "-o", "json"]);
        let out = run(cmd, Some(QUERY_TIMEOUT))?;
        match out {
            Outcome::Exited { status, stdout, .. } if status.success() => {
                let pods: PodList = serde_json::from_str(&stdout)?;
                Ok(pods)
            }
            Outcome::Exited { stdout, stderr, .. } => {
                Err(BinderError::ClusterQuery(combine(&stdout, &stderr)))
            }
            Outcome::Killed => Err(BinderError::ClusterQuery(format!(
                "pod listing did not finish within {}s",
                QUERY_TIMEOUT.as_secs()
            ))),
        }
    }
}

impl ClusterApi for Kubectl {
    fn rollout_status(&self, workload: &WorkloadRef, timeout: Duration) -> StepStatus {
        let secs = timeout.as_secs();
        let cmd = match workload.kind {
            WorkloadKind::Deployment => {
                let mut cmd = self.kubectl_command();
                cmd.args(["rollout", "status", "--watch"])
                    .arg(format!("--timeout={secs}s"))
                    .arg(format!("deployment/{}", workload.name));
                cmd
            }
            WorkloadKind::Rollout => {
                let mut cmd = self.argo_command();
                cmd.args(["status", "--watch", "--timeout"])
                    .arg(format!("{secs}s"))
                    .arg(&workload.name);
                cmd
            }
        };

        tracing::info!(workload = %workload, timeout_s = secs, "waiting for rollout");
        let deadline = match secs {
            0 => None,
            _ => timeout.checked_add(KILL_GRACE),
        };
        match run(cmd, deadline) {
            Ok(Outcome::Exited { status, stdout, stderr }) => {
                classify_rollout(status.success(), &stdout, &stderr, secs)
            }
            Ok(Outcome::Killed) => StepStatus::TimedOut { seconds: secs },
            Err(e) => StepStatus::Failed {
                message: e.to_string(),
            },
        }
    }

    fn exists(&self, workload: &WorkloadRef) -> Result<Existence> {
        let mut cmd = self.kubectl_command();
        cmd.arg("get")
            .arg(Self::resource_name(workload))
            .args(["-o", "name"]);
        match run(cmd, Some(QUERY_TIMEOUT))? {
            Outcome::Exited { status, .. } if status.success() => Ok(Existence::Present),
            Outcome::Exited { stdout, stderr, .. } => {
                if is_not_found(&stderr) {
                    Ok(Existence::Absent)
                } else {
                    Err(BinderError::ClusterQuery(combine(&stdout, &stderr)))
                }
            }
            Outcome::Killed => Err(BinderError::ClusterQuery(format!(
                "lookup of {workload} did not finish within {}s",
                QUERY_TIMEOUT.as_secs()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Output classification
// ---------------------------------------------------------------------------

fn classify_rollout(success: bool, stdout: &str, stderr: &str, secs: u64) -> StepStatus {
    if success {
        return StepStatus::Ready;
    }
    let output = combine(stdout, stderr);
    if output.to_ascii_lowercase().contains("timed out") {
        StepStatus::TimedOut { seconds: secs }
    } else {
        StepStatus::Failed { message: output }
    }
}

/// True when the API server reports the resource missing. Client-side
/// failures (auth plugins, connectivity) can also say "not found" and must
/// not count.
fn is_not_found(stderr: &str) -> bool {
    stderr.contains("Error from server (NotFound)")
}

fn combine(stdout: &str, stderr: &str) -> String {
    let output = match (stdout.trim(), stderr.trim()) {
        ("", err) => err.to_string(),
        (out, "") => out.to_string(),
        (out, err) => format!("{out}\n{err}"),
    };
    if output.len() > MAX_OUTPUT {
        let mut start = output.len() - MAX_OUTPUT;
        while !output.is_char_boundary(start) {
            start += 1;
        }
        output[start..].to_string()
    } else {
        output
    }
}

// ---------------------------------------------------------------------------
// Process execution
// ---------------------------------------------------------------------------

enum Outcome {
    Exited {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    Killed,
}

/// Run `cmd` to completion, killing it if `deadline` elapses first.
/// `None` waits indefinitely.
fn run(mut cmd: Command, deadline: Option<Duration>) -> Result<Outcome> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BinderError::SpawnFailed {
            command: program.clone(),
            reason: e.to_string(),
        })?;

    let child_pid = child.id();
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> String {
        let mut buf = String::new();
        if let Some(mut r) = stdout_handle {
            let _ = r.read_to_string(&mut buf);
        }
        buf
    });
    let stderr_thread = std::thread::spawn(move || -> String {
        let mut buf = String::new();
        if let Some(mut r) = stderr_handle {
            let _ = r.read_to_string(&mut buf);
        }
        buf
    });

    let wait_result = match deadline {
        None => child.wait(),
        Some(limit) => {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(child.wait());
            });
            match rx.recv_timeout(limit) {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(command = %program, pid = child_pid, "deadline exceeded, killing");
                    kill_process(child_pid);
                    return Ok(Outcome::Killed);
                }
            }
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();
    let status = wait_result?;
    Ok(Outcome::Exited {
        status,
        stdout,
        stderr,
    })
}

/// SIGKILL by PID. Best-effort.
fn kill_process(pid: u32) {
    let _ = Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
