use crate::error::{BinderError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// WorkloadKind / WorkloadRef
// ---------------------------------------------------------------------------

/// How a workload's rollout is tracked in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    /// A native `apps/v1` Deployment, watched with `kubectl rollout status`.
    Deployment,
    /// An Argo Rollouts `Rollout`, watched with `kubectl-argo-rollouts status`.
    Rollout,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::Rollout => "rollout",
        }
    }
}

/// A named workload the gate looks up. Never created or modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub name: String,
    pub kind: WorkloadKind,
}

impl WorkloadRef {
    pub fn deployment(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: WorkloadKind::Deployment,
        }
    }

    pub fn rollout(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: WorkloadKind::Rollout,
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.name)
    }
}

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?$").unwrap())
}

/// Workload names are DNS-1123 labels.
pub fn validate_workload_name(name: &str) -> Result<()> {
    if name_re().is_match(name) {
        Ok(())
    } else {
        Err(BinderError::InvalidWorkloadName(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// GateStep / GateConfig
// ---------------------------------------------------------------------------

/// One entry in the ordered readiness chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateStep {
    pub name: String,
    pub kind: WorkloadKind,
    /// Optional steps are skipped when the workload does not exist.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    /// Per-step override of `GateConfig.timeout_seconds`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl GateStep {
    fn new(name: &str, kind: WorkloadKind, optional: bool) -> Self {
        Self {
            name: name.to_string(),
            kind,
            optional,
            timeout_seconds: None,
        }
    }

    pub fn workload(&self) -> WorkloadRef {
        WorkloadRef {
            name: self.name.clone(),
            kind: self.kind,
        }
    }
}

/// Which set of workloads to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// proxy, hub, autohttps (optional), binder
    #[default]
    Binderhub,
    /// proxy, hub, autohttps (optional)
    Jupyterhub,
}

impl Profile {
    pub fn steps(&self) -> Vec<GateStep> {
        let mut steps = vec![
            GateStep::new("proxy", WorkloadKind::Deployment, false),
            GateStep::new("hub", WorkloadKind::Rollout, false),
            GateStep::new("autohttps", WorkloadKind::Deployment, true),
        ];
        if *self == Profile::Binderhub {
            steps.push(GateStep::new("binder", WorkloadKind::Rollout, false));
        }
        steps
    }
}

impl FromStr for Profile {
    type Err = BinderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "binderhub" => Ok(Profile::Binderhub),
            "jupyterhub" => Ok(Profile::Jupyterhub),
            other => Err(BinderError::UnknownProfile(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Seconds to wait for each workload. `0` waits indefinitely.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_steps")]
    pub steps: Vec<GateStep>,
}

fn default_timeout() -> u64 {
    300
}

fn default_steps() -> Vec<GateStep> {
    Profile::default().steps()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            steps: default_steps(),
        }
    }
}

impl GateConfig {
    pub fn for_profile(profile: Profile) -> Self {
        Self {
            timeout_seconds: default_timeout(),
            steps: profile.steps(),
        }
    }

    pub fn timeout_for(&self, step: &GateStep) -> Duration {
        Duration::from_secs(step.timeout_seconds.unwrap_or(self.timeout_seconds))
    }

    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(BinderError::EmptyGate);
        }
        for step in &self.steps {
            validate_workload_name(&step.name)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Ready,
    Skipped,
    TimedOut { seconds: u64 },
    Failed { message: String },
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Ready | StepStatus::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Ready => f.write_str("ready"),
            StepStatus::Skipped => f.write_str("skipped"),
            StepStatus::TimedOut { seconds } => write!(f, "timed out after {seconds}s"),
            StepStatus::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub workload: WorkloadRef,
    #[serde(flatten)]
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Outcome of one pass through the gate.
///
/// Holds a result for every step that was attempted, in order. When the gate
/// fails, the last entry is the step that stopped it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub passed: bool,
    pub steps: Vec<StepResult>,
}

impl GateReport {
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.status.is_success())
    }

    /// Human-readable failure line, `None` when the gate passed.
    pub fn failure_message(&self) -> Option<String> {
        self.failed_step().map(|s| {
            format!(
                "readiness gate failed at workload {}: {}",
                s.workload.name, s.status
            )
        })
    }
}

// ---------------------------------------------------------------------------
// ClusterApi
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Present,
    Absent,
}

/// Read-only view of the orchestration API the gate depends on.
pub trait ClusterApi {
    /// Block until `workload` reports rolled out, fails, or `timeout` elapses.
    fn rollout_status(&self, workload: &WorkloadRef, timeout: Duration) -> StepStatus;

    /// `Ok(Absent)` only when the API clearly reports the resource missing.
    fn exists(&self, workload: &WorkloadRef) -> Result<Existence>;
}

// ---------------------------------------------------------------------------
// Gate evaluation
// ---------------------------------------------------------------------------

/// Wait for every configured workload to finish rolling out, in order.
///
/// Stops at the first step that times out or fails; later steps are not
/// attempted. Optional steps whose workload is absent are recorded as
/// `Skipped` and do not fail the gate.
pub fn await_core_ready(api: &dyn ClusterApi, config: &GateConfig) -> Result<GateReport> {
    config.validate()?;

    let mut steps = Vec::with_capacity(config.steps.len());
    for step in &config.steps {
        let workload = step.workload();
        let start = Instant::now();
        let status = check_step(api, step, &workload, config.timeout_for(step));
        let duration_ms = start.elapsed().as_millis() as u64;

        let ok = status.is_success();
        if ok {
            tracing::info!(workload = %workload, status = %status, duration_ms, "gate step passed");
        } else {
            tracing::warn!(workload = %workload, status = %status, duration_ms, "gate step failed");
        }
        steps.push(StepResult {
            workload,
            status,
            duration_ms,
        });
        if !ok {
            return Ok(GateReport {
                passed: false,
                steps,
            });
        }
    }

    Ok(GateReport {
        passed: true,
        steps,
    })
}

fn check_step(
    api: &dyn ClusterApi,
    step: &GateStep,
    workload: &WorkloadRef,
    timeout: Duration,
) -> StepStatus {
    if step.optional {
        match api.exists(workload) {
            Ok(Existence::Present) => {}
            Ok(Existence::Absent) => {
                tracing::info!(workload = %workload, "optional workload not found, skipping");
                return StepStatus::Skipped;
            }
            Err(e) => {
                return StepStatus::Failed {
                    message: format!("existence check failed: {e}"),
                }
            }
        }
    }
    api.rollout_status(workload, timeout)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Scripted cluster: every call is recorded, responses come from maps.
    #[derive(Default)]
    struct FakeCluster {
        statuses: HashMap<String, StepStatus>,
        absent: Vec<String>,
        broken_lookup: Vec<String>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeCluster {
        fn all_ready() -> Self {
            Self::default()
        }

        fn with_status(mut self, name: &str, status: StepStatus) -> Self {
            self.statuses.insert(name.to_string(), status);
            self
        }

        fn with_absent(mut self, name: &str) -> Self {
            self.absent.push(name.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl ClusterApi for FakeCluster {
        fn rollout_status(&self, workload: &WorkloadRef, _timeout: Duration) -> StepStatus {
            self.calls
                .borrow_mut()
                .push(format!("status:{}", workload.name));
            self.statuses
                .get(&workload.name)
                .cloned()
                .unwrap_or(StepStatus::Ready)
        }

        fn exists(&self, workload: &WorkloadRef) -> Result<Existence> {
            self.calls
                .borrow_mut()
                .push(format!("exists:{}", workload.name));
            if self.broken_lookup.contains(&workload.name) {
                return Err(BinderError::ClusterQuery("connection refused".to_string()));
            }
            if self.absent.contains(&workload.name) {
                Ok(Existence::Absent)
            } else {
                Ok(Existence::Present)
            }
        }
    }

    #[test]
    fn all_steps_ready_passes() {
        let api = FakeCluster::all_ready();
        let report = await_core_ready(&api, &GateConfig::default()).unwrap();
        assert!(report.passed);
        assert_eq!(report.steps.len(), 4);
        assert!(report.failed_step().is_none());
        assert_eq!(
            api.calls(),
            vec![
                "status:proxy",
                "status:hub",
                "exists:autohttps",
                "status:autohttps",
                "status:binder"
            ]
        );
    }

    #[test]
    fn proxy_failure_short_circuits() {
        let api = FakeCluster::all_ready().with_status(
            "proxy",
            StepStatus::Failed {
                message: "deployment exceeded its progress deadline".to_string(),
            },
        );
        let report = await_core_ready(&api, &GateConfig::default()).unwrap();
        assert!(!report.passed);
        assert_eq!(report.steps.len(), 1);
        assert_eq!(api.calls(), vec!["status:proxy"]);
        assert_eq!(report.failed_step().unwrap().workload.name, "proxy");
    }

    #[test]
    fn absent_autohttps_is_skipped() {
        let api = FakeCluster::all_ready().with_absent("autohttps");
        let report = await_core_ready(&api, &GateConfig::default()).unwrap();
        assert!(report.passed);
        assert_eq!(report.steps[2].status, StepStatus::Skipped);
        assert_eq!(
            api.calls(),
            vec![
                "status:proxy",
                "status:hub",
                "exists:autohttps",
                "status:binder"
            ]
        );
    }

    #[test]
    fn binder_timeout_fails_the_gate() {
        let api =
            FakeCluster::all_ready().with_status("binder", StepStatus::TimedOut { seconds: 300 });
        let report = await_core_ready(&api, &GateConfig::default()).unwrap();
        assert!(!report.passed);
        assert_eq!(report.steps.len(), 4);
        let failed = report.failed_step().unwrap();
        assert_eq!(failed.workload, WorkloadRef::rollout("binder"));
        assert_eq!(
            report.failure_message().unwrap(),
            "readiness gate failed at workload binder: timed out after 300s"
        );
    }

    #[test]
    fn lookup_error_on_optional_step_fails() {
        let mut api = FakeCluster::all_ready();
        api.broken_lookup.push("autohttps".to_string());
        let report = await_core_ready(&api, &GateConfig::default()).unwrap();
        assert!(!report.passed);
        let failed = report.failed_step().unwrap();
        assert_eq!(failed.workload.name, "autohttps");
        assert!(matches!(failed.status, StepStatus::Failed { .. }));
        assert!(!api.calls().contains(&"status:binder".to_string()));
    }

    #[test]
    fn jupyterhub_profile_has_no_binder_step() {
        let api = FakeCluster::all_ready();
        let config = GateConfig::for_profile(Profile::Jupyterhub);
        let report = await_core_ready(&api, &config).unwrap();
        assert!(report.passed);
        assert_eq!(report.steps.len(), 3);
        assert!(!api.calls().iter().any(|c| c.ends_with("binder")));
    }

    #[test]
    fn empty_gate_is_rejected() {
        let config = GateConfig {
            timeout_seconds: 300,
            steps: Vec::new(),
        };
        let err = await_core_ready(&FakeCluster::all_ready(), &config).unwrap_err();
        assert!(matches!(err, BinderError::EmptyGate));
    }

    #[test]
    fn step_timeout_override() {
        let mut config = GateConfig::default();
        config.steps[1].timeout_seconds = Some(30);
        assert_eq!(config.timeout_for(&config.steps[0]), Duration::from_secs(300));
        assert_eq!(config.timeout_for(&config.steps[1]), Duration::from_secs(30));
    }

    #[test]
    fn workload_name_validation() {
        assert!(validate_workload_name("proxy").is_ok());
        assert!(validate_workload_name("user-scheduler").is_ok());
        assert!(validate_workload_name("Proxy").is_err());
        assert!(validate_workload_name("-proxy").is_err());
        assert!(validate_workload_name("").is_err());
        assert!(validate_workload_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn profile_from_str() {
        assert_eq!("binderhub".parse::<Profile>().unwrap(), Profile::Binderhub);
        assert_eq!("jupyterhub".parse::<Profile>().unwrap(), Profile::Jupyterhub);
        assert!("kubernetes".parse::<Profile>().is_err());
    }

    #[test]
    fn gate_config_defaults_from_yaml() {
        let cfg: GateConfig = serde_yaml::from_str("timeout_seconds: 120\n").unwrap();
        assert_eq!(cfg.timeout_seconds, 120);
        assert_eq!(cfg.steps, Profile::Binderhub.steps());
    }

    #[test]
    fn gate_step_rejects_unknown_fields() {
        let yaml = "name: proxy\nkind: deployment\noptinal: true\n";
        assert!(serde_yaml::from_str::<GateStep>(yaml).is_err());
    }

    #[test]
    fn report_json_flattens_status() {
        let report = GateReport {
            passed: false,
            steps: vec![StepResult {
                workload: WorkloadRef::deployment("proxy"),
                status: StepStatus::Failed {
                    message: "boom".to_string(),
                },
                duration_ms: 12,
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][0]["status"], "failed");
        assert_eq!(json["steps"][0]["message"], "boom");
        assert_eq!(json["steps"][0]["workload"]["kind"], "deployment");
    }
}
