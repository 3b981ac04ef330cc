use crate::error::Result;
use crate::gate::{validate_workload_name, GateConfig};
use crate::kubectl::KubectlConfig;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ImageConfig / LaunchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Prepended to every image name, e.g. `gcr.io/my-project/binder-`.
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Max concurrent servers per repository image. Unset means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<u32>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub kubectl: KubectlConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub launch: LaunchConfig,
    /// Token store path, relative to the project root.
    #[serde(default = "default_token_store")]
    pub token_store: PathBuf,
}

fn default_version() -> u32 {
    1
}

fn default_token_store() -> PathBuf {
    PathBuf::from(paths::TOKEN_STORE_FILE)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            gate: GateConfig::default(),
            kubectl: KubectlConfig::default(),
            images: ImageConfig::default(),
            launch: LaunchConfig::default(),
            token_store: default_token_store(),
        }
    }
}

impl Config {
    /// Load `binder.yaml` from `root`. A missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but rejects a gate with no steps or with a
    /// malformed workload name.
    pub fn load_validated(root: &Path) -> Result<Self> {
        let cfg = Self::load(root)?;
        cfg.gate.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn token_store_path(&self, root: &Path) -> PathBuf {
        root.join(&self.token_store)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.gate.steps.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "gate.steps is empty: nothing to wait for".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for step in &self.gate.steps {
            if let Err(e) = validate_workload_name(&step.name) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: e.to_string(),
                });
            }
            if !seen.insert((step.name.as_str(), step.kind)) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "{} '{}' appears more than once in gate.steps",
                        step.kind.as_str(),
                        step.name
                    ),
                });
            }
            if step.timeout_seconds == Some(0) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("step '{}' has timeout 0 and waits indefinitely", step.name),
                });
            }
        }

        if self.gate.timeout_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "gate.timeout_seconds is 0: steps wait indefinitely".to_string(),
            });
        }

        if self.kubectl.kubectl.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "kubectl.kubectl is empty".to_string(),
            });
        }

        if self.launch.quota == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "launch.quota is 0, which means unlimited; omit it instead".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BinderError;
    use crate::gate::{GateStep, WorkloadKind};
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.gate.timeout_seconds, 300);
        assert_eq!(cfg.gate.steps.len(), 4);
    }

    #[test]
    fn load_validated_rejects_bad_workload_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("binder.yaml"),
            "gate:\n  steps:\n    - name: Not_Valid\n      kind: deployment\n",
        )
        .unwrap();

        assert!(Config::load(dir.path()).is_ok());
        let err = Config::load_validated(dir.path()).unwrap_err();
        assert!(matches!(err, BinderError::InvalidWorkloadName(_)));
    }

    #[test]
    fn load_validated_rejects_empty_gate() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("binder.yaml"), "gate:\n  steps: []\n").unwrap();
        let err = Config::load_validated(dir.path()).unwrap_err();
        assert!(matches!(err, BinderError::EmptyGate));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.kubectl.namespace = Some("binder-staging".to_string());
        cfg.launch.quota = Some(100);
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "gate:\n  timeout_seconds: 60\n  steps:\n    - name: hub\n      kind: rollout\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.gate.timeout_seconds, 60);
        assert_eq!(cfg.gate.steps.len(), 1);
        assert_eq!(cfg.kubectl.kubectl, "kubectl");
        assert_eq!(cfg.token_store, PathBuf::from(paths::TOKEN_STORE_FILE));
    }

    #[test]
    fn default_config_is_clean() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn validate_flags_bad_steps() {
        let mut cfg = Config::default();
        cfg.gate.steps.push(GateStep {
            name: "Proxy_2".to_string(),
            kind: WorkloadKind::Deployment,
            optional: false,
            timeout_seconds: None,
        });
        cfg.gate.steps.push(cfg.gate.steps[0].clone());
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("Proxy_2")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("more than once")));
    }

    #[test]
    fn validate_flags_empty_gate() {
        let mut cfg = Config::default();
        cfg.gate.steps.clear();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Error);
    }
}
