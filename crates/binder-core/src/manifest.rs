//! Rendering of the chart's PodDisruptionBudget.
//!
//! The manifest is built from typed structs and serialized with
//! `serde_yaml`. Label maps are `BTreeMap`s and field order is fixed by the
//! struct layout, so identical values always render byte-identical output.

use crate::error::{BinderError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

pub const PDB_API_VERSION: &str = "policy/v1";
pub const COMPONENT: &str = "binder";

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// The subset of chart values this renderer reads. Unknown keys are ignored
/// so a full `values.yaml` can be passed in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartValues {
    #[serde(default)]
    pub pdb: PdbValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdbValues {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub min_available: MinAvailable,
}

fn default_enabled() -> bool {
    true
}

impl Default for PdbValues {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            min_available: MinAvailable::default(),
        }
    }
}

/// An absolute replica count or a percentage such as `"50%"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MinAvailable {
    Count(u32),
    Percent(String),
}

impl Default for MinAvailable {
    fn default() -> Self {
        MinAvailable::Count(1)
    }
}

static PERCENT_RE: OnceLock<Regex> = OnceLock::new();

fn percent_re() -> &'static Regex {
    PERCENT_RE.get_or_init(|| Regex::new(r"^(100|[1-9]?[0-9])%$").unwrap())
}

impl MinAvailable {
    pub fn validate(&self) -> Result<()> {
        match self {
            MinAvailable::Count(_) => Ok(()),
            MinAvailable::Percent(p) if percent_re().is_match(p) => Ok(()),
            MinAvailable::Percent(p) => Err(BinderError::InvalidMinAvailable(p.clone())),
        }
    }
}

impl ChartValues {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        // An empty values file is a valid "all defaults".
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }
}

// ---------------------------------------------------------------------------
// Release metadata
// ---------------------------------------------------------------------------

/// Metadata the chart host supplies alongside the values.
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub name: String,
    pub service: String,
}

static RELEASE_RE: OnceLock<Regex> = OnceLock::new();

fn release_re() -> &'static Regex {
    RELEASE_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
    })
}

impl Release {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: "Helm".to_string(),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Release names follow Helm's rule: DNS subdomain, at most 53 chars.
    pub fn validate(&self) -> Result<()> {
        if self.name.len() > 53 || !release_re().is_match(&self.name) {
            return Err(BinderError::InvalidReleaseName(self.name.clone()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Manifest types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodDisruptionBudget {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: PdbSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectMeta {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdbSpec {
    pub min_available: MinAvailable,
    pub selector: LabelSelector,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

/// Labels selecting the binder pods of a release.
pub fn selector_labels(release: &Release) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), COMPONENT.to_string());
    labels.insert("name".to_string(), COMPONENT.to_string());
    labels.insert("component".to_string(), COMPONENT.to_string());
    labels.insert("release".to_string(), release.name.clone());
    labels
}

/// Build the budget, or `None` when `pdb.enabled` is false.
pub fn build_pdb(values: &ChartValues, release: &Release) -> Result<Option<PodDisruptionBudget>> {
    if !values.pdb.enabled {
        return Ok(None);
    }
    values.pdb.min_available.validate()?;
    release.validate()?;

    let mut labels = selector_labels(release);
    labels.insert("heritage".to_string(), release.service.clone());

    Ok(Some(PodDisruptionBudget {
        api_version: PDB_API_VERSION,
        kind: "PodDisruptionBudget",
        metadata: ObjectMeta {
            name: COMPONENT.to_string(),
            labels,
        },
        spec: PdbSpec {
            min_available: values.pdb.min_available.clone(),
            selector: LabelSelector {
                match_labels: selector_labels(release),
            },
        },
    }))
}

/// Render the budget as YAML. Returns `None` when nothing is emitted.
pub fn render_pdb(values: &ChartValues, release: &Release) -> Result<Option<String>> {
    match build_pdb(values, release)? {
        Some(pdb) => Ok(Some(serde_yaml::to_string(&pdb)?)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
