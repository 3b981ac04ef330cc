use serde::{Deserialize, Serialize};

/// Label selector for single-user notebook servers spawned by the hub.
pub const SINGLEUSER_SELECTOR: &str = "app=jupyterhub,component=singleuser-server";

// ---------------------------------------------------------------------------
// Pod listing (subset of the `kubectl get pods -o json` shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pod {
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub name: String,
    pub image: String,
}

// ---------------------------------------------------------------------------
// Counting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PodCounts {
    /// Pods with at least one container running the image.
    pub matching: u32,
    pub total: u32,
}

/// Strip a trailing `:tag`. A colon inside the registry host (`host:5000/x`)
/// is left alone.
pub fn image_without_tag(image: &str) -> &str {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => repo,
        _ => image,
    }
}

/// Count pods running `image`, ignoring tags on both sides.
pub fn count_pods(pods: &PodList, image: &str) -> PodCounts {
    let wanted = image_without_tag(image);
    let mut counts = PodCounts {
        matching: 0,
        total: 0,
    };
    for pod in &pods.items {
        counts.total += 1;
        if pod
            .spec
            .containers
            .iter()
            .any(|c| image_without_tag(&c.image) == wanted)
        {
            counts.matching += 1;
        }
    }
    counts
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDecision {
    Allowed,
    /// Allowed, but at least half the quota is in use.
    Crowded,
    Exceeded,
}

impl QuotaDecision {
    pub fn allows_launch(&self) -> bool {
        !matches!(self, QuotaDecision::Exceeded)
    }
}

/// `None` or `Some(0)` means the repository is unlimited.
pub fn evaluate(counts: PodCounts, quota: Option<u32>) -> QuotaDecision {
    let Some(quota) = quota.filter(|q| *q > 0) else {
        return QuotaDecision::Allowed;
    };
    if counts.matching >= quota {
        QuotaDecision::Exceeded
    } else if u64::from(counts.matching) * 2 >= u64::from(quota) {
        QuotaDecision::Crowded
    } else {
        QuotaDecision::Allowed
    }
}
