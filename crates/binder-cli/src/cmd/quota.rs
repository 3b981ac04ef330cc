use crate::output::print_json;
use anyhow::Context;
use binder_core::config::Config;
use binder_core::kubectl::Kubectl;
use binder_core::quota::{count_pods, evaluate, QuotaDecision, SINGLEUSER_SELECTOR};
use std::path::Path;

pub fn run(
    root: &Path,
    image: &str,
    limit: Option<u32>,
    namespace: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load(root).context("failed to load config")?;
    if namespace.is_some() {
        config.kubectl.namespace = namespace;
    }
    let quota = limit.or(config.launch.quota);

    let kubectl = Kubectl::new(&config.kubectl).context("cannot query the cluster")?;
    let pods = kubectl
        .list_pods(SINGLEUSER_SELECTOR)
        .context("failed to list single-user pods")?;
    let counts = count_pods(&pods, image);
    let decision = evaluate(counts, quota);

    match decision {
        QuotaDecision::Exceeded => tracing::error!(
            image,
            matching = counts.matching,
            quota = ?quota,
            total = counts.total,
            "launch quota exceeded"
        ),
        QuotaDecision::Crowded => tracing::warn!(
            image,
            matching = counts.matching,
            quota = ?quota,
            total = counts.total,
            "repository is using over half its quota"
        ),
        QuotaDecision::Allowed => tracing::info!(
            image,
            matching = counts.matching,
            total = counts.total,
            "within quota"
        ),
    }

    if json {
        print_json(&serde_json::json!({
            "image": image,
            "matching": counts.matching,
            "total": counts.total,
            "quota": quota,
            "decision": decision,
        }))?;
    } else {
        let limit = quota
            .map(|q| q.to_string())
            .unwrap_or_else(|| "unlimited".to_string());
        println!(
            "{image}: {} running (quota {limit}, {} servers total)",
            counts.matching, counts.total
        );
    }

    if !decision.allows_launch() {
        anyhow::bail!("too many users running {image}; try again soon");
    }
    Ok(())
}
