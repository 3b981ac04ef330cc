use crate::output::{print_json, print_table};
use anyhow::Context;
use binder_core::config::Config;
use binder_core::gate::{await_core_ready, ClusterApi, GateConfig, GateReport, Profile};
use binder_core::kubectl::Kubectl;
use std::path::Path;

pub struct AwaitArgs {
    pub profile: Option<String>,
    pub timeout: Option<u64>,
    pub namespace: Option<String>,
    pub context: Option<String>,
}

pub fn run(root: &Path, args: AwaitArgs, json: bool) -> anyhow::Result<()> {
    let mut config = Config::load_validated(root).context("failed to load config")?;
    if args.namespace.is_some() {
        config.kubectl.namespace = args.namespace.clone();
    }
    if args.context.is_some() {
        config.kubectl.context = args.context.clone();
    }

    let gate = gate_config(&config, &args)?;
    let kubectl = Kubectl::new(&config.kubectl).context("cannot query the cluster")?;
    report(&kubectl, &gate, json)
}

/// Apply command-line overrides on top of the configured gate.
fn gate_config(config: &Config, args: &AwaitArgs) -> anyhow::Result<GateConfig> {
    let mut gate = match &args.profile {
        Some(name) => {
            let profile: Profile = name.parse()?;
            GateConfig {
                timeout_seconds: config.gate.timeout_seconds,
                steps: profile.steps(),
            }
        }
        None => config.gate.clone(),
    };
    if let Some(t) = args.timeout {
        gate.timeout_seconds = t;
        for step in &mut gate.steps {
            step.timeout_seconds = None;
        }
    }
    Ok(gate)
}

fn report(api: &dyn ClusterApi, gate: &GateConfig, json: bool) -> anyhow::Result<()> {
    let report = await_core_ready(api, gate)?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    match report.failure_message() {
        Some(msg) => anyhow::bail!(msg),
        None => Ok(()),
    }
}

fn print_report(report: &GateReport) {
    let rows: Vec<Vec<String>> = report
        .steps
        .iter()
        .map(|s| {
            vec![
                s.workload.name.clone(),
                s.workload.kind.as_str().to_string(),
                s.status.to_string(),
                format!("{:.1}s", s.duration_ms as f64 / 1000.0),
            ]
        })
        .collect();
    print_table(&["WORKLOAD", "KIND", "STATUS", "TIME"], &rows);
    if report.passed {
        println!("\nall workloads ready");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> AwaitArgs {
        AwaitArgs {
            profile: None,
            timeout: None,
            namespace: None,
            context: None,
        }
    }

    #[test]
    fn configured_gate_used_by_default() {
        let mut config = Config::default();
        config.gate.timeout_seconds = 45;
        let gate = gate_config(&config, &args()).unwrap();
        assert_eq!(gate, config.gate);
    }

    #[test]
    fn profile_and_timeout_override() {
        let config = Config::default();
        let gate = gate_config(
            &config,
            &AwaitArgs {
                profile: Some("jupyterhub".to_string()),
                timeout: Some(600),
                ..args()
            },
        )
        .unwrap();
        assert_eq!(gate.timeout_seconds, 600);
        assert_eq!(gate.steps, Profile::Jupyterhub.steps());
    }

    #[test]
    fn command_line_timeout_beats_step_override() {
        let mut config = Config::default();
        config.gate.steps[3].timeout_seconds = Some(900);
        let gate = gate_config(
            &config,
            &AwaitArgs {
                timeout: Some(60),
                ..args()
            },
        )
        .unwrap();
        for step in &gate.steps {
            assert_eq!(gate.timeout_for(step), std::time::Duration::from_secs(60));
        }

        let gate = gate_config(&config, &args()).unwrap();
        assert_eq!(
            gate.timeout_for(&gate.steps[3]),
            std::time::Duration::from_secs(900)
        );
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let err = gate_config(
            &Config::default(),
            &AwaitArgs {
                profile: Some("nope".to_string()),
                ..args()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown gate profile"));
    }
}
