use crate::output::{print_json, print_warnings};
use anyhow::Context;
use binder_core::config::{Config, WarnLevel};
use binder_core::paths;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration (defaults applied)
    Show,
    /// Write binder.yaml with default values if it does not exist
    Init,
    /// Validate binder.yaml and report warnings and errors
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Init => init(root),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load_validated(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn init(root: &Path) -> anyhow::Result<()> {
    let path = paths::config_path(root);
    let data = serde_yaml::to_string(&Config::default())?;
    if binder_core::io::write_if_missing(&path, data.as_bytes())? {
        println!("created {}", path.display());
    } else {
        println!("{} already exists, left unchanged", path.display());
    }
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();
    let errors = warnings
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .count();

    if json {
        print_json(&serde_json::json!({
            "valid": errors == 0,
            "warnings": warnings,
        }))?;
    } else if warnings.is_empty() {
        println!("config ok");
    } else {
        print_warnings(&warnings);
    }

    if errors > 0 {
        anyhow::bail!("config has {errors} error(s)");
    }
    Ok(())
}
