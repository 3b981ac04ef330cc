use crate::output::print_json;
use anyhow::Context;
use binder_core::manifest::{build_pdb, render_pdb, ChartValues, Release};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum RenderSubcommand {
    /// Render the binder PodDisruptionBudget
    Pdb {
        /// Chart values file (reads pdb.enabled / pdb.minAvailable)
        #[arg(long, short = 'f')]
        values: Option<PathBuf>,

        /// Release name
        #[arg(long)]
        release: String,

        /// Release service recorded in the heritage label
        #[arg(long, default_value = "Helm")]
        service: String,

        /// Write to this file instead of stdout (removed when pdb.enabled is false)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },
}

pub fn run(subcmd: RenderSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        RenderSubcommand::Pdb {
            values,
            release,
            service,
            out,
        } => pdb(values.as_deref(), &release, &service, out.as_deref(), json),
    }
}

fn pdb(
    values: Option<&Path>,
    release: &str,
    service: &str,
    out: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let values = match values {
        Some(path) => ChartValues::load(path)
            .with_context(|| format!("failed to read values from {}", path.display()))?,
        None => ChartValues::default(),
    };
    let release = Release::new(release).with_service(service);

    let rendered = if json {
        match build_pdb(&values, &release)? {
            Some(manifest) => Some(serde_json::to_string_pretty(&manifest)? + "\n"),
            None => None,
        }
    } else {
        render_pdb(&values, &release)?
    };

    match (rendered, out) {
        (Some(text), Some(path)) => {
            binder_core::io::atomic_write(path, text.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        (Some(text), None) => print!("{text}"),
        (None, Some(path)) => {
            tracing::info!("pdb.enabled is false, nothing rendered");
            remove_stale(path)?;
        }
        (None, None) => {
            tracing::info!("pdb.enabled is false, nothing rendered");
            if json {
                print_json(&serde_json::Value::Null)?;
            }
        }
    }
    Ok(())
}

/// A disabled budget must not leave an earlier render behind at `path`.
fn remove_stale(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            println!("removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}
