use crate::output::print_json;
use anyhow::Context;
use binder_core::config::Config;
use binder_core::naming;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum NameSubcommand {
    /// Build pod name for a repository slug and resolved ref
    Build {
        #[arg(long)]
        slug: String,
        #[arg(long = "ref")]
        git_ref: String,
        #[arg(long, default_value = naming::BUILD_PREFIX)]
        prefix: String,
    },
    /// Image reference for a repository slug and resolved ref
    Image {
        #[arg(long)]
        slug: String,
        #[arg(long = "ref")]
        git_ref: String,
        /// Image prefix (default: images.prefix from binder.yaml)
        #[arg(long)]
        prefix: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: NameSubcommand, json: bool) -> anyhow::Result<()> {
    let name = match subcmd {
        NameSubcommand::Build {
            slug,
            git_ref,
            prefix,
        } => naming::generate_build_name(
            &slug,
            &git_ref,
            &prefix,
            naming::BUILD_NAME_LIMIT,
            6,
        ),
        NameSubcommand::Image {
            slug,
            git_ref,
            prefix,
        } => {
            let prefix = match prefix {
                Some(p) => p,
                None => {
                    Config::load(root)
                        .context("failed to load config")?
                        .images
                        .prefix
                }
            };
            naming::image_name(&prefix, &slug, &git_ref)
        }
    };

    if json {
        print_json(&serde_json::json!({ "name": name }))?;
    } else {
        println!("{name}");
    }
    Ok(())
}
