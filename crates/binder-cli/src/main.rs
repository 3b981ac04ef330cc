mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, name::NameSubcommand, render::RenderSubcommand,
    token::TokenSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "binderctl",
    about = "Readiness gate and chart tooling for a BinderHub deployment",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from binder.yaml or .git/)
    #[arg(long, global = true, env = "BINDER_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the core workloads to finish rolling out, in order
    Await {
        /// Workload set to check: binderhub or jupyterhub (default: from binder.yaml)
        #[arg(long)]
        profile: Option<String>,

        /// Seconds to wait for each workload, overriding per-step timeouts (0 = no limit)
        #[arg(long)]
        timeout: Option<u64>,

        /// Kubernetes namespace
        #[arg(long, short = 'n', env = "BINDER_NAMESPACE")]
        namespace: Option<String>,

        /// kubeconfig context
        #[arg(long)]
        context: Option<String>,
    },

    /// Render chart manifests
    Render {
        #[command(subcommand)]
        subcommand: RenderSubcommand,
    },

    /// Show, create, or validate binder.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Compute build and image names for a repository ref
    Name {
        #[command(subcommand)]
        subcommand: NameSubcommand,
    },

    /// Manage repository access tokens
    Token {
        /// Token store path, relative to the current directory (default: token_store from binder.yaml, relative to the project root)
        #[arg(long)]
        store: Option<PathBuf>,

        #[command(subcommand)]
        subcommand: TokenSubcommand,
    },

    /// Check a repository image against the launch quota
    Quota {
        /// Image to count (tag is ignored)
        #[arg(long)]
        image: String,

        /// Max concurrent servers (default: launch.quota from binder.yaml)
        #[arg(long)]
        limit: Option<u32>,

        /// Kubernetes namespace
        #[arg(long, short = 'n', env = "BINDER_NAMESPACE")]
        namespace: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Await { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Await {
            profile,
            timeout,
            namespace,
            context,
        } => cmd::await_ready::run(
            &root,
            cmd::await_ready::AwaitArgs {
                profile,
                timeout,
                namespace,
                context,
            },
            cli.json,
        ),
        Commands::Render { subcommand } => cmd::render::run(subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Name { subcommand } => cmd::name::run(&root, subcommand, cli.json),
        Commands::Token { store, subcommand } => {
            cmd::token::run(&root, store.as_deref(), subcommand, cli.json)
        }
        Commands::Quota {
            image,
            limit,
            namespace,
        } => cmd::quota::run(&root, &image, limit, namespace, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
