use crate::output::print_json;
use anyhow::Context;
use binder_core::config::Config;
use binder_core::token_store::TokenStore;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum TokenSubcommand {
    /// Start an authorization session and print its state token
    NewSession {
        #[arg(long)]
        user: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        provider_id: String,
        /// Repository spec the session authorizes
        #[arg(long)]
        spec: String,
    },
    /// Show the provider and spec recorded for a session
    Session {
        #[arg(long)]
        user: String,
        #[arg(long)]
        state: String,
    },
    /// Attach an access token to a session
    Register {
        #[arg(long)]
        user: String,
        #[arg(long)]
        state: String,
        #[arg(long)]
        token: String,
        /// Expiry as RFC 3339 (omit for a token that never expires)
        #[arg(long)]
        expires: Option<String>,
    },
    /// Print the current access token for a user and provider
    Get {
        #[arg(long)]
        user: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        provider_id: String,
    },
}

pub fn run(
    root: &Path,
    store: Option<&Path>,
    subcmd: TokenSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let path = store_path(root, store)?;
    let store = TokenStore::open(&path)
        .with_context(|| format!("failed to open token store {}", path.display()))?;

    match subcmd {
        TokenSubcommand::NewSession {
            user,
            provider,
            provider_id,
            spec,
        } => {
            let state = store.new_session(&spec, &user, &provider, &provider_id)?;
            emit(json, "state", &state)
        }
        TokenSubcommand::Session { user, state } => {
            let session = store.get_session(&user, &state)?;
            if json {
                print_json(&serde_json::json!({
                    "provider_name": session.provider_name,
                    "spec": session.spec,
                }))
            } else {
                println!("{} {}", session.provider_name, session.spec);
                Ok(())
            }
        }
        TokenSubcommand::Register {
            user,
            state,
            token,
            expires,
        } => {
            let expires = expires.as_deref().map(parse_expiry).transpose()?;
            let spec = store.register_token(&user, &state, &token, expires)?;
            emit(json, "spec", &spec)
        }
        TokenSubcommand::Get {
            user,
            provider,
            provider_id,
        } => match store.get_access_token_for(&user, &provider, &provider_id)? {
            Some(token) => emit(json, "access_token", &token),
            None => anyhow::bail!("no valid token for {user} on {provider}/{provider_id}"),
        },
    }
}

fn store_path(root: &Path, explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(p) => Ok(p.to_path_buf()),
        None => {
            let config = Config::load(root).context("failed to load config")?;
            Ok(config.token_store_path(root))
        }
    }
}

fn parse_expiry(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid --expires '{raw}': expected RFC 3339"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn emit(json: bool, key: &str, value: &str) -> anyhow::Result<()> {
    if json {
        print_json(&serde_json::json!({ key: value }))
    } else {
        println!("{value}");
        Ok(())
    }
}
