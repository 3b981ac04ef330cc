//! SQLite-backed store of repository access tokens.
//!
//! A session is opened when a user must authorize against a repository
//! provider; its random `state` round-trips through the provider's OAuth
//! redirect, and the callback registers the token against that state.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{BinderError, Result};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS repo_session (
    user TEXT NOT NULL,
    provider_id TEXT NOT NULL,
    access_token TEXT,
    state TEXT NOT NULL,
    acquired TEXT,
    expires TEXT,
    provider_name TEXT NOT NULL,
    spec TEXT NOT NULL
);";

/// Session details recorded when authorization started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSession {
    pub provider_name: String,
    pub spec: String,
}

pub struct TokenStore {
    conn: Connection,
}

impl TokenStore {
    /// Open or create the store at `path`, creating the table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Start an authorization session and return its state token.
    pub fn new_session(
        &self,
        spec: &str,
        user: &str,
        provider_name: &str,
        provider_id: &str,
    ) -> Result<String> {
        tracing::info!(user, provider_id, "new repo auth session");
        let state = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO repo_session (user, provider_name, provider_id, state, spec)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user, provider_name, provider_id, state, spec],
        )?;
        Ok(state)
    }

    pub fn get_session(&self, user: &str, state: &str) -> Result<RepoSession> {
        self.conn
            .query_row(
                "SELECT provider_name, spec FROM repo_session WHERE user = ?1 AND state = ?2",
                params![user, state],
                |row| {
                    Ok(RepoSession {
                        provider_name: row.get(0)?,
                        spec: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| session_not_found(user, state))
    }

    /// Attach a token to the session identified by `state`, returning the
    /// session's spec. A session accepts only its first token.
    ///
    /// `expires = None` means the token does not expire.
    pub fn register_token(
        &self,
        user: &str,
        state: &str,
        access_token: &str,
        expires: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let updated = self.conn.execute(
            "UPDATE repo_session SET access_token = ?1, acquired = ?2, expires = ?3
             WHERE user = ?4 AND state = ?5 AND access_token IS NULL",
            params![
                access_token,
                Utc::now().to_rfc3339(),
                expires.map(|e| e.to_rfc3339()),
                user,
                state
            ],
        )?;
        if updated == 0 {
            tracing::warn!(user, "token not registered: session missing or already holds a token");
        }
        Ok(self.get_session(user, state)?.spec)
    }

    /// Most recently acquired, unexpired token for the user and provider.
    pub fn get_access_token_for(
        &self,
        user: &str,
        provider_name: &str,
        provider_id: &str,
    ) -> Result<Option<String>> {
        self.access_token_at(user, provider_name, provider_id, Utc::now())
    }

    fn access_token_at(
        &self,
        user: &str,
        provider_name: &str,
        provider_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT access_token, expires FROM repo_session
                 WHERE user = ?1 AND provider_name = ?2 AND provider_id = ?3
                   AND access_token IS NOT NULL
                 ORDER BY acquired DESC LIMIT 1",
                params![user, provider_name, provider_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((token, expires)) = row else {
            return Ok(None);
        };
        match expires {
            None => Ok(Some(token)),
            Some(raw) => {
                let expires = DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| BinderError::InvalidTimestamp(format!("{raw}: {e}")))?
                    .with_timezone(&Utc);
                if expires < now {
                    Ok(None)
                } else {
                    Ok(Some(token))
                }
            }
        }
    }
}

fn session_not_found(user: &str, state: &str) -> BinderError {
    BinderError::SessionNotFound {
        user: user.to_string(),
        state: state.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn session_roundtrip() {
        let store = TokenStore::open_in_memory().unwrap();
        let state = store
            .new_session("osf.io/abc12", "alice", "osf", "osf-prod")
            .unwrap();
        let session = store.get_session("alice", &state).unwrap();
        assert_eq!(session.provider_name, "osf");
        assert_eq!(session.spec, "osf.io/abc12");
    }

    #[test]
    fn unknown_session_is_an_error() {
        let store = TokenStore::open_in_memory().unwrap();
        let err = store.get_session("alice", "nope").unwrap_err();
        assert!(matches!(err, BinderError::SessionNotFound { .. }));
    }

    #[test]
    fn registered_token_is_returned() {
        let store = TokenStore::open_in_memory().unwrap();
        let state = store.new_session("spec", "alice", "osf", "osf-prod").unwrap();
        let expires = Utc::now() + Duration::hours(1);
        let spec = store
            .register_token("alice", &state, "tok-1", Some(expires))
            .unwrap();
        assert_eq!(spec, "spec");
        assert_eq!(
            store
                .get_access_token_for("alice", "osf", "osf-prod")
                .unwrap()
                .as_deref(),
            Some("tok-1")
        );
        assert!(store
            .get_access_token_for("bob", "osf", "osf-prod")
            .unwrap()
            .is_none());
    }

    #[test]
    fn expired_token_is_not_returned() {
        let store = TokenStore::open_in_memory().unwrap();
        let state = store.new_session("spec", "alice", "osf", "osf-prod").unwrap();
        let expires = Utc::now() - Duration::minutes(1);
        store
            .register_token("alice", &state, "old", Some(expires))
            .unwrap();
        assert!(store
            .get_access_token_for("alice", "osf", "osf-prod")
            .unwrap()
            .is_none());
    }

    #[test]
    fn token_without_expiry_never_expires() {
        let store = TokenStore::open_in_memory().unwrap();
        let state = store.new_session("spec", "alice", "osf", "osf-prod").unwrap();
        store.register_token("alice", &state, "forever", None).unwrap();
        let far_future = Utc::now() + Duration::days(3650);
        assert_eq!(
            store
                .access_token_at("alice", "osf", "osf-prod", far_future)
                .unwrap()
                .as_deref(),
            Some("forever")
        );
    }

    #[test]
    fn session_accepts_only_first_token() {
        let store = TokenStore::open_in_memory().unwrap();
        let state = store.new_session("spec", "alice", "osf", "osf-prod").unwrap();
        store.register_token("alice", &state, "first", None).unwrap();
        store.register_token("alice", &state, "second", None).unwrap();
        assert_eq!(
            store
                .get_access_token_for("alice", "osf", "osf-prod")
                .unwrap()
                .as_deref(),
            Some("first")
        );
    }

    #[test]
    fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens/repo_tokens.sqlite");
        let state = {
            let store = TokenStore::open(&path).unwrap();
            let state = store.new_session("spec", "alice", "osf", "osf-prod").unwrap();
            store.register_token("alice", &state, "tok", None).unwrap();
            state
        };
        let store = TokenStore::open(&path).unwrap();
        assert_eq!(store.get_session("alice", &state).unwrap().spec, "spec");
        assert_eq!(
            store
                .get_access_token_for("alice", "osf", "osf-prod")
                .unwrap()
                .as_deref(),
            Some("tok")
        );
    }
}
