use thiserror::Error;

#[derive(Debug, Error)]
pub enum BinderError {
    #[error("invalid workload name '{0}': must be a lowercase DNS label (a-z, 0-9, '-')")]
    InvalidWorkloadName(String),

    #[error("invalid minAvailable '{0}': expected an integer or a percentage like \"50%\"")]
    InvalidMinAvailable(String),

    #[error("invalid release name '{0}'")]
    InvalidReleaseName(String),

    #[error("gate has no steps")]
    EmptyGate,

    #[error("unknown gate profile '{0}': expected 'binderhub' or 'jupyterhub'")]
    UnknownProfile(String),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("failed to spawn {command}: {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("cluster query failed: {0}")]
    ClusterQuery(String),

    #[error("session not found for user '{user}' and state '{state}'")]
    SessionNotFound { user: String, state: String },

    #[error("invalid timestamp in token store: {0}")]
    InvalidTimestamp(String),

    #[error("token store error: {0}")]
    TokenStore(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BinderError>;
