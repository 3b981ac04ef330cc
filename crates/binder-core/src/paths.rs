use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "binder.yaml";
pub const TOKEN_STORE_FILE: &str = ".binder/repo_tokens.sqlite";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}
