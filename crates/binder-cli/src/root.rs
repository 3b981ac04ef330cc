use binder_core::paths::CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `BINDER_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `binder.yaml`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    find_upward(&cwd, |dir| dir.join(CONFIG_FILE).is_file())
        .or_else(|| find_upward(&cwd, |dir| dir.join(".git").is_dir()))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, found: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|dir| found(dir)).map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_config_in_ancestor() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "version: 1\n").unwrap();
        let subdir = dir.path().join("deploy/staging");
        std::fs::create_dir_all(&subdir).unwrap();

        let found = find_upward(&subdir, |d| d.join(CONFIG_FILE).is_file());
        assert_eq!(found.as_deref(), Some(dir.path()));
    }

    #[test]
    fn nothing_found() {
        let dir = TempDir::new().unwrap();
        assert!(find_upward(dir.path(), |d| d.join("no-such-marker-file").exists()).is_none());
    }
}
