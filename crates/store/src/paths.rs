//! Locating (and creating) the database file for an account.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Candidate database locations, most preferred first.
///
/// An explicit path wins outright. Otherwise the platform data directory
/// (`$XDG_DATA_HOME` or `~/.local/share` on Linux) is tried, then the
/// current working directory.
pub fn candidate_paths(app_name: &str, account: &str, explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    let file_name = format!("{account}.db");
    let mut paths = Vec::new();

    match BaseDirs::new() {
        Some(dirs) => paths.push(dirs.data_dir().join(app_name).join(&file_name)),
        None => debug!("no home directory found, skipping platform data dir"),
    }
    match std::env::current_dir() {
        Ok(cwd) => paths.push(cwd.join(&file_name)),
        Err(e) => debug!("error getting current working directory: {e}"),
    }

    paths
}

/// Returns the first candidate that can be created and opened for writing.
///
/// Parent directories are created as needed and the file itself is created
/// if missing, similar to touch(1).
pub fn resolve_db_path(candidates: &[PathBuf]) -> Result<PathBuf> {
    for path in candidates {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                debug!("error creating db dir {}, skipping: {e}", parent.display());
                continue;
            }
        }
        match OpenOptions::new().read(true).write(true).create(true).open(path) {
            Ok(_) => return Ok(path.clone()),
            Err(e) => debug!("error opening or creating db {}, skipping: {e}", path.display()),
        }
    }

    Err(StoreError::NoWritableLocation {
        tried: candidates.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_path_is_the_only_candidate() {
        let paths = candidate_paths("communique", "me@example.com", Some(Path::new("/tmp/x.db")));
        assert_eq!(paths, vec![PathBuf::from("/tmp/x.db")]);
    }

    #[test]
    fn default_candidates_end_with_account_file() {
        let paths = candidate_paths("communique", "me@example.com", None);
        assert!(!paths.is_empty());
        for p in &paths {
            assert!(p.ends_with("me@example.com.db"), "{}", p.display());
        }
    }

    #[test]
    fn resolve_creates_parent_dirs_and_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/deeper/me.db");
        let got = resolve_db_path(&[target.clone()]).unwrap();
        assert_eq!(got, target);
        assert!(target.exists());
    }

    #[test]
    fn resolve_skips_unusable_candidates() {
        let dir = TempDir::new().unwrap();
        // A regular file cannot act as a parent directory.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let bad = blocker.join("me.db");
        let good = dir.path().join("me.db");

        let got = resolve_db_path(&[bad, good.clone()]).unwrap();
        assert_eq!(got, good);
    }

    #[test]
    fn resolve_fails_when_nothing_is_writable() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let err = resolve_db_path(&[blocker.join("a.db")]).unwrap_err();
        assert!(matches!(err, StoreError::NoWritableLocation { .. }));
    }
}
