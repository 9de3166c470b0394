//! Repository acquisition: turn a locator into a local source tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use crate::error::{Error, Result};

/// A source tree ready to be chunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub name: String,
    pub root: PathBuf,
    /// Whether `root` is a clone we created and may delete.
    pub cloned: bool,
}

/// Whether the locator names a remote repository rather than a local path.
pub fn is_remote(locator: &str) -> bool {
    let l = locator.trim();
    ["http://", "https://", "git@", "ssh://", "git://", "file://"]
        .iter()
        .any(|p| l.starts_with(p))
        || l.ends_with(".git")
}

/// Derive the repository name used as the index key.
///
/// Takes the last path segment (query and fragment stripped), removes a
/// trailing `.git`, and replaces anything outside `[A-Za-z0-9._-]` with `_`.
pub fn derive_repo_name(locator: &str) -> Result<String> {
    let trimmed = locator.trim();
    let without_suffix = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches(['/', '\\']);
    let segment = without_suffix
        .rsplit(['/', '\\', ':'])
        .next()
        .unwrap_or_default();
    let segment = segment.strip_suffix(".git").unwrap_or(segment);

    let name: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        return Err(Error::Acquisition(format!(
            "cannot derive a repository name from '{locator}'"
        )));
    }
    Ok(name)
}

/// Resolve `locator` to a local tree, cloning remote repositories into
/// `repos_dir/<name>`. A failed clone leaves no directory behind.
pub fn acquire(locator: &str, repos_dir: &Path) -> Result<Checkout> {
    let name = derive_repo_name(locator)?;

    if !is_remote(locator) {
        let root = PathBuf::from(locator.trim());
        if !root.is_dir() {
            return Err(Error::Acquisition(format!(
                "'{locator}' is neither a repository URL nor a local directory"
            )));
        }
        return Ok(Checkout {
            name,
            root,
            cloned: false,
        });
    }

    fs::create_dir_all(repos_dir).map_err(|e| {
        Error::Acquisition(format!("cannot create {}: {e}", repos_dir.display()))
    })?;
    let dest = repos_dir.join(&name);
    if dest.exists() {
        fs::remove_dir_all(&dest).map_err(|e| {
            Error::Acquisition(format!("cannot remove stale clone {}: {e}", dest.display()))
        })?;
    }

    info!("Cloning {locator} into {}", dest.display());
    let output = Command::new("git")
        .args(["clone", "--depth=1", "--quiet", locator.trim()])
        .arg(&dest)
        .output()
        .map_err(|e| Error::Acquisition(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let _ = fs::remove_dir_all(&dest);
        return Err(Error::Acquisition(format!(
            "git clone failed ({}): {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(Checkout {
        name,
        root: dest,
        cloned: true,
    })
}

/// Delete a clone created by [`acquire`]. Local trees are never touched.
pub fn cleanup(checkout: &Checkout) {
    if !checkout.cloned || !checkout.root.exists() {
        return;
    }
    match fs::remove_dir_all(&checkout.root) {
        Ok(()) => info!("Removed clone {}", checkout.root.display()),
        Err(e) => warn!("Could not remove clone {}: {e}", checkout.root.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_derive_repo_name() {
        assert_eq!(derive_repo_name("https://github.com/user/NutriFit.git").unwrap(), "NutriFit");
        assert_eq!(derive_repo_name("https://github.com/user/repo/").unwrap(), "repo");
        assert_eq!(derive_repo_name("https://host/x/my-repo?tab=readme#top").unwrap(), "my-repo");
        assert_eq!(derive_repo_name("git@github.com:user/tool.git").unwrap(), "tool");
        assert_eq!(derive_repo_name("/home/me/src/some proj").unwrap(), "some_proj");
        assert_eq!(derive_repo_name(r"C:\work\lib").unwrap(), "lib");
    }

    #[test]
    fn test_derive_repo_name_rejects_empty() {
        assert!(matches!(derive_repo_name(""), Err(Error::Acquisition(_))));
        assert!(matches!(derive_repo_name("https://host/.git"), Err(Error::Acquisition(_))));
        assert!(matches!(derive_repo_name(".."), Err(Error::Acquisition(_))));
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://github.com/a/b"));
        assert!(is_remote("git@github.com:a/b.git"));
        assert!(is_remote("/srv/mirror/b.git"));
        assert!(!is_remote("./local/project"));
    }

    #[test]
    fn test_acquire_local_directory_in_place() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("widget");
        fs::create_dir_all(&project).unwrap();

        let checkout = acquire(project.to_str().unwrap(), &dir.path().join("repos")).unwrap();

        assert_eq!(checkout.name, "widget");
        assert_eq!(checkout.root, project);
        assert!(!checkout.cloned);

        cleanup(&checkout);
        assert!(project.exists(), "local trees must survive cleanup");
    }

    #[test]
    fn test_acquire_missing_local_path_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let err = acquire(missing.to_str().unwrap(), dir.path()).unwrap_err();

        assert!(matches!(err, Error::Acquisition(_)));
    }
}
