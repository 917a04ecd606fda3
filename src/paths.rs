//! Resolution of user-supplied paths against the project root.

use crate::error::{Result, VisionError};
use std::path::{Component, Path, PathBuf};

/// Maps user paths to absolute paths. Relative paths resolve against `root`.
///
/// Only lexical normalization happens here; containment policy is not enforced.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
        }
    }

    pub fn resolve(&self, user_path: &str) -> Result<PathBuf> {
        if user_path.trim().is_empty() {
            return Err(VisionError::invalid("path must be a non-empty string"));
        }
        let path = Path::new(user_path);
        if path.is_absolute() {
            Ok(normalize(path))
        } else {
            Ok(normalize(&self.root.join(path)))
        }
    }
}

/// Collapses `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
