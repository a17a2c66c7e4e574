// CacheLink Agent - Path Guard
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Single source of truth for cache path resolution.
// Every path the hub sends is joined onto the cache root, normalized
// lexically, then checked component-by-component against the root.
//
// SECURITY NOTE: the check is purely lexical and never touches the disk.
// A path that fails here must not reach any std::fs call.
// Symlinks are not resolved. A link placed inside the root is followed by
// std::fs, so readFile/writeFile through it can reach files outside the
// root. Whoever can create links in the cache directory owns that risk.

use crate::error::{AgentError, Result};
use std::path::{Component, Path, PathBuf};

/// The directory an agent is confined to. Fixed at startup.
#[derive(Debug, Clone)]
pub struct CacheRoot {
    root: PathBuf,
}

impl CacheRoot {
    /// Canonicalize `path` once so later comparisons see an absolute,
    /// symlink-free root.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let root = std::fs::canonicalize(path)?;
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a hub-supplied relative path inside the root.
    ///
    /// Leading separators are dropped so `/a.txt` means `<root>/a.txt`.
    /// Fails with `AccessDenied` when the normalized result is not the root
    /// or a descendant of it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let joined = normalize(&self.root, relative);
        if is_within(&self.root, &joined) {
            Ok(joined)
        } else {
            Err(AgentError::AccessDenied(relative.to_string()))
        }
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Join `relative` onto `base` and resolve `.` and `..` without touching the
/// filesystem. `..` may climb above `base`; containment is judged afterwards.
fn normalize(base: &Path, relative: &str) -> PathBuf {
    let mut out = base.to_path_buf();

    for component in Path::new(relative).components() {
        match component {
            // Absolute hub paths are still relative to the cache root
            Component::Prefix(_) | Component::RootDir | Component::CurDir => continue,
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }

    out
}

/// Segment-wise prefix check: `/a/bc` is not inside `/a/b`.
fn is_within(root: &Path, candidate: &Path) -> bool {
    let mut candidate = candidate.components();
    for expected in root.components() {
        match candidate.next() {
            Some(actual) if actual == expected => {}
            _ => return false,
        }
    }
    true
}

// ============================================================================
// TESTS
// ============================================================================
