// CacheLink Agent - Cache Filesystem
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// The four file operations the hub can ask for: ls, read, write, info.
// Every path goes through CacheRoot::resolve before any std::fs call.
// Payloads travel as standard base64 so binary cache files survive JSON.

use crate::error::{AgentError, Result};
use crate::paths::CacheRoot;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Names returned by cache_info before silent truncation
pub const INFO_LISTING_LIMIT: usize = 50;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub is_directory: bool,
    /// Byte length for files, 0 for directories
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    /// base64 of the whole file
    pub data: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub written: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub path: String,
    pub file_count: u64,
    pub total_size: u64,
    pub files: Vec<String>,
}

// ============================================================================
// CACHE FILESYSTEM
// ============================================================================

pub struct CacheFs {
    root: CacheRoot,
}

impl CacheFs {
    pub fn new(root: CacheRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &CacheRoot {
        &self.root
    }

    /// List direct children of `subdir` (root when None). Sorted by name.
    pub fn list_files(&self, subdir: Option<&str>) -> Result<Vec<FileEntry>> {
        let dir = self.root.resolve(subdir.unwrap_or(""))?;
        if !dir.exists() {
            return Err(AgentError::NotFound(display_name(subdir.unwrap_or("."))));
        }
        read_entries(&dir)
    }

    /// Read a whole file. No range support and no size cap.
    pub fn read_file(&self, file_path: &str) -> Result<FileContent> {
        let path = self.root.resolve(file_path)?;
        if !path.exists() {
            return Err(AgentError::NotFound(file_path.to_string()));
        }

        let bytes = std::fs::read(&path)?;
        log::debug!("read {} ({} bytes)", file_path, bytes.len());

        Ok(FileContent {
            size: bytes.len() as u64,
            data: STANDARD.encode(&bytes),
        })
    }

    /// Decode `data` and write it, creating parent directories.
    /// Overwrites in place; an interrupted write leaves a partial file.
    pub fn write_file(&self, file_path: &str, data: &str) -> Result<WriteResult> {
        let path = self.root.resolve(file_path)?;
        let bytes = STANDARD.decode(data)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &bytes)?;
        log::debug!("wrote {} ({} bytes)", file_path, bytes.len());

        Ok(WriteResult { written: bytes.len() as u64 })
    }

    /// Summarize the root: entry count, size of top-level plain files, and
    /// up to INFO_LISTING_LIMIT names.
    pub fn cache_info(&self) -> Result<CacheInfo> {
        let entries = scan_dir(self.root.path())?;

        let total_size = entries.iter()
            .filter(|e| e.is_file)
            .map(|e| e.entry.size)
            .sum();

        if entries.len() > INFO_LISTING_LIMIT {
            log::debug!("cache info listing truncated: {} of {} entries", INFO_LISTING_LIMIT, entries.len());
        }

        Ok(CacheInfo {
            path: self.root.path().to_string_lossy().to_string(),
            file_count: entries.len() as u64,
            total_size,
            files: entries.into_iter().take(INFO_LISTING_LIMIT).map(|e| e.entry.name).collect(),
        })
    }

    /// First `limit` root entry names, used for registration and the
    /// startup cache-marker check.
    pub fn preview(&self, limit: usize) -> Result<Vec<String>> {
        Ok(read_entries(self.root.path())?
            .into_iter()
            .take(limit)
            .map(|e| e.name)
            .collect())
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// A listed entry plus whether its target is a regular file
struct Scanned {
    entry: FileEntry,
    is_file: bool,
}

fn read_entries(dir: &Path) -> Result<Vec<FileEntry>> {
    Ok(scan_dir(dir)?.into_iter().map(|s| s.entry).collect())
}

fn scan_dir(dir: &Path) -> Result<Vec<Scanned>> {
    let mut entries = Vec::new();

    for item in std::fs::read_dir(dir)? {
        let item = item?;
        // Follow symlinks so a link reports its target; a dangling link
        // falls back to the link itself and counts as neither kind
        let meta = match std::fs::metadata(item.path()) {
            Ok(meta) => meta,
            Err(_) => item.metadata()?,
        };
        let is_file = meta.is_file();

        entries.push(Scanned {
            entry: FileEntry {
                name: item.file_name().to_string_lossy().to_string(),
                is_directory: meta.is_dir(),
                size: if is_file { meta.len() } else { 0 },
            },
            is_file,
        });
    }

    entries.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));
    Ok(entries)
}

fn display_name(path: &str) -> String {
    if path.is_empty() { ".".to_string() } else { path.to_string() }
}

// ============================================================================
// TESTS
// ============================================================================
