use anyhow::Result;
use ignore::WalkBuilder;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub extensions: Vec<String>,
    pub min_lines: usize,
    pub ignore_dirs: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            extensions: vec!["py".to_string()],
            min_lines: 100,
            ignore_dirs: [".git", "__pycache__", "node_modules", ".venv", "venv", "env", "target"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Path relative to the scanned root.
    pub path: PathBuf,
    pub lines: usize,
}

pub fn find_candidates(root: &Path, settings: &ScanSettings) -> Result<Vec<Candidate>> {
    let ignore_dirs = settings.ignore_dirs.clone();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && ignore_dirs.iter().any(|d| entry.file_name() == d.as_str()))
        })
        .build();

    let mut found = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| settings.extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if !matches_ext {
            continue;
        }

        let lines = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).lines().count(),
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "skipping unreadable file");
                continue;
            }
        };
        if lines <= settings.min_lines {
            continue;
        }

        let rel = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        found.push(Candidate { path: rel, lines });
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(count = found.len(), root = %root.display(), "scanned for candidates");
    Ok(found)
}

/// Once every file has `max_per_file` commits, the least-touched ones are reused.
#[derive(Debug)]
pub struct FileRotation {
    files: Vec<PathBuf>,
    counts: HashMap<PathBuf, u32>,
    max_per_file: u32,
}

impl FileRotation {
    pub fn new(files: Vec<PathBuf>, max_per_file: u32) -> Self {
        Self {
            files,
            counts: HashMap::new(),
            max_per_file,
        }
    }

    pub fn count(&self, path: &Path) -> u32 {
        self.counts.get(path).copied().unwrap_or(0)
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Path> {
        let mut available: Vec<&PathBuf> = self
            .files
            .iter()
            .filter(|f| self.count(f) < self.max_per_file)
            .collect();

        if available.is_empty() {
            let least = self.files.iter().map(|f| self.count(f)).min()?;
            available = self.files.iter().filter(|f| self.count(f) == least).collect();
        }

        available.choose(rng).map(|p| p.as_path())
    }

    pub fn record(&mut self, path: &Path) {
        *self.counts.entry(path.to_path_buf()).or_insert(0) += 1;
    }

    /// Drops a file that can't be edited so it is never picked again.
    pub fn retire(&mut self, path: &Path) {
        self.files.retain(|f| f != path);
        self.counts.remove(path);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
