//! Test discovery module
//!
//! This module walks a test directory and collects the test programs that
//! follow the project's naming convention.

use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A single test program, identified by its source path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestUnit {
    /// Path to the test source, as found under the discovery root
    pub path: PathBuf,

    /// Display name: path relative to the root, without extension
    pub name: String,

    /// Last modification time, used for run ordering
    pub modified: DateTime<Utc>,
}

impl TestUnit {
    pub fn new(path: impl Into<PathBuf>, root: &Path, modified: DateTime<Utc>) -> Self {
        let path = path.into();
        let name = display_name(&path, root);
        Self { path, name, modified }
    }
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Directory to scan
    pub root: PathBuf,

    /// File stems starting with one of these are tests (`test_*`)
    pub prefixes: Vec<String>,

    /// File stems ending with one of these are tests (`*_test`)
    pub suffixes: Vec<String>,

    /// Orchestrator-internal entry points, never treated as tests
    pub reserved: Vec<String>,

    /// Directory names that are not traversed
    pub exclude_dirs: Vec<String>,

    /// Accepted extensions; empty accepts any
    pub extensions: Vec<String>,

    /// Whether subdirectories are traversed
    pub recursive: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tests"),
            prefixes: vec!["test_".to_string()],
            suffixes: vec!["_test".to_string()],
            reserved: vec!["test_runner".to_string(), "test_main".to_string()],
            exclude_dirs: vec!["target".to_string(), ".git".to_string(), "build".to_string()],
            extensions: Vec::new(),
            recursive: true,
        }
    }
}

/// Discovery errors. All of them are fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Cannot read test directory {path:?}: {source}")]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Test root {path:?} is not a directory")]
    NotADirectory { path: PathBuf },
}

/// An entry that was skipped during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryWarning {
    pub path: PathBuf,
    pub message: String,
}

/// Discovered units plus the entries that had to be skipped
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub units: Vec<TestUnit>,
    pub warnings: Vec<DiscoveryWarning>,
}

/// Test discovery
pub struct TestDiscovery {
    config: DiscoveryConfig,
}

impl TestDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Discover all test units under the configured root.
    ///
    /// Units are ordered most recently modified first so that files a
    /// developer just edited show up first in the output. This ordering is
    /// a convenience only; ties fall back to path order.
    pub fn discover(&self) -> Result<DiscoveryOutcome, DiscoveryError> {
        let root = &self.config.root;
        let meta = fs::metadata(root).map_err(|source| DiscoveryError::UnreadableRoot {
            path: root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(DiscoveryError::NotADirectory { path: root.clone() });
        }
        // Listing the root up front turns a permission problem into a
        // configuration error instead of a per-entry warning.
        fs::read_dir(root).map_err(|source| DiscoveryError::UnreadableRoot {
            path: root.clone(),
            source,
        })?;

        let mut outcome = DiscoveryOutcome::default();
        let max_depth = if self.config.recursive { usize::MAX } else { 1 };

        let walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_excluded_dir(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    warn!("Skipping {}: {}", path.display(), err);
                    outcome.warnings.push(DiscoveryWarning {
                        path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_candidate(entry.path()) {
                continue;
            }

            match self.load_unit(entry.path()) {
                Ok(unit) => {
                    debug!("Discovered {}", unit.name);
                    outcome.units.push(unit);
                }
                Err(err) => {
                    warn!("Skipping unreadable test {}: {}", entry.path().display(), err);
                    outcome.warnings.push(DiscoveryWarning {
                        path: entry.path().to_path_buf(),
                        message: err.to_string(),
                    });
                }
            }
        }

        outcome
            .units
            .sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));

        Ok(outcome)
    }

    /// Whether a file path follows the naming convention and is not reserved.
    pub fn is_candidate(&self, path: &Path) -> bool {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return false;
        };
        let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or(stem);

        if self
            .config
            .reserved
            .iter()
            .any(|reserved| reserved == stem || reserved == file_name)
        {
            return false;
        }

        if !self.config.extensions.is_empty() {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !self.config.extensions.iter().any(|allowed| allowed.trim_start_matches('.') == ext) {
                return false;
            }
        }

        self.config.prefixes.iter().any(|p| stem.starts_with(p.as_str()))
            || self.config.suffixes.iter().any(|s| stem.ends_with(s.as_str()))
    }

    fn is_excluded_dir(&self, entry: &walkdir::DirEntry) -> bool {
        entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map_or(false, |name| self.config.exclude_dirs.iter().any(|d| d == name))
    }

    fn load_unit(&self, path: &Path) -> std::io::Result<TestUnit> {
        // Opening proves the compile step will be able to read the file.
        fs::File::open(path)?;
        let modified = fs::metadata(path)?.modified()?;
        Ok(TestUnit::new(path, &self.config.root, DateTime::<Utc>::from(modified)))
    }
}

/// Relative path without extension, always `/`-separated.
fn display_name(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let without_ext = relative.with_extension("");
    without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
