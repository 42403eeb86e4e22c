//! Which changed paths count as a trigger

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Editor swap and backup files never trigger a run.
const EDITOR_ARTIFACT_SUFFIXES: &[&str] = &["~", ".swp", ".swx", ".tmp"];

/// Trigger scope for the guard loop.
///
/// A path is relevant when it lies under one of the watched roots, is not
/// under an ignored path, is not an editor artifact and, if extensions are
/// configured, carries one of them.
#[derive(Debug, Clone, Default)]
pub struct TriggerPolicy {
    roots: Vec<PathBuf>,
    ignored: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl TriggerPolicy {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut policy = Self::default();
        for root in roots {
            push_forms(&mut policy.roots, &root);
        }
        policy
    }

    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .collect();
        self
    }

    /// Exclude a path (and everything below it) from the trigger scope.
    pub fn ignore(mut self, path: impl AsRef<Path>) -> Self {
        push_forms(&mut self.ignored, path.as_ref());
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_relevant(&self, path: &Path) -> bool {
        let path = absolutize(path);

        if !self.roots.iter().any(|root| path.starts_with(root)) {
            return false;
        }
        if self.ignored.iter().any(|ignored| path.starts_with(ignored)) {
            return false;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if file_name.starts_with(".#")
            || EDITOR_ARTIFACT_SUFFIXES.iter().any(|s| file_name.ends_with(s))
        {
            return false;
        }

        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| self.extensions.iter().any(|allowed| allowed == ext))
    }
}

/// Keep both the absolute and the canonical form so that event paths
/// reported through symlinked directories still match.
fn push_forms(list: &mut Vec<PathBuf>, path: &Path) {
    let absolute = absolutize(path);
    if let Ok(canonical) = fs::canonicalize(&absolute) {
        if canonical != absolute && !list.contains(&canonical) {
            list.push(canonical);
        }
    }
    if !list.contains(&absolute) {
        list.push(absolute);
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
