//! Filename policy: which changes may trigger a redeploy and how they coalesce.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::event::ChangeEvent;

/// How the coalescing key is derived from a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyMode {
    /// Full path relative to the watch root.
    #[default]
    RelativePath,
    /// Bare file name only. Same-named classes in different packages share a window.
    FileName,
}

/// Extension allow-list, excluded file names and key mode.
#[derive(Debug, Clone)]
pub struct FilenamePolicy {
    /// Allowed suffixes including the dot, e.g. `.class`.
    suffixes: Vec<String>,
    excludes: HashSet<String>,
    key_mode: KeyMode,
}

impl Default for FilenamePolicy {
    fn default() -> Self {
        Self::new(["class"])
    }
}

impl FilenamePolicy {
    /// Create a policy for the given extensions (with or without leading dot).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let suffixes = extensions
            .into_iter()
            .map(|ext| format!(".{}", ext.as_ref().trim_start_matches('.')))
            .collect();

        Self {
            suffixes,
            excludes: HashSet::new(),
            key_mode: KeyMode::default(),
        }
    }

    /// Never dispatch for this bare file name.
    pub fn exclude(mut self, file_name: impl Into<String>) -> Self {
        self.excludes.insert(file_name.into());
        self
    }

    pub fn with_key_mode(mut self, key_mode: KeyMode) -> Self {
        self.key_mode = key_mode;
        self
    }

    pub fn key_mode(&self) -> KeyMode {
        self.key_mode
    }

    pub fn is_excluded(&self, file_name: &str) -> bool {
        self.excludes.contains(file_name)
    }

    pub fn has_allowed_extension(&self, file_name: &str) -> bool {
        self.suffixes.iter().any(|suffix| file_name.ends_with(suffix))
    }

    /// Coalescing key for an admitted change, or `None` if the policy rejects it.
    pub fn key_for(&self, event: &ChangeEvent) -> Option<String> {
        let file_name = event.file_name()?;
        if self.is_excluded(file_name) || !self.has_allowed_extension(file_name) {
            return None;
        }

        let key = match self.key_mode {
            KeyMode::RelativePath => event.path.to_string_lossy().into_owned(),
            KeyMode::FileName => file_name.to_string(),
        };
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::ChangeKind;

    fn modified(path: &str) -> ChangeEvent {
        ChangeEvent::new(ChangeKind::Modified, path)
    }

    #[test]
    fn test_default_policy_accepts_class_files_only() {
        let policy = FilenamePolicy::default();

        assert_eq!(
            policy.key_for(&modified("pkg/Foo.class")),
            Some("pkg/Foo.class".to_string())
        );
        assert_eq!(policy.key_for(&modified("README.md")), None);
        assert_eq!(policy.key_for(&modified("pkg/Foo.classic")), None);
    }

    #[test]
    fn test_excluded_name_is_rejected_even_with_allowed_extension() {
        let policy = FilenamePolicy::new([".class", "dodeploy"]).exclude("extensions.jar.dodeploy");

        assert_eq!(policy.key_for(&modified("extensions.jar.dodeploy")), None);
        assert!(policy.key_for(&modified("other.dodeploy")).is_some());
    }

    #[test]
    fn test_file_name_mode_shares_key_across_packages() {
        let policy = FilenamePolicy::default().with_key_mode(KeyMode::FileName);

        let a = policy.key_for(&modified("a/Util.class"));
        let b = policy.key_for(&modified("b/Util.class"));
        assert_eq!(a, Some("Util.class".to_string()));
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_mode_parses_kebab_case() {
        let mode: KeyMode = serde_json::from_str("\"file-name\"").unwrap();
        assert_eq!(mode, KeyMode::FileName);
    }
}
