//! Filter list registry and content source seams.
//!
//! The coordinator does not own filter lists. It asks a [`ListRegistry`]
//! which lists exist and a [`ListContentSource`] for each list's content.

use std::collections::{BTreeMap, HashMap};
use std::fs;

use parking_lot::RwLock;

/// Registry metadata for one filter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMeta {
    pub title: String,
    pub support_url: String,
    pub disabled: bool,
}

impl ListMeta {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_support_url(mut self, url: impl Into<String>) -> Self {
        self.support_url = url.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// Source of truth for the known filter lists.
pub trait ListRegistry: Send + Sync {
    /// Every known list, enabled or not, keyed by path.
    fn lists(&self) -> Vec<(String, ListMeta)>;

    /// Path of the list holding the user's own filters.
    fn user_filters_path(&self) -> &str;
}

/// Content of one filter list as delivered by a [`ListContentSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListContent {
    pub path: String,
    pub content: String,
}

/// Continuation receiving a list's content.
pub type ContentCallback = Box<dyn FnOnce(ListContent) + Send>;

/// Asynchronous provider of compiled list content.
pub trait ListContentSource: Send + Sync {
    /// Fetch the content for `path` and pass it to `on_loaded` at most once.
    ///
    /// `on_loaded` may run before this method returns.
    fn fetch_compiled(&self, path: &str, on_loaded: ContentCallback);
}

// =============================================================================
// Static registry
// =============================================================================

/// In-memory registry that can be edited at runtime.
#[derive(Debug)]
pub struct StaticRegistry {
    lists: RwLock<BTreeMap<String, ListMeta>>,
    user_filters_path: String,
}

impl StaticRegistry {
    pub fn new(user_filters_path: impl Into<String>) -> Self {
        Self {
            lists: RwLock::new(BTreeMap::new()),
            user_filters_path: user_filters_path.into(),
        }
    }

    /// Add or replace a list.
    pub fn insert(&self, path: impl Into<String>, meta: ListMeta) {
        self.lists.write().insert(path.into(), meta);
    }

    /// Remove a list, returning its metadata.
    pub fn remove(&self, path: &str) -> Option<ListMeta> {
        self.lists.write().remove(path)
    }

    /// Toggle the disabled flag of a known list.
    pub fn set_disabled(&self, path: &str, disabled: bool) -> bool {
        match self.lists.write().get_mut(path) {
            Some(meta) => {
                meta.disabled = disabled;
                true
            }
            None => false,
        }
    }
}

impl ListRegistry for StaticRegistry {
    fn lists(&self) -> Vec<(String, ListMeta)> {
        self.lists
            .read()
            .iter()
            .map(|(path, meta)| (path.clone(), meta.clone()))
            .collect()
    }

    fn user_filters_path(&self) -> &str {
        &self.user_filters_path
    }
}

// =============================================================================
// Content sources
// =============================================================================

/// Content source answering synchronously from memory.
///
/// Unknown paths resolve with empty content.
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    contents: RwLock<HashMap<String, String>>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.contents.write().insert(path.into(), content.into());
    }
}

impl ListContentSource for MemoryContentSource {
    fn fetch_compiled(&self, path: &str, on_loaded: ContentCallback) {
        let content = self.contents.read().get(path).cloned().unwrap_or_default();
        on_loaded(ListContent {
            path: path.to_string(),
            content,
        });
    }
}

/// Content source treating list paths as filesystem paths.
///
/// A list that cannot be read resolves with empty content so priming still
/// completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileContentSource;

impl ListContentSource for FileContentSource {
    fn fetch_compiled(&self, path: &str, on_loaded: ContentCallback) {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Failed to read filter list '{}': {}", path, e);
                String::new()
            }
        };
        on_loaded(ListContent {
            path: path.to_string(),
            content,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_static_registry_edits() {
        let registry = StaticRegistry::new("user-filters");
        registry.insert("b", ListMeta::new("B"));
        registry.insert("a", ListMeta::new("A").with_support_url("https://a.example"));

        assert!(registry.set_disabled("b", true));
        assert!(!registry.set_disabled("missing", true));

        let lists = registry.lists();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].0, "a");
        assert_eq!(lists[0].1.support_url, "https://a.example");
        assert!(lists[1].1.disabled);

        assert!(registry.remove("a").is_some());
        assert_eq!(registry.lists().len(), 1);
        assert_eq!(registry.user_filters_path(), "user-filters");
    }

    #[test]
    fn test_memory_source_unknown_path_is_empty() {
        let source = MemoryContentSource::new();
        source.insert("known", "||ads.example^");

        let (tx, rx) = mpsc::channel();
        for path in ["known", "unknown"] {
            let tx = tx.clone();
            source.fetch_compiled(path, Box::new(move |loaded| tx.send(loaded).unwrap()));
        }

        assert_eq!(rx.recv().unwrap().content, "||ads.example^");
        let missing = rx.recv().unwrap();
        assert_eq!(missing.path, "unknown");
        assert!(missing.content.is_empty());
    }

    #[test]
    fn test_file_source_missing_file_is_empty() {
        let (tx, rx) = mpsc::channel();
        FileContentSource.fetch_compiled(
            "/nonexistent/bb-lookup/list.txt",
            Box::new(move |loaded| tx.send(loaded).unwrap()),
        );
        assert!(rx.recv().unwrap().content.is_empty());
    }
}
