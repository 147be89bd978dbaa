//! Priming of a fresh background context with filter list content.
//!
//! A priming run enumerates the enabled lists, requests every list's content
//! and forwards each arrival into the context. The run completes when the
//! countdown of outstanding lists reaches zero, whatever the arrival order.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::message::ContextMessage;
use crate::sources::{ListContent, ListRegistry};

/// One enabled filter list taking part in priming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub title: String,
    pub support_url: String,
    /// Filled in when the content arrives
    pub content: Option<String>,
}

/// Enabled lists keyed by path.
pub type ListEntries = BTreeMap<String, ListEntry>;

/// Continuation run once the context is ready.
///
/// Receives the primed entries when this activation ran the priming, `None`
/// when the context was already primed or no list is enabled.
pub type ReadyCallback = Box<dyn FnOnce(Option<Arc<ListEntries>>) + Send>;

/// Enumerate the enabled lists of `registry`.
///
/// The user filters list is shown under `user_filters_title` instead of its
/// registry title.
pub fn collect_entries(registry: &dyn ListRegistry, user_filters_title: &str) -> ListEntries {
    let user_filters_path = registry.user_filters_path();
    registry
        .lists()
        .into_iter()
        .filter(|(_, meta)| !meta.disabled)
        .map(|(path, meta)| {
            let title = if path == user_filters_path {
                user_filters_title.to_string()
            } else {
                meta.title
            };
            let entry = ListEntry {
                title,
                support_url: meta.support_url,
                content: None,
            };
            (path, entry)
        })
        .collect()
}

/// State of an in-flight priming run.
pub(crate) struct PrimingRun {
    id: u64,
    entries: ListEntries,
    remaining: usize,
    waiters: Vec<ReadyCallback>,
    stale: bool,
}

/// What a finished run hands back to the lifecycle.
pub(crate) struct FinishedRun {
    pub entries: Arc<ListEntries>,
    pub waiters: Vec<ReadyCallback>,
    pub stale: bool,
}

impl PrimingRun {
    pub fn new(id: u64, entries: ListEntries, first: ReadyCallback) -> Self {
        Self {
            id,
            remaining: entries.len(),
            entries,
            waiters: vec![first],
            stale: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Park another activation until this run completes.
    pub fn add_waiter(&mut self, waiter: ReadyCallback) {
        self.waiters.push(waiter);
    }

    /// The lists changed while this run was in flight.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Merge arrived content and build the message forwarding it.
    ///
    /// Unknown paths and second arrivals for the same path return `None`
    /// and leave the countdown alone.
    pub fn accept(&mut self, loaded: ListContent) -> Option<ContextMessage> {
        let entry = match self.entries.get_mut(&loaded.path) {
            Some(entry) if entry.content.is_none() => entry,
            Some(_) => {
                log::warn!("Duplicate content for list '{}'", loaded.path);
                return None;
            }
            None => {
                log::warn!("Content for unrequested list '{}'", loaded.path);
                return None;
            }
        };
        entry.content = Some(loaded.content.clone());
        self.remaining -= 1;

        let title = if entry.title.is_empty() {
            loaded.path.clone()
        } else {
            entry.title.clone()
        };
        Some(ContextMessage::SetList {
            path: loaded.path,
            title,
            support_url: entry.support_url.clone(),
            content: loaded.content,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    pub fn finish(self) -> FinishedRun {
        FinishedRun {
            entries: Arc::new(self.entries),
            waiters: self.waiters,
            stale: self.stale,
        }
    }
}
