//! Primed filter lists and the lookups run against them.

use std::collections::BTreeMap;

use bb_lookup::message::{ListMatch, LookupResponse};

/// Cosmetic filter separators, longest first.
const COSMETIC_SEPARATORS: &[&str] = &["#@#", "#?#", "#$#", "##"];

#[derive(Debug, Clone)]
struct StoredList {
    title: String,
    support_url: String,
    content: String,
}

/// Filter lists loaded into a context, keyed by path.
#[derive(Debug, Default)]
pub struct ListStore {
    lists: BTreeMap<String, StoredList>,
}

impl ListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load or replace a list.
    pub fn set_list(&mut self, path: String, title: String, support_url: String, content: String) {
        self.lists.insert(
            path,
            StoredList {
                title,
                support_url,
                content,
            },
        );
    }

    /// Forget every list.
    pub fn reset(&mut self) {
        self.lists.clear();
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Lists with a line equal to the raw or compiled form of a network
    /// filter.
    pub fn from_net_filter(&self, compiled_filter: &str, raw_filter: &str) -> Option<LookupResponse> {
        let raw_filter = raw_filter.trim();
        let compiled_filter = compiled_filter.trim();
        self.collect(raw_filter, |line| line == raw_filter || line == compiled_filter)
    }

    /// Lists with a cosmetic filter whose selector matches `raw_filter` and
    /// that applies to `hostname`.
    ///
    /// A filter applies when it is generic or names the hostname, one of
    /// its parent domains, or the entity of `domain` (`example.*`).
    pub fn from_cosmetic_filter(
        &self,
        domain: &str,
        hostname: &str,
        raw_filter: &str,
    ) -> Option<LookupResponse> {
        let selector = split_cosmetic(raw_filter.trim())
            .map(|(_, selector)| selector)
            .unwrap_or(raw_filter.trim());
        if selector.is_empty() {
            return None;
        }
        self.collect(raw_filter, |line| match split_cosmetic(line) {
            Some((hosts, candidate)) if candidate == selector => {
                applies_to(hosts, domain, hostname)
            }
            _ => false,
        })
    }

    fn collect(&self, filter: &str, matches: impl Fn(&str) -> bool) -> Option<LookupResponse> {
        let lists: Vec<ListMatch> = self
            .lists
            .iter()
            .filter(|(_, list)| {
                list.content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !is_comment_line(line))
                    .any(&matches)
            })
            .map(|(path, list)| ListMatch {
                path: path.clone(),
                title: list.title.clone(),
                support_url: list.support_url.clone(),
            })
            .collect();

        if lists.is_empty() {
            return None;
        }
        Some(LookupResponse {
            filter: filter.to_string(),
            lists,
        })
    }
}

fn is_comment_line(line: &str) -> bool {
    line.is_empty() || line.starts_with('!') || line.starts_with('[') || line.starts_with("# ")
}

/// Split `hosts##selector` at its separator.
fn split_cosmetic(line: &str) -> Option<(&str, &str)> {
    let (pos, sep) = COSMETIC_SEPARATORS
        .iter()
        .filter_map(|sep| line.find(sep).map(|pos| (pos, *sep)))
        .min_by_key(|(pos, _)| *pos)?;
    Some((&line[..pos], &line[pos + sep.len()..]))
}

/// Whether a cosmetic filter's host list covers the page.
///
/// `~host` entries exclude a host; a list made only of exclusions applies
/// everywhere else.
fn applies_to(hosts: &str, domain: &str, hostname: &str) -> bool {
    let mut included = false;
    let mut has_inclusions = false;
    for host in hosts.split(',').map(str::trim).filter(|h| !h.is_empty()) {
        match host.strip_prefix('~') {
            Some(excluded) => {
                if host_matches(excluded, domain, hostname) {
                    return false;
                }
            }
            None => {
                has_inclusions = true;
                included |= host_matches(host, domain, hostname);
            }
        }
    }
    included || !has_inclusions
}

/// `host` names the hostname, one of its parents, or the entity of `domain`.
fn host_matches(host: &str, domain: &str, hostname: &str) -> bool {
    if let Some(entity) = host.strip_suffix(".*") {
        return domain
            .strip_prefix(entity)
            .is_some_and(|rest| rest.starts_with('.'));
    }
    hostname == host
        || hostname
            .strip_suffix(host)
            .is_some_and(|rest| rest.ends_with('.'))
}
