//! Hostname to registrable domain (eTLD+1) resolution.
//!
//! Cosmetic lookups carry the registrable domain of the page hostname.
//! [`PslResolver`] uses a Public Suffix List; [`HeuristicResolver`] is the
//! list-free fallback.
//!
//! ```
//! use bb_lookup::domain::{DomainResolver, HeuristicResolver};
//!
//! assert_eq!(HeuristicResolver.domain_from_hostname("sub.example.com"), "example.com");
//! assert_eq!(HeuristicResolver.domain_from_hostname("a.example.co.uk"), "example.co.uk");
//! ```

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use publicsuffix::{List, Psl};

use crate::error::LookupError;

/// Resolves a hostname to its registrable domain.
pub trait DomainResolver: Send + Sync {
    fn domain_from_hostname(&self, hostname: &str) -> String;
}

/// Common two-part TLDs for the fallback heuristic.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Lowercase, strip a trailing dot and IPv6 brackets.
fn normalize(hostname: &str) -> String {
    let host = hostname.trim().trim_end_matches('.');
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.to_ascii_lowercase()
}

/// IP literals and single labels are their own domain.
fn is_own_domain(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok() || !host.contains('.')
}

/// Last two labels, or three under a known two-part TLD.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicResolver;

impl HeuristicResolver {
    fn resolve(host: &str) -> String {
        let labels: Vec<&str> = host.split('.').collect();
        let n = labels.len();
        if n <= 2 {
            return host.to_string();
        }

        let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
        if COMMON_TWO_PART_TLDS.contains(&last_two.as_str()) {
            return labels[n - 3..].join(".");
        }

        labels[n - 2..].join(".")
    }
}

impl DomainResolver for HeuristicResolver {
    fn domain_from_hostname(&self, hostname: &str) -> String {
        let host = normalize(hostname);
        if is_own_domain(&host) {
            return host;
        }
        Self::resolve(&host)
    }
}

/// Resolver backed by a Public Suffix List.
pub struct PslResolver {
    list: List,
}

impl PslResolver {
    /// Parse a list in the publicsuffix.org `.dat` format.
    pub fn from_text(text: &str) -> Result<Self, LookupError> {
        let list = text
            .parse::<List>()
            .map_err(|e| LookupError::Psl(format!("{e:?}")))?;
        Ok(Self { list })
    }

    pub fn from_file(path: &Path) -> Result<Self, LookupError> {
        let text = fs::read_to_string(path).map_err(|e| LookupError::io(path, e))?;
        Self::from_text(&text)
    }
}

impl DomainResolver for PslResolver {
    fn domain_from_hostname(&self, hostname: &str) -> String {
        let host = normalize(hostname);
        if is_own_domain(&host) {
            return host;
        }
        match self.list.domain(host.as_bytes()) {
            Some(domain) => String::from_utf8_lossy(domain.as_bytes()).into_owned(),
            None => HeuristicResolver::resolve(&host),
        }
    }
}

impl std::fmt::Debug for PslResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PslResolver").finish_non_exhaustive()
    }
}
