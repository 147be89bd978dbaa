//! Channel protocol between the coordinator and the background context.
//!
//! Messages are plain data and serialize to the JSON shapes a script worker
//! would exchange (`what`-tagged objects with camelCase fields).

use serde::{Deserialize, Serialize};

/// Message posted into the background context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "what", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ContextMessage {
    /// Load (or replace) one filter list
    SetList {
        path: String,
        title: String,
        #[serde(rename = "supportURL")]
        support_url: String,
        content: String,
    },
    /// Forget all loaded lists
    ResetLists,
    /// Find the lists containing a network filter
    FromNetFilter {
        id: u64,
        compiled_filter: String,
        raw_filter: String,
    },
    /// Find the lists containing a cosmetic filter
    FromCosmeticFilter {
        id: u64,
        domain: String,
        hostname: String,
        raw_filter: String,
    },
}

impl ContextMessage {
    /// Correlation ID of a lookup message.
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::FromNetFilter { id, .. } | Self::FromCosmeticFilter { id, .. } => Some(*id),
            Self::SetList { .. } | Self::ResetLists => None,
        }
    }
}

/// Lookup request body before a correlation ID is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    NetFilter {
        compiled_filter: String,
        raw_filter: String,
    },
    CosmeticFilter {
        domain: String,
        hostname: String,
        raw_filter: String,
    },
}

impl LookupRequest {
    /// Tag the request with its correlation ID.
    pub fn into_message(self, id: u64) -> ContextMessage {
        match self {
            Self::NetFilter {
                compiled_filter,
                raw_filter,
            } => ContextMessage::FromNetFilter {
                id,
                compiled_filter,
                raw_filter,
            },
            Self::CosmeticFilter {
                domain,
                hostname,
                raw_filter,
            } => ContextMessage::FromCosmeticFilter {
                id,
                domain,
                hostname,
                raw_filter,
            },
        }
    }
}

/// A filter list that contains the looked-up filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMatch {
    pub path: String,
    pub title: String,
    #[serde(rename = "supportURL")]
    pub support_url: String,
}

/// Answer to a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    /// The filter as it was looked up
    pub filter: String,
    /// Lists containing the filter
    pub lists: Vec<ListMatch>,
}

/// Inbound message from the background context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    /// `None` means "no result"
    #[serde(default)]
    pub response: Option<LookupResponse>,
}
