//! Coordinator settings.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LookupError;

/// Idle period after which the background context is torn down.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(11 * 60);

/// Display title used for the user's own filter list.
pub const DEFAULT_USER_FILTERS_TITLE: &str = "My filters";

/// Settings for a [`crate::ReverseLookup`].
///
/// Deserializes from JSON; missing fields keep their defaults.
///
/// ```
/// use bb_lookup::LookupConfig;
///
/// let config = LookupConfig::from_json(r#"{ "idleTtlSecs": 30 }"#).unwrap();
/// assert_eq!(config.idle_ttl.as_secs(), 30);
/// assert_eq!(config.user_filters_title, "My filters");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LookupConfig {
    /// Idle time before the context is recycled
    #[serde(rename = "idleTtlSecs", with = "duration_secs")]
    pub idle_ttl: Duration,
    /// Localized label for the user filters list
    pub user_filters_title: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            idle_ttl: DEFAULT_IDLE_TTL,
            user_filters_title: DEFAULT_USER_FILTERS_TITLE.to_string(),
        }
    }
}

impl LookupConfig {
    /// Parse settings from a JSON document.
    pub fn from_json(text: &str) -> Result<Self, LookupError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load settings from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, LookupError> {
        let text = fs::read_to_string(path).map_err(|e| LookupError::io(path, e))?;
        Self::from_json(&text)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
