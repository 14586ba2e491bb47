//! Broadcast configuration
//!
//! A [`BroadcastConfig`] is resolved once, when the middleware is built, by
//! merging caller-supplied [`BroadcastOptions`] over the defaults. It is never
//! mutated afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default `type` of actions synthesized for undecodable envelopes
pub const DEFAULT_ERROR_KEY: &str = "__dispatch-broadcast_error__";
/// Default `meta` field marking an action for broadcast
pub const DEFAULT_META_KEY: &str = "broadcast";
/// Default channel key carrying envelopes
pub const DEFAULT_STORAGE_KEY: &str = "__dispatch-broadcast_action__";
/// Default channel key used by the availability probe
pub const DEFAULT_TEST_KEY: &str = "__dispatch-broadcast_storage-test__";

/// Errors from loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config key `{0}` must not be empty")]
    EmptyKey(&'static str),

    #[error("storageKey and testKey must differ (both are `{0}`)")]
    KeyCollision(String),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Resolved broadcast configuration
///
/// Serialized with the camelCase names `errorKey`, `metaKey`, `storageKey`
/// and `testKey`. Missing fields take their defaults.
///
/// # Example
/// ```
/// use dispatch_broadcast_core::config::BroadcastConfig;
///
/// let config = BroadcastConfig::from_json(r#"{ "metaKey": "sync" }"#).unwrap();
/// assert_eq!(config.meta_key, "sync");
/// assert_eq!(config.storage_key, "__dispatch-broadcast_action__");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BroadcastConfig {
    /// `type` used for synthesized error actions
    pub error_key: String,
    /// `meta` field marking an action for broadcast
    pub meta_key: String,
    /// Channel key carrying envelopes
    pub storage_key: String,
    /// Channel key used for the availability probe
    pub test_key: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            error_key: DEFAULT_ERROR_KEY.to_string(),
            meta_key: DEFAULT_META_KEY.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            test_key: DEFAULT_TEST_KEY.to_string(),
        }
    }
}

impl BroadcastConfig {
    /// Parse a JSON config, filling missing keys with defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check that keys are non-empty and the probe key does not collide
    /// with the envelope key
    pub fn validate(&self) -> Result<(), ConfigError> {
        let keys = [
            ("errorKey", &self.error_key),
            ("metaKey", &self.meta_key),
            ("storageKey", &self.storage_key),
            ("testKey", &self.test_key),
        ];
        for (name, value) in keys {
            if value.is_empty() {
                return Err(ConfigError::EmptyKey(name));
            }
        }

        if self.storage_key == self.test_key {
            return Err(ConfigError::KeyCollision(self.storage_key.clone()));
        }

        Ok(())
    }
}

/// Caller overrides for [`BroadcastConfig`]
///
/// Every field is optional; unset fields keep the default.
///
/// # Example
/// ```
/// use dispatch_broadcast_core::config::{BroadcastConfig, BroadcastOptions};
///
/// let config: BroadcastConfig = BroadcastOptions::new().with_meta_key("sync").into();
/// assert_eq!(config.meta_key, "sync");
/// assert_eq!(config.test_key, "__dispatch-broadcast_storage-test__");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BroadcastOptions {
    pub error_key: Option<String>,
    pub meta_key: Option<String>,
    pub storage_key: Option<String>,
    pub test_key: Option<String>,
}

impl BroadcastOptions {
    /// No overrides
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error_key(mut self, key: impl Into<String>) -> Self {
        self.error_key = Some(key.into());
        self
    }

    pub fn with_meta_key(mut self, key: impl Into<String>) -> Self {
        self.meta_key = Some(key.into());
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn with_test_key(mut self, key: impl Into<String>) -> Self {
        self.test_key = Some(key.into());
        self
    }

    /// Merge these overrides over the defaults
    pub fn resolve(self) -> BroadcastConfig {
        let defaults = BroadcastConfig::default();
        BroadcastConfig {
            error_key: self.error_key.unwrap_or(defaults.error_key),
            meta_key: self.meta_key.unwrap_or(defaults.meta_key),
            storage_key: self.storage_key.unwrap_or(defaults.storage_key),
            test_key: self.test_key.unwrap_or(defaults.test_key),
        }
    }
}

impl From<BroadcastOptions> for BroadcastConfig {
    fn from(options: BroadcastOptions) -> Self {
        options.resolve()
    }
}
