//! Script configuration
//!
//! Every field has a default, so `{}` is a complete configuration and a
//! script only spells out what it changes.

use crate::navigation::{NavigationOptions, DEFAULT_NAVIGATION_EVENT};
use crate::result::WatchResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"pagewatch=debug"`
    pub level: String,
    /// Prepended to every log line
    pub prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            prefix: "pagewatch".to_string(),
        }
    }
}

impl LogConfig {
    /// Set the filter directive
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Set the line prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// Which event signals navigation, and how to listen for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Event name dispatched on the document
    pub event: String,
    /// Hold dispatch while the tab is hidden
    pub await_unhide: bool,
    /// Capture-phase listeners
    pub capture: bool,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            event: DEFAULT_NAVIGATION_EVENT.to_string(),
            await_unhide: false,
            capture: false,
        }
    }
}

impl NavigationConfig {
    /// Watcher options for this configuration
    #[must_use]
    pub const fn options(&self) -> NavigationOptions {
        NavigationOptions {
            await_unhide: self.await_unhide,
            capture: self.capture,
        }
    }
}

/// Element acquisition settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Default timeout in milliseconds; `None` waits indefinitely
    pub timeout_ms: Option<u64>,
}

impl WaitConfig {
    /// The timeout as a `Duration`
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level script configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Logging
    pub log: LogConfig,
    /// Navigation watching
    pub navigation: NavigationConfig,
    /// Element waits
    pub wait: WaitConfig,
    /// Action name to key combination (`""` disables the action)
    pub shortcuts: BTreeMap<String, String>,
}

impl ScriptConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> WatchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> WatchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Bind `action` to `combo`
    #[must_use]
    pub fn with_shortcut(mut self, action: impl Into<String>, combo: impl Into<String>) -> Self {
        self.shortcuts.insert(action.into(), combo.into());
        self
    }

    /// Set the default wait timeout
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.wait.timeout_ms = Some(timeout_ms);
        self
    }

    /// Replace the navigation settings
    #[must_use]
    pub fn with_navigation(mut self, navigation: NavigationConfig) -> Self {
        self.navigation = navigation;
        self
    }

    /// Key combination configured for `action`
    #[must_use]
    pub fn shortcut(&self, action: &str) -> Option<&str> {
        self.shortcuts.get(action).map(String::as_str)
    }
}
