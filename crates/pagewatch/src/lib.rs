//! pagewatch: race-free DOM plumbing for userscripts
//!
//! Single-page apps render late and navigate without reloading. pagewatch
//! gives a script four pieces that make that manageable:
//!
//! - [`ElementWaiter`] / [`await_element`]: resolve once a locator finds
//!   something, driven by mutation observation instead of polling
//! - [`ElementCache`]: named locators with single-flight acquisition
//! - [`NavigationWatcher`]: one callback per distinct target page
//! - [`ShortcutDispatcher`]: human-readable key combinations to triggers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ScriptContext                          │
//! │  ┌────────────────┐   reset + on_enter   ┌────────────────┐  │
//! │  │ Navigation     │─────────────────────►│ ElementCache   │  │
//! │  │ Watcher        │                      │  (single-      │  │
//! │  └───────┬────────┘                      │   flight)      │  │
//! │          │            triggers           └───────┬────────┘  │
//! │  ┌───────┴────────┐  ─────────────────►          │           │
//! │  │ Shortcut       │    feature logic     ┌───────▼────────┐  │
//! │  │ Dispatcher     │                      │ ElementWaiter  │  │
//! │  └───────┬────────┘                      └───────┬────────┘  │
//! └──────────┼───────────────────────────────────────┼───────────┘
//!            ▼                                       ▼
//!      ┌───────────────────────── Dom ─────────────────────────┐
//!      │  MockDom (tests, native)  │  BrowserDom (wasm32)      │
//!      └───────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on the page's single event-loop thread; types are `!Send`.

#![warn(missing_docs)]

/// Element acquisition cache
pub mod cache;

/// Script configuration (serde)
pub mod config;

/// Per-script context
pub mod context;

/// Host document abstraction
pub mod dom;

/// Log output via `tracing-subscriber`
pub mod logging;

/// SPA navigation de-duplication
pub mod navigation;

/// Result and error types
pub mod result;

/// Keyboard shortcut parsing and dispatch
pub mod shortcut;

/// Waiting for elements to appear
pub mod wait;

pub use cache::{ElementCache, ElementFuture};
pub use config::{LogConfig, NavigationConfig, ScriptConfig, WaitConfig};
pub use context::ScriptContext;
#[cfg(target_arch = "wasm32")]
pub use dom::BrowserDom;
pub use dom::{is_valid_element, Dom, KeyEvent, ListenerOptions, Located, MockDom, MockKeyEvent, MockTarget, NodeId};
pub use logging::{init_logging, PrefixedFormat};
pub use navigation::{normalize_url, NavigationOptions, NavigationState, NavigationWatcher, DEFAULT_NAVIGATION_EVENT};
pub use result::{DomResult, ShortcutError, WatchError, WatchResult};
pub use shortcut::{KeyCombo, Modifiers, ShortcutDispatcher, ShortcutOptions};
pub use wait::{await_element, wait_with_hook, wait_with_locator, ElementWaiter, Locator, SettleHook, WaitFuture, WaitOptions};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::cache::ElementCache;
    pub use super::config::ScriptConfig;
    pub use super::context::ScriptContext;
    pub use super::dom::{Dom, Located};
    pub use super::navigation::{NavigationOptions, NavigationWatcher};
    pub use super::result::{WatchError, WatchResult};
    pub use super::shortcut::{ShortcutDispatcher, ShortcutOptions};
    pub use super::wait::{await_element, ElementWaiter, WaitOptions};
}
