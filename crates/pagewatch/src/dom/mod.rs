//! Host document abstraction
//!
//! Everything pagewatch needs from a browser goes through the [`Dom`] trait:
//! mutation observers, timers, event listeners, focus, visibility and the
//! current location. [`MockDom`] implements it in memory for tests and native
//! builds; `BrowserDom` implements it with `web-sys` on wasm32.

#[cfg(target_arch = "wasm32")]
mod browser;
mod mock;

#[cfg(target_arch = "wasm32")]
pub use browser::{BrowserDom, BrowserListener, BrowserObserver, BrowserTimer};
pub use mock::{MockDom, MockKeyEvent, MockListener, MockObserver, MockTarget, MockTimer, NodeId};

use crate::result::DomResult;
use std::time::Duration;

/// What a locator found: one element, or a node-list-like collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located<N> {
    /// A single element
    Node(N),
    /// A collection of elements (may be empty)
    List(Vec<N>),
}

impl<N> Located<N> {
    /// Number of elements found
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Node(_) => 1,
            Self::List(nodes) => nodes.len(),
        }
    }

    /// True for an empty collection
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first element, if any
    #[must_use]
    pub fn first(&self) -> Option<&N> {
        match self {
            Self::Node(node) => Some(node),
            Self::List(nodes) => nodes.first(),
        }
    }

    /// The single element, or `None` for collections
    #[must_use]
    pub fn as_node(&self) -> Option<&N> {
        match self {
            Self::Node(node) => Some(node),
            Self::List(_) => None,
        }
    }

    /// All elements as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[N] {
        match self {
            Self::Node(node) => std::slice::from_ref(node),
            Self::List(nodes) => nodes,
        }
    }
}

/// A locator result is valid when something was found and, for collections,
/// the collection is non-empty.
#[must_use]
pub fn is_valid_element<N>(result: Option<&Located<N>>) -> bool {
    result.is_some_and(|found| !found.is_empty())
}

/// Options passed to `addEventListener` / `removeEventListener`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Listen during the capture phase
    pub capture: bool,
}

impl ListenerOptions {
    /// Capture-phase listener
    #[must_use]
    pub const fn capture() -> Self {
        Self { capture: true }
    }
}

/// A keyboard event as seen by shortcut dispatch
pub trait KeyEvent {
    /// `KeyboardEvent.key`
    fn key(&self) -> String;
    /// Alt held
    fn alt_key(&self) -> bool;
    /// Control held
    fn ctrl_key(&self) -> bool;
    /// Shift held
    fn shift_key(&self) -> bool;
    /// Meta held
    fn meta_key(&self) -> bool;
    /// Suppress the browser's default action
    fn prevent_default(&self);
    /// Stop the event reaching other listeners
    fn stop_propagation(&self);
}

/// The host document
///
/// Callbacks handed to the host run on the single event-loop thread. A host
/// must not invoke a mutation callback while a previous invocation of the
/// same observer is still running.
pub trait Dom: 'static {
    /// An element handle
    type Node: Clone + 'static;
    /// Something listeners can be attached to
    type Target: Clone + 'static;
    /// A live mutation observer
    type Observer: 'static;
    /// A pending timer
    type Timer: 'static;
    /// An attached event listener
    type Listener: 'static;
    /// Keyboard event type delivered to key listeners
    type KeyEvent: KeyEvent + 'static;

    /// `document.body`
    fn body(&self) -> Option<Self::Node>;

    /// `document` as an event target
    fn document(&self) -> Self::Target;

    /// Watch child-list changes under `scope`; `callback` runs once per batch
    fn observe_mutations(
        &self,
        scope: &Self::Node,
        subtree: bool,
        callback: Box<dyn FnMut()>,
    ) -> DomResult<Self::Observer>;

    /// Stop an observer and release its callback
    fn disconnect_observer(&self, observer: Self::Observer);

    /// Run `callback` once after `delay`
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> DomResult<Self::Timer>;

    /// Cancel a timer that has not fired
    fn clear_timeout(&self, timer: Self::Timer);

    /// Listen for a named event
    fn add_listener(
        &self,
        target: &Self::Target,
        event: &str,
        options: ListenerOptions,
        callback: Box<dyn FnMut()>,
    ) -> DomResult<Self::Listener>;

    /// Listen for `keydown`
    fn add_key_listener(
        &self,
        target: &Self::Target,
        options: ListenerOptions,
        callback: Box<dyn FnMut(&Self::KeyEvent)>,
    ) -> DomResult<Self::Listener>;

    /// Remove a listener using the options it was added with
    fn remove_listener(&self, listener: Self::Listener);

    /// `location.href`
    fn current_url(&self) -> String;

    /// `document.hidden`
    fn is_hidden(&self) -> bool;

    /// Whether `document.activeElement` accepts typed text
    fn text_entry_focused(&self) -> bool;
}
