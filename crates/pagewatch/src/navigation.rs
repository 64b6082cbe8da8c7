//! Navigation watching
//!
//! Single-page apps fire their "navigation finished" event more than once per
//! logical page change, and sometimes before a script has attached. The
//! watcher turns that stream into one callback per distinct page:
//!
//! ```text
//!   signal ──► normalize URL ──► same as previous? ──yes──► drop
//!                                      │ no
//!                                      ▼
//!                              target page? ──no──► ignore
//!                                      │ yes
//!                                      ▼
//!                  hidden && await_unhide? ──yes──► defer until visible
//!                                      │ no
//!                                      ▼
//!                                  dispatch
//! ```

use crate::dom::{Dom, ListenerOptions};
use crate::result::DomResult;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Event fired by the host page when a client-side navigation completes
pub const DEFAULT_NAVIGATION_EVENT: &str = "yt-navigate-finish";

/// Strip everything from the first `&`. Playlist position and similar
/// parameters follow the first `&` and do not mean a new page.
#[must_use]
pub fn normalize_url(url: &str) -> &str {
    url.split_once('&').map_or(url, |(head, _)| head)
}

/// Watcher behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationOptions {
    /// Defer dispatch while the tab is hidden
    pub await_unhide: bool,
    /// Register listeners for the capture phase
    pub capture: bool,
}

impl NavigationOptions {
    /// No deferral, bubble phase
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defer dispatch until the tab is visible
    #[must_use]
    pub const fn with_await_unhide(mut self, await_unhide: bool) -> Self {
        self.await_unhide = await_unhide;
        self
    }

    /// Listen in the capture phase
    #[must_use]
    pub const fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    fn listener_options(self) -> ListenerOptions {
        ListenerOptions {
            capture: self.capture,
        }
    }
}

/// Snapshot of the watcher's own state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationState {
    /// Last normalized URL seen
    pub previous_url: Option<String>,
    /// A target page arrived while hidden and awaits visibility
    pub awaiting_unhide: bool,
}

type TargetPredicate = Rc<dyn Fn(&str) -> bool>;
type NavigateCallback = Rc<dyn Fn(&str)>;

struct Handler<D: Dom> {
    dom: Rc<D>,
    options: NavigationOptions,
    state: RefCell<NavigationState>,
    is_target: TargetPredicate,
    on_navigate: NavigateCallback,
}

impl<D: Dom> Handler<D> {
    fn on_signal(&self) {
        let url = self.dom.current_url();
        let normalized = normalize_url(&url);
        {
            let mut state = self.state.borrow_mut();
            if state.previous_url.as_deref() == Some(normalized) {
                tracing::trace!(url = normalized, "duplicate navigation signal");
                return;
            }
            state.previous_url = Some(normalized.to_string());
        }

        if !(self.is_target)(normalized) {
            tracing::debug!(url = normalized, "not a target page");
            // a deferral belongs to the page we just left
            self.state.borrow_mut().awaiting_unhide = false;
            return;
        }

        if self.options.await_unhide && self.dom.is_hidden() {
            tracing::debug!(url = normalized, "target page while hidden; deferring");
            self.state.borrow_mut().awaiting_unhide = true;
            return;
        }

        self.dispatch(&url);
    }

    fn on_visibility_change(&self) {
        if self.dom.is_hidden() {
            return;
        }
        let deferred = std::mem::take(&mut self.state.borrow_mut().awaiting_unhide);
        if deferred {
            let url = self.dom.current_url();
            tracing::debug!(url = %url, "tab visible; dispatching deferred navigation");
            self.dispatch(&url);
        }
    }

    fn dispatch(&self, url: &str) {
        tracing::info!(url, "entered target page");
        (self.on_navigate)(url);
    }
}

/// Turns navigation signals into one callback per distinct target page
pub struct NavigationWatcher<D: Dom> {
    handler: Rc<Handler<D>>,
    listeners: Vec<D::Listener>,
}

impl<D: Dom> fmt::Debug for NavigationWatcher<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationWatcher")
            .field("options", &self.handler.options)
            .field("state", &self.handler.state.borrow())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl<D: Dom> NavigationWatcher<D> {
    /// Watch for pages matching `is_target`; `on_navigate` receives the full URL
    pub fn new<P, C>(dom: Rc<D>, is_target: P, on_navigate: C) -> Self
    where
        P: Fn(&str) -> bool + 'static,
        C: Fn(&str) + 'static,
    {
        Self {
            handler: Rc::new(Handler {
                dom,
                options: NavigationOptions::default(),
                state: RefCell::new(NavigationState::default()),
                is_target: Rc::new(is_target),
                on_navigate: Rc::new(on_navigate),
            }),
            listeners: Vec::new(),
        }
    }

    /// Replace the watcher options. Takes effect on the next `connect`.
    #[must_use]
    pub fn with_options(self, options: NavigationOptions) -> Self {
        let handler = Rc::new(Handler {
            dom: Rc::clone(&self.handler.dom),
            options,
            state: RefCell::new(self.handler.state.borrow().clone()),
            is_target: Rc::clone(&self.handler.is_target),
            on_navigate: Rc::clone(&self.handler.on_navigate),
        });
        let mut watcher = self;
        watcher.disconnect();
        watcher.handler = handler;
        watcher
    }

    /// Current options
    #[must_use]
    pub fn options(&self) -> NavigationOptions {
        self.handler.options
    }

    /// Copy of the de-duplication state
    #[must_use]
    pub fn state(&self) -> NavigationState {
        self.handler.state.borrow().clone()
    }

    /// Whether listeners are attached
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// Listen for `event_name` on `target` (default: the document), then
    /// check the current page once right away.
    pub fn connect(&mut self, event_name: &str, target: Option<D::Target>) -> DomResult<()> {
        self.disconnect();

        let dom = Rc::clone(&self.handler.dom);
        let target = target.unwrap_or_else(|| dom.document());
        let options = self.handler.options.listener_options();

        let handler = Rc::clone(&self.handler);
        let listener = dom.add_listener(&target, event_name, options, Box::new(move || handler.on_signal()))?;
        self.listeners.push(listener);

        if self.handler.options.await_unhide {
            let handler = Rc::clone(&self.handler);
            let visibility = dom.add_listener(
                &dom.document(),
                "visibilitychange",
                options,
                Box::new(move || handler.on_visibility_change()),
            );
            match visibility {
                Ok(listener) => self.listeners.push(listener),
                Err(err) => {
                    self.disconnect();
                    return Err(err);
                }
            }
        }

        tracing::debug!(event = event_name, "navigation watcher connected");
        // the first page load may have fired before we were listening
        self.handler.on_signal();
        Ok(())
    }

    /// Remove the listeners added by the last `connect`. No-op when idle.
    pub fn disconnect(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        for listener in self.listeners.drain(..) {
            self.handler.dom.remove_listener(listener);
        }
        tracing::debug!("navigation watcher disconnected");
    }
}

impl<D: Dom> Drop for NavigationWatcher<D> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
