//! Per-script context
//!
//! Holds the host, the configuration and the element cache for one script
//! instance, and wires navigation and shortcuts to them.

use crate::cache::ElementCache;
use crate::config::ScriptConfig;
use crate::dom::Dom;
use crate::navigation::NavigationWatcher;
use crate::result::{DomResult, WatchResult};
use crate::shortcut::{ShortcutDispatcher, ShortcutOptions};
use std::fmt;
use std::rc::Rc;

/// Everything one script instance shares between its features
pub struct ScriptContext<D: Dom> {
    dom: Rc<D>,
    config: ScriptConfig,
    cache: Rc<ElementCache<D>>,
    watcher: Option<NavigationWatcher<D>>,
    dispatcher: ShortcutDispatcher<D>,
}

impl<D: Dom> fmt::Debug for ScriptContext<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptContext")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("watcher", &self.watcher)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl<D: Dom> ScriptContext<D> {
    /// Build a context. A configured wait timeout becomes the cache's
    /// default timeout.
    pub fn new(dom: Rc<D>, config: ScriptConfig, cache: ElementCache<D>) -> Self {
        let cache = match config.wait.timeout() {
            Some(timeout) => cache.with_default_timeout(Some(timeout)),
            None => cache,
        };
        let dispatcher = ShortcutDispatcher::new(Rc::clone(&dom));
        Self {
            dom,
            config,
            cache: Rc::new(cache),
            watcher: None,
            dispatcher,
        }
    }

    /// The element cache
    #[must_use]
    pub fn elements(&self) -> Rc<ElementCache<D>> {
        Rc::clone(&self.cache)
    }

    /// The host document
    #[must_use]
    pub fn dom(&self) -> &Rc<D> {
        &self.dom
    }

    /// The configuration this context was built with
    #[must_use]
    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Run `on_enter` once per distinct target page. The cache is reset
    /// before each call so elements from the previous page are not reused.
    pub fn watch_navigation<P, C>(&mut self, is_target: P, on_enter: C) -> DomResult<()>
    where
        P: Fn(&str) -> bool + 'static,
        C: Fn(&ElementCache<D>, &str) + 'static,
    {
        let cache = Rc::clone(&self.cache);
        let navigation = &self.config.navigation;
        let mut watcher = NavigationWatcher::new(Rc::clone(&self.dom), is_target, move |url: &str| {
            cache.reset();
            on_enter(&cache, url);
        })
        .with_options(navigation.options());
        // replace first so the old watcher's listeners are gone before connect
        self.watcher = None;
        watcher.connect(&navigation.event, None)?;
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Bind `trigger` to the combination configured for `action`.
    ///
    /// Returns `false` when the configuration has no entry for `action`.
    pub fn bind_shortcut(&mut self, action: &str, trigger: impl Fn() + 'static) -> WatchResult<bool> {
        let Some(combo) = self.config.shortcut(action) else {
            tracing::warn!(action, "no shortcut configured");
            return Ok(false);
        };
        self.dispatcher.register(combo, trigger)?;
        if !self.dispatcher.is_connected() {
            self.dispatcher.connect(None, ShortcutOptions::default())?;
        }
        Ok(true)
    }

    /// Bind several actions; returns how many had a configured combination
    pub fn bind_shortcuts<I, S>(&mut self, actions: I) -> WatchResult<usize>
    where
        I: IntoIterator<Item = (S, Box<dyn Fn()>)>,
        S: AsRef<str>,
    {
        let mut bound = 0;
        for (action, trigger) in actions {
            if self.bind_shortcut(action.as_ref(), trigger)? {
                bound += 1;
            }
        }
        Ok(bound)
    }

    /// Whether a navigation watcher is attached
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(NavigationWatcher::is_connected)
    }

    /// Shortcut dispatcher, e.g. to check what is bound
    #[must_use]
    pub fn shortcuts(&self) -> &ShortcutDispatcher<D> {
        &self.dispatcher
    }

    /// Detach every listener and forget cached elements
    pub fn shutdown(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.disconnect();
        }
        self.dispatcher.disconnect();
        self.cache.reset();
        tracing::debug!("script context shut down");
    }
}
