//! Named element cache
//!
//! Maps names to locators and remembers what they found. Acquisition is
//! single-flight: while a wait for a name is pending, every caller gets a
//! clone of the same shared future and only one observer exists.
//!
//! Results are recorded when the wait settles, so [`ElementCache::get`] sees
//! them even if nobody polls the acquisition.

use crate::dom::{Dom, Located};
use crate::wait::{ElementWaiter, Locator, WaitOptions};
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Shared handle to an acquisition; clones resolve to the same value
pub type ElementFuture<N> = Shared<LocalBoxFuture<'static, Option<Located<N>>>>;

struct Registration<N> {
    locator: Locator<N>,
    options: WaitOptions<N>,
}

enum Entry<N> {
    Resolved(Located<N>),
    Pending(ElementFuture<N>),
}

struct Entries<N> {
    generation: u64,
    map: HashMap<String, Entry<N>>,
}

/// Named locators plus memoized and in-flight results
pub struct ElementCache<D: Dom> {
    waiter: ElementWaiter<D>,
    registry: HashMap<String, Registration<D::Node>>,
    essentials: Vec<String>,
    entries: Rc<RefCell<Entries<D::Node>>>,
}

impl<D: Dom> fmt::Debug for ElementCache<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        f.debug_struct("ElementCache")
            .field("registered", &self.registry.len())
            .field("essentials", &self.essentials)
            .field("entries", &entries.map.len())
            .field("generation", &entries.generation)
            .finish_non_exhaustive()
    }
}

impl<D: Dom> ElementCache<D> {
    /// Empty cache on `dom`
    #[must_use]
    pub fn new(dom: Rc<D>) -> Self {
        Self {
            waiter: ElementWaiter::new(dom),
            registry: HashMap::new(),
            essentials: Vec::new(),
            entries: Rc::new(RefCell::new(Entries {
                generation: 0,
                map: HashMap::new(),
            })),
        }
    }

    /// Timeout for locators registered without their own
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.waiter = self.waiter.with_default_timeout(timeout);
        self
    }

    /// Register `locator` under `name` with default wait options
    #[must_use]
    pub fn with_locator<F>(self, name: &str, locator: F) -> Self
    where
        F: Fn() -> Option<Located<D::Node>> + 'static,
    {
        self.with_locator_options(name, locator, WaitOptions::new())
    }

    /// Register `locator` under `name` with explicit wait options
    #[must_use]
    pub fn with_locator_options<F>(mut self, name: &str, locator: F, options: WaitOptions<D::Node>) -> Self
    where
        F: Fn() -> Option<Located<D::Node>> + 'static,
    {
        self.registry.insert(
            name.to_string(),
            Registration {
                locator: Rc::new(locator),
                options,
            },
        );
        self
    }

    /// Names that [`initialize`](Self::initialize) waits for
    #[must_use]
    pub fn with_essentials<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.essentials = names.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `name` has a locator
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.registry.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// What has already resolved for `name`. Never starts an acquisition.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Located<D::Node>> {
        match self.entries.borrow().map.get(name)? {
            Entry::Resolved(found) => Some(found.clone()),
            Entry::Pending(_) => None,
        }
    }

    /// Acquire `name`: the cached value, the in-flight wait, or a new wait.
    ///
    /// An unregistered name logs a warning and resolves `None`.
    pub fn wait_for(&self, name: &str) -> ElementFuture<D::Node> {
        if let Some(entry) = self.entries.borrow().map.get(name) {
            return match entry {
                Entry::Resolved(found) => ready(Some(found.clone())),
                Entry::Pending(shared) => shared.clone(),
            };
        }

        let Some(registration) = self.registry.get(name) else {
            tracing::warn!(name, "no locator registered");
            return ready(None);
        };

        tracing::debug!(name, "acquiring element");
        let settled = Rc::new(Cell::new(false));
        let write_back = WriteBack {
            entries: Rc::downgrade(&self.entries),
            name: name.to_string(),
            generation: self.entries.borrow().generation,
            settled: Rc::clone(&settled),
        };
        let shared = self
            .waiter
            .wait_then(
                Rc::clone(&registration.locator),
                registration.options.clone(),
                Some(Box::new(move |found: Option<&Located<D::Node>>| write_back.apply(found))),
            )
            .shared();

        // a wait that settled on the spot has already written its result
        if !settled.get() {
            self.entries
                .borrow_mut()
                .map
                .insert(name.to_string(), Entry::Pending(shared.clone()));
        }
        shared
    }

    /// Forget every entry. Waits started earlier keep running for whoever
    /// holds them but no longer update the cache; waits nobody holds are
    /// cancelled and release their observers.
    pub fn reset(&self) {
        let (stale, generation) = {
            let mut entries = self.entries.borrow_mut();
            entries.generation += 1;
            (std::mem::take(&mut entries.map), entries.generation)
        };
        tracing::debug!(generation, abandoned = stale.len(), "element cache reset");
        // dropping the last handle of a pending wait re-enters the cache
        drop(stale);
    }

    /// Wait for every essential element so later [`get`](Self::get) calls
    /// can rely on them. No essentials means nothing to do.
    pub async fn initialize(&self) {
        if self.essentials.is_empty() {
            return;
        }
        let waits: Vec<_> = self.essentials.iter().map(|name| self.wait_for(name)).collect();
        let results = future::join_all(waits).await;
        let missing: Vec<&str> = self
            .essentials
            .iter()
            .zip(&results)
            .filter(|(_, found)| found.is_none())
            .map(|(name, _)| name.as_str())
            .collect();
        if missing.is_empty() {
            tracing::debug!(count = results.len(), "essential elements ready");
        } else {
            tracing::warn!(?missing, "essential elements not found");
        }
    }
}

fn ready<N: Clone + 'static>(value: Option<Located<N>>) -> ElementFuture<N> {
    future::ready(value).boxed_local().shared()
}

/// Records a settled wait in the cache it came from, unless the cache was
/// reset in the meantime.
struct WriteBack<N> {
    entries: Weak<RefCell<Entries<N>>>,
    name: String,
    generation: u64,
    settled: Rc<Cell<bool>>,
}

impl<N: Clone> WriteBack<N> {
    fn apply(&self, found: Option<&Located<N>>) {
        self.settled.set(true);
        let Some(entries) = self.entries.upgrade() else {
            return;
        };
        let replaced = {
            let mut entries = entries.borrow_mut();
            if entries.generation != self.generation {
                return;
            }
            match found {
                Some(found) => entries.map.insert(self.name.clone(), Entry::Resolved(found.clone())),
                // absent is not memoized; the next request tries again
                None => entries.map.remove(&self.name),
            }
        };
        // the replaced handle may be the last one; drop it outside the borrow
        drop(replaced);
    }
}
