//! Element waiting
//!
//! Resolves "wait until this locator finds something" with a mutation
//! observer instead of polling.
//!
//! - **Fast path**: a locator that already succeeds resolves without an
//!   observer.
//! - **Race-free attach**: the locator runs once more right after the observer
//!   is attached, so content inserted in between is not missed.
//! - **Timeouts are not errors**: an elapsed timeout resolves to `None`.

use crate::dom::{is_valid_element, Dom, Located};
use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// A locator: pure, synchronous, cheap to call repeatedly
pub type Locator<N> = Rc<dyn Fn() -> Option<Located<N>>>;

/// Future returned by [`await_element`]. Dropping it before it resolves
/// cancels the wait and releases its observer and timer.
pub type WaitFuture<N> = LocalBoxFuture<'static, Option<Located<N>>>;

/// Runs once when a wait settles, before its future resolves, whether or not
/// anyone polls the future
pub type SettleHook<N> = Box<dyn FnOnce(Option<&Located<N>>)>;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for a single wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions<N> {
    /// Subtree root to observe; `None` means `document.body`
    pub scope: Option<N>,
    /// Observe all descendants, not just direct children
    pub subtree: bool,
    /// Give up (resolve `None`) after this long
    pub timeout: Option<Duration>,
}

impl<N> Default for WaitOptions<N> {
    fn default() -> Self {
        Self {
            scope: None,
            subtree: true,
            timeout: None,
        }
    }
}

impl<N> WaitOptions<N> {
    /// Body scope, subtree on, no timeout
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `scope` instead of the body
    #[must_use]
    pub fn with_scope(mut self, scope: N) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Include or exclude descendants
    #[must_use]
    pub fn with_subtree(mut self, subtree: bool) -> Self {
        self.subtree = subtree;
        self
    }

    /// Resolve `None` after `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Resolve `None` after `timeout_ms` milliseconds
    #[must_use]
    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(timeout_ms))
    }
}

// =============================================================================
// PENDING WAIT
// =============================================================================

struct Pending<D: Dom> {
    sender: Option<oneshot::Sender<Option<Located<D::Node>>>>,
    observer: Option<D::Observer>,
    timer: Option<D::Timer>,
    on_settle: Option<SettleHook<D::Node>>,
}

impl<D: Dom> Pending<D> {
    fn is_settled(&self) -> bool {
        self.sender.is_none()
    }
}

/// Resolve once: release the observer and timer, run the hook, then send.
fn settle<D: Dom>(dom: &Weak<D>, pending: &RefCell<Pending<D>>, value: Option<Located<D::Node>>) {
    let (sender, observer, timer, on_settle) = {
        let mut pending = pending.borrow_mut();
        (
            pending.sender.take(),
            pending.observer.take(),
            pending.timer.take(),
            pending.on_settle.take(),
        )
    };
    if let Some(dom) = dom.upgrade() {
        if let Some(observer) = observer {
            dom.disconnect_observer(observer);
        }
        if let Some(timer) = timer {
            dom.clear_timeout(timer);
        }
    }
    if let Some(on_settle) = on_settle {
        on_settle(value.as_ref());
    }
    if let Some(sender) = sender {
        // receiver may be gone; nobody is waiting then
        let _ = sender.send(value);
    }
}

/// Cancels a still-pending wait when its future is dropped
struct CancelOnDrop<D: Dom> {
    dom: Weak<D>,
    pending: Rc<RefCell<Pending<D>>>,
}

impl<D: Dom> Drop for CancelOnDrop<D> {
    fn drop(&mut self) {
        if self.pending.borrow().is_settled() {
            return;
        }
        tracing::debug!("element wait dropped before settling; releasing observer");
        settle(&self.dom, &self.pending, None);
    }
}

// =============================================================================
// WAITER
// =============================================================================

/// Wait until `locator` returns a valid result.
///
/// Resolves with the first valid result, or `None` if `options.timeout`
/// elapses first. Exactly one observer is live while the wait is pending and
/// it is disconnected when the wait settles.
pub fn await_element<D, F>(dom: &Rc<D>, locator: F, options: WaitOptions<D::Node>) -> WaitFuture<D::Node>
where
    D: Dom,
    F: Fn() -> Option<Located<D::Node>> + 'static,
{
    wait_with_locator(dom, Rc::new(locator), options)
}

/// [`await_element`] for an already shared locator
pub fn wait_with_locator<D: Dom>(
    dom: &Rc<D>,
    locator: Locator<D::Node>,
    options: WaitOptions<D::Node>,
) -> WaitFuture<D::Node> {
    wait_with_hook(dom, locator, options, None)
}

/// Settle without a pending future: run the hook, hand back a ready one
fn settled<N: 'static>(value: Option<Located<N>>, on_settle: Option<SettleHook<N>>) -> WaitFuture<N> {
    if let Some(on_settle) = on_settle {
        on_settle(value.as_ref());
    }
    future::ready(value).boxed_local()
}

/// [`wait_with_locator`] that also runs `on_settle` at the moment the wait
/// settles (found, timed out, or cancelled), even if the future is never polled
pub fn wait_with_hook<D: Dom>(
    dom: &Rc<D>,
    locator: Locator<D::Node>,
    options: WaitOptions<D::Node>,
    on_settle: Option<SettleHook<D::Node>>,
) -> WaitFuture<D::Node> {
    let found = locator();
    if is_valid_element(found.as_ref()) {
        tracing::debug!("element present, no observer needed");
        return settled(found, on_settle);
    }

    let Some(scope) = options.scope.or_else(|| dom.body()) else {
        tracing::warn!("no observation scope (document has no body); giving up");
        return settled(None, on_settle);
    };

    let (sender, receiver) = oneshot::channel();
    let pending = Rc::new(RefCell::new(Pending::<D> {
        sender: Some(sender),
        observer: None,
        timer: None,
        on_settle: None,
    }));
    let weak_dom = Rc::downgrade(dom);

    let on_mutation = {
        let pending = Rc::clone(&pending);
        let weak_dom = weak_dom.clone();
        let locator = Rc::clone(&locator);
        Box::new(move || {
            if pending.borrow().is_settled() {
                return;
            }
            let found = locator();
            if is_valid_element(found.as_ref()) {
                tracing::trace!("element appeared after mutation batch");
                settle(&weak_dom, &pending, found);
            }
        })
    };

    match dom.observe_mutations(&scope, options.subtree, on_mutation) {
        Ok(observer) => pending.borrow_mut().observer = Some(observer),
        Err(err) => {
            tracing::warn!(error = %err, "could not observe mutations; giving up");
            return settled(None, on_settle);
        }
    }
    pending.borrow_mut().on_settle = on_settle;

    // content may have landed between the first check and observe()
    let found = locator();
    if is_valid_element(found.as_ref()) {
        tracing::debug!("element appeared while attaching observer");
        settle(&weak_dom, &pending, found);
    } else if let Some(timeout) = options.timeout {
        let on_timeout = {
            let pending = Rc::clone(&pending);
            let weak_dom = weak_dom.clone();
            Box::new(move || {
                // the fired timer must not be cleared again
                pending.borrow_mut().timer = None;
                if !pending.borrow().is_settled() {
                    tracing::debug!(timeout_ms = timeout.as_millis() as u64, "element wait timed out");
                    settle(&weak_dom, &pending, None);
                }
            })
        };
        match dom.set_timeout(timeout, on_timeout) {
            Ok(timer) => pending.borrow_mut().timer = Some(timer),
            Err(err) => tracing::warn!(error = %err, "could not arm wait timeout"),
        }
    }

    let cancel = CancelOnDrop {
        dom: weak_dom,
        pending,
    };
    async move {
        let _cancel = cancel;
        receiver.await.unwrap_or(None)
    }
    .boxed_local()
}

/// Waits bound to one host, with a default timeout
pub struct ElementWaiter<D: Dom> {
    dom: Rc<D>,
    default_timeout: Option<Duration>,
}

impl<D: Dom> fmt::Debug for ElementWaiter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementWaiter")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl<D: Dom> Clone for ElementWaiter<D> {
    fn clone(&self) -> Self {
        Self {
            dom: Rc::clone(&self.dom),
            default_timeout: self.default_timeout,
        }
    }
}

impl<D: Dom> ElementWaiter<D> {
    /// Waiter with no default timeout
    #[must_use]
    pub fn new(dom: Rc<D>) -> Self {
        Self {
            dom,
            default_timeout: None,
        }
    }

    /// Apply `timeout` to waits that do not set their own
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The host this waiter observes
    #[must_use]
    pub fn dom(&self) -> &Rc<D> {
        &self.dom
    }

    /// Wait for `locator` with `options`
    pub fn wait(&self, locator: Locator<D::Node>, options: WaitOptions<D::Node>) -> WaitFuture<D::Node> {
        self.wait_then(locator, options, None)
    }

    /// [`wait`](Self::wait) with a hook that runs when the wait settles
    pub fn wait_then(
        &self,
        locator: Locator<D::Node>,
        mut options: WaitOptions<D::Node>,
        on_settle: Option<SettleHook<D::Node>>,
    ) -> WaitFuture<D::Node> {
        if options.timeout.is_none() {
            options.timeout = self.default_timeout;
        }
        wait_with_hook(&self.dom, locator, options, on_settle)
    }
}
