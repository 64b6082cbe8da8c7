//! In-memory document for tests and native builds
//!
//! `MockDom` keeps a small node tree, per-observer mutation records, a
//! virtual clock and an event-listener table. Nothing happens on its own:
//! tests drive it with [`MockDom::flush_mutations`] (the microtask checkpoint
//! where observers run) and [`MockDom::advance`] (timers).

use super::{Dom, KeyEvent, ListenerOptions};
use crate::result::{DomResult, WatchError};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Upper bound on observer rounds in one flush; observers that keep mutating
/// their own scope would otherwise spin forever.
const MAX_FLUSH_ROUNDS: usize = 64;

/// Handle to a node in a [`MockDom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Event targets known to the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockTarget {
    /// `document`
    Document,
    /// `window`
    Window,
    /// An element
    Node(NodeId),
}

/// Keyboard event used with [`MockDom::press_key`]
#[derive(Debug, Clone, Default)]
pub struct MockKeyEvent {
    key: String,
    alt: bool,
    ctrl: bool,
    shift: bool,
    meta: bool,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

impl MockKeyEvent {
    /// A keydown for `key` with no modifiers
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }

    /// Hold Alt
    #[must_use]
    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// Hold Control
    #[must_use]
    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    /// Hold Shift
    #[must_use]
    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// Hold Meta
    #[must_use]
    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// Whether a listener called `prevent_default`
    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    /// Whether a listener called `stop_propagation`
    #[must_use]
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }
}

impl KeyEvent for MockKeyEvent {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn alt_key(&self) -> bool {
        self.alt
    }

    fn ctrl_key(&self) -> bool {
        self.ctrl
    }

    fn shift_key(&self) -> bool {
        self.shift
    }

    fn meta_key(&self) -> bool {
        self.meta
    }

    fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }
}

/// Live observer handle
#[derive(Debug, PartialEq, Eq)]
pub struct MockObserver(u64);

/// Pending timer handle
#[derive(Debug, PartialEq, Eq)]
pub struct MockTimer {
    due_ms: u64,
    id: u64,
}

/// Attached listener handle
#[derive(Debug, PartialEq, Eq)]
pub struct MockListener(u64);

type Callback = Rc<RefCell<Box<dyn FnMut()>>>;
type KeyCallback = Rc<RefCell<Box<dyn FnMut(&MockKeyEvent)>>>;
type ObserveHook = Box<dyn FnOnce(&MockDom)>;

#[derive(Debug)]
struct MockNode {
    tag: String,
    attributes: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct ObserverEntry {
    scope: NodeId,
    subtree: bool,
    has_records: bool,
    callback: Callback,
}

enum ListenerCallback {
    Plain(Callback),
    Key(KeyCallback),
}

struct ListenerEntry {
    target: MockTarget,
    event: String,
    capture: bool,
    callback: ListenerCallback,
}

struct MockState {
    nodes: Vec<MockNode>,
    root: NodeId,
    body: NodeId,
    observers: BTreeMap<u64, ObserverEntry>,
    listeners: BTreeMap<u64, ListenerEntry>,
    timers: BTreeMap<(u64, u64), Box<dyn FnOnce()>>,
    next_handle: u64,
    observers_created: usize,
    now_ms: u64,
    url: String,
    hidden: bool,
    focused: Option<NodeId>,
    observe_hook: Option<ObserveHook>,
}

impl MockState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn node(&self, id: NodeId) -> &MockNode {
        &self.nodes[id.0]
    }

    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        while let Some(parent) = self.node(node).parent {
            if parent == ancestor {
                return true;
            }
            node = parent;
        }
        false
    }

    fn is_connected(&self, node: NodeId) -> bool {
        node == self.root || self.is_ancestor(self.root, node)
    }

    /// Queue a child-list record on every observer interested in `target`
    fn record_child_list(&mut self, target: NodeId) {
        let interested: Vec<u64> = self
            .observers
            .iter()
            .filter(|(_, entry)| {
                entry.scope == target || (entry.subtree && self.is_ancestor(entry.scope, target))
            })
            .map(|(id, _)| *id)
            .collect();
        for id in interested {
            if let Some(entry) = self.observers.get_mut(&id) {
                entry.has_records = true;
            }
        }
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != child);
            self.record_child_list(parent);
        }
    }

    fn connected_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev());
        }
        out
    }
}

/// In-memory [`Dom`] host
pub struct MockDom {
    state: RefCell<MockState>,
}

impl fmt::Debug for MockDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MockDom")
            .field("url", &state.url)
            .field("nodes", &state.nodes.len())
            .field("observers", &state.observers.len())
            .field("listeners", &state.listeners.len())
            .field("timers", &state.timers.len())
            .field("now_ms", &state.now_ms)
            .finish_non_exhaustive()
    }
}

impl Default for MockDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDom {
    /// Creates `<html><head></head><body></body></html>` at `about:blank`
    #[must_use]
    pub fn new() -> Self {
        let blank = |tag: &str, parent: Option<NodeId>| MockNode {
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
            parent,
            children: Vec::new(),
        };
        let root = NodeId(0);
        let head = NodeId(1);
        let body = NodeId(2);
        let mut html = blank("html", None);
        html.children = vec![head, body];
        let nodes = vec![html, blank("head", Some(root)), blank("body", Some(root))];

        Self {
            state: RefCell::new(MockState {
                nodes,
                root,
                body,
                observers: BTreeMap::new(),
                listeners: BTreeMap::new(),
                timers: BTreeMap::new(),
                next_handle: 0,
                observers_created: 0,
                now_ms: 0,
                url: "about:blank".to_string(),
                hidden: false,
                focused: None,
                observe_hook: None,
            }),
        }
    }

    /// Creates a mock already at `url`
    #[must_use]
    pub fn at(url: &str) -> Self {
        let dom = Self::new();
        dom.navigate(url);
        dom
    }

    // ---- tree ----

    /// `document.body`
    #[must_use]
    pub fn body_node(&self) -> NodeId {
        self.state.borrow().body
    }

    /// `document.createElement`
    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut state = self.state.borrow_mut();
        let id = NodeId(state.nodes.len());
        state.nodes.push(MockNode {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Create an element with an `id` attribute
    pub fn create_element_with_id(&self, tag: &str, id: &str) -> NodeId {
        let node = self.create_element(tag);
        self.set_attribute(node, "id", id);
        node
    }

    /// `Element.setAttribute`
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        self.state.borrow_mut().nodes[node.0]
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    /// `Element.getAttribute`
    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state.borrow().node(node).attributes.get(name).cloned()
    }

    /// Lowercase tag name
    #[must_use]
    pub fn tag_name(&self, node: NodeId) -> String {
        self.state.borrow().node(node).tag.clone()
    }

    /// `Node.appendChild`; moves the child if it already has a parent
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut state = self.state.borrow_mut();
        state.detach(child);
        state.nodes[child.0].parent = Some(parent);
        state.nodes[parent.0].children.push(child);
        state.record_child_list(parent);
    }

    /// `Element.remove`
    pub fn remove(&self, node: NodeId) {
        self.state.borrow_mut().detach(node);
    }

    /// Parent node, if attached
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.borrow().node(node).parent
    }

    /// Child nodes in order
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state.borrow().node(node).children.clone()
    }

    /// `Node.isConnected`
    #[must_use]
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.state.borrow().is_connected(node)
    }

    /// `document.getElementById` (connected nodes only)
    #[must_use]
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        let state = self.state.borrow();
        state
            .connected_nodes()
            .into_iter()
            .find(|n| state.node(*n).attributes.get("id").is_some_and(|v| v == id))
    }

    /// `document.getElementsByTagName` in document order
    #[must_use]
    pub fn get_elements_by_tag_name(&self, tag: &str) -> Vec<NodeId> {
        let tag = tag.to_ascii_lowercase();
        let state = self.state.borrow();
        state
            .connected_nodes()
            .into_iter()
            .filter(|n| state.node(*n).tag == tag)
            .collect()
    }

    /// `document.getElementsByClassName` for a single class
    #[must_use]
    pub fn get_elements_by_class_name(&self, class: &str) -> Vec<NodeId> {
        let state = self.state.borrow();
        state
            .connected_nodes()
            .into_iter()
            .filter(|n| {
                state
                    .node(*n)
                    .attributes
                    .get("class")
                    .is_some_and(|v| v.split_whitespace().any(|c| c == class))
            })
            .collect()
    }

    // ---- mutation observers ----

    /// Deliver queued mutation records, one callback per observer per round.
    /// Returns the number of callbacks invoked.
    pub fn flush_mutations(&self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_FLUSH_ROUNDS {
            let batch: Vec<(u64, Callback)> = {
                let mut state = self.state.borrow_mut();
                state
                    .observers
                    .iter_mut()
                    .filter(|(_, entry)| entry.has_records)
                    .map(|(id, entry)| {
                        entry.has_records = false;
                        (*id, Rc::clone(&entry.callback))
                    })
                    .collect()
            };
            if batch.is_empty() {
                break;
            }
            for (id, callback) in batch {
                if !self.state.borrow().observers.contains_key(&id) {
                    continue;
                }
                (*callback.borrow_mut())();
                delivered += 1;
            }
        }
        delivered
    }

    /// Run `hook` inside the next `observe_mutations` call, before the
    /// observer is registered. Mutations made by the hook are invisible to
    /// that observer, like DOM work racing ahead of `observe()`.
    pub fn on_next_observe(&self, hook: impl FnOnce(&MockDom) + 'static) {
        self.state.borrow_mut().observe_hook = Some(Box::new(hook));
    }

    /// Observers currently connected
    #[must_use]
    pub fn live_observers(&self) -> usize {
        self.state.borrow().observers.len()
    }

    /// Observers ever created
    #[must_use]
    pub fn observers_created(&self) -> usize {
        self.state.borrow().observers_created
    }

    // ---- clock ----

    /// Virtual time in milliseconds
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.state.borrow().now_ms
    }

    /// Move the virtual clock forward, firing due timers in order
    pub fn advance(&self, by: Duration) {
        let target = self.state.borrow().now_ms + by.as_millis() as u64;
        loop {
            let due = {
                let mut state = self.state.borrow_mut();
                let next = state
                    .timers
                    .keys()
                    .next()
                    .copied()
                    .filter(|(due_ms, _)| *due_ms <= target);
                next.and_then(|key| {
                    state.now_ms = key.0;
                    state.timers.remove(&key)
                })
            };
            match due {
                Some(callback) => callback(),
                None => break,
            }
        }
        self.state.borrow_mut().now_ms = target;
    }

    /// Timers not yet fired or cleared
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    // ---- location, visibility, focus ----

    /// Change `location.href` without dispatching anything
    pub fn navigate(&self, url: &str) {
        self.state.borrow_mut().url = url.to_string();
    }

    /// Change `document.hidden`, dispatching `visibilitychange` on change
    pub fn set_hidden(&self, hidden: bool) {
        let changed = {
            let mut state = self.state.borrow_mut();
            let changed = state.hidden != hidden;
            state.hidden = hidden;
            changed
        };
        if changed {
            self.dispatch(MockTarget::Document, "visibilitychange");
        }
    }

    /// Move focus to `node`
    pub fn focus(&self, node: NodeId) {
        self.state.borrow_mut().focused = Some(node);
    }

    /// Return focus to the body
    pub fn blur(&self) {
        self.state.borrow_mut().focused = None;
    }

    /// `document.activeElement`
    #[must_use]
    pub fn active_element(&self) -> NodeId {
        let state = self.state.borrow();
        state.focused.unwrap_or(state.body)
    }

    // ---- events ----

    /// Dispatch a plain event; returns how many listeners ran
    pub fn dispatch(&self, target: MockTarget, event: &str) -> usize {
        let matching: Vec<(u64, Callback)> = {
            let state = self.state.borrow();
            let mut entries: Vec<(&u64, &ListenerEntry)> = state
                .listeners
                .iter()
                .filter(|(_, l)| l.target == target && l.event == event)
                .collect();
            // capture listeners first, then registration order
            entries.sort_by_key(|(id, l)| (!l.capture, **id));
            entries
                .into_iter()
                .filter_map(|(id, l)| match &l.callback {
                    ListenerCallback::Plain(cb) => Some((*id, Rc::clone(cb))),
                    ListenerCallback::Key(_) => None,
                })
                .collect()
        };
        let mut ran = 0;
        for (id, callback) in matching {
            if !self.state.borrow().listeners.contains_key(&id) {
                continue;
            }
            (*callback.borrow_mut())();
            ran += 1;
        }
        ran
    }

    /// Dispatch `keydown` on the document
    pub fn press_key(&self, event: &MockKeyEvent) -> usize {
        self.dispatch_key(MockTarget::Document, event)
    }

    /// Dispatch `keydown` on `target`; returns how many listeners ran
    pub fn dispatch_key(&self, target: MockTarget, event: &MockKeyEvent) -> usize {
        let matching: Vec<(u64, KeyCallback)> = {
            let state = self.state.borrow();
            let mut entries: Vec<(&u64, &ListenerEntry)> = state
                .listeners
                .iter()
                .filter(|(_, l)| l.target == target && l.event == "keydown")
                .collect();
            entries.sort_by_key(|(id, l)| (!l.capture, **id));
            entries
                .into_iter()
                .filter_map(|(id, l)| match &l.callback {
                    ListenerCallback::Key(cb) => Some((*id, Rc::clone(cb))),
                    ListenerCallback::Plain(_) => None,
                })
                .collect()
        };
        let mut ran = 0;
        for (id, callback) in matching {
            if !self.state.borrow().listeners.contains_key(&id) {
                continue;
            }
            (*callback.borrow_mut())(event);
            ran += 1;
            if event.propagation_stopped() {
                break;
            }
        }
        ran
    }

    /// Listeners currently attached
    #[must_use]
    pub fn live_listeners(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// Listeners attached for `event` on `target`
    #[must_use]
    pub fn listeners_for(&self, target: MockTarget, event: &str) -> usize {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|l| l.target == target && l.event == event)
            .count()
    }

    fn insert_listener(
        &self,
        target: MockTarget,
        event: &str,
        options: ListenerOptions,
        callback: ListenerCallback,
    ) -> MockListener {
        let mut state = self.state.borrow_mut();
        let id = state.next_handle();
        state.listeners.insert(
            id,
            ListenerEntry {
                target,
                event: event.to_string(),
                capture: options.capture,
                callback,
            },
        );
        MockListener(id)
    }
}

impl Dom for MockDom {
    type Node = NodeId;
    type Target = MockTarget;
    type Observer = MockObserver;
    type Timer = MockTimer;
    type Listener = MockListener;
    type KeyEvent = MockKeyEvent;

    fn body(&self) -> Option<NodeId> {
        Some(self.body_node())
    }

    fn document(&self) -> MockTarget {
        MockTarget::Document
    }

    fn observe_mutations(
        &self,
        scope: &NodeId,
        subtree: bool,
        callback: Box<dyn FnMut()>,
    ) -> DomResult<MockObserver> {
        if scope.0 >= self.state.borrow().nodes.len() {
            return Err(WatchError::dom(format!("unknown node {}", scope.0)));
        }
        let hook = self.state.borrow_mut().observe_hook.take();
        if let Some(hook) = hook {
            hook(self);
        }
        let mut state = self.state.borrow_mut();
        let id = state.next_handle();
        state.observers_created += 1;
        state.observers.insert(
            id,
            ObserverEntry {
                scope: *scope,
                subtree,
                has_records: false,
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        Ok(MockObserver(id))
    }

    fn disconnect_observer(&self, observer: MockObserver) {
        let removed = self.state.borrow_mut().observers.remove(&observer.0);
        drop(removed);
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> DomResult<MockTimer> {
        let mut state = self.state.borrow_mut();
        let id = state.next_handle();
        let due_ms = state.now_ms + delay.as_millis() as u64;
        state.timers.insert((due_ms, id), callback);
        Ok(MockTimer { due_ms, id })
    }

    fn clear_timeout(&self, timer: MockTimer) {
        let removed = self.state.borrow_mut().timers.remove(&(timer.due_ms, timer.id));
        drop(removed);
    }

    fn add_listener(
        &self,
        target: &MockTarget,
        event: &str,
        options: ListenerOptions,
        callback: Box<dyn FnMut()>,
    ) -> DomResult<MockListener> {
        Ok(self.insert_listener(
            *target,
            event,
            options,
            ListenerCallback::Plain(Rc::new(RefCell::new(callback))),
        ))
    }

    fn add_key_listener(
        &self,
        target: &MockTarget,
        options: ListenerOptions,
        callback: Box<dyn FnMut(&MockKeyEvent)>,
    ) -> DomResult<MockListener> {
        Ok(self.insert_listener(
            *target,
            "keydown",
            options,
            ListenerCallback::Key(Rc::new(RefCell::new(callback))),
        ))
    }

    fn remove_listener(&self, listener: MockListener) {
        let removed = self.state.borrow_mut().listeners.remove(&listener.0);
        drop(removed);
    }

    fn current_url(&self) -> String {
        self.state.borrow().url.clone()
    }

    fn is_hidden(&self) -> bool {
        self.state.borrow().hidden
    }

    fn text_entry_focused(&self) -> bool {
        let state = self.state.borrow();
        let Some(focused) = state.focused else {
            return false;
        };
        let tag = state.node(focused).tag.as_str();
        if tag == "input" || tag == "textarea" {
            return true;
        }
        // contenteditable is inherited until an explicit "false"
        let mut node = Some(focused);
        while let Some(id) = node {
            match state.node(id).attributes.get("contenteditable").map(String::as_str) {
                Some("" | "true" | "plaintext-only") => return true,
                Some(_) => return false,
                None => node = state.node(id).parent,
            }
        }
        false
    }
}
