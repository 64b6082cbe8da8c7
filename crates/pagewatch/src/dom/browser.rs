//! Browser host backed by `web-sys`
//!
//! Compiled only for wasm32. Each [`Dom`] operation maps onto the matching
//! browser API; closures handed to JavaScript are owned by the returned
//! handles and released when the handle is given back.

use super::{Dom, KeyEvent, ListenerOptions};
use crate::result::{DomResult, WatchError};
use std::time::Duration;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, EventTarget, HtmlElement, KeyboardEvent, MutationObserver, Window};

impl From<JsValue> for WatchError {
    fn from(value: JsValue) -> Self {
        WatchError::dom(
            value
                .as_string()
                .unwrap_or_else(|| format!("{value:?}")),
        )
    }
}

impl KeyEvent for KeyboardEvent {
    fn key(&self) -> String {
        KeyboardEvent::key(self)
    }

    fn alt_key(&self) -> bool {
        KeyboardEvent::alt_key(self)
    }

    fn ctrl_key(&self) -> bool {
        KeyboardEvent::ctrl_key(self)
    }

    fn shift_key(&self) -> bool {
        KeyboardEvent::shift_key(self)
    }

    fn meta_key(&self) -> bool {
        KeyboardEvent::meta_key(self)
    }

    fn prevent_default(&self) {
        self.unchecked_ref::<web_sys::Event>().prevent_default();
    }

    fn stop_propagation(&self) {
        self.unchecked_ref::<web_sys::Event>().stop_propagation();
    }
}

/// A connected `MutationObserver` and the closure it calls
#[derive(Debug)]
pub struct BrowserObserver {
    observer: MutationObserver,
    callback: Closure<dyn FnMut(js_sys::Array, MutationObserver)>,
}

/// A pending `setTimeout`
#[derive(Debug)]
pub struct BrowserTimer {
    handle: i32,
    callback: Closure<dyn FnMut()>,
}

/// An attached event listener
#[derive(Debug)]
pub struct BrowserListener {
    target: EventTarget,
    event: String,
    capture: bool,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

/// The page this script runs in
#[derive(Debug, Clone)]
pub struct BrowserDom {
    window: Window,
    document: Document,
}

impl BrowserDom {
    /// Bind to the global `window` and `document`
    pub fn new() -> DomResult<Self> {
        let window = web_sys::window().ok_or_else(|| WatchError::dom("no global window"))?;
        let document = window
            .document()
            .ok_or_else(|| WatchError::dom("window has no document"))?;
        Ok(Self { window, document })
    }

    /// The bound window
    #[must_use]
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// The bound document
    #[must_use]
    pub fn raw_document(&self) -> &Document {
        &self.document
    }

    /// `window` as a listener target (e.g. for `popstate`)
    #[must_use]
    pub fn window_target(&self) -> EventTarget {
        self.window.clone().unchecked_into()
    }
}

/// Drop a JS-facing closure after the current task; a closure may be
/// released from inside its own invocation.
fn release<T: 'static>(value: T) {
    wasm_bindgen_futures::spawn_local(async move { drop(value) });
}

impl Dom for BrowserDom {
    type Node = Element;
    type Target = EventTarget;
    type Observer = BrowserObserver;
    type Timer = BrowserTimer;
    type Listener = BrowserListener;
    type KeyEvent = KeyboardEvent;

    fn body(&self) -> Option<Element> {
        self.document.body().map(Into::into)
    }

    fn document(&self) -> EventTarget {
        self.document.clone().unchecked_into()
    }

    fn observe_mutations(
        &self,
        scope: &Element,
        subtree: bool,
        mut callback: Box<dyn FnMut()>,
    ) -> DomResult<BrowserObserver> {
        let callback = Closure::wrap(Box::new(move |_records: js_sys::Array, _observer: MutationObserver| {
            callback();
        }) as Box<dyn FnMut(js_sys::Array, MutationObserver)>);
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
        let init = web_sys::MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(subtree);
        observer.observe_with_options(scope, &init)?;
        Ok(BrowserObserver { observer, callback })
    }

    fn disconnect_observer(&self, observer: BrowserObserver) {
        observer.observer.disconnect();
        release(observer.callback);
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> DomResult<BrowserTimer> {
        let mut callback = Some(callback);
        let callback = Closure::wrap(Box::new(move || {
            if let Some(callback) = callback.take() {
                callback();
            }
        }) as Box<dyn FnMut()>);
        let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        let handle = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.as_ref().unchecked_ref(), millis)?;
        Ok(BrowserTimer { handle, callback })
    }

    fn clear_timeout(&self, timer: BrowserTimer) {
        self.window.clear_timeout_with_handle(timer.handle);
        release(timer.callback);
    }

    fn add_listener(
        &self,
        target: &EventTarget,
        event: &str,
        options: ListenerOptions,
        mut callback: Box<dyn FnMut()>,
    ) -> DomResult<BrowserListener> {
        let callback = Closure::wrap(Box::new(move |_event: web_sys::Event| callback())
            as Box<dyn FnMut(web_sys::Event)>);
        target.add_event_listener_with_callback_and_bool(
            event,
            callback.as_ref().unchecked_ref(),
            options.capture,
        )?;
        Ok(BrowserListener {
            target: target.clone(),
            event: event.to_string(),
            capture: options.capture,
            callback,
        })
    }

    fn add_key_listener(
        &self,
        target: &EventTarget,
        options: ListenerOptions,
        mut callback: Box<dyn FnMut(&KeyboardEvent)>,
    ) -> DomResult<BrowserListener> {
        let callback = Closure::wrap(Box::new(move |event: web_sys::Event| {
            if let Some(key_event) = event.dyn_ref::<KeyboardEvent>() {
                callback(key_event);
            }
        }) as Box<dyn FnMut(web_sys::Event)>);
        target.add_event_listener_with_callback_and_bool(
            "keydown",
            callback.as_ref().unchecked_ref(),
            options.capture,
        )?;
        Ok(BrowserListener {
            target: target.clone(),
            event: "keydown".to_string(),
            capture: options.capture,
            callback,
        })
    }

    fn remove_listener(&self, listener: BrowserListener) {
        if let Err(err) = listener.target.remove_event_listener_with_callback_and_bool(
            &listener.event,
            listener.callback.as_ref().unchecked_ref(),
            listener.capture,
        ) {
            tracing::warn!(event = %listener.event, error = ?err, "removeEventListener failed");
        }
        release(listener.callback);
    }

    fn current_url(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn is_hidden(&self) -> bool {
        self.document.hidden()
    }

    fn text_entry_focused(&self) -> bool {
        let Some(active) = self.document.active_element() else {
            return false;
        };
        let tag = active.tag_name();
        if tag.eq_ignore_ascii_case("input") || tag.eq_ignore_ascii_case("textarea") {
            return true;
        }
        active
            .dyn_ref::<HtmlElement>()
            .is_some_and(HtmlElement::is_content_editable)
    }
}
