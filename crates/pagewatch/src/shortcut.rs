//! Keyboard shortcuts
//!
//! Shortcuts are written the way users type them: modifiers first, key last,
//! separated by whitespace (`"Shift >"`, `"ctrl alt k"`). An empty string
//! disables a shortcut without removing it from configuration.

use crate::dom::{Dom, KeyEvent, ListenerOptions};
use crate::result::{DomResult, ShortcutError};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Modifier keys held during a keystroke
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    /// Alt / Option
    pub alt: bool,
    /// Control
    pub ctrl: bool,
    /// Shift
    pub shift: bool,
    /// Meta / Command / Windows
    pub meta: bool,
}

impl Modifiers {
    /// No modifiers
    pub const NONE: Self = Self {
        alt: false,
        ctrl: false,
        shift: false,
        meta: false,
    };

    /// The modifier state of a keyboard event
    #[must_use]
    pub fn of<E: KeyEvent + ?Sized>(event: &E) -> Self {
        Self {
            alt: event.alt_key(),
            ctrl: event.ctrl_key(),
            shift: event.shift_key(),
            meta: event.meta_key(),
        }
    }

    /// Set the flag named by `token`; false if the token names no modifier
    fn set(&mut self, token: &str) -> bool {
        match token.to_ascii_lowercase().as_str() {
            "alt" | "option" => self.alt = true,
            "ctrl" | "control" => self.ctrl = true,
            "shift" => self.shift = true,
            "meta" | "cmd" | "command" | "super" | "win" => self.meta = true,
            _ => return false,
        }
        true
    }
}

/// A parsed key combination
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    key: Option<String>,
    modifiers: Modifiers,
}

impl KeyCombo {
    /// A combination that never matches
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// `key` with `modifiers`; the key is compared case-insensitively
    #[must_use]
    pub fn new(key: &str, modifiers: Modifiers) -> Self {
        Self {
            key: Some(normalize_key(key)),
            modifiers,
        }
    }

    /// Parse `"[modifier ...] key"`. Blank input yields a disabled combo.
    pub fn parse(combo: &str) -> Result<Self, ShortcutError> {
        let mut tokens: Vec<&str> = combo.split_whitespace().collect();
        let Some(key) = tokens.pop() else {
            return Ok(Self::disabled());
        };

        let mut modifiers = Modifiers::NONE;
        for token in tokens {
            if !modifiers.set(token) {
                return Err(ShortcutError::UnknownModifier {
                    token: token.to_string(),
                    combo: combo.to_string(),
                });
            }
        }

        Ok(Self::new(key, modifiers))
    }

    /// Lowercased key, `None` when disabled
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Required modifiers
    #[must_use]
    pub const fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// True for a combination parsed from a blank string
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.key.is_none()
    }

    /// Key equal ignoring case and all four modifier flags equal
    #[must_use]
    pub fn matches<E: KeyEvent + ?Sized>(&self, event: &E) -> bool {
        let Some(key) = self.key.as_deref() else {
            return false;
        };
        Modifiers::of(event) == self.modifiers && event.key().to_lowercase() == key
    }
}

fn normalize_key(key: &str) -> String {
    let key = key.to_lowercase();
    match key.as_str() {
        "space" => " ".to_string(),
        "esc" => "escape".to_string(),
        _ => key,
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(key) = self.key.as_deref() else {
            return Ok(());
        };
        let flags = [
            (self.modifiers.alt, "alt"),
            (self.modifiers.ctrl, "ctrl"),
            (self.modifiers.shift, "shift"),
            (self.modifiers.meta, "meta"),
        ];
        for (_, name) in flags.iter().filter(|(held, _)| *held) {
            write!(f, "{name} ")?;
        }
        if key == " " {
            f.write_str("space")
        } else {
            f.write_str(key)
        }
    }
}

impl std::str::FromStr for KeyCombo {
    type Err = ShortcutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Listener options for [`ShortcutDispatcher::connect`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutOptions {
    /// Listen in the capture phase, ahead of page handlers
    pub capture: bool,
}

type Trigger = Rc<dyn Fn()>;

struct Shortcut {
    combo: KeyCombo,
    trigger: Trigger,
}

struct Router<D: Dom> {
    dom: Rc<D>,
    shortcuts: RefCell<Vec<Shortcut>>,
    on_any_shortcut: RefCell<Option<Trigger>>,
}

impl<D: Dom> Router<D> {
    fn on_key(&self, event: &D::KeyEvent) {
        if self.dom.text_entry_focused() {
            return;
        }

        let matched: Vec<Trigger> = self
            .shortcuts
            .borrow()
            .iter()
            .filter(|shortcut| shortcut.combo.matches(event))
            .map(|shortcut| Rc::clone(&shortcut.trigger))
            .collect();
        if matched.is_empty() {
            return;
        }

        tracing::debug!(key = %event.key(), triggers = matched.len(), "shortcut matched");
        for trigger in &matched {
            trigger();
        }
        event.prevent_default();
        event.stop_propagation();

        let on_any = self.on_any_shortcut.borrow().clone();
        if let Some(on_any) = on_any {
            on_any();
        }
    }
}

/// Routes `keydown` events to registered triggers
pub struct ShortcutDispatcher<D: Dom> {
    router: Rc<Router<D>>,
    listener: Option<D::Listener>,
}

impl<D: Dom> fmt::Debug for ShortcutDispatcher<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let combos: Vec<String> = self
            .router
            .shortcuts
            .borrow()
            .iter()
            .map(|shortcut| shortcut.combo.to_string())
            .collect();
        f.debug_struct("ShortcutDispatcher")
            .field("shortcuts", &combos)
            .field("connected", &self.listener.is_some())
            .finish()
    }
}

impl<D: Dom> ShortcutDispatcher<D> {
    /// Dispatcher with no shortcuts
    #[must_use]
    pub fn new(dom: Rc<D>) -> Self {
        Self {
            router: Rc::new(Router {
                dom,
                shortcuts: RefCell::new(Vec::new()),
                on_any_shortcut: RefCell::new(None),
            }),
            listener: None,
        }
    }

    /// Run `callback` after the triggers of any matching keystroke
    #[must_use]
    pub fn with_on_any_shortcut(self, callback: impl Fn() + 'static) -> Self {
        *self.router.on_any_shortcut.borrow_mut() = Some(Rc::new(callback));
        self
    }

    /// Parse `combo` and bind `trigger` to it. Applies to an already
    /// connected dispatcher as well.
    pub fn register(&mut self, combo: &str, trigger: impl Fn() + 'static) -> Result<(), ShortcutError> {
        let combo = KeyCombo::parse(combo)?;
        self.register_combo(combo, trigger);
        Ok(())
    }

    /// Bind an already parsed combination
    pub fn register_combo(&mut self, combo: KeyCombo, trigger: impl Fn() + 'static) {
        if combo.is_disabled() {
            tracing::debug!("shortcut disabled");
        }
        self.router.shortcuts.borrow_mut().push(Shortcut {
            combo,
            trigger: Rc::new(trigger),
        });
    }

    /// Registered shortcuts, disabled ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.router.shortcuts.borrow().len()
    }

    /// True when nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the `keydown` listener is attached
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.listener.is_some()
    }

    /// Attach one `keydown` listener to `target` (default: the document),
    /// replacing any listener from a previous call.
    pub fn connect(&mut self, target: Option<D::Target>, options: ShortcutOptions) -> DomResult<()> {
        self.disconnect();
        let dom = Rc::clone(&self.router.dom);
        let target = target.unwrap_or_else(|| dom.document());
        let router = Rc::clone(&self.router);
        let listener = dom.add_key_listener(
            &target,
            ListenerOptions {
                capture: options.capture,
            },
            Box::new(move |event: &D::KeyEvent| router.on_key(event)),
        )?;
        self.listener = Some(listener);
        tracing::debug!(shortcuts = self.len(), "shortcut dispatcher connected");
        Ok(())
    }

    /// Remove the listener added by `connect`. No-op when idle.
    pub fn disconnect(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.router.dom.remove_listener(listener);
            tracing::debug!("shortcut dispatcher disconnected");
        }
    }
}

impl<D: Dom> Drop for ShortcutDispatcher<D> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MockDom, MockKeyEvent, MockTarget};
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<usize>>, impl Fn() + 'static) {
        let count = Rc::new(Cell::new(0));
        let handle = Rc::clone(&count);
        (count, move || handle.set(handle.get() + 1))
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_key_only() {
            let combo = KeyCombo::parse("k").unwrap();
            assert_eq!(combo.key(), Some("k"));
            assert_eq!(combo.modifiers(), Modifiers::NONE);
        }

        #[test]
        fn test_parse_modifiers_any_order() {
            let a = KeyCombo::parse("Ctrl Shift ArrowUp").unwrap();
            let b = KeyCombo::parse("shift  CTRL arrowup").unwrap();
            assert_eq!(a, b);
            assert_eq!(a.key(), Some("arrowup"));
            assert!(a.modifiers().ctrl && a.modifiers().shift);
            assert!(!a.modifiers().alt && !a.modifiers().meta);
        }

        #[test]
        fn test_parse_duplicate_modifier_tolerated() {
            let combo = KeyCombo::parse("shift shift >").unwrap();
            assert_eq!(combo, KeyCombo::new(">", Modifiers { shift: true, ..Modifiers::NONE }));
        }

        #[test]
        fn test_parse_blank_is_disabled() {
            assert!(KeyCombo::parse("").unwrap().is_disabled());
            assert!(KeyCombo::parse("   \t").unwrap().is_disabled());
            assert_eq!(KeyCombo::parse("").unwrap().to_string(), "");
        }

        #[test]
        fn test_parse_aliases() {
            let combo = KeyCombo::parse("control option cmd space").unwrap();
            assert_eq!(combo.key(), Some(" "));
            assert_eq!(
                combo.modifiers(),
                Modifiers {
                    alt: true,
                    ctrl: true,
                    shift: false,
                    meta: true,
                }
            );
            assert_eq!(KeyCombo::parse("Esc").unwrap().key(), Some("escape"));
        }

        #[test]
        fn test_parse_unknown_modifier() {
            let err = KeyCombo::parse("hyper k").unwrap_err();
            assert_eq!(
                err,
                ShortcutError::UnknownModifier {
                    token: "hyper".to_string(),
                    combo: "hyper k".to_string(),
                }
            );
        }

        #[test]
        fn test_display_canonical() {
            let combo: KeyCombo = "Meta Shift Alt Space".parse().unwrap();
            assert_eq!(combo.to_string(), "alt shift meta space");
        }
    }

    mod match_tests {
        use super::*;

        #[test]
        fn test_shift_arrow_up_exact() {
            let combo = KeyCombo::parse("Shift ArrowUp").unwrap();
            assert!(combo.matches(&MockKeyEvent::new("ArrowUp").with_shift()));
            assert!(!combo.matches(&MockKeyEvent::new("ArrowUp").with_shift().with_ctrl()));
            assert!(!combo.matches(&MockKeyEvent::new("ArrowUp")));
        }

        #[test]
        fn test_key_case_insensitive() {
            let combo = KeyCombo::parse("k").unwrap();
            assert!(combo.matches(&MockKeyEvent::new("K")));
            assert!(combo.matches(&MockKeyEvent::new("k")));
            assert!(!combo.matches(&MockKeyEvent::new("j")));
        }

        #[test]
        fn test_symbol_with_shift() {
            let combo = KeyCombo::parse("Shift >").unwrap();
            assert!(combo.matches(&MockKeyEvent::new(">").with_shift()));
            assert!(!combo.matches(&MockKeyEvent::new(">")));
        }

        #[test]
        fn test_disabled_never_matches() {
            let combo = KeyCombo::disabled();
            assert!(!combo.matches(&MockKeyEvent::new("")));
            assert!(!combo.matches(&MockKeyEvent::new("a")));
        }
    }

    mod dispatcher_tests {
        use super::*;

        fn setup() -> (Rc<MockDom>, ShortcutDispatcher<MockDom>) {
            let dom = Rc::new(MockDom::new());
            let dispatcher = ShortcutDispatcher::new(Rc::clone(&dom));
            (dom, dispatcher)
        }

        #[test]
        fn test_matching_key_runs_trigger() {
            let (dom, mut dispatcher) = setup();
            let (count, trigger) = counter();
            dispatcher.register("Shift ArrowUp", trigger).unwrap();
            dispatcher.connect(None, ShortcutOptions::default()).unwrap();

            let event = MockKeyEvent::new("ArrowUp").with_shift();
            dom.press_key(&event);
            assert_eq!(count.get(), 1);
            assert!(event.default_prevented());
            assert!(event.propagation_stopped());

            let extra = MockKeyEvent::new("ArrowUp").with_shift().with_ctrl();
            dom.press_key(&extra);
            assert_eq!(count.get(), 1);
            assert!(!extra.default_prevented());
        }

        #[test]
        fn test_overlapping_shortcuts_all_fire() {
            let (dom, dispatcher) = setup();
            let (first, a) = counter();
            let (second, b) = counter();
            let (any, on_any) = counter();
            let mut dispatcher = dispatcher.with_on_any_shortcut(on_any);
            dispatcher.register("k", a).unwrap();
            dispatcher.register("K", b).unwrap();
            dispatcher.connect(None, ShortcutOptions::default()).unwrap();

            dom.press_key(&MockKeyEvent::new("k"));
            assert_eq!((first.get(), second.get(), any.get()), (1, 1, 1));

            dom.press_key(&MockKeyEvent::new("x"));
            assert_eq!(any.get(), 1);
            dispatcher.disconnect();
        }

        #[test]
        fn test_text_entry_suppresses() {
            for (tag, editable) in [("input", None), ("textarea", None), ("div", Some("true"))] {
                let (dom, mut dispatcher) = setup();
                let (count, trigger) = counter();
                dispatcher.register("k", trigger).unwrap();
                dispatcher.connect(None, ShortcutOptions::default()).unwrap();

                let field = dom.create_element(tag);
                if let Some(value) = editable {
                    dom.set_attribute(field, "contenteditable", value);
                }
                dom.append_child(dom.body_node(), field);
                dom.focus(field);

                let event = MockKeyEvent::new("k");
                dom.press_key(&event);
                assert_eq!(count.get(), 0, "{tag} should suppress shortcuts");
                assert!(!event.default_prevented());

                dom.blur();
                dom.press_key(&MockKeyEvent::new("k"));
                assert_eq!(count.get(), 1);
            }
        }

        #[test]
        fn test_focused_button_does_not_suppress() {
            let (dom, mut dispatcher) = setup();
            let (count, trigger) = counter();
            dispatcher.register("k", trigger).unwrap();
            dispatcher.connect(None, ShortcutOptions::default()).unwrap();

            let button = dom.create_element("button");
            dom.append_child(dom.body_node(), button);
            dom.focus(button);
            dom.press_key(&MockKeyEvent::new("k"));
            assert_eq!(count.get(), 1);
        }

        #[test]
        fn test_disabled_shortcut_registered_but_inert() {
            let (dom, mut dispatcher) = setup();
            let (count, trigger) = counter();
            dispatcher.register("", trigger).unwrap();
            assert_eq!(dispatcher.len(), 1);
            dispatcher.connect(None, ShortcutOptions::default()).unwrap();

            let event = MockKeyEvent::new("");
            dom.press_key(&event);
            assert_eq!(count.get(), 0);
            assert!(!event.default_prevented());
        }

        #[test]
        fn test_register_unknown_modifier_rejected() {
            let (_dom, mut dispatcher) = setup();
            assert!(dispatcher.register("Hyper k", || {}).is_err());
            assert!(dispatcher.is_empty());
        }

        #[test]
        fn test_register_after_connect() {
            let (dom, mut dispatcher) = setup();
            dispatcher.connect(None, ShortcutOptions::default()).unwrap();
            let (count, trigger) = counter();
            dispatcher.register("j", trigger).unwrap();

            dom.press_key(&MockKeyEvent::new("j"));
            assert_eq!(count.get(), 1);
        }

        #[test]
        fn test_capture_listener_runs_first() {
            let (dom, mut dispatcher) = setup();
            let (count, trigger) = counter();
            dispatcher.register("k", trigger).unwrap();

            let (late, late_trigger) = counter();
            let _page = dom
                .add_key_listener(&MockTarget::Document, ListenerOptions::default(), Box::new(move |_: &MockKeyEvent| late_trigger()))
                .unwrap();
            dispatcher
                .connect(None, ShortcutOptions { capture: true })
                .unwrap();

            dom.press_key(&MockKeyEvent::new("k"));
            assert_eq!(count.get(), 1);
            // propagation stopped before the page's own handler
            assert_eq!(late.get(), 0);
        }

        #[test]
        fn test_custom_target() {
            let (dom, mut dispatcher) = setup();
            let (count, trigger) = counter();
            dispatcher.register("k", trigger).unwrap();
            let player = dom.create_element("div");
            dispatcher
                .connect(Some(MockTarget::Node(player)), ShortcutOptions::default())
                .unwrap();

            dom.press_key(&MockKeyEvent::new("k"));
            assert_eq!(count.get(), 0);
            dom.dispatch_key(MockTarget::Node(player), &MockKeyEvent::new("k"));
            assert_eq!(count.get(), 1);
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_connect_disconnect_cycles_do_not_leak() {
            let dom = Rc::new(MockDom::new());
            let mut dispatcher = ShortcutDispatcher::new(Rc::clone(&dom));
            for capture in [false, true, false, true] {
                dispatcher.connect(None, ShortcutOptions { capture }).unwrap();
                assert_eq!(dom.live_listeners(), 1);
                dispatcher.disconnect();
                assert_eq!(dom.live_listeners(), 0);
            }
        }

        #[test]
        fn test_reconnect_replaces_listener() {
            let dom = Rc::new(MockDom::new());
            let mut dispatcher = ShortcutDispatcher::new(Rc::clone(&dom));
            let (count, trigger) = counter();
            dispatcher.register("k", trigger).unwrap();
            dispatcher.connect(None, ShortcutOptions::default()).unwrap();
            dispatcher.connect(None, ShortcutOptions::default()).unwrap();

            assert_eq!(dom.listeners_for(MockTarget::Document, "keydown"), 1);
            dom.press_key(&MockKeyEvent::new("k"));
            assert_eq!(count.get(), 1);
        }

        #[test]
        fn test_disconnect_idle_and_drop() {
            let dom = Rc::new(MockDom::new());
            {
                let mut dispatcher = ShortcutDispatcher::new(Rc::clone(&dom));
                dispatcher.disconnect();
                dispatcher.connect(None, ShortcutOptions::default()).unwrap();
                assert!(dispatcher.is_connected());
            }
            assert_eq!(dom.live_listeners(), 0);
        }

        #[test]
        fn test_debug_lists_combos() {
            let dom = Rc::new(MockDom::new());
            let mut dispatcher = ShortcutDispatcher::new(dom);
            dispatcher.register("Shift >", || {}).unwrap();
            let debug = format!("{dispatcher:?}");
            assert!(debug.contains("shift >"));
            assert!(debug.contains("connected: false"));
        }
    }
}
