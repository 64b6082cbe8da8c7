//! End-to-end flow of a watch-page script against the mock host
//!
//! The page renders its player late, navigates client-side, fires duplicate
//! navigation events and has a search box the user types into.

use futures::FutureExt;
use pagewatch::prelude::*;
use pagewatch::{ElementFuture, MockDom, MockKeyEvent, MockTarget, NodeId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

const CONFIG: &str = r#"{
    "log": { "level": "debug", "prefix": "[watch-tweaks]" },
    "wait": { "timeout_ms": 5000 },
    "shortcuts": {
        "speed_up": "Shift >",
        "slow_down": "Shift <",
        "toggle_chat": ""
    }
}"#;

fn is_watch_page(url: &str) -> bool {
    url.contains("/watch?")
}

fn navigate(dom: &MockDom, url: &str) {
    dom.navigate(url);
    dom.dispatch(MockTarget::Document, "yt-navigate-finish");
}

fn render_player(dom: &MockDom) -> NodeId {
    let player = dom.create_element_with_id("div", "movie_player");
    let video = dom.create_element("video");
    dom.append_child(player, video);
    dom.append_child(dom.body_node(), player);
    dom.flush_mutations();
    player
}

fn build_context(dom: &Rc<MockDom>) -> ScriptContext<MockDom> {
    let config = ScriptConfig::from_json(CONFIG).unwrap();
    let by_id = Rc::downgrade(dom);
    let by_tag = Rc::downgrade(dom);
    let cache = ElementCache::new(Rc::clone(dom))
        .with_locator("player", move || by_id.upgrade()?.get_element_by_id("movie_player").map(Located::Node))
        .with_locator("videos", move || Some(Located::List(by_tag.upgrade()?.get_elements_by_tag_name("video"))))
        .with_essentials(["player", "videos"]);
    ScriptContext::new(Rc::clone(dom), config, cache)
}

#[test]
fn test_watch_page_flow() {
    let dom = Rc::new(MockDom::at("https://www.example.tv/"));
    let mut ctx = build_context(&dom);

    let entered: Rc<RefCell<Vec<String>>> = Rc::default();
    let players: Rc<RefCell<Vec<ElementFuture<NodeId>>>> = Rc::default();
    {
        let entered = Rc::clone(&entered);
        let players = Rc::clone(&players);
        ctx.watch_navigation(is_watch_page, move |cache: &ElementCache<MockDom>, url: &str| {
            entered.borrow_mut().push(url.to_string());
            players.borrow_mut().push(cache.wait_for("player"));
        })
        .unwrap();
    }
    assert!(entered.borrow().is_empty(), "home page is not a target");

    let speed = Rc::new(Cell::new(0i32));
    {
        let elements = ctx.elements();
        let up = Rc::clone(&speed);
        let down = Rc::clone(&speed);
        let speed_up: Box<dyn Fn()> = Box::new(move || {
            if elements.get("videos").is_some() {
                up.set(up.get() + 1);
            }
        });
        let slow_down: Box<dyn Fn()> = Box::new(move || down.set(down.get() - 1));
        let toggle_chat: Box<dyn Fn()> = Box::new(|| panic!("disabled shortcut fired"));
        let actions = vec![("speed_up", speed_up), ("slow_down", slow_down), ("toggle_chat", toggle_chat)];
        assert_eq!(ctx.bind_shortcuts(actions).unwrap(), 3);
    }

    // first watch page: player renders after the navigation event
    navigate(&dom, "https://www.example.tv/watch?v=1");
    assert_eq!(entered.borrow().len(), 1);
    let mut first = players.borrow()[0].clone();
    assert!((&mut first).now_or_never().is_none());
    assert_eq!(dom.live_observers(), 1);

    let player = render_player(&dom);
    assert_eq!(first.now_or_never(), Some(Some(Located::Node(player))));
    assert_eq!(dom.live_observers(), 0);

    // essentials: player cached, videos acquired on the spot
    let elements = ctx.elements();
    assert!(Box::pin(elements.initialize()).now_or_never().is_some());
    assert_eq!(elements.get("videos").map(|found| found.len()), Some(1));

    // playlist parameters do not count as a new page
    navigate(&dom, "https://www.example.tv/watch?v=1&list=PL1");
    assert_eq!(entered.borrow().len(), 1);

    dom.press_key(&MockKeyEvent::new(">").with_shift());
    dom.press_key(&MockKeyEvent::new(">").with_shift().with_ctrl());
    assert_eq!(speed.get(), 1);

    // typing in the search box never triggers shortcuts
    let search = dom.create_element("input");
    dom.append_child(dom.body_node(), search);
    dom.focus(search);
    dom.press_key(&MockKeyEvent::new("<").with_shift());
    assert_eq!(speed.get(), 1);
    dom.blur();
    dom.press_key(&MockKeyEvent::new("<").with_shift());
    assert_eq!(speed.get(), 0);

    // next video: cache starts over
    navigate(&dom, "https://www.example.tv/watch?v=2");
    assert_eq!(
        *entered.borrow(),
        vec![
            "https://www.example.tv/watch?v=1".to_string(),
            "https://www.example.tv/watch?v=2".to_string(),
        ]
    );
    assert!(elements.get("videos").is_none());
    let second = players.borrow()[1].clone();
    assert_eq!(second.now_or_never(), Some(Some(Located::Node(player))));

    ctx.shutdown();
    assert_eq!(dom.live_listeners(), 0);
    navigate(&dom, "https://www.example.tv/watch?v=3");
    assert_eq!(entered.borrow().len(), 2);
}

#[test]
fn test_concurrent_features_share_one_wait() {
    let dom = Rc::new(MockDom::at("https://www.example.tv/watch?v=1"));
    let ctx = build_context(&dom);
    let elements = ctx.elements();

    let a = elements.wait_for("player");
    let b = elements.wait_for("player");
    let c = elements.wait_for("player");
    assert!(a.ptr_eq(&b) && b.ptr_eq(&c));
    assert_eq!(dom.observers_created(), 1);

    let player = render_player(&dom);
    for wait in [a, b, c] {
        assert_eq!(wait.now_or_never(), Some(Some(Located::Node(player))));
    }
    assert_eq!(dom.observers_created(), 1);
}

#[test]
fn test_missing_player_times_out_from_config() {
    let dom = Rc::new(MockDom::at("https://www.example.tv/watch?v=1"));
    let ctx = build_context(&dom);
    let elements = ctx.elements();

    let mut wait = elements.wait_for("player");
    dom.advance(Duration::from_millis(4999));
    assert!((&mut wait).now_or_never().is_none());
    dom.advance(Duration::from_millis(1));
    assert_eq!(wait.now_or_never(), Some(None));
    assert_eq!(dom.live_observers(), 0);
    assert_eq!(dom.pending_timers(), 0);

    // a later request tries again
    let _retry = elements.wait_for("player");
    assert_eq!(dom.observers_created(), 2);
}

#[test]
fn test_unknown_name_resolves_none() {
    let dom = Rc::new(MockDom::new());
    let ctx = build_context(&dom);
    assert_eq!(ctx.elements().wait_for("sidebar").now_or_never(), Some(None));
    assert_eq!(dom.observers_created(), 0);
}

#[test]
fn test_hidden_tab_defers_until_visible() {
    let dom = Rc::new(MockDom::new());
    let config = ScriptConfig::from_json(r#"{ "navigation": { "await_unhide": true } }"#).unwrap();
    let cache = ElementCache::new(Rc::clone(&dom));
    let mut ctx = ScriptContext::new(Rc::clone(&dom), config, cache);

    let entered = Rc::new(Cell::new(0));
    let count = Rc::clone(&entered);
    ctx.watch_navigation(is_watch_page, move |_: &ElementCache<MockDom>, _: &str| count.set(count.get() + 1))
        .unwrap();

    dom.set_hidden(true);
    navigate(&dom, "https://www.example.tv/watch?v=1");
    navigate(&dom, "https://www.example.tv/watch?v=1");
    assert_eq!(entered.get(), 0);

    dom.set_hidden(false);
    assert_eq!(entered.get(), 1);
    dom.set_hidden(true);
    dom.set_hidden(false);
    assert_eq!(entered.get(), 1);
}
