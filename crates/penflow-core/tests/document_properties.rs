//! Behavioral properties of the engine, exercised through the public API.

use kurbo::{Rect, Vec2};
use penflow_core::{
    Align, EventAction, EventBinding, Frame, LineFilter, LockState, ManualClock, Options, Pen,
    PenId, PenRegistry, Predicate, RecordingSurface, SetValueOptions, Topology, TopologyData,
    Trigger,
};
use serde_json::{Map, Value, json};

type Engine = Topology<RecordingSurface>;

fn engine() -> Engine {
    Topology::new(PenRegistry::new(), Options::default(), RecordingSurface::default())
}

fn ids(names: &[&str]) -> Vec<PenId> {
    names.iter().map(|s| s.to_string()).collect()
}

fn patch(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Persisted pens in paint order, runtime cache excluded.
fn observable(t: &Engine) -> Vec<Value> {
    t.data().pens.iter().map(Pen::to_persisted).collect()
}

fn example_doc() -> TopologyData {
    TopologyData {
        pens: vec![
            Pen::node("n1", 0.0, 0.0, 10.0, 10.0),
            Pen::node("n2", 100.0, 0.0, 10.0, 10.0),
            Pen::line("l1", Some("n1"), Some("n2")),
        ],
        ..TopologyData::default()
    }
}

fn scattered() -> Engine {
    let mut t = engine();
    t.open(TopologyData {
        pens: vec![
            Pen::node("a", 3.25, 7.5, 12.0, 9.0),
            Pen::node("b", 41.0, -3.75, 7.3, 20.1),
            Pen::node("c", -18.6, 55.0, 33.3, 4.4),
            Pen::node("d", 90.0, 90.0, 10.0, 10.0),
            Pen::line("l", Some("a"), Some("c")),
        ],
        ..TopologyData::default()
    });
    t
}

fn assert_rect_close(a: Rect, b: Rect) {
    let eps = 1e-9;
    assert!(
        (a.x0 - b.x0).abs() < eps
            && (a.y0 - b.y0).abs() < eps
            && (a.x1 - b.x1).abs() < eps
            && (a.y1 - b.y1).abs() < eps,
        "{:?} != {:?}",
        a,
        b
    );
}

#[test]
fn uncombine_restores_child_rects() {
    let mut t = scattered();
    let members = ids(&["a", "b", "c"]);
    let before: Vec<Rect> = members.iter().map(|id| t.get_pen(id).unwrap().rect()).collect();

    let container = t.combine(&members).unwrap();
    for id in &members {
        assert_eq!(t.get_parent(id).unwrap().id, container);
    }
    // Moving the container carries the children.
    t.translate_pens(&[container.clone()], Vec2::new(10.0, 0.0), false);
    t.translate_pens(&[container.clone()], Vec2::new(-10.0, 0.0), false);

    assert!(t.uncombine(&container));
    for (id, rect) in members.iter().zip(before) {
        let pen = t.get_pen(id).unwrap();
        assert!(pen.parent_id.is_none());
        assert!(pen.locked.is_none());
        assert_rect_close(pen.rect(), rect);
    }
}

#[test]
fn set_layer_round_trip() {
    let mut t = scattered();
    let original = t.store().ids();
    for (i, id) in original.iter().enumerate() {
        for target in 0..original.len() {
            t.set_layer(id, target);
            t.set_layer(id, i);
            assert_eq!(t.store().ids(), original);
        }
    }
}

fn assert_undoable(name: &str, mutate: impl FnOnce(&mut Engine)) {
    let mut t = scattered();
    let before = observable(&t);
    mutate(&mut t);
    assert_ne!(observable(&t), before, "{} changed nothing", name);
    assert!(t.undo(), "{} recorded no history", name);
    assert_eq!(observable(&t), before, "undo of {}", name);
}

#[test]
fn single_undo_reverts_each_mutation() {
    assert_undoable("add", |t| {
        t.add_pen(Pen::node("new", 1.0, 1.0, 1.0, 1.0), true);
    });
    assert_undoable("delete", |t| {
        t.delete(&ids(&["a", "l"]), true);
    });
    assert_undoable("combine", |t| {
        t.combine(&ids(&["a", "b"]));
    });
    assert_undoable("push_children", |t| {
        t.push_children("d", &ids(&["a", "b"]));
    });
    assert_undoable("set_value", |t| {
        t.set_value(
            &patch(json!({"id": "b", "x": 60, "text": "hot"})),
            SetValueOptions {
                history: true,
                render: true,
            },
        );
    });
    assert_undoable("translate", |t| {
        t.translate_pens(&ids(&["a", "l"]), Vec2::new(4.0, -2.0), true);
    });
    assert_undoable("align", |t| {
        t.align_nodes(Align::Bottom, None, None);
    });
    assert_undoable("space_between", |t| {
        t.space_between(None, Some(300.0));
    });
    assert_undoable("layout", |t| {
        t.layout(None, Some(60.0), None);
    });
    assert_undoable("top", |t| {
        t.top("a");
    });
    assert_undoable("set_layer", |t| {
        t.set_layer("d", 1);
    });
}

#[test]
fn uncombine_undo_restores_group() {
    let mut t = scattered();
    let container = t.combine(&ids(&["a", "b"])).unwrap();
    let grouped = observable(&t);
    assert!(t.uncombine(&container));
    assert!(t.undo());
    assert_eq!(observable(&t), grouped);
}

#[test]
fn pause_resume_shifts_frame_window() {
    let clock = ManualClock::new(10_000);
    let mut t = engine().with_clock(clock.clone());
    t.add_pen(
        Pen::node("lamp", 0.0, 0.0, 10.0, 10.0)
            .with_frames(vec![Frame::new(400).with("x", 10.0), Frame::new(600).with("x", 0.0)]),
        false,
    );
    let lamp = ids(&["lamp"]);
    t.start_animate(Some(&lamp));
    t.tick();
    clock.advance(100);
    t.tick();

    let before = t.get_pen("lamp").unwrap().calculative.animation.clone();
    t.pause_animate(Some(&lamp));
    clock.advance(750);
    t.tick();
    t.pause_animate(Some(&lamp));
    clock.advance(250);
    t.start_animate(Some(&lamp));

    let after = &t.get_pen("lamp").unwrap().calculative.animation;
    assert_eq!(after.frame_start, before.frame_start + 1_000);
    assert_eq!(after.frame_end, before.frame_end + 1_000);
    assert_eq!(after.frame_index, before.frame_index);
    assert!(after.pause.is_none());
}

#[test]
fn stopped_pen_stays_scheduled() {
    let clock = ManualClock::new(0);
    let mut t = engine().with_clock(clock.clone());
    t.add_pen(
        Pen::node("lamp", 0.0, 0.0, 10.0, 10.0).with_frames(vec![Frame::new(100).with("x", 50.0)]),
        false,
    );
    let lamp = ids(&["lamp"]);
    t.start_animate(Some(&lamp));
    t.tick();
    clock.advance(50);
    t.tick();
    assert_eq!(t.get_pen("lamp").unwrap().calculative.number("x"), Some(25.0));

    t.stop_animate(Some(&lamp));
    assert!(t.store().is_animating("lamp"));
    assert_eq!(t.get_pen("lamp").unwrap().calculative.number("x"), Some(0.0));

    clock.advance(1_000);
    t.tick();
    assert_eq!(t.get_pen("lamp").unwrap().calculative.animation.frame_start, 1_050);
}

#[test]
fn simple_chain_neighbours() {
    let mut t = engine();
    t.open(example_doc());
    assert_eq!(t.get_lines("n1", LineFilter::Out), ids(&["l1"]));
    assert_eq!(t.next_node("n1"), ids(&["n2"]));
    assert_eq!(t.previous_node("n2"), ids(&["n1"]));
    assert_eq!(t.downstream_nodes("n1"), ids(&["n2"]));
    assert_eq!(t.upstream_nodes("n2"), ids(&["n1"]));
}

#[test]
fn set_value_touches_one_pen() {
    let mut t = engine();
    t.open(example_doc());
    let n2 = t.get_pen("n2").unwrap().to_persisted();
    t.render(true);

    t.set_value(
        &patch(json!({"id": "n1", "x": 50})),
        SetValueOptions {
            history: false,
            render: false,
        },
    );
    let n1 = t.get_pen("n1").unwrap();
    assert_eq!(n1.calculative.number("x"), Some(50.0));
    assert!(n1.calculative.dirty);
    assert_eq!(n1.calculative.world_rect, Rect::new(50.0, 0.0, 60.0, 10.0));

    let untouched = t.get_pen("n2").unwrap();
    assert!(!untouched.calculative.dirty);
    assert_eq!(untouched.to_persisted(), n2);
}

#[test]
fn malformed_message_is_dropped() {
    let mut t = engine();
    t.open(example_doc());
    let before = observable(&t);
    t.do_socket("{bad json", None);
    t.do_socket("[1, 2]", None);
    assert_eq!(observable(&t), before);
}

fn assert_ids_unique(t: &Engine) {
    let ids = t.store().ids();
    let mut sorted = ids.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len(), "duplicate ids in {:?}", ids);
    assert_eq!(ids.len(), t.store().len());
}

#[test]
fn self_triggering_value_rule_settles() {
    let mut t = engine();
    t.set_locked(LockState::Disable);
    let mut pen = Pen::node("p", 0.0, 0.0, 10.0, 10.0).with_events(vec![
        EventBinding::new(Trigger::ValueUpdate, EventAction::Function)
            .with_value("pen.count = pen.count + 1"),
        EventBinding::new(Trigger::ValueUpdate, EventAction::Function).with_value("pen.x = 5"),
    ]);
    pen.extra.insert("count".into(), json!(0));
    t.add_pen(pen, false);

    t.do_socket(r#"{"id":"p","temp":1}"#, None);
    let p = t.get_pen("p").unwrap();
    assert_eq!(p.extra["count"], json!(1.0));
    assert_eq!(p.x, 5.0);
    assert_ids_unique(&t);
}

#[test]
fn oversized_scripts_are_inert() {
    let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
    let mut t = engine();
    t.set_locked(LockState::Disable);
    t.add_pen(
        Pen::node("p", 0.0, 0.0, 10.0, 10.0).with_events(vec![
            EventBinding::new(Trigger::ValueUpdate, EventAction::Emit)
                .with_value("alarm")
                .with_predicate(Predicate::expression(deep.clone())),
            EventBinding::new(Trigger::ValueUpdate, EventAction::Function)
                .with_value(format!("pen.x = {}", deep)),
        ]),
        false,
    );
    let alarms = std::rc::Rc::new(std::cell::RefCell::new(0));
    let a = alarms.clone();
    t.on("alarm", move |_, _| *a.borrow_mut() += 1);

    t.do_socket(r#"{"id":"p","temp":1}"#, None);
    t.do_socket(r#"{"id":"p","temp":2}"#, None);
    assert_eq!(*alarms.borrow(), 0);
    let p = t.get_pen("p").unwrap();
    assert_eq!(p.x, 0.0);
    assert_eq!(p.extra["temp"], json!(2));
}

#[test]
fn live_frames_replace_running_timeline() {
    let clock = ManualClock::new(0);
    let mut t = engine().with_clock(clock.clone());
    t.add_pen(
        Pen::node("a", 0.0, 0.0, 10.0, 10.0).with_frames(vec![
            Frame::new(100).with("x", 10.0),
            Frame::new(100).with("x", 20.0),
            Frame::new(100).with("x", 30.0),
        ]),
        false,
    );
    let a = ids(&["a"]);
    t.start_animate(Some(&a));
    t.tick();
    clock.advance(250);
    t.tick();
    assert_eq!(t.get_pen("a").unwrap().calculative.animation.frame_index, 2);

    t.do_socket(r#"{"id":"a","frames":[{"duration":100,"x":5}]}"#, None);
    clock.advance(10);
    let outcome = t.tick();
    assert_eq!(outcome.dirty, a);
    let pen = t.get_pen("a").unwrap();
    assert_eq!(pen.frames.len(), 1);
    assert_eq!(pen.calculative.animation.frame_index, 0);
    assert_eq!(pen.calculative.animation.start, Some(260));
    assert!(t.store().is_animating("a"));
}

#[test]
fn undo_after_rename_keeps_ids_unique() {
    let mut t = scattered();
    t.translate_pens(&ids(&["a"]), Vec2::new(5.0, 0.0), true);
    t.top("a");
    assert!(t.change_pen_id("a", "renamed"));

    while t.undo() {
        assert_ids_unique(&t);
        assert!(t.get_pen("a").is_none());
    }
    let pen = t.get_pen("renamed").unwrap();
    assert_eq!(pen.x, 3.25);
    assert_eq!(t.get_lines("renamed", LineFilter::Out), ids(&["l"]));
    assert_eq!(t.store().ids()[0], "renamed");
}

#[test]
fn document_survives_storage_round_trip() {
    use penflow_core::{MemoryStorage, Storage};

    let mut t = engine();
    t.open(example_doc());
    let storage = MemoryStorage::new();
    block_on(storage.save("plant", &t.data())).unwrap();
    let loaded = block_on(storage.load("plant")).unwrap();

    let mut reopened = engine();
    reopened.open(loaded);
    assert_eq!(observable(&reopened), observable(&t));
    assert_eq!(reopened.next_node("n1"), ids(&["n2"]));
}

/// The in-memory backend completes on first poll.
fn block_on<F: std::future::Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, Waker};

    let mut cx = Context::from_waker(Waker::noop());
    let mut f = std::pin::pin!(f);
    match f.as_mut().poll(&mut cx) {
        Poll::Ready(result) => result,
        Poll::Pending => panic!("in-memory storage future was pending"),
    }
}
