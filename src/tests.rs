//! Scenario tests driving the full engine through its command surface, the
//! way a host would: begin gestures, feed pointer positions, tick the
//! scheduler, observe the store.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::engine::Engine;
use crate::geometry::{Point, Rect, ResizeEdge, Size};
use crate::grid::{Event, ItemId, ItemRef, NestId};
use crate::persist::{MemoryStorage, Storage, StorageError};
use crate::Options;

struct Harness {
    engine: Engine,
    now: Duration,
}

impl Harness {
    fn new() -> Self {
        Self::with_options(Options::default())
    }

    fn with_options(options: Options) -> Self {
        Self::with_storage(options, Box::new(MemoryStorage::new()))
    }

    fn with_storage(options: Options, storage: Box<dyn Storage>) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let engine = Engine::with_parts(options.into(), storage, crate::clock::Clock::new());
        Self {
            engine,
            now: Duration::ZERO,
        }
    }

    /// Advances time and runs one scheduler tick.
    fn advance(&mut self, ms: u64) {
        self.now += Duration::from_millis(ms);
        self.engine.tick(self.now);
    }

    /// Advances past the history debounce so the last mutation settles into
    /// an undo entry.
    fn settle(&mut self) {
        self.advance(150);
    }

    /// Places a widget at an exact rectangle.
    fn widget_at(&mut self, title: &str, rect: Rect) -> ItemId {
        let id = self
            .engine
            .add_widget(title, "chart", rect.size, Point::new(10_000., 10_000.))
            .unwrap();
        self.engine
            .update_widget(id, |widget| widget.rect = rect)
            .unwrap();
        self.settle();
        id
    }

    /// Places a nest at an exact rectangle.
    fn nest_at(&mut self, title: &str, rect: Rect) -> NestId {
        let id = self
            .engine
            .add_nest(title, Point::new(-10_000., -10_000.))
            .unwrap();
        self.engine
            .update_nest(id, |nest| nest.rect = rect)
            .unwrap();
        self.settle();
        id
    }

    /// Full drag gesture with intermediate pointer frames.
    fn drag(&mut self, target: ItemRef, from: Point, to: Point) {
        assert!(self.engine.begin_drag(target, from));
        let mid = Point::new((from.x + to.x) / 2., (from.y + to.y) / 2.);
        self.advance(16);
        self.engine.pointer_moved(mid);
        self.advance(16);
        self.engine.pointer_moved(to);
        self.advance(16);
        self.engine.pointer_released(to);
        self.settle();
    }

    fn events(&mut self) -> Rc<RefCell<Vec<Event>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        self.engine
            .subscribe(move |event| sink.borrow_mut().push(event.clone()));
        seen
    }

    fn widget_rect(&self, id: ItemId) -> Rect {
        self.engine.state().widget(id).unwrap().rect
    }
}

/// Storage double whose writes always fail, for the auto-save scenarios.
struct BrokenStorage;

impl Storage for BrokenStorage {
    fn read(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(None)
    }
    fn write(&mut self, _key: &str, _value: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Backend(anyhow::anyhow!("write refused")))
    }
    fn remove(&mut self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
    fn list(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }
}

// =============================================================================
// Drag
// =============================================================================

#[test]
fn committed_drag_lands_on_grid_multiples() {
    let mut harness = Harness::new();
    let id = harness.widget_at("a", Rect::new(100., 100., 100., 100.));

    harness.drag(
        ItemRef::Widget(id),
        Point::new(150., 150.),
        Point::new(287., 243.),
    );

    let rect = harness.widget_rect(id);
    assert_eq!(rect.loc.x % 20., 0.);
    assert_eq!(rect.loc.y % 20., 0.);
    // The drag moved by (137, 93); the commit snapped to the nearest step.
    assert_eq!(rect.loc, Point::new(240., 200.));
    harness.engine.state().verify_invariants();
}

#[test]
fn drag_pushes_overlapped_siblings() {
    let mut harness = Harness::new();
    let mover = harness.widget_at("mover", Rect::new(0., 0., 100., 100.));
    let other = harness.widget_at("other", Rect::new(300., 0., 100., 100.));

    harness.drag(
        ItemRef::Widget(mover),
        Point::new(50., 50.),
        Point::new(350., 70.),
    );

    let mover_rect = harness.widget_rect(mover);
    let other_rect = harness.widget_rect(other);
    assert!(!crate::geometry::collides(mover_rect, other_rect));
    // The sibling was displaced, not the mover.
    assert_eq!(mover_rect.loc, Point::new(300., 20.));
    assert!(other_rect.loc != Point::new(300., 0.));
    harness.engine.state().verify_invariants();
}

#[test]
fn drag_into_nest_transfers_with_relative_coordinates() {
    let mut harness = Harness::new();
    let nest = harness.nest_at("nest", Rect::new(300., 300., 400., 300.));
    let id = harness.widget_at("w", Rect::new(0., 0., 100., 80.));

    // Pointer starts at (50, 40) inside the widget; ends with the widget at
    // (400, 440), whose center (450, 480) is inside the nest.
    harness.drag(
        ItemRef::Widget(id),
        Point::new(50., 40.),
        Point::new(450., 480.),
    );

    let widget = harness.engine.state().widget(id).unwrap();
    assert_eq!(widget.nest, Some(nest));
    // Coordinates are relative to the container origin plus the header
    // offset: (300, 300) + (0, 40).
    assert_eq!(widget.rect.loc, Point::new(100., 100.));
    harness.engine.state().verify_invariants();
}

#[test]
fn drag_out_of_nest_returns_to_world_coordinates() {
    let mut harness = Harness::new();
    let nest = harness.nest_at("nest", Rect::new(300., 300., 400., 300.));
    let id = harness.widget_at("w", Rect::new(0., 0., 100., 80.));
    harness.drag(
        ItemRef::Widget(id),
        Point::new(50., 40.),
        Point::new(450., 480.),
    );
    assert_eq!(
        harness.engine.state().widget(id).unwrap().nest,
        Some(nest)
    );

    // Now drag it far outside the nest.
    harness.drag(
        ItemRef::Widget(id),
        Point::new(450., 480.),
        Point::new(50., 40.),
    );

    let widget = harness.engine.state().widget(id).unwrap();
    assert_eq!(widget.nest, None);
    assert_eq!(widget.rect.loc, Point::new(0., 0.));
    harness.engine.state().verify_invariants();
}

#[test]
fn hovering_a_foreign_nest_suppresses_push() {
    let mut harness = Harness::new();
    let nest = harness.nest_at("nest", Rect::new(300., 300., 400., 300.));
    let id = harness.widget_at("w", Rect::new(0., 0., 100., 80.));
    // A widget inside the nest that would collide if push physics ran while
    // previewing: content-local (100, 60) is world (400, 400).
    let nested = harness.widget_at("nested", Rect::new(500., 0., 100., 80.));
    harness
        .engine
        .update_widget(nested, |widget| {
            widget.nest = Some(nest);
            widget.rect = Rect::new(100., 60., 100., 80.);
        })
        .unwrap();
    harness.settle();

    assert!(harness
        .engine
        .begin_drag(ItemRef::Widget(id), Point::new(50., 40.)));
    harness.advance(16);
    // The dragged widget lands at (400, 400) world, right on top of the
    // nested widget's world footprint.
    harness.engine.pointer_moved(Point::new(450., 440.));
    assert!(harness.engine.interaction().drag_state().unwrap().hover_nest == Some(nest));

    // The nested sibling hasn't moved while the preview is active.
    assert_eq!(harness.widget_rect(nested).loc, Point::new(100., 60.));

    harness.advance(16);
    harness.engine.pointer_released(Point::new(450., 440.));

    // The transfer commits and the overlap resolves on drop.
    let widget = harness.engine.state().widget(id).unwrap();
    assert_eq!(widget.nest, Some(nest));
    assert!(!crate::geometry::collides(
        widget.rect,
        harness.widget_rect(nested)
    ));
    harness.engine.state().verify_invariants();
}

#[test]
fn gestures_are_mutually_exclusive() {
    let mut harness = Harness::new();
    let id = harness.widget_at("a", Rect::new(0., 0., 100., 100.));

    assert!(harness.engine.begin_pan(Point::new(0., 0.)));
    assert!(!harness
        .engine
        .begin_drag(ItemRef::Widget(id), Point::new(50., 50.)));
    assert!(!harness.engine.begin_resize(
        ItemRef::Widget(id),
        ResizeEdge::BOTTOM_RIGHT,
        Point::new(100., 100.)
    ));

    harness.engine.pointer_released(Point::new(0., 0.));
    assert!(harness.engine.interaction().is_idle());
}

#[test]
fn removing_the_target_mid_gesture_aborts_silently() {
    let mut harness = Harness::new();
    let id = harness.widget_at("a", Rect::new(0., 0., 100., 100.));

    assert!(harness
        .engine
        .begin_drag(ItemRef::Widget(id), Point::new(50., 50.)));
    harness.engine.remove_widget(id).unwrap();

    harness.advance(16);
    harness.engine.pointer_moved(Point::new(200., 200.));
    harness.engine.pointer_released(Point::new(200., 200.));

    assert!(harness.engine.interaction().is_idle());
    harness.engine.state().verify_invariants();
}

// =============================================================================
// Resize
// =============================================================================

#[test]
fn resize_snaps_continuously_and_respects_minimum() {
    let mut harness = Harness::new();
    let id = harness.widget_at("a", Rect::new(100., 100., 200., 200.));

    assert!(harness.engine.begin_resize(
        ItemRef::Widget(id),
        ResizeEdge::BOTTOM_RIGHT,
        Point::new(300., 300.)
    ));
    harness.advance(16);
    harness.engine.pointer_moved(Point::new(333., 287.));

    // Mid-gesture, the rect is already grid-aligned.
    let rect = harness.widget_rect(id);
    assert_eq!(rect, Rect::new(100., 100., 240., 180.));

    // Shrink far below the minimum.
    harness.advance(16);
    harness.engine.pointer_released(Point::new(-500., -500.));
    let rect = harness.widget_rect(id);
    assert_eq!(rect.size, Size::new(60., 40.));
    harness.engine.state().verify_invariants();
}

#[test]
fn left_handle_resize_pins_the_right_edge() {
    let mut harness = Harness::new();
    let id = harness.widget_at("a", Rect::new(100., 100., 200., 200.));

    assert!(harness.engine.begin_resize(
        ItemRef::Widget(id),
        ResizeEdge::LEFT,
        Point::new(100., 200.)
    ));
    harness.advance(16);
    harness.engine.pointer_moved(Point::new(160., 200.));
    harness.engine.pointer_released(Point::new(160., 200.));

    let rect = harness.widget_rect(id);
    assert_eq!(rect, Rect::new(160., 100., 140., 200.));

    // Shrinking past the minimum keeps the right edge at 300.
    assert!(harness.engine.begin_resize(
        ItemRef::Widget(id),
        ResizeEdge::LEFT,
        Point::new(160., 200.)
    ));
    harness.advance(16);
    harness.engine.pointer_released(Point::new(290., 200.));
    let rect = harness.widget_rect(id);
    assert_eq!(rect, Rect::new(240., 100., 60., 200.));
}

#[test]
fn nests_have_a_larger_resize_minimum() {
    let mut harness = Harness::new();
    let id = harness.nest_at("nest", Rect::new(0., 0., 400., 300.));

    assert!(harness.engine.begin_resize(
        ItemRef::Nest(id),
        ResizeEdge::BOTTOM_RIGHT,
        Point::new(400., 300.)
    ));
    harness.advance(16);
    harness.engine.pointer_released(Point::new(10., 10.));

    let nest = harness.engine.state().nest(id).unwrap();
    assert_eq!(nest.rect.size, Size::new(200., 160.));
}

// =============================================================================
// Palette drop
// =============================================================================

#[test]
fn palette_drop_places_and_pushes() {
    let mut harness = Harness::new();
    let a = harness.widget_at("a", Rect::new(100., 100., 200., 150.));

    let payload = r#"{
        "type": "chart",
        "title": "b",
        "defaultSize": { "w": 40.0, "h": 40.0 }
    }"#;
    let b = harness
        .engine
        .drop_from_palette(payload, Point::new(150., 120.))
        .unwrap();
    harness.settle();

    // The template is centered on the drop point and snapped to the grid.
    assert_eq!(harness.widget_rect(b).loc, Point::new(140., 100.));
    // The occupant was pushed to a non-overlapping grid-aligned position.
    assert_eq!(harness.widget_rect(a).loc, Point::new(100., 140.));
    assert!(!crate::geometry::collides(
        harness.widget_rect(a),
        harness.widget_rect(b)
    ));
    harness.engine.state().verify_invariants();
}

#[test]
fn palette_drop_over_a_nest_inserts_inside() {
    let mut harness = Harness::new();
    let nest = harness.nest_at("nest", Rect::new(300., 300., 400., 300.));

    let payload = r#"{
        "type": "sensor",
        "title": "temp",
        "defaultSize": { "w": 80.0, "h": 60.0 },
        "ariesModType": "thermal"
    }"#;
    let id = harness
        .engine
        .drop_from_palette(payload, Point::new(500., 500.))
        .unwrap();

    let widget = harness.engine.state().widget(id).unwrap();
    assert_eq!(widget.nest, Some(nest));
    assert_eq!(widget.module.as_deref(), Some("thermal"));
    // (500, 500) world is (200, 160) in content space; minus half the size,
    // snapped to the grid.
    assert_eq!(widget.rect.loc, Point::new(160., 140.));
}

#[test]
fn malformed_palette_payload_is_rejected() {
    let mut harness = Harness::new();
    let result = harness
        .engine
        .drop_from_palette("not json", Point::new(0., 0.));
    assert!(result.is_err());
    assert_eq!(harness.engine.state().widget_count(), 0);
}

// =============================================================================
// History
// =============================================================================

#[test]
fn undo_redo_round_trip_restores_exact_state() {
    let mut harness = Harness::new();

    let initial = harness.engine.state().snapshot();
    let a = harness.widget_at("a", Rect::new(0., 0., 100., 100.));
    harness.engine.nudge(ItemRef::Widget(a), 2, 0).unwrap();
    harness.settle();
    harness.engine.nudge(ItemRef::Widget(a), 0, 3).unwrap();
    harness.settle();

    let final_state = harness.engine.state().snapshot();
    assert_eq!(harness.widget_rect(a).loc, Point::new(40., 60.));

    let mut undos = 0;
    while harness.engine.undo() {
        undos += 1;
    }
    assert_eq!(harness.engine.state().snapshot(), initial);

    for _ in 0..undos {
        assert!(harness.engine.redo());
    }
    assert!(!harness.engine.redo());
    assert_eq!(harness.engine.state().snapshot(), final_state);
}

#[test]
fn auto_size_wraps_a_nest_around_its_children() {
    let mut harness = Harness::new();
    let nest = harness.nest_at("nest", Rect::new(0., 0., 400., 300.));
    let a = harness.widget_at("a", Rect::new(2000., 2000., 100., 100.));
    harness
        .engine
        .update_widget(a, |widget| {
            widget.nest = Some(nest);
            widget.rect = Rect::new(0., 0., 100., 100.);
        })
        .unwrap();
    let b = harness.widget_at("b", Rect::new(2000., 2000., 100., 60.));
    harness
        .engine
        .update_widget(b, |widget| {
            widget.nest = Some(nest);
            widget.rect = Rect::new(120., 40., 100., 60.);
        })
        .unwrap();
    harness.settle();

    harness.engine.auto_size_nest(nest).unwrap();

    // Content extent 220x100, plus margin 20 and header 40, on a 20 grid.
    let rect = harness.engine.state().nest(nest).unwrap().rect;
    assert_eq!(rect.size, Size::new(240., 160.));

    // With no children left, the nest falls back to its minimum size.
    harness.engine.remove_widget(a).unwrap();
    harness.engine.remove_widget(b).unwrap();
    harness.engine.auto_size_nest(nest).unwrap();
    let rect = harness.engine.state().nest(nest).unwrap().rect;
    assert_eq!(rect.size, Size::new(200., 150.));
}

#[test]
fn nudge_pushes_siblings() {
    let mut harness = Harness::new();
    let a = harness.widget_at("a", Rect::new(0., 0., 100., 100.));
    let b = harness.widget_at("b", Rect::new(120., 0., 100., 100.));

    harness.engine.nudge(ItemRef::Widget(a), 2, 0).unwrap();
    harness.settle();

    assert_eq!(harness.widget_rect(a).loc, Point::new(40., 0.));
    // b was overlapped by 20 and pushed right.
    assert_eq!(harness.widget_rect(b).loc, Point::new(140., 0.));
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn export_import_reproduces_collections() {
    let mut harness = Harness::new();
    harness.nest_at("nest", Rect::new(300., 300., 400., 300.));
    let free = harness.widget_at("free", Rect::new(0., 0., 100., 100.));
    // End with a nested item so both collections are populated.
    harness.drag(
        ItemRef::Widget(free),
        Point::new(50., 50.),
        Point::new(450., 480.),
    );

    let before = harness.engine.state().snapshot();
    let bytes = harness.engine.export().unwrap();
    harness.engine.import(&bytes).unwrap();

    let after = harness.engine.state().snapshot();
    assert_eq!(after.widgets, before.widgets);
    assert_eq!(after.nests, before.nests);
    assert_eq!(after.viewport, before.viewport);

    // Import resets history to a single entry.
    assert!(!harness.engine.undo());
}

#[test]
fn explicit_save_survives_reload() {
    let options = Options::default();
    let mut harness = Harness::with_options(options.clone());
    harness.widget_at("a", Rect::new(40., 40., 100., 100.));
    harness.engine.save().unwrap();

    // A fresh engine picks the document up via the export/import path.
    let bytes = harness.engine.export().unwrap();
    let mut fresh = Harness::with_options(options);
    fresh.engine.import(&bytes).unwrap();

    assert_eq!(fresh.engine.state().widget_count(), 1);
    let widget = fresh.engine.state().widgets().next().unwrap();
    assert_eq!(widget.rect, Rect::new(40., 40., 100., 100.));
}

#[test]
fn autosave_retries_then_disables() {
    let options = Options {
        autosave_interval: Duration::from_millis(1000),
        autosave_max_retries: 3,
        ..Options::default()
    };
    let mut harness = Harness::with_storage(options, Box::new(BrokenStorage));
    let events = harness.events();

    harness
        .engine
        .add_widget("a", "chart", Size::new(100., 100.), Point::new(0., 0.))
        .unwrap();

    // Attempt 1 at the interval, then backoff 2s and 4s.
    harness.engine.tick(Duration::from_millis(1000));
    harness.engine.tick(Duration::from_millis(2900));
    harness.engine.tick(Duration::from_millis(3000));
    harness.engine.tick(Duration::from_millis(6900));
    harness.engine.tick(Duration::from_millis(7000));
    // Long after: disabled, nothing further.
    harness.engine.tick(Duration::from_millis(60_000));

    let autosave_events: Vec<_> = events
        .borrow()
        .iter()
        .filter(|event| {
            matches!(
                event,
                Event::AutoSaveFailed { .. } | Event::AutoSaveDisabled
            )
        })
        .cloned()
        .collect();
    assert_eq!(
        autosave_events,
        vec![
            Event::AutoSaveFailed { attempt: 1 },
            Event::AutoSaveFailed { attempt: 2 },
            Event::AutoSaveFailed { attempt: 3 },
            Event::AutoSaveDisabled,
        ]
    );
    assert!(!harness.engine.is_autosave_enabled());

    harness.engine.enable_autosave();
    assert!(harness.engine.is_autosave_enabled());
}

#[test]
fn profiles_round_trip_through_the_engine() {
    let mut harness = Harness::new();
    let events = harness.events();
    harness.widget_at("a", Rect::new(0., 0., 100., 100.));

    harness.engine.save_profile("flight").unwrap();
    assert_eq!(harness.engine.active_profile(), Some("flight"));

    harness.widget_at("b", Rect::new(200., 0., 100., 100.));
    harness.engine.load_profile("flight").unwrap();

    assert_eq!(harness.engine.state().widget_count(), 1);
    assert!(events
        .borrow()
        .iter()
        .any(|event| matches!(event, Event::ProfileChanged { name } if name == "flight")));
}

// =============================================================================
// Culling
// =============================================================================

#[test]
fn dragged_items_are_never_culled() {
    let mut harness = Harness::new();
    let far = harness.widget_at("far", Rect::new(9000., 9000., 100., 100.));

    let report = harness.engine.visible_items(Size::new(1280., 720.));
    assert!(!report.is_widget_visible(far));

    assert!(harness
        .engine
        .begin_drag(ItemRef::Widget(far), Point::new(9050., 9050.)));
    let report = harness.engine.visible_items(Size::new(1280., 720.));
    assert!(report.is_widget_visible(far));
}

// =============================================================================
// Viewport
// =============================================================================

#[test]
fn pan_gesture_moves_the_viewport() {
    let mut harness = Harness::new();

    assert!(harness.engine.begin_pan(Point::new(100., 100.)));
    harness.advance(16);
    harness.engine.pointer_moved(Point::new(160., 80.));
    harness.engine.pointer_released(Point::new(160., 80.));

    let viewport = harness.engine.state().viewport;
    assert_eq!(Point::new(viewport.x, viewport.y), Point::new(60., -20.));
    assert!(harness.engine.interaction().is_idle());
}

#[test]
fn zoom_commands_clamp_to_range() {
    let mut harness = Harness::new();
    let anchor = Point::new(640., 360.);

    for _ in 0..50 {
        harness.engine.zoom_in(anchor);
    }
    assert_eq!(harness.engine.state().viewport.zoom, 3.0);

    for _ in 0..50 {
        harness.engine.zoom_out(anchor);
    }
    assert_eq!(harness.engine.state().viewport.zoom, 0.1);

    harness.engine.reset_zoom(anchor);
    assert_eq!(harness.engine.state().viewport.zoom, 1.0);
}

#[test]
fn pointer_moves_are_throttled_between_ticks() {
    let mut harness = Harness::new();
    let id = harness.widget_at("a", Rect::new(0., 0., 100., 100.));

    assert!(harness
        .engine
        .begin_drag(ItemRef::Widget(id), Point::new(50., 50.)));
    harness.advance(16);
    harness.engine.pointer_moved(Point::new(70., 50.));
    // Same clock instant: this frame is dropped by the throttle.
    harness.engine.pointer_moved(Point::new(90., 50.));
    assert_eq!(harness.widget_rect(id).loc, Point::new(20., 0.));

    // The final position still wins at release.
    harness.engine.pointer_released(Point::new(90., 50.));
    assert_eq!(harness.widget_rect(id).loc, Point::new(40., 0.));
}
