//! The engine facade: one object wiring the store, history, persistence and
//! interaction together behind the command surface hosts actually call.
//!
//! Control flow: gestures and viewport commands are the only producers of
//! store mutations; every settled mutation is recorded into history and arms
//! the persistence dirty flag; culling derives a read-only view per render
//! cycle. The host drives [`Engine::tick`] from its display-refresh
//! scheduler and re-renders when it returns true.

use std::rc::Rc;
use std::time::Duration;

use pegboard_config::Config;
use tracing::warn;

use crate::clock::Clock;
use crate::culling::{compute_visible, CullingReport};
use crate::geometry::{
    find_non_colliding_position, nest_auto_size, resolve_push, round_point_to_grid, Point, Rect,
    ResizeEdge, Size,
};
use crate::grid::{GridError, GridState, ItemId, ItemRef, Nest, NestId, Widget};
use crate::history::History;
use crate::interaction::{DropError, InteractionController};
use crate::persist::{PersistenceError, PersistenceManager, Storage};
use crate::viewport::ScrollEvent;
use crate::Options;

#[derive(Debug)]
pub struct Engine {
    state: GridState,
    interaction: InteractionController,
    history: History,
    persistence: PersistenceManager,
    clock: Clock,
    options: Rc<Options>,
    /// Explicit recompute flag: set by any mutation, drained once per tick.
    needs_recompute: bool,
}

impl Engine {
    pub fn new(config: &Config, storage: Box<dyn Storage>) -> Self {
        Self::with_parts(Rc::new(Options::from_config(config)), storage, Clock::new())
    }

    /// Constructor with injected options and clock, for tests and embedders
    /// that share a clock with the host loop.
    pub fn with_parts(options: Rc<Options>, storage: Box<dyn Storage>, clock: Clock) -> Self {
        let state = GridState::new(options.clone());
        let history = History::new(
            state.snapshot(),
            options.history_capacity,
            options.history_debounce,
            clock.clone(),
        );
        let persistence = PersistenceManager::new(storage, options.clone(), clock.clone());
        let interaction = InteractionController::new(options.clone(), clock.clone());

        Self {
            state,
            interaction,
            history,
            persistence,
            clock,
            options,
            needs_recompute: true,
        }
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn options(&self) -> &Rc<Options> {
        &self.options
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn interaction(&self) -> &InteractionController {
        &self.interaction
    }

    pub fn is_dirty(&self) -> bool {
        self.persistence.is_dirty()
    }

    pub fn is_autosave_enabled(&self) -> bool {
        self.persistence.is_autosave_enabled()
    }

    pub fn active_profile(&self) -> Option<&str> {
        self.persistence.active_profile()
    }

    /// Subscribes to the store's typed event stream.
    pub fn subscribe(&mut self, subscriber: impl FnMut(&crate::grid::Event) + 'static) {
        self.state.events.subscribe(subscriber);
    }

    pub fn update_config(&mut self, config: &Config) {
        let options = Rc::new(Options::from_config(config));
        self.state.update_config(options.clone());
        self.interaction.update_config(options.clone());
        self.persistence.update_config(options.clone());
        self.options = options;
        self.needs_recompute = true;
    }

    fn settled(&mut self) {
        self.history.record(self.state.snapshot());
        self.persistence.mark_dirty();
        self.needs_recompute = true;
    }

    // =========================================================================
    // Scheduler
    // =========================================================================

    /// One scheduler tick, driven by the host at display-refresh cadence.
    ///
    /// Advances the clock, flushes the history debounce, runs due auto-save
    /// attempts, and reports whether anything changed since the last tick
    /// (so the host knows to recompute its render state).
    pub fn tick(&mut self, now: Duration) -> bool {
        self.clock.set(now);
        self.history.maybe_flush();

        if self.persistence.wants_autosave() {
            let snapshot = self.state.snapshot();
            self.persistence.tick(&snapshot, &mut self.state.events);
        }

        std::mem::take(&mut self.needs_recompute)
    }

    // =========================================================================
    // Item commands
    // =========================================================================

    /// Explicit "add widget" action: places the widget near `at_world`,
    /// searching outward for a spot free of collisions.
    pub fn add_widget(
        &mut self,
        title: &str,
        kind: &str,
        size: Size,
        at_world: Point,
    ) -> Result<ItemId, GridError> {
        let grid = self.options.grid_size;
        let candidate = Rect::from_loc_and_size(
            round_point_to_grid(at_world - Point::new(size.w / 2., size.h / 2.), grid),
            size,
        );
        let existing: Vec<_> = self
            .state
            .main_sibling_rects(None)
            .into_iter()
            .map(|(_, rect)| rect)
            .collect();
        let loc = find_non_colliding_position(candidate, &existing, grid);

        let id = self
            .state
            .add_widget(Widget::new(Rect::from_loc_and_size(loc, size), title, kind))?;
        self.settled();
        Ok(id)
    }

    /// Explicit "add nest" action, at the minimum container size.
    pub fn add_nest(&mut self, title: &str, at_world: Point) -> Result<NestId, GridError> {
        let grid = self.options.grid_size;
        let size = self.options.min_nest_size;
        let candidate = Rect::from_loc_and_size(
            round_point_to_grid(at_world - Point::new(size.w / 2., size.h / 2.), grid),
            size,
        );
        let existing: Vec<_> = self
            .state
            .main_sibling_rects(None)
            .into_iter()
            .map(|(_, rect)| rect)
            .collect();
        let loc = find_non_colliding_position(candidate, &existing, grid);

        let id = self
            .state
            .add_nest(Nest::new(Rect::from_loc_and_size(loc, size), title))?;
        self.settled();
        Ok(id)
    }

    pub fn update_widget(
        &mut self,
        id: ItemId,
        update: impl FnOnce(&mut Widget),
    ) -> Result<(), GridError> {
        self.state.update_widget(id, update)?;
        self.settled();
        Ok(())
    }

    pub fn update_nest(
        &mut self,
        id: NestId,
        update: impl FnOnce(&mut Nest),
    ) -> Result<(), GridError> {
        self.state.update_nest(id, update)?;
        self.settled();
        Ok(())
    }

    pub fn remove_widget(&mut self, id: ItemId) -> Result<(), GridError> {
        self.state.remove_widget(id)?;
        self.settled();
        Ok(())
    }

    /// Removes a nest, promoting its children to the parent container.
    pub fn remove_nest(&mut self, id: NestId) -> Result<(), GridError> {
        self.state.remove_nest(id)?;
        self.settled();
        Ok(())
    }

    /// Removes a nest together with its entire subtree.
    pub fn remove_nest_cascade(&mut self, id: NestId) -> Result<(), GridError> {
        self.state.remove_nest_cascade(id)?;
        self.settled();
        Ok(())
    }

    /// Shrink-wraps a nest around its children, plus header and margin,
    /// never below the configured minimum.
    pub fn auto_size_nest(&mut self, id: NestId) -> Result<(), GridError> {
        let children: Vec<_> = self
            .state
            .widgets()
            .filter(|widget| widget.nest == Some(id))
            .map(|widget| widget.rect)
            .chain(
                self.state
                    .nests()
                    .filter(|nest| nest.parent == Some(id))
                    .map(|nest| nest.rect),
            )
            .collect();

        let size = nest_auto_size(
            &children,
            self.options.grid_size,
            self.options.nest_header_height,
            self.options.nest_margin,
            self.options.min_nest_size,
        );
        self.state.update_nest(id, |nest| nest.rect.size = size)?;
        self.settled();
        Ok(())
    }

    /// Keyboard nudge: moves an item by whole grid steps, pushing siblings.
    pub fn nudge(&mut self, target: ItemRef, dx: i32, dy: i32) -> Result<(), GridError> {
        let grid = self.options.grid_size;
        let delta = Point::new(f64::from(dx) * grid, f64::from(dy) * grid);

        let (rect, siblings) = match target {
            ItemRef::Widget(id) => {
                let widget = self.state.widget(id).ok_or(GridError::MissingWidget(id))?;
                let rect = Rect::from_loc_and_size(widget.rect.loc + delta, widget.rect.size);
                let siblings = match widget.nest {
                    Some(nest) => self.state.nest_sibling_rects(nest, Some(target)),
                    None => self.state.main_sibling_rects(Some(target)),
                };
                (rect, siblings)
            }
            ItemRef::Nest(id) => {
                let nest = self.state.nest(id).ok_or(GridError::MissingNest(id))?;
                let rect = Rect::from_loc_and_size(nest.rect.loc + delta, nest.rect.size);
                let siblings = match nest.parent {
                    Some(parent) => self.state.nest_sibling_rects(parent, Some(target)),
                    None => self.state.main_sibling_rects(Some(target)),
                };
                (rect, siblings)
            }
        };

        let sibling_rects: Vec<_> = siblings.iter().map(|(_, rect)| *rect).collect();
        let resolved = resolve_push(rect, &sibling_rects, grid);

        let mut updates = vec![(target, rect.loc)];
        updates.extend(
            siblings
                .iter()
                .zip(&resolved)
                .filter(|(_, pushed)| pushed.pushed)
                .map(|((item, _), pushed)| (*item, pushed.rect.loc)),
        );
        self.state.apply_positions(&updates)?;
        self.settled();
        Ok(())
    }

    /// Routes a live data value into bound widgets. Non-settled: triggers a
    /// re-render but no history entry or save.
    pub fn apply_stream_value(&mut self, stream: &str, value: serde_json::Value) -> usize {
        let routed = self.state.apply_stream_value(stream, value);
        if routed > 0 {
            self.needs_recompute = true;
        }
        routed
    }

    // =========================================================================
    // Gesture commands
    // =========================================================================

    pub fn begin_drag(&mut self, target: ItemRef, pointer_screen: Point) -> bool {
        self.interaction.begin_drag(&self.state, target, pointer_screen)
    }

    pub fn begin_resize(
        &mut self,
        target: ItemRef,
        edges: ResizeEdge,
        pointer_screen: Point,
    ) -> bool {
        self.interaction
            .begin_resize(&self.state, target, edges, pointer_screen)
    }

    pub fn begin_pan(&mut self, pointer_screen: Point) -> bool {
        self.interaction.begin_pan(pointer_screen)
    }

    pub fn pointer_moved(&mut self, pointer_screen: Point) {
        if self.interaction.update_pointer(&mut self.state, pointer_screen) {
            self.needs_recompute = true;
        }
    }

    pub fn pointer_released(&mut self, pointer_screen: Point) {
        if self.interaction.end_gesture(&mut self.state, pointer_screen) {
            self.settled();
        }
    }

    /// Focus loss, device removal: always resolves back to idle.
    pub fn cancel_gesture(&mut self) {
        if self.interaction.cancel(&mut self.state) {
            self.settled();
        }
    }

    pub fn drop_from_palette(
        &mut self,
        payload_json: &str,
        pointer_screen: Point,
    ) -> Result<ItemId, DropError> {
        let id = self
            .interaction
            .drop_from_palette(&mut self.state, payload_json, pointer_screen)?;
        self.settled();
        Ok(id)
    }

    // =========================================================================
    // Viewport commands
    // =========================================================================

    pub fn scroll(&mut self, event: ScrollEvent) {
        self.state.viewport.apply_scroll(event, &self.options);
        self.settled();
    }

    pub fn zoom_in(&mut self, anchor_screen: Point) {
        self.state.viewport.zoom_in(anchor_screen, &self.options);
        self.settled();
    }

    pub fn zoom_out(&mut self, anchor_screen: Point) {
        self.state.viewport.zoom_out(anchor_screen, &self.options);
        self.settled();
    }

    pub fn reset_zoom(&mut self, anchor_screen: Point) {
        self.state.viewport.reset_zoom(anchor_screen, &self.options);
        self.settled();
    }

    // =========================================================================
    // History commands
    // =========================================================================

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo() else {
            return false;
        };
        self.state.restore(&snapshot);
        self.persistence.mark_dirty();
        self.needs_recompute = true;
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo() else {
            return false;
        };
        self.state.restore(&snapshot);
        self.persistence.mark_dirty();
        self.needs_recompute = true;
        true
    }

    // =========================================================================
    // Persistence commands
    // =========================================================================

    /// Loads the previously saved state, if any. Resets history.
    pub fn load_persisted(&mut self) -> Result<bool, PersistenceError> {
        let Some(snapshot) = self.persistence.load()? else {
            return Ok(false);
        };
        self.state.restore(&snapshot);
        self.history.reset(snapshot);
        self.needs_recompute = true;
        Ok(true)
    }

    /// Explicit, verified save.
    pub fn save(&mut self) -> Result<(), PersistenceError> {
        self.history.flush();
        let snapshot = self.state.snapshot();
        let result = self.persistence.save(&snapshot, &mut self.state.events);
        if let Err(err) = &result {
            warn!("save failed: {err}");
        }
        result
    }

    pub fn export(&self) -> Result<Vec<u8>, PersistenceError> {
        self.persistence.export(&self.state.snapshot())
    }

    /// Imports an exported document, replacing the current state and
    /// resetting history to a single entry.
    pub fn import(&mut self, bytes: &[u8]) -> Result<(), PersistenceError> {
        let snapshot = self.persistence.import(bytes)?;
        self.state.restore(&snapshot);
        self.history.reset(snapshot);
        self.persistence.mark_dirty();
        self.needs_recompute = true;
        Ok(())
    }

    pub fn save_profile(&mut self, name: &str) -> Result<(), PersistenceError> {
        let snapshot = self.state.snapshot();
        self.persistence
            .save_profile(name, &snapshot, &mut self.state.events)
    }

    pub fn load_profile(&mut self, name: &str) -> Result<(), PersistenceError> {
        let snapshot = self
            .persistence
            .load_profile(name, &mut self.state.events)?;
        self.state.restore(&snapshot);
        self.history.reset(snapshot);
        self.needs_recompute = true;
        Ok(())
    }

    pub fn delete_profile(&mut self, name: &str) -> Result<(), PersistenceError> {
        self.persistence.delete_profile(name)
    }

    pub fn list_profiles(&self) -> Result<Vec<String>, PersistenceError> {
        self.persistence.list_profiles()
    }

    /// Re-arms auto-save after it disabled itself on repeated failures.
    pub fn enable_autosave(&mut self) {
        self.persistence.enable_autosave();
    }

    // =========================================================================
    // Culling
    // =========================================================================

    /// Read-only visibility classification for the current render cycle.
    pub fn visible_items(&self, view_size: Size) -> CullingReport {
        compute_visible(
            &self.state,
            view_size,
            &self.interaction.active_items(),
            &self.options,
        )
    }
}
