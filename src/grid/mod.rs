//! The grid state store: the single source of truth for items, containers
//! and the viewport.
//!
//! All mutations go through the updaters here. Each updater either commits a
//! valid state and stamps `updated_at`, or returns an error without touching
//! anything. Nothing else in the engine holds a second mutable copy of this
//! data; gestures, persistence and culling all work against this store.

mod events;
mod item;

use std::rc::Rc;

pub use events::{Event, Events};
pub(crate) use item::bump_id_counter;
pub use item::{ItemId, ItemRef, Nest, NestId, Widget};

use chrono::Utc;

use crate::geometry::{Point, Rect};
use crate::viewport::Viewport;
use crate::Options;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("width and height must be positive")]
    NonPositiveSize,
    #[error("coordinates must be finite")]
    NonFiniteCoordinates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("nest {id} cannot become its own ancestor")]
pub struct CycleError {
    pub id: NestId,
}

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("no widget with id {0}")]
    MissingWidget(ItemId),
    #[error("no nest with id {0}")]
    MissingNest(NestId),
}

/// Pure-data snapshot of the store, used for history entries and the
/// persisted document.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    pub viewport: Viewport,
    pub widgets: Vec<Widget>,
    pub nests: Vec<Nest>,
}

#[derive(Debug)]
pub struct GridState {
    pub viewport: Viewport,
    widgets: Vec<Widget>,
    nests: Vec<Nest>,
    /// Pub-sub surface for the host; see [`Events`].
    pub events: Events,
    options: Rc<Options>,
}

impl GridState {
    pub fn new(options: Rc<Options>) -> Self {
        Self {
            viewport: Viewport::default(),
            widgets: Vec::new(),
            nests: Vec::new(),
            events: Events::new(),
            options,
        }
    }

    pub fn update_config(&mut self, options: Rc<Options>) {
        self.options = options;
    }

    pub fn options(&self) -> &Rc<Options> {
        &self.options
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            viewport: self.viewport,
            widgets: self.widgets.clone(),
            nests: self.nests.clone(),
        }
    }

    /// Replaces the whole data model, keeping subscribers and options.
    pub fn restore(&mut self, snapshot: &GridSnapshot) {
        let old_count = self.widgets.len();

        self.viewport = snapshot.viewport;
        self.widgets = snapshot.widgets.clone();
        self.nests = snapshot.nests.clone();

        if self.widgets.len() != old_count {
            let count = self.widgets.len();
            self.events.emit(Event::WidgetCountChanged { count });
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn widgets(&self) -> impl Iterator<Item = &Widget> + '_ {
        self.widgets.iter()
    }

    pub fn nests(&self) -> impl Iterator<Item = &Nest> + '_ {
        self.nests.iter()
    }

    pub fn widget(&self, id: ItemId) -> Option<&Widget> {
        self.widgets.iter().find(|widget| widget.id == id)
    }

    pub fn nest(&self, id: NestId) -> Option<&Nest> {
        self.nests.iter().find(|nest| nest.id == id)
    }

    pub fn widget_count(&self) -> usize {
        self.widgets.len()
    }

    fn widget_idx(&self, id: ItemId) -> Result<usize, GridError> {
        self.widgets
            .iter()
            .position(|widget| widget.id == id)
            .ok_or(GridError::MissingWidget(id))
    }

    fn nest_idx(&self, id: NestId) -> Result<usize, GridError> {
        self.nests
            .iter()
            .position(|nest| nest.id == id)
            .ok_or(GridError::MissingNest(id))
    }

    /// World-space rectangle of a nest, walking up the parent chain.
    pub fn nest_world_rect(&self, id: NestId) -> Option<Rect> {
        let nest = self.nest(id)?;
        let mut rect = nest.rect;
        let mut parent = nest.parent;

        // Parent chains are trees (enforced on every mutation), so this
        // walk terminates.
        while let Some(parent_id) = parent {
            let parent_nest = self.nest(parent_id)?;
            rect.loc += self.content_origin(parent_nest.rect.loc);
            parent = parent_nest.parent;
        }
        Some(rect)
    }

    /// Origin of a container's content space: its top-left shifted below the
    /// header.
    pub fn content_origin(&self, nest_loc: Point) -> Point {
        Point::new(nest_loc.x, nest_loc.y + self.options.nest_header_height)
    }

    /// World-space content origin of a nest.
    pub fn nest_content_origin(&self, id: NestId) -> Option<Point> {
        self.nest_world_rect(id).map(|rect| self.content_origin(rect.loc))
    }

    /// Sibling geometry on the main grid, ascending by raw id, excluding
    /// `exclude`. Used as the push-solver input set.
    pub fn main_sibling_rects(&self, exclude: Option<ItemRef>) -> Vec<(ItemRef, Rect)> {
        let widgets = self
            .widgets
            .iter()
            .filter(|widget| widget.nest.is_none())
            .map(|widget| (ItemRef::Widget(widget.id), widget.rect));
        let nests = self
            .nests
            .iter()
            .filter(|nest| nest.parent.is_none())
            .map(|nest| (ItemRef::Nest(nest.id), nest.rect));

        let mut rects: Vec<_> = widgets
            .chain(nests)
            .filter(|(item, _)| Some(*item) != exclude)
            .collect();
        rects.sort_by_key(|(item, _)| item.raw());
        rects
    }

    /// Sibling geometry inside a nest's content space, ascending by raw id.
    pub fn nest_sibling_rects(&self, nest: NestId, exclude: Option<ItemRef>) -> Vec<(ItemRef, Rect)> {
        let widgets = self
            .widgets
            .iter()
            .filter(|widget| widget.nest == Some(nest))
            .map(|widget| (ItemRef::Widget(widget.id), widget.rect));
        let nests = self
            .nests
            .iter()
            .filter(|child| child.parent == Some(nest))
            .map(|child| (ItemRef::Nest(child.id), child.rect));

        let mut rects: Vec<_> = widgets
            .chain(nests)
            .filter(|(item, _)| Some(*item) != exclude)
            .collect();
        rects.sort_by_key(|(item, _)| item.raw());
        rects
    }

    /// Whether `ancestor` appears above `nest` in the tree.
    pub fn nest_has_ancestor(&self, nest: NestId, ancestor: NestId) -> bool {
        let parent = self.nest(nest).and_then(|nest| nest.parent);
        self.has_ancestor(parent, ancestor)
    }

    /// Nesting depth of a nest: 0 on the main grid.
    pub fn nest_depth(&self, id: NestId) -> usize {
        let mut depth = 0;
        let mut current = self.nest(id).and_then(|nest| nest.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.nest(parent).and_then(|nest| nest.parent);
        }
        depth
    }

    /// Whether `target` appears in the ancestor chain starting at `start`.
    fn has_ancestor(&self, start: Option<NestId>, target: NestId) -> bool {
        let mut current = start;
        while let Some(id) = current {
            if id == target {
                return true;
            }
            current = self.nest(id).and_then(|nest| nest.parent);
        }
        false
    }

    // =========================================================================
    // Updaters
    // =========================================================================

    pub fn add_widget(&mut self, widget: Widget) -> Result<ItemId, GridError> {
        validate_rect(widget.rect)?;
        if let Some(nest) = widget.nest {
            self.nest_idx(nest)?;
        }

        let id = widget.id;
        self.widgets.push(widget);
        self.events.emit(Event::WidgetAdded { id });
        let count = self.widgets.len();
        self.events.emit(Event::WidgetCountChanged { count });
        Ok(id)
    }

    pub fn add_nest(&mut self, nest: Nest) -> Result<NestId, GridError> {
        validate_rect(nest.rect)?;
        if let Some(parent) = nest.parent {
            self.nest_idx(parent)?;
        }

        let id = nest.id;
        self.nests.push(nest);
        self.events.emit(Event::NestAdded { id });
        Ok(id)
    }

    /// Applies a partial update to a widget. The closure works on a copy;
    /// the result is validated before it replaces the stored widget.
    pub fn update_widget(
        &mut self,
        id: ItemId,
        update: impl FnOnce(&mut Widget),
    ) -> Result<(), GridError> {
        let idx = self.widget_idx(id)?;

        let mut widget = self.widgets[idx].clone();
        update(&mut widget);
        widget.id = id;
        validate_rect(widget.rect)?;
        if let Some(nest) = widget.nest {
            self.nest_idx(nest)?;
        }

        widget.updated_at = Utc::now();
        self.widgets[idx] = widget;
        Ok(())
    }

    /// Applies a partial update to a nest, re-validating the parent link.
    pub fn update_nest(
        &mut self,
        id: NestId,
        update: impl FnOnce(&mut Nest),
    ) -> Result<(), GridError> {
        let idx = self.nest_idx(id)?;

        let mut nest = self.nests[idx].clone();
        update(&mut nest);
        nest.id = id;
        validate_rect(nest.rect)?;
        if let Some(parent) = nest.parent {
            self.nest_idx(parent)?;
            if parent == id || self.has_ancestor(Some(parent), id) {
                return Err(CycleError { id }.into());
            }
        }

        nest.updated_at = Utc::now();
        self.nests[idx] = nest;
        Ok(())
    }

    /// Gesture fast path: replace a widget's rectangle.
    pub fn set_widget_rect(&mut self, id: ItemId, rect: Rect) -> Result<(), GridError> {
        validate_rect(rect)?;
        let idx = self.widget_idx(id)?;
        self.widgets[idx].rect = rect;
        self.widgets[idx].updated_at = Utc::now();
        Ok(())
    }

    /// Gesture fast path: replace a nest's rectangle.
    pub fn set_nest_rect(&mut self, id: NestId, rect: Rect) -> Result<(), GridError> {
        validate_rect(rect)?;
        let idx = self.nest_idx(id)?;
        self.nests[idx].rect = rect;
        self.nests[idx].updated_at = Utc::now();
        Ok(())
    }

    /// Commits a batch of new positions in one update (the moved item plus
    /// everything the push solver displaced).
    pub fn apply_positions(&mut self, updates: &[(ItemRef, Point)]) -> Result<(), GridError> {
        // Validate everything first so a bad entry doesn't half-commit.
        for (item, loc) in updates {
            if !loc.is_finite() {
                return Err(GeometryError::NonFiniteCoordinates.into());
            }
            match item {
                ItemRef::Widget(id) => {
                    self.widget_idx(*id)?;
                }
                ItemRef::Nest(id) => {
                    self.nest_idx(*id)?;
                }
            }
        }

        let now = Utc::now();
        for (item, loc) in updates {
            match item {
                ItemRef::Widget(id) => {
                    let idx = self.widget_idx(*id)?;
                    self.widgets[idx].rect.loc = *loc;
                    self.widgets[idx].updated_at = now;
                }
                ItemRef::Nest(id) => {
                    let idx = self.nest_idx(*id)?;
                    self.nests[idx].rect.loc = *loc;
                    self.nests[idx].updated_at = now;
                }
            }
        }
        Ok(())
    }

    pub fn remove_widget(&mut self, id: ItemId) -> Result<Widget, GridError> {
        let idx = self.widget_idx(id)?;
        let widget = self.widgets.remove(idx);

        self.events.emit(Event::WidgetRemoved { id });
        let count = self.widgets.len();
        self.events.emit(Event::WidgetCountChanged { count });
        Ok(widget)
    }

    /// Removes a nest, promoting its children into the parent coordinate
    /// space so no dangling references survive.
    pub fn remove_nest(&mut self, id: NestId) -> Result<Nest, GridError> {
        let idx = self.nest_idx(id)?;
        let nest = self.nests.remove(idx);

        let origin = self.content_origin(nest.rect.loc);
        let new_parent = nest.parent;
        let now = Utc::now();

        let mut transferred = Vec::new();
        for widget in &mut self.widgets {
            if widget.nest == Some(id) {
                widget.rect.loc += origin;
                widget.nest = new_parent;
                widget.updated_at = now;
                transferred.push(widget.id);
            }
        }
        for child in &mut self.nests {
            if child.parent == Some(id) {
                child.rect.loc += origin;
                child.parent = new_parent;
                child.updated_at = now;
            }
        }

        for widget_id in transferred {
            self.events.emit(Event::WidgetTransferred {
                id: widget_id,
                to: new_parent,
            });
        }
        self.events.emit(Event::NestRemoved { id });
        Ok(nest)
    }

    /// Removes a nest and everything inside it, recursively.
    pub fn remove_nest_cascade(&mut self, id: NestId) -> Result<(), GridError> {
        self.nest_idx(id)?;

        // Collect the whole subtree before touching anything.
        let mut doomed = vec![id];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let current = doomed[cursor];
            cursor += 1;
            doomed.extend(
                self.nests
                    .iter()
                    .filter(|nest| nest.parent == Some(current))
                    .map(|nest| nest.id),
            );
        }

        let removed_widgets: Vec<_> = self
            .widgets
            .iter()
            .filter(|widget| widget.nest.is_some_and(|nest| doomed.contains(&nest)))
            .map(|widget| widget.id)
            .collect();

        self.widgets
            .retain(|widget| !widget.nest.is_some_and(|nest| doomed.contains(&nest)));
        self.nests.retain(|nest| !doomed.contains(&nest.id));

        for widget_id in removed_widgets {
            self.events.emit(Event::WidgetRemoved { id: widget_id });
        }
        for nest_id in doomed {
            self.events.emit(Event::NestRemoved { id: nest_id });
        }
        let count = self.widgets.len();
        self.events.emit(Event::WidgetCountChanged { count });
        Ok(())
    }

    /// Moves a widget into a nest, at the given content-relative rectangle.
    pub fn move_widget_to_nest(
        &mut self,
        id: ItemId,
        nest: NestId,
        rect: Rect,
    ) -> Result<(), GridError> {
        validate_rect(rect)?;
        self.nest_idx(nest)?;
        let idx = self.widget_idx(id)?;

        let widget = &mut self.widgets[idx];
        widget.rect = rect;
        widget.nest = Some(nest);
        widget.updated_at = Utc::now();

        self.events.emit(Event::WidgetTransferred { id, to: Some(nest) });
        Ok(())
    }

    /// Moves a widget out to the main grid, at the given world rectangle.
    pub fn move_widget_to_main(&mut self, id: ItemId, rect: Rect) -> Result<(), GridError> {
        validate_rect(rect)?;
        let idx = self.widget_idx(id)?;

        let widget = &mut self.widgets[idx];
        widget.rect = rect;
        widget.nest = None;
        widget.updated_at = Utc::now();

        self.events.emit(Event::WidgetTransferred { id, to: None });
        Ok(())
    }

    /// Reparents a nest. Rejects moves that would make the nest its own
    /// ancestor.
    pub fn move_nest_into(
        &mut self,
        id: NestId,
        parent: Option<NestId>,
        rect: Rect,
    ) -> Result<(), GridError> {
        validate_rect(rect)?;
        let idx = self.nest_idx(id)?;
        if let Some(parent) = parent {
            self.nest_idx(parent)?;
            if parent == id || self.has_ancestor(Some(parent), id) {
                return Err(CycleError { id }.into());
            }
        }

        let nest = &mut self.nests[idx];
        nest.rect = rect;
        nest.parent = parent;
        nest.updated_at = Utc::now();
        Ok(())
    }

    /// Routes a live data value into every widget bound to `stream`.
    ///
    /// Live data is presentation state, not layout: this does not stamp
    /// `updated_at` and never lands in history or the persisted document.
    pub fn apply_stream_value(&mut self, stream: &str, value: serde_json::Value) -> usize {
        let mut routed = 0;
        for widget in &mut self.widgets {
            if widget.stream.as_deref() == Some(stream) {
                widget.data = Some(value.clone());
                routed += 1;
            }
        }
        routed
    }

    // =========================================================================
    // Test helpers
    // =========================================================================

    #[cfg(test)]
    pub fn verify_invariants(&self) {
        use std::collections::HashSet;

        let mut ids = HashSet::new();
        for widget in &self.widgets {
            assert!(ids.insert(widget.id.get()), "duplicate widget id {}", widget.id);
            assert!(widget.rect.size.w > 0. && widget.rect.size.h > 0.);
            if let Some(nest) = widget.nest {
                assert!(self.nest(nest).is_some(), "dangling nest reference {nest}");
            }
        }
        for nest in &self.nests {
            assert!(ids.insert(nest.id.get()), "duplicate nest id {}", nest.id);
            assert!(nest.rect.size.w > 0. && nest.rect.size.h > 0.);
            if let Some(parent) = nest.parent {
                assert!(self.nest(parent).is_some(), "dangling parent reference {parent}");
                assert!(
                    !self.has_ancestor(Some(parent), nest.id),
                    "cycle through nest {}",
                    nest.id
                );
            }
        }

        assert!(self.viewport.zoom > 0.);
        assert!(self.viewport.zoom.is_finite());
    }
}

fn validate_rect(rect: Rect) -> Result<(), GeometryError> {
    if !rect.loc.is_finite() || !rect.size.is_finite() {
        return Err(GeometryError::NonFiniteCoordinates);
    }
    if rect.size.w <= 0. || rect.size.h <= 0. {
        return Err(GeometryError::NonPositiveSize);
    }
    Ok(())
}
