//! Drag lifecycle: smooth movement, push physics, entering-nest preview and
//! cross-container transfers.

use tracing::debug;

use super::{Container, Gesture, InteractionController};
use crate::geometry::{resolve_push, round_point_to_grid, Point, Rect, Size};
use crate::grid::{GridState, ItemRef, NestId};

/// Transient state of an ongoing drag.
#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    pub target: ItemRef,
    /// Container the item started in.
    pub source: Container,
    /// Pointer-to-item offset in world units, captured at drag start.
    pub pointer_offset: Point,
    /// Smooth (unsnapped) world position of the item's top-left.
    pub position: Point,
    pub size: Size,
    /// Nest whose bounds currently contain the dragged item's center, if
    /// any. Drives the drag-over indicator and the entering-nest preview.
    pub hover_nest: Option<NestId>,
}

impl InteractionController {
    /// Starts a drag on a widget or nest. Captures the source container and
    /// the pointer-to-item offset in world coordinates.
    pub fn begin_drag(
        &mut self,
        state: &GridState,
        target: ItemRef,
        pointer_screen: Point,
    ) -> bool {
        if self.gesture.is_some() {
            return false;
        }

        let Some(source) = Self::container_of(state, target) else {
            return false;
        };
        let Some(origin) = Self::container_origin(state, source) else {
            return false;
        };

        let (local, size) = match target {
            ItemRef::Widget(id) => match state.widget(id) {
                Some(widget) => (widget.rect.loc, widget.rect.size),
                None => return false,
            },
            ItemRef::Nest(id) => match state.nest(id) {
                Some(nest) => (nest.rect.loc, nest.rect.size),
                None => return false,
            },
        };

        let world = origin + local;
        let pointer_world = state.viewport.screen_to_world(pointer_screen);

        self.gesture = Some(Gesture::Drag(DragState {
            target,
            source,
            pointer_offset: pointer_world - world,
            position: world,
            size,
            hover_nest: None,
        }));
        true
    }

    /// One drag frame: smooth candidate position, hover detection, push
    /// resolution, single store commit.
    pub(super) fn drag_move(&mut self, state: &mut GridState, pointer_screen: Point) {
        let Some(Gesture::Drag(drag)) = &mut self.gesture else {
            return;
        };

        let pointer_world = state.viewport.screen_to_world(pointer_screen);
        // No grid rounding mid-gesture; snapping happens at commit so the
        // item tracks the pointer without jitter.
        let world = pointer_world - drag.pointer_offset;
        drag.position = world;

        let center = Rect::from_loc_and_size(world, drag.size).center();
        let exclude = match drag.target {
            ItemRef::Nest(id) => Some(id),
            ItemRef::Widget(_) => None,
        };
        drag.hover_nest = containing_nest(state, center, exclude);

        let source = drag.source;
        let target = drag.target;
        let size = drag.size;
        let source_nest = match source {
            Container::Nest(id) => Some(id),
            Container::Main => None,
        };
        let entering_preview = drag.hover_nest.is_some() && drag.hover_nest != source_nest;

        let Some(origin) = Self::container_origin(state, source) else {
            self.abort("drag source container vanished");
            return;
        };
        let local = world - origin;

        if entering_preview {
            // Over a foreign nest: suppress push physics and just track the
            // pointer; the transfer happens at drag end.
            if self
                .apply_drag_positions(state, &[(target, local)])
                .is_err()
            {
                self.abort("drag target vanished");
            }
            return;
        }

        let siblings = Self::siblings_of(state, source, Some(target));
        let moving = Rect::from_loc_and_size(local, size);
        let sibling_rects: Vec<_> = siblings.iter().map(|(_, rect)| *rect).collect();
        let resolved = resolve_push(moving, &sibling_rects, self.options.grid_size);

        let mut updates = vec![(target, local)];
        updates.extend(
            siblings
                .iter()
                .zip(&resolved)
                .filter(|(_, pushed)| pushed.pushed)
                .map(|((item, _), pushed)| (*item, pushed.rect.loc)),
        );

        if self.apply_drag_positions(state, &updates).is_err() {
            self.abort("drag commit failed");
        }
    }

    fn apply_drag_positions(
        &self,
        state: &mut GridState,
        updates: &[(ItemRef, Point)],
    ) -> Result<(), ()> {
        state.apply_positions(updates).map_err(|err| {
            debug!("drag frame rejected: {err}");
        })
    }

    /// Drag end: snap to the grid and resolve the destination container.
    pub(super) fn finish_drag(&mut self, state: &mut GridState, drag: DragState) {
        let grid = self.options.grid_size;
        let snapped_world = round_point_to_grid(drag.position, grid);
        let center = Rect::from_loc_and_size(snapped_world, drag.size).center();

        // Re-read the source from the state; a collaborator may have moved
        // the item while we were dragging it.
        let Some(source) = Self::container_of(state, drag.target) else {
            debug!("drag target vanished before drop");
            return;
        };

        let exclude = match drag.target {
            ItemRef::Nest(id) => Some(id),
            ItemRef::Widget(_) => None,
        };
        let destination = match containing_nest(state, center, exclude) {
            Some(nest) => Container::Nest(nest),
            None => Container::Main,
        };

        if destination == source {
            self.settle_in_container(state, drag.target, source, snapped_world, drag.size);
            return;
        }

        let Some(dest_origin) = Self::container_origin(state, destination) else {
            debug!("drop destination vanished, leaving item in place");
            self.settle_in_container(state, drag.target, source, snapped_world, drag.size);
            return;
        };
        let local = snapped_world - dest_origin;
        let rect = Rect::from_loc_and_size(local, drag.size);

        let transfer = match (drag.target, destination) {
            (ItemRef::Widget(id), Container::Nest(nest)) => {
                state.move_widget_to_nest(id, nest, rect)
            }
            (ItemRef::Widget(id), Container::Main) => state.move_widget_to_main(id, rect),
            (ItemRef::Nest(id), Container::Nest(parent)) => {
                state.move_nest_into(id, Some(parent), rect)
            }
            (ItemRef::Nest(id), Container::Main) => state.move_nest_into(id, None, rect),
        };

        match transfer {
            Ok(()) => {
                self.push_siblings(state, drag.target, destination, rect);
            }
            Err(err) => {
                // Nesting a container under its own descendant, or a lookup
                // race: stay in the source container.
                debug!("cross-container transfer rejected: {err}");
                self.settle_in_container(state, drag.target, source, snapped_world, drag.size);
            }
        }
    }

    /// Commits a snapped position within `container` and runs a final push
    /// pass so the snap can't leave residual overlap.
    fn settle_in_container(
        &self,
        state: &mut GridState,
        target: ItemRef,
        container: Container,
        snapped_world: Point,
        size: Size,
    ) {
        let Some(origin) = Self::container_origin(state, container) else {
            return;
        };
        let local = snapped_world - origin;
        let rect = Rect::from_loc_and_size(local, size);

        if self.apply_drag_positions(state, &[(target, local)]).is_err() {
            return;
        }
        self.push_siblings(state, target, container, rect);
    }

    pub(super) fn push_siblings(
        &self,
        state: &mut GridState,
        target: ItemRef,
        container: Container,
        rect: Rect,
    ) {
        let siblings = Self::siblings_of(state, container, Some(target));
        let sibling_rects: Vec<_> = siblings.iter().map(|(_, rect)| *rect).collect();
        let resolved = resolve_push(rect, &sibling_rects, self.options.grid_size);

        let updates: Vec<_> = siblings
            .iter()
            .zip(&resolved)
            .filter(|(_, pushed)| pushed.pushed)
            .map(|((item, _), pushed)| (*item, pushed.rect.loc))
            .collect();
        if !updates.is_empty() {
            let _ = self.apply_drag_positions(state, &updates);
        }
    }
}

/// Deepest nest whose world bounds contain `point`, skipping the subtree
/// rooted at `exclude` (a dragged nest can't be dropped into itself or its
/// descendants). Ties on depth resolve to the newest nest.
pub(super) fn containing_nest(
    state: &GridState,
    point: Point,
    exclude: Option<NestId>,
) -> Option<NestId> {
    state
        .nests()
        .filter(|nest| match exclude {
            None => true,
            Some(id) => nest.id != id && !state.nest_has_ancestor(nest.id, id),
        })
        .filter(|nest| {
            state
                .nest_world_rect(nest.id)
                .is_some_and(|rect| rect.contains(point))
        })
        .max_by_key(|nest| (state.nest_depth(nest.id), nest.id.get()))
        .map(|nest| nest.id)
}
