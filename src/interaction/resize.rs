//! Resize lifecycle for the eight compass handles.
//!
//! Unlike dragging, resize snaps continuously: all four coordinates are
//! grid-rounded on every move, so there is nothing left to settle at gesture
//! end.

use super::{Gesture, InteractionController};
use crate::geometry::{ceil_to_grid, round_to_grid, Point, Rect, ResizeEdge, Size};
use crate::grid::{GridState, ItemRef};

/// Transient state of an ongoing resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeState {
    pub target: ItemRef,
    /// Which edges the gripped handle moves.
    pub edges: ResizeEdge,
    /// Pointer position at gesture start, in world units.
    pub start_pointer: Point,
    /// Item rectangle at gesture start, in container-local units.
    pub start_rect: Rect,
}

impl InteractionController {
    /// One resize frame: derive the candidate rectangle from the handle,
    /// round, clamp to the minimum size, commit, push siblings.
    pub(super) fn resize_move(&mut self, state: &mut GridState, pointer_screen: Point) {
        let Some(Gesture::Resize(resize)) = &self.gesture else {
            return;
        };
        let resize = *resize;

        let pointer_world = state.viewport.screen_to_world(pointer_screen);
        // Nested coordinate spaces are pure translations, so a world-space
        // delta applies to container-local coordinates directly.
        let delta = pointer_world - resize.start_pointer;
        let grid = self.options.grid_size;

        // Work on edges rather than x/y/w/h: the handle's edges move and
        // round to the grid, the opposite edges stay pinned.
        let start = resize.start_rect;
        let mut left = start.loc.x;
        let mut right = start.right();
        let mut top = start.loc.y;
        let mut bottom = start.bottom();

        if resize.edges.contains(ResizeEdge::LEFT) {
            left = round_to_grid(start.loc.x + delta.x, grid);
        }
        if resize.edges.contains(ResizeEdge::RIGHT) {
            right = round_to_grid(start.right() + delta.x, grid);
        }
        if resize.edges.contains(ResizeEdge::TOP) {
            top = round_to_grid(start.loc.y + delta.y, grid);
        }
        if resize.edges.contains(ResizeEdge::BOTTOM) {
            bottom = round_to_grid(start.bottom() + delta.y, grid);
        }

        let min = self.min_size_for(resize.target);
        if right - left < min.w {
            if resize.edges.contains(ResizeEdge::LEFT) {
                left = right - min.w;
            } else {
                right = left + min.w;
            }
        }
        if bottom - top < min.h {
            if resize.edges.contains(ResizeEdge::TOP) {
                top = bottom - min.h;
            } else {
                bottom = top + min.h;
            }
        }

        let rect = Rect::new(left, top, right - left, bottom - top);

        let result = match resize.target {
            ItemRef::Widget(id) => state.set_widget_rect(id, rect),
            ItemRef::Nest(id) => state.set_nest_rect(id, rect),
        };
        if result.is_err() {
            self.abort("resize target vanished");
            return;
        }

        let Some(container) = Self::container_of(state, resize.target) else {
            self.abort("resize container vanished");
            return;
        };
        self.push_siblings(state, resize.target, container, rect);
    }

    /// Minimum size for the resized item, rounded up to the grid. Containers
    /// have a larger floor than widgets.
    fn min_size_for(&self, target: ItemRef) -> Size {
        let grid = self.options.grid_size;
        let min = match target {
            ItemRef::Widget(_) => self.options.min_widget_size,
            ItemRef::Nest(_) => self.options.min_nest_size,
        };
        Size::new(ceil_to_grid(min.w, grid), ceil_to_grid(min.h, grid))
    }
}
