//! The pointer interaction state machine.
//!
//! One controller owns all gesture state and exposes a narrow command
//! surface to the rendering layer: begin a gesture, feed pointer positions,
//! end or cancel. Exactly one gesture can be active at a time per pointer
//! device: dragging, resizing, or panning.
//!
//! ## Module Structure
//!
//! ```text
//! interaction/
//! ├── mod.rs    - InteractionController, gesture types, pan
//! ├── drag.rs   - drag lifecycle, entering-nest preview, container transfer
//! ├── resize.rs - 8-handle resize lifecycle
//! └── drop.rs   - drop from an external widget palette
//! ```
//!
//! Pointer moves are throttled against the clock so a high-rate mouse can't
//! swamp the layout solver; the gesture-ending event always re-processes the
//! final position, so the last frame is never dropped.
//!
//! If required context disappears mid-gesture (the target was removed, a
//! container lookup fails), the gesture silently aborts back to idle. That
//! is deliberate: a stray pointer event after a collaborative delete is not
//! an error the user can act on.

mod drag;
mod drop;
mod resize;

use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

pub use drag::DragState;
pub use drop::{DropError, DropPayload};
pub use resize::ResizeState;

use crate::clock::Clock;
use crate::geometry::{Point, ResizeEdge};
use crate::grid::{GridState, ItemRef, NestId};
use crate::Options;

/// Which container an item lives in during a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Main,
    Nest(NestId),
}

/// Pointer buttons the engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
}

/// Whether a button press should start a pan rather than a drag.
pub fn is_pan_trigger(button: PointerButton, ctrl: bool) -> bool {
    match button {
        PointerButton::Middle => true,
        PointerButton::Primary => ctrl,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanState {
    last_screen: Point,
}

#[derive(Debug, Clone, PartialEq)]
enum Gesture {
    Drag(DragState),
    Resize(ResizeState),
    Pan(PanState),
}

#[derive(Debug)]
pub struct InteractionController {
    gesture: Option<Gesture>,
    last_commit: Option<Duration>,
    clock: Clock,
    options: Rc<Options>,
}

impl InteractionController {
    pub fn new(options: Rc<Options>, clock: Clock) -> Self {
        Self {
            gesture: None,
            last_commit: None,
            clock,
            options,
        }
    }

    pub fn update_config(&mut self, options: Rc<Options>) {
        self.options = options;
    }

    pub fn is_idle(&self) -> bool {
        self.gesture.is_none()
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.gesture, Some(Gesture::Drag(_)))
    }

    pub fn is_resizing(&self) -> bool {
        matches!(self.gesture, Some(Gesture::Resize(_)))
    }

    pub fn is_panning(&self) -> bool {
        matches!(self.gesture, Some(Gesture::Pan(_)))
    }

    pub fn drag_state(&self) -> Option<&DragState> {
        match &self.gesture {
            Some(Gesture::Drag(drag)) => Some(drag),
            _ => None,
        }
    }

    pub fn resize_state(&self) -> Option<&ResizeState> {
        match &self.gesture {
            Some(Gesture::Resize(resize)) => Some(resize),
            _ => None,
        }
    }

    /// Items an ongoing gesture is moving or resizing. The culling engine
    /// treats these as always visible.
    pub fn active_items(&self) -> Vec<ItemRef> {
        match &self.gesture {
            Some(Gesture::Drag(drag)) => vec![drag.target],
            Some(Gesture::Resize(resize)) => vec![resize.target],
            _ => Vec::new(),
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Starts a pan. Hosts call this for middle-button or ctrl+primary
    /// presses (see [`is_pan_trigger`]).
    pub fn begin_pan(&mut self, pointer_screen: Point) -> bool {
        if self.gesture.is_some() {
            return false;
        }
        self.gesture = Some(Gesture::Pan(PanState {
            last_screen: pointer_screen,
        }));
        true
    }

    /// Feeds a pointer move into the active gesture, throttled to the
    /// configured rate. Returns whether a frame was committed.
    pub fn update_pointer(&mut self, state: &mut GridState, pointer_screen: Point) -> bool {
        if self.gesture.is_none() {
            return false;
        }

        let now = self.clock.now();
        if let Some(last) = self.last_commit {
            if now.saturating_sub(last) < self.options.pointer_throttle {
                return false;
            }
        }
        self.last_commit = Some(now);

        self.process_pointer(state, pointer_screen);
        true
    }

    /// Ends the active gesture at the given pointer position. The final
    /// position bypasses the throttle so the last frame is never dropped.
    ///
    /// Returns whether a gesture actually ended (and so whether the caller
    /// should treat the state as settled).
    pub fn end_gesture(&mut self, state: &mut GridState, pointer_screen: Point) -> bool {
        if self.gesture.is_none() {
            return false;
        }

        self.process_pointer(state, pointer_screen);

        let Some(gesture) = self.gesture.take() else {
            // The final frame hit a missing lookup and aborted.
            return false;
        };
        self.last_commit = None;

        match gesture {
            Gesture::Drag(drag) => self.finish_drag(state, drag),
            Gesture::Resize(_) | Gesture::Pan(_) => {
                // Resize snaps continuously and pan has nothing to settle
                // beyond the viewport it already moved.
            }
        }
        true
    }

    /// Resolves the gesture to idle without the usual end-of-gesture work.
    /// Used when the pointer is lost (focus change, device removal).
    /// Returns whether a gesture was actually active.
    pub fn cancel(&mut self, state: &mut GridState) -> bool {
        let Some(gesture) = self.gesture.take() else {
            return false;
        };
        self.last_commit = None;

        // Positions committed by earlier frames stay; only snap the target
        // back onto the grid so nothing is left misaligned.
        if let Gesture::Drag(drag) = gesture {
            self.snap_target_in_place(state, drag.target);
        }
        debug!("gesture cancelled, back to idle");
        true
    }

    /// Aborts silently: clears the gesture without any follow-up work.
    fn abort(&mut self, reason: &str) {
        debug!("gesture aborted: {reason}");
        self.gesture = None;
        self.last_commit = None;
    }

    fn process_pointer(&mut self, state: &mut GridState, pointer_screen: Point) {
        match &self.gesture {
            Some(Gesture::Drag(_)) => self.drag_move(state, pointer_screen),
            Some(Gesture::Resize(_)) => self.resize_move(state, pointer_screen),
            Some(Gesture::Pan(_)) => self.pan_move(state, pointer_screen),
            None => {}
        }
    }

    fn pan_move(&mut self, state: &mut GridState, pointer_screen: Point) {
        let Some(Gesture::Pan(pan)) = &mut self.gesture else {
            return;
        };

        let delta = pointer_screen - pan.last_screen;
        pan.last_screen = pointer_screen;
        state.viewport.pan_by(delta);
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    /// World-space content origin of a container.
    fn container_origin(state: &GridState, container: Container) -> Option<Point> {
        match container {
            Container::Main => Some(Point::new(0., 0.)),
            Container::Nest(id) => state.nest_content_origin(id),
        }
    }

    /// The container an item currently belongs to.
    fn container_of(state: &GridState, target: ItemRef) -> Option<Container> {
        match target {
            ItemRef::Widget(id) => {
                let widget = state.widget(id)?;
                Some(match widget.nest {
                    Some(nest) => Container::Nest(nest),
                    None => Container::Main,
                })
            }
            ItemRef::Nest(id) => {
                let nest = state.nest(id)?;
                Some(match nest.parent {
                    Some(parent) => Container::Nest(parent),
                    None => Container::Main,
                })
            }
        }
    }

    /// Sibling geometry of `container`, ascending by id.
    fn siblings_of(
        state: &GridState,
        container: Container,
        exclude: Option<ItemRef>,
    ) -> Vec<(ItemRef, crate::geometry::Rect)> {
        match container {
            Container::Main => state.main_sibling_rects(exclude),
            Container::Nest(id) => state.nest_sibling_rects(id, exclude),
        }
    }

    fn snap_target_in_place(&self, state: &mut GridState, target: ItemRef) {
        let grid = self.options.grid_size;
        let result = match target {
            ItemRef::Widget(id) => state.update_widget(id, |widget| {
                widget.rect.loc = crate::geometry::round_point_to_grid(widget.rect.loc, grid);
            }),
            ItemRef::Nest(id) => state.update_nest(id, |nest| {
                nest.rect.loc = crate::geometry::round_point_to_grid(nest.rect.loc, grid);
            }),
        };
        if let Err(err) = result {
            debug!("snap-in-place skipped: {err}");
        }
    }

    /// Starts a resize on one of the eight handles.
    pub fn begin_resize(
        &mut self,
        state: &GridState,
        target: ItemRef,
        edges: ResizeEdge,
        pointer_screen: Point,
    ) -> bool {
        if self.gesture.is_some() || edges.is_empty() {
            return false;
        }

        let rect = match target {
            ItemRef::Widget(id) => match state.widget(id) {
                Some(widget) => widget.rect,
                None => return false,
            },
            ItemRef::Nest(id) => match state.nest(id) {
                Some(nest) => nest.rect,
                None => return false,
            },
        };

        let pointer_world = state.viewport.screen_to_world(pointer_screen);
        self.gesture = Some(Gesture::Resize(ResizeState {
            target,
            edges,
            start_pointer: pointer_world,
            start_rect: rect,
        }));
        true
    }
}
