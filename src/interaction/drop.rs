//! Drop from an external widget palette.
//!
//! The palette lives outside the engine; it hands over a serialized template
//! when the user releases a drag over the canvas. The engine materializes the
//! template at the drop point, pushing existing children out of the way.

use serde::{Deserialize, Serialize};

use super::drag::containing_nest;
use super::{Container, InteractionController};
use crate::geometry::{resolve_push, round_point_to_grid, Point, Rect, Size};
use crate::grid::{GridError, GridState, ItemId, Widget};

/// Serialized transfer payload carried by a palette drag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub default_size: Size,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aries_mod_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DropError {
    #[error("malformed drop payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Grid(#[from] GridError),
}

impl InteractionController {
    /// Materializes a palette template at the pointer position.
    ///
    /// The new widget is centered on the pointer and grid-rounded; if the
    /// pointer is over a nest, it lands inside that nest in content-relative
    /// coordinates. Existing children of the destination are pushed before
    /// the insert commits.
    pub fn drop_from_palette(
        &mut self,
        state: &mut GridState,
        payload_json: &str,
        pointer_screen: Point,
    ) -> Result<ItemId, DropError> {
        let payload: DropPayload = serde_json::from_str(payload_json)?;
        let pointer_world = state.viewport.screen_to_world(pointer_screen);
        let grid = self.options.grid_size;
        let size = payload.default_size;

        let destination = match containing_nest(state, pointer_world, None) {
            Some(nest) => Container::Nest(nest),
            None => Container::Main,
        };
        let Some(origin) = Self::container_origin(state, destination) else {
            return Err(DropError::Grid(GridError::MissingNest(match destination {
                Container::Nest(id) => id,
                Container::Main => unreachable!("main grid always has an origin"),
            })));
        };

        // Center the template on the pointer, then snap in the destination's
        // coordinate space.
        let local = round_point_to_grid(
            pointer_world - origin - Point::new(size.w / 2., size.h / 2.),
            grid,
        );
        let rect = Rect::from_loc_and_size(local, size);

        let siblings = Self::siblings_of(state, destination, None);
        let sibling_rects: Vec<_> = siblings.iter().map(|(_, rect)| *rect).collect();
        let resolved = resolve_push(rect, &sibling_rects, grid);

        let mut widget = Widget::new(rect, payload.title, payload.kind);
        widget.module = payload.aries_mod_type;
        if let Container::Nest(nest) = destination {
            widget.nest = Some(nest);
        }
        let id = state.add_widget(widget)?;

        let updates: Vec<_> = siblings
            .iter()
            .zip(&resolved)
            .filter(|(_, pushed)| pushed.pushed)
            .map(|((item, _), pushed)| (*item, pushed.rect.loc))
            .collect();
        if !updates.is_empty() {
            state.apply_positions(&updates)?;
        }

        Ok(id)
    }
}
