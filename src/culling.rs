//! Spatial virtualization: which items are worth handing to the renderer.
//!
//! Culling is a read-only view over the store; items never leave the state,
//! they just drop out of the render set while off-screen. The viewport is
//! expanded by a buffer margin so items pop in slightly before they scroll
//! into view.

use std::collections::{HashMap, HashSet};

use crate::geometry::{collides, Point, Rect, Size};
use crate::grid::{GridState, ItemId, ItemRef, NestId};
use crate::Options;

#[derive(Debug, Clone, Default)]
pub struct CullingReport {
    pub total: usize,
    pub rendered: usize,
    pub culled: usize,
    visible_widgets: HashSet<ItemId>,
    visible_nests: HashSet<NestId>,
}

impl CullingReport {
    pub fn is_widget_visible(&self, id: ItemId) -> bool {
        self.visible_widgets.contains(&id)
    }

    pub fn is_nest_visible(&self, id: NestId) -> bool {
        self.visible_nests.contains(&id)
    }

    /// Share of items culled, for the diagnostics overlay.
    pub fn culled_percentage(&self) -> f64 {
        if self.total == 0 {
            0.
        } else {
            self.culled as f64 / self.total as f64 * 100.
        }
    }
}

/// Classifies every item against the expanded viewport.
///
/// `view_size` is the host's drawing area in screen units. Items listed in
/// `active` (the ongoing gesture's target) are always rendered so they can't
/// vanish mid-drag. A nest's visibility gates all of its children.
pub fn compute_visible(
    state: &GridState,
    view_size: Size,
    active: &[ItemRef],
    options: &Options,
) -> CullingReport {
    let viewport = state.viewport;
    let world_bounds = Rect::from_loc_and_size(
        viewport.screen_to_world(Point::new(0., 0.)),
        view_size.downscale(viewport.zoom),
    )
    .expanded(options.culling_buffer);

    let active_widgets: HashSet<ItemId> = active
        .iter()
        .filter_map(|item| match item {
            ItemRef::Widget(id) => Some(*id),
            ItemRef::Nest(_) => None,
        })
        .collect();
    let active_nests: HashSet<NestId> = active
        .iter()
        .filter_map(|item| match item {
            ItemRef::Nest(id) => Some(*id),
            ItemRef::Widget(_) => None,
        })
        .collect();

    // Nest visibility, parents first. A nested nest needs its whole ancestor
    // chain visible.
    let mut nest_visible: HashMap<NestId, bool> = HashMap::new();
    let mut remaining: Vec<_> = state.nests().collect();
    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|nest| {
            let parent_visible = match nest.parent {
                None => Some(true),
                Some(parent) => nest_visible.get(&parent).copied(),
            };
            let Some(parent_visible) = parent_visible else {
                // Parent not classified yet; retry on the next pass.
                return true;
            };

            let own = state
                .nest_world_rect(nest.id)
                .is_some_and(|rect| collides(rect, world_bounds));
            let visible = active_nests.contains(&nest.id) || (parent_visible && own);
            nest_visible.insert(nest.id, visible);
            false
        });

        // Dangling parents can't happen (store invariant), but don't loop
        // forever if they somehow do.
        if remaining.len() == before {
            for nest in remaining.drain(..) {
                nest_visible.insert(nest.id, false);
            }
        }
    }

    let mut report = CullingReport::default();
    for (id, visible) in &nest_visible {
        report.total += 1;
        if *visible {
            report.visible_nests.insert(*id);
        }
    }

    for widget in state.widgets() {
        report.total += 1;
        let visible = if active_widgets.contains(&widget.id) {
            true
        } else {
            match widget.nest {
                None => collides(widget.rect, world_bounds),
                Some(nest) => {
                    let parent_visible = nest_visible.get(&nest).copied().unwrap_or(false);
                    parent_visible
                        && state
                            .nest_content_origin(nest)
                            .map(|origin| {
                                let world = Rect::from_loc_and_size(
                                    origin + widget.rect.loc,
                                    widget.rect.size,
                                );
                                collides(world, world_bounds)
                            })
                            .unwrap_or(false)
                }
            }
        };
        if visible {
            report.visible_widgets.insert(widget.id);
        }
    }

    report.rendered = report.visible_widgets.len() + report.visible_nests.len();
    report.culled = report.total - report.rendered;
    report
}
