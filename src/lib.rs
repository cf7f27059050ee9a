//! Dashboard grid interaction and layout engine.
//!
//! Pegboard owns the state and the algorithms behind a dashboard canvas:
//! widgets and nest containers on an infinite, zoomable 2-D grid, with
//! drag/resize/pan gestures, collision-driven push physics, undo/redo
//! history, debounced persistence and render culling. Rendering itself is a
//! host concern: a host feeds pointer, keyboard and scroll events into
//! [`Engine`] and reads the resulting state back out every frame.
//!
//! The engine is single-threaded and event-driven. All mutations funnel
//! through the [`grid::GridState`] updaters, every settled mutation lands in
//! the history and arms the persistence dirty flag, and a host-driven
//! [`Engine::tick`] advances the debounce and auto-save machinery. Nothing in
//! here reads wall-clock time for control flow; the [`clock::Clock`] is the
//! only time source, which keeps gesture and retry timing deterministic under
//! test.

use std::time::Duration;

use pegboard_config::Config;

use crate::geometry::Size;

pub mod clock;
pub mod culling;
pub mod engine;
pub mod geometry;
pub mod grid;
pub mod history;
pub mod interaction;
pub mod persist;
pub mod viewport;

#[cfg(test)]
mod tests;

pub use engine::Engine;
pub use grid::{GridState, ItemId, Nest, NestId, Widget};
pub use viewport::Viewport;

/// Configurable properties of the engine, resolved from [`Config`].
///
/// Shared behind `Rc` by everything that needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Snap step in world units.
    pub grid_size: f64,
    pub min_widget_size: Size,
    pub min_nest_size: Size,
    /// Height of the nest title bar; child coordinates start below it.
    pub nest_header_height: f64,
    pub nest_margin: f64,
    pub zoom_min: f64,
    pub zoom_max: f64,
    /// Zoom multiplier applied per wheel detent.
    pub zoom_wheel_step: f64,
    pub history_capacity: usize,
    pub history_debounce: Duration,
    pub autosave_interval: Duration,
    pub autosave_max_retries: u32,
    /// Margin in world units by which the viewport is expanded for culling.
    pub culling_buffer: f64,
    pub pointer_throttle: Duration,
}

impl Options {
    pub fn from_config(config: &Config) -> Self {
        Self {
            grid_size: config.grid.size,
            min_widget_size: Size::new(
                config.grid.min_widget_size.w,
                config.grid.min_widget_size.h,
            ),
            min_nest_size: Size::new(config.grid.min_nest_size.w, config.grid.min_nest_size.h),
            nest_header_height: config.grid.nest_header_height,
            nest_margin: config.grid.nest_margin,
            zoom_min: config.zoom.min,
            zoom_max: config.zoom.max,
            zoom_wheel_step: config.zoom.wheel_step,
            history_capacity: config.history.capacity,
            history_debounce: Duration::from_millis(config.history.debounce_ms),
            autosave_interval: Duration::from_millis(config.autosave.interval_ms),
            autosave_max_retries: config.autosave.max_retries,
            culling_buffer: config.culling.buffer,
            pointer_throttle: Duration::from_millis(config.interaction.pointer_throttle_ms),
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
