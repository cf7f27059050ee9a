//! Viewport state and zoom/pan arithmetic.
//!
//! The viewport maps between screen and world coordinates:
//! `world = screen / zoom - offset`. The offset is in world units, the zoom
//! is a multiplier clamped to the configured range.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::Options;

/// Zoom factor change per unit of ctrl+trackpad scroll.
const PINCH_ZOOM_SPEED: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Pan offset in world units.
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.,
            y: 0.,
            zoom: 1.,
        }
    }
}

/// Where a scroll event came from. Wheel detents zoom; finger scrolling pans
/// (or pinch-zooms while ctrl is held).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollSource {
    Wheel,
    Finger,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollEvent {
    /// Scroll delta in screen units.
    pub delta: Point,
    pub source: ScrollSource,
    pub ctrl: bool,
    /// Pointer position in screen units; zoom anchors here.
    pub pos: Point,
}

impl Viewport {
    pub fn offset(self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn screen_to_world(self, screen: Point) -> Point {
        screen.downscale(self.zoom) - self.offset()
    }

    pub fn world_to_screen(self, world: Point) -> Point {
        (world + self.offset()).upscale(self.zoom)
    }

    /// Pans so that content follows a pointer moving by `screen_delta`.
    pub fn pan_by(&mut self, screen_delta: Point) {
        self.x += screen_delta.x / self.zoom;
        self.y += screen_delta.y / self.zoom;
    }

    /// Sets the zoom, clamped to the configured range, keeping the world
    /// point under `anchor_screen` stationary on screen.
    pub fn set_zoom(&mut self, zoom: f64, anchor_screen: Point, options: &Options) {
        let new_zoom = zoom.clamp(options.zoom_min, options.zoom_max);
        if new_zoom == self.zoom {
            return;
        }

        let world = self.screen_to_world(anchor_screen);
        self.zoom = new_zoom;
        let offset = anchor_screen.downscale(new_zoom) - world;
        self.x = offset.x;
        self.y = offset.y;
    }

    pub fn zoom_by(&mut self, factor: f64, anchor_screen: Point, options: &Options) {
        self.set_zoom(self.zoom * factor, anchor_screen, options);
    }

    pub fn zoom_in(&mut self, anchor_screen: Point, options: &Options) {
        self.zoom_by(options.zoom_wheel_step, anchor_screen, options);
    }

    pub fn zoom_out(&mut self, anchor_screen: Point, options: &Options) {
        self.zoom_by(1. / options.zoom_wheel_step, anchor_screen, options);
    }

    pub fn reset_zoom(&mut self, anchor_screen: Point, options: &Options) {
        self.set_zoom(1., anchor_screen, options);
    }

    /// Routes a scroll event: mouse wheels zoom in detents, trackpad fingers
    /// pan, and ctrl+finger pinch-zooms continuously.
    pub fn apply_scroll(&mut self, event: ScrollEvent, options: &Options) {
        match (event.source, event.ctrl) {
            (ScrollSource::Wheel, _) => {
                let factor = if event.delta.y < 0. {
                    options.zoom_wheel_step
                } else {
                    1. / options.zoom_wheel_step
                };
                self.zoom_by(factor, event.pos, options);
            }
            (ScrollSource::Finger, true) => {
                let factor = f64::max(1. - event.delta.y * PINCH_ZOOM_SPEED, 0.01);
                self.zoom_by(factor, event.pos, options);
            }
            (ScrollSource::Finger, false) => {
                self.pan_by(Point::new(-event.delta.x, -event.delta.y));
            }
        }
    }
}
