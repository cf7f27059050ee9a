//! Pure geometry for the grid canvas.
//!
//! Everything in here operates on world units (`f64`) and has no knowledge of
//! items, containers or the store. The push solver and placement search live
//! in [`push`].

mod push;

use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

pub use push::{find_non_colliding_position, nest_auto_size, resolve_push, Pushed};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn downscale(self, scale: f64) -> Self {
        Self::new(self.x / scale, self.y / scale)
    }

    pub fn upscale(self, scale: f64) -> Self {
        Self::new(self.x * scale, self.y * scale)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Point {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub w: f64,
    pub h: f64,
}

impl Size {
    pub fn new(w: f64, h: f64) -> Self {
        Self { w, h }
    }

    pub fn downscale(self, scale: f64) -> Self {
        Self::new(self.w / scale, self.h / scale)
    }

    pub fn upscale(self, scale: f64) -> Self {
        Self::new(self.w * scale, self.h * scale)
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(f64::max(self.w, other.w), f64::max(self.h, other.h))
    }

    pub fn is_finite(self) -> bool {
        self.w.is_finite() && self.h.is_finite()
    }
}

impl From<(f64, f64)> for Size {
    fn from((w, h): (f64, f64)) -> Self {
        Self::new(w, h)
    }
}

/// Axis-aligned rectangle: top-left corner plus size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub loc: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            loc: Point::new(x, y),
            size: Size::new(w, h),
        }
    }

    pub fn from_loc_and_size(loc: impl Into<Point>, size: impl Into<Size>) -> Self {
        Self {
            loc: loc.into(),
            size: size.into(),
        }
    }

    pub fn right(self) -> f64 {
        self.loc.x + self.size.w
    }

    pub fn bottom(self) -> f64 {
        self.loc.y + self.size.h
    }

    pub fn center(self) -> Point {
        Point::new(self.loc.x + self.size.w / 2., self.loc.y + self.size.h / 2.)
    }

    /// Whether the point lies within the rectangle.
    ///
    /// The left/top edges are inclusive, the right/bottom edges exclusive, so
    /// adjacent rectangles never both contain a shared-edge point.
    pub fn contains(self, point: Point) -> bool {
        self.loc.x <= point.x && point.x < self.right() && self.loc.y <= point.y && point.y < self.bottom()
    }

    /// Grows the rectangle by `margin` on every side.
    pub fn expanded(self, margin: f64) -> Self {
        Self {
            loc: Point::new(self.loc.x - margin, self.loc.y - margin),
            size: Size::new(self.size.w + margin * 2., self.size.h + margin * 2.),
        }
    }
}

/// True iff the two rectangles overlap in interior area.
///
/// Strict inequality on all four edges: rectangles that merely share an edge
/// do not collide.
pub fn collides(a: Rect, b: Rect) -> bool {
    a.loc.x < b.right() && b.loc.x < a.right() && a.loc.y < b.bottom() && b.loc.y < a.bottom()
}

/// Nearest multiple of `grid`.
pub fn round_to_grid(value: f64, grid: f64) -> f64 {
    (value / grid).round() * grid
}

/// Smallest multiple of `grid` at or above `value`.
pub fn ceil_to_grid(value: f64, grid: f64) -> f64 {
    (value / grid).ceil() * grid
}

pub fn round_point_to_grid(point: Point, grid: f64) -> Point {
    Point::new(round_to_grid(point.x, grid), round_to_grid(point.y, grid))
}

bitflags::bitflags! {
    /// Which edges of an item a resize gesture grips.
    ///
    /// The eight compass handles are the four edges plus the four corner
    /// combinations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResizeEdge: u32 {
        const TOP = 0b0001;
        const BOTTOM = 0b0010;
        const LEFT = 0b0100;
        const RIGHT = 0b1000;

        const TOP_LEFT = Self::TOP.bits() | Self::LEFT.bits();
        const TOP_RIGHT = Self::TOP.bits() | Self::RIGHT.bits();
        const BOTTOM_LEFT = Self::BOTTOM.bits() | Self::LEFT.bits();
        const BOTTOM_RIGHT = Self::BOTTOM.bits() | Self::RIGHT.bits();

        const LEFT_RIGHT = Self::LEFT.bits() | Self::RIGHT.bits();
        const TOP_BOTTOM = Self::TOP.bits() | Self::BOTTOM.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collides_requires_interior_overlap() {
        let a = Rect::new(0., 0., 100., 100.);

        assert!(collides(a, Rect::new(50., 50., 100., 100.)));
        assert!(collides(a, Rect::new(-50., -50., 100., 100.)));
        // Contained rectangles overlap.
        assert!(collides(a, Rect::new(25., 25., 10., 10.)));
        assert!(collides(Rect::new(25., 25., 10., 10.), a));
    }

    #[test]
    fn touching_edges_do_not_collide() {
        let a = Rect::new(0., 0., 100., 100.);

        assert!(!collides(a, Rect::new(100., 0., 100., 100.)));
        assert!(!collides(a, Rect::new(-100., 0., 100., 100.)));
        assert!(!collides(a, Rect::new(0., 100., 100., 100.)));
        assert!(!collides(a, Rect::new(0., -100., 100., 100.)));
        // Corner contact only.
        assert!(!collides(a, Rect::new(100., 100., 50., 50.)));
    }

    #[test]
    fn disjoint_rects_do_not_collide() {
        let a = Rect::new(0., 0., 100., 100.);
        assert!(!collides(a, Rect::new(250., 0., 100., 100.)));
        assert!(!collides(a, Rect::new(0., 250., 100., 100.)));
    }

    #[test]
    fn contains_is_half_open() {
        let r = Rect::new(10., 10., 20., 20.);

        assert!(r.contains(Point::new(10., 10.)));
        assert!(r.contains(Point::new(29.9, 29.9)));
        assert!(!r.contains(Point::new(30., 20.)));
        assert!(!r.contains(Point::new(20., 30.)));
    }

    #[test]
    fn grid_rounding() {
        assert_eq!(round_to_grid(130., 20.), 140.);
        assert_eq!(round_to_grid(129., 20.), 120.);
        assert_eq!(round_to_grid(-15., 20.), -20.);
        assert_eq!(ceil_to_grid(101., 20.), 120.);
        assert_eq!(ceil_to_grid(100., 20.), 100.);
    }

    #[test]
    fn resize_edge_masks() {
        assert!(ResizeEdge::TOP_LEFT.intersects(ResizeEdge::LEFT_RIGHT));
        assert!(ResizeEdge::TOP_LEFT.intersects(ResizeEdge::TOP_BOTTOM));
        assert!(!ResizeEdge::BOTTOM.intersects(ResizeEdge::LEFT_RIGHT));
        assert!(ResizeEdge::BOTTOM_RIGHT.contains(ResizeEdge::RIGHT));
    }
}
