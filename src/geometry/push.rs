//! Push physics and placement search.

use super::{collides, round_to_grid, ceil_to_grid, Point, Rect, Size};

/// Bound for the outward placement search, in grid steps.
const MAX_SEARCH_RADIUS: i32 = 64;

/// Result of [`resolve_push`] for one input rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pushed {
    pub rect: Rect,
    /// Whether the rectangle moved.
    pub pushed: bool,
}

/// Displaces every rectangle in `others` that collides with `moving`.
///
/// Each collider is pushed along one axis only: the axis with the smaller
/// overlap (ties resolve to the vertical axis), in the direction away from
/// `moving`'s center, far enough to sit flush against `moving`'s edge. The
/// result is then rounded to the nearest multiple of `grid`.
///
/// The output is parallel to the input. Callers are expected to pass
/// `others` in a stable order (ascending by item id) so that downstream
/// commits are deterministic for a given input set.
///
/// Rectangles that don't collide with `moving` come back unchanged, so
/// applying this to an already-resolved configuration is a no-op.
pub fn resolve_push(moving: Rect, others: &[Rect], grid: f64) -> Vec<Pushed> {
    others
        .iter()
        .map(|&other| {
            if !collides(moving, other) {
                return Pushed {
                    rect: other,
                    pushed: false,
                };
            }

            let overlap_x =
                f64::min(moving.right(), other.right()) - f64::max(moving.loc.x, other.loc.x);
            let overlap_y =
                f64::min(moving.bottom(), other.bottom()) - f64::max(moving.loc.y, other.loc.y);

            let mut loc = other.loc;
            if overlap_x < overlap_y {
                loc.x = if other.center().x >= moving.center().x {
                    moving.right()
                } else {
                    moving.loc.x - other.size.w
                };
                loc.x = round_to_grid(loc.x, grid);
            } else {
                loc.y = if other.center().y >= moving.center().y {
                    moving.bottom()
                } else {
                    moving.loc.y - other.size.h
                };
                loc.y = round_to_grid(loc.y, grid);
            }

            Pushed {
                rect: Rect {
                    loc,
                    size: other.size,
                },
                pushed: loc != other.loc,
            }
        })
        .collect()
}

/// Finds a position for `candidate` that collides with nothing in `existing`.
///
/// Searches outward from the candidate in square rings of `grid`-sized steps.
/// Bounded: if no free position exists within [`MAX_SEARCH_RADIUS`] steps,
/// the original candidate position is returned unchanged.
pub fn find_non_colliding_position(candidate: Rect, existing: &[Rect], grid: f64) -> Point {
    let free_at = |loc: Point| {
        let probe = Rect {
            loc,
            size: candidate.size,
        };
        !existing.iter().any(|&other| collides(probe, other))
    };

    if free_at(candidate.loc) {
        return candidate.loc;
    }

    for radius in 1..=MAX_SEARCH_RADIUS {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                // Perimeter of the ring only; the interior was already probed.
                if dx.abs() != radius && dy.abs() != radius {
                    continue;
                }

                let loc = Point::new(
                    candidate.loc.x + f64::from(dx) * grid,
                    candidate.loc.y + f64::from(dy) * grid,
                );
                if free_at(loc) {
                    return loc;
                }
            }
        }
    }

    candidate.loc
}

/// Smallest size for a nest that fits all of `children`.
///
/// `children` are in the nest's content coordinate space (below the header).
/// The extent is measured from the content origin, so children at negative
/// offsets overflow rather than grow the container leftwards/upwards. The
/// result includes the header and margin, is rounded up to `grid`, and never
/// goes below `min_size`.
pub fn nest_auto_size(
    children: &[Rect],
    grid: f64,
    header_height: f64,
    margin: f64,
    min_size: Size,
) -> Size {
    let mut max_x: f64 = 0.;
    let mut max_y: f64 = 0.;
    for child in children {
        max_x = f64::max(max_x, child.right());
        max_y = f64::max(max_y, child.bottom());
    }

    let size = Size::new(
        ceil_to_grid(max_x + margin, grid),
        ceil_to_grid(max_y + margin + header_height, grid),
    );
    size.max(min_size)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn push_moves_collider_along_smaller_overlap_axis() {
        // Wide overlap horizontally, narrow vertically: push down.
        let moving = Rect::new(140., 100., 40., 40.);
        let others = [Rect::new(100., 100., 200., 150.)];

        let resolved = resolve_push(moving, &others, 20.);
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].pushed);
        assert_eq!(resolved[0].rect, Rect::new(100., 140., 200., 150.));
        assert!(!collides(moving, resolved[0].rect));
    }

    #[test]
    fn push_direction_follows_centers() {
        let moving = Rect::new(100., 100., 100., 100.);

        // Other's center left of moving's center: pushed left.
        let resolved = resolve_push(moving, &[Rect::new(40., 110., 80., 80.)], 20.);
        assert_eq!(resolved[0].rect.loc, Point::new(20., 110.));

        // Other's center right of moving's center: pushed right.
        let resolved = resolve_push(moving, &[Rect::new(180., 110., 80., 80.)], 20.);
        assert_eq!(resolved[0].rect.loc, Point::new(200., 110.));
    }

    #[test]
    fn push_leaves_non_colliders_alone() {
        let moving = Rect::new(0., 0., 100., 100.);
        let others = [
            Rect::new(100., 0., 100., 100.),
            Rect::new(500., 500., 40., 40.),
        ];

        let resolved = resolve_push(moving, &others, 20.);
        assert!(resolved.iter().all(|p| !p.pushed));
        assert_eq!(resolved[0].rect, others[0]);
        assert_eq!(resolved[1].rect, others[1]);
    }

    #[test]
    fn placement_search_returns_candidate_when_free() {
        let candidate = Rect::new(40., 40., 100., 100.);
        let existing = [Rect::new(300., 300., 100., 100.)];

        assert_eq!(
            find_non_colliding_position(candidate, &existing, 20.),
            Point::new(40., 40.)
        );
    }

    #[test]
    fn placement_search_steps_off_an_occupied_spot() {
        let candidate = Rect::new(0., 0., 100., 100.);
        let existing = [Rect::new(0., 0., 100., 100.)];

        let loc = find_non_colliding_position(candidate, &existing, 20.);
        assert!(!collides(
            Rect {
                loc,
                size: candidate.size
            },
            existing[0]
        ));
    }

    #[test]
    fn placement_search_falls_back_when_everything_is_occupied() {
        let candidate = Rect::new(0., 0., 20., 20.);
        // One giant rectangle covering the whole reachable search area.
        let existing = [Rect::new(-10000., -10000., 20000., 20000.)];

        assert_eq!(
            find_non_colliding_position(candidate, &existing, 20.),
            candidate.loc
        );
    }

    #[test]
    fn auto_size_fits_children_with_header_and_margin() {
        let children = [Rect::new(0., 0., 100., 100.), Rect::new(120., 40., 100., 60.)];

        let size = nest_auto_size(&children, 20., 40., 20., Size::new(200., 150.));
        // Content extent 220x100, plus margin 20 and header 40, ceil to 20.
        assert_eq!(size, Size::new(240., 160.));
    }

    #[test]
    fn auto_size_respects_minimum() {
        let size = nest_auto_size(&[], 20., 40., 20., Size::new(200., 150.));
        assert_eq!(size, Size::new(200., 150.));
    }

    fn arb_rect() -> impl Strategy<Value = Rect> {
        (
            (-25i32..25).prop_map(|v| f64::from(v) * 20.),
            (-25i32..25).prop_map(|v| f64::from(v) * 20.),
            (1i32..10).prop_map(|v| f64::from(v) * 20.),
            (1i32..10).prop_map(|v| f64::from(v) * 20.),
        )
            .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
    }

    proptest! {
        #[test]
        fn collision_is_symmetric(a in arb_rect(), b in arb_rect()) {
            prop_assert_eq!(collides(a, b), collides(b, a));
        }

        #[test]
        fn push_is_idempotent_on_resolved_input(
            moving in arb_rect(),
            others in proptest::collection::vec(arb_rect(), 0..6),
        ) {
            let resolved: Vec<_> = resolve_push(moving, &others, 20.)
                .into_iter()
                .map(|p| p.rect)
                .collect();
            let non_colliding: Vec<_> = resolved
                .into_iter()
                .filter(|&r| !collides(moving, r))
                .collect();

            // Once nothing collides with the mover, a second pass is a no-op.
            let again = resolve_push(moving, &non_colliding, 20.);
            for (pushed, original) in again.iter().zip(&non_colliding) {
                prop_assert!(!pushed.pushed);
                prop_assert_eq!(pushed.rect, *original);
            }
        }

        #[test]
        fn placement_search_result_is_collision_free_or_fallback(
            candidate in arb_rect(),
            existing in proptest::collection::vec(arb_rect(), 0..8),
        ) {
            let loc = find_non_colliding_position(candidate, &existing, 20.);
            let probe = Rect { loc, size: candidate.size };

            let clear = !existing.iter().any(|&other| collides(probe, other));
            prop_assert!(clear || loc == candidate.loc);
        }
    }
}
