//! Convex hull and corner-ordering primitives.

use nalgebra::Point2;

/// Upper bound on vertices emitted by the wrap loop. Real marker hulls stay
/// far below this.
pub const HULL_VERTEX_CAP: usize = 64;

/// Cross-product orientation test for the directed turn `p -> q -> r`.
///
/// Negative means a clockwise turn under the image convention (y grows
/// downward). The hull walk keeps a single winding direction by accepting
/// candidates while this is negative.
#[inline]
pub fn orientation(p: Point2<f32>, q: Point2<f32>, r: Point2<f32>) -> f32 {
    (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y)
}

/// Jarvis-march (gift wrapping) convex hull of a 2D point set.
///
/// Starts from the leftmost point and wraps until it returns to the start
/// or hits [`HULL_VERTEX_CAP`]. Returns the hull vertices in winding order;
/// fewer than 3 input points come back unchanged.
pub fn convex_hull(points: &[Point2<f32>]) -> Vec<Point2<f32>> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut left = 0;
    for (i, p) in points.iter().enumerate() {
        if p.x < points[left].x {
            left = i;
        }
    }

    let dist2 = |a: Point2<f32>, b: Point2<f32>| {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        dx * dx + dy * dy
    };

    let mut hull = Vec::new();
    let mut p = left;
    loop {
        hull.push(points[p]);
        let mut q = (p + 1) % points.len();
        for r in 0..points.len() {
            let o = orientation(points[p], points[r], points[q]);
            // Strictly-right candidate wins; among collinear candidates the
            // farthest wins, so runs of edge points collapse to endpoints.
            if o < 0.0 || (o == 0.0 && dist2(points[p], points[r]) > dist2(points[p], points[q])) {
                q = r;
            }
        }
        p = q;
        if p == left || hull.len() >= HULL_VERTEX_CAP {
            break;
        }
    }
    hull
}

/// Assign tl/tr/br/bl corners from a hull by coordinate sums/differences:
/// tl = min(x+y), br = max(x+y), tr = min(x-y), bl = max(x-y).
///
/// Returns `None` for hulls with fewer than 4 vertices (a detection
/// failure, not an error).
///
/// Known limitation: the heuristic only holds while the target plane is
/// close to axis-aligned in camera view; it misassigns corners under large
/// in-plane rotation.
pub fn order_corners(hull: &[Point2<f32>]) -> Option<[Point2<f32>; 4]> {
    if hull.len() < 4 {
        return None;
    }

    let sum = |p: &Point2<f32>| p.x + p.y;
    let diff = |p: &Point2<f32>| p.x - p.y;

    let mut tl = hull[0];
    let mut br = hull[0];
    let mut tr = hull[0];
    let mut bl = hull[0];
    for p in &hull[1..] {
        if sum(p) < sum(&tl) {
            tl = *p;
        }
        if sum(p) > sum(&br) {
            br = *p;
        }
        if diff(p) < diff(&tr) {
            tr = *p;
        }
        if diff(p) > diff(&bl) {
            bl = *p;
        }
    }
    Some([tl, tr, br, bl])
}
