//! Point-triangle primitives shared by the spatial queries.

use nalgebra::{Point2, Point3};

/// Squared normal length below which a triangle counts as degenerate.
pub const DEGENERATE_AREA_SQUARED: f64 = 1e-12;

/// Tolerance of the 2D point-in-triangle test.
pub const POINT_IN_TRIANGLE_EPSILON: f64 = 1e-8;

/// Closest point on triangle `abc` to `p`, with its barycentric weights.
///
/// Region-based walk over the triangle's Voronoi regions; the weights are
/// always non-negative and sum to one, degenerate triangles included.
pub fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> (Point3<f64>, [f64; 3]) {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (*a, [1.0, 0.0, 0.0]);
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (*b, [0.0, 1.0, 0.0]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, [1.0 - v, v, 0.0]);
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (*c, [0.0, 0.0, 1.0]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, [1.0 - w, 0.0, w]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, [0.0, 1.0 - w, w]);
    }

    let denom = va + vb + vc;
    if denom.abs() <= f64::MIN_POSITIVE {
        // Zero-area triangle that slipped through the edge regions
        return nearest_corner(p, a, b, c);
    }
    let v = vb / denom;
    let w = vc / denom;
    (a + ab * v + ac * w, [1.0 - v - w, v, w])
}

/// Squared distance from `p` to triangle `abc`.
pub fn point_triangle_distance_squared(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> f64 {
    let (q, _) = closest_point_on_triangle(p, a, b, c);
    (p - q).norm_squared()
}

/// Barycentric weights of `p` against triangle `abc`.
///
/// `p` is first clamped onto the triangle. Degenerate triangles put the full
/// weight on the nearest corner instead of dividing by a vanishing area.
pub fn barycentric_weights(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> [f64; 3] {
    if (b - a).cross(&(c - a)).norm_squared() <= DEGENERATE_AREA_SQUARED {
        return nearest_corner(p, a, b, c).1;
    }
    closest_point_on_triangle(p, a, b, c).1
}

fn nearest_corner(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> (Point3<f64>, [f64; 3]) {
    let da = (p - a).norm_squared();
    let db = (p - b).norm_squared();
    let dc = (p - c).norm_squared();
    if da <= db && da <= dc {
        (*a, [1.0, 0.0, 0.0])
    } else if db <= dc {
        (*b, [0.0, 1.0, 0.0])
    } else {
        (*c, [0.0, 0.0, 1.0])
    }
}

/// UV-space containment test.
///
/// A point counts as inside when it coincides with a corner, lies within
/// [`POINT_IN_TRIANGLE_EPSILON`] of an edge, or is on the same side of all
/// three edges. Works for either winding, so mirrored UV islands match too.
pub fn point_in_triangle_2d(
    p: &Point2<f32>,
    a: &Point2<f32>,
    b: &Point2<f32>,
    c: &Point2<f32>,
) -> bool {
    let p = p.cast::<f64>();
    let [a, b, c] = [a.cast::<f64>(), b.cast::<f64>(), c.cast::<f64>()];

    if p == a || p == b || p == c {
        return true;
    }

    let edge = |u: &Point2<f64>, v: &Point2<f64>| (v - u).perp(&(p - u));
    let e0 = edge(&a, &b);
    let e1 = edge(&b, &c);
    let e2 = edge(&c, &a);
    if (e0 >= 0.0 && e1 >= 0.0 && e2 >= 0.0) || (e0 <= 0.0 && e1 <= 0.0 && e2 <= 0.0) {
        return true;
    }

    let eps2 = POINT_IN_TRIANGLE_EPSILON * POINT_IN_TRIANGLE_EPSILON;
    segment_distance_squared_2d(&p, &a, &b) <= eps2
        || segment_distance_squared_2d(&p, &b, &c) <= eps2
        || segment_distance_squared_2d(&p, &c, &a) <= eps2
}

fn segment_distance_squared_2d(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return (p - a).norm_squared();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm_squared()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> [Point3<f64>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_closest_point_interior() {
        let [a, b, c] = tri();
        let p = Point3::new(0.25, 0.25, 2.0);
        let (q, w) = closest_point_on_triangle(&p, &a, &b, &c);
        assert!((q - Point3::new(0.25, 0.25, 0.0)).norm() < 1e-12);
        assert!((w[0] - 0.5).abs() < 1e-12);
        assert!((w[1] - 0.25).abs() < 1e-12);
        assert!((w[2] - 0.25).abs() < 1e-12);
        assert!((point_triangle_distance_squared(&p, &a, &b, &c) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_closest_point_regions() {
        let [a, b, c] = tri();
        // Vertex region of b
        let (q, w) = closest_point_on_triangle(&Point3::new(2.0, -1.0, 0.0), &a, &b, &c);
        assert_eq!(q, b);
        assert_eq!(w, [0.0, 1.0, 0.0]);

        // Edge region of bc
        let (q, w) = closest_point_on_triangle(&Point3::new(1.0, 1.0, 0.0), &a, &b, &c);
        assert!((q - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
        assert!((w[1] - 0.5).abs() < 1e-12 && (w[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_barycentric_degenerate_picks_nearest_corner() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(2.0, 0.0, 0.0);
        let w = barycentric_weights(&Point3::new(1.9, 0.3, 0.0), &a, &b, &c);
        assert_eq!(w, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_point_in_triangle_2d() {
        let a = Point2::new(0.0f32, 0.0);
        let b = Point2::new(1.0f32, 0.0);
        let c = Point2::new(0.0f32, 1.0);

        assert!(point_in_triangle_2d(&Point2::new(0.2, 0.2), &a, &b, &c));
        // Mirrored winding
        assert!(point_in_triangle_2d(&Point2::new(0.2, 0.2), &a, &c, &b));
        // Corners and edges
        assert!(point_in_triangle_2d(&b, &a, &b, &c));
        assert!(point_in_triangle_2d(&Point2::new(0.5, 0.5), &a, &b, &c));
        assert!(!point_in_triangle_2d(&Point2::new(0.6, 0.6), &a, &b, &c));
        assert!(!point_in_triangle_2d(&Point2::new(-0.1, 0.5), &a, &b, &c));
    }
}
