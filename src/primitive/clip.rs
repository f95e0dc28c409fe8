use crate::geometry::Bounds3f;
use crate::{Float, Point3f};
use smallvec::SmallVec;

/// Clip vertex kept in double precision; the k-d builder feeds clipped
/// bounds back into split selection, so accumulated error here directly
/// loosens the tree.
type ClipVertex = [f64; 3];

type Polygon = SmallVec<[ClipVertex; 10]>;

/// Sutherland-Hodgman clip of a convex polygon against the six half-spaces
/// of an axis-aligned box. Returns the bound of the clipped polygon, or
/// `None` when the polygon lies entirely outside.
pub fn clip_polygon_to_bound(points: &[Point3f], bound: &Bounds3f) -> Option<Bounds3f> {
    let mut poly: Polygon = points
        .iter()
        .map(|p| [p.x as f64, p.y as f64, p.z as f64])
        .collect();

    for axis in 0..3 {
        let lower = bound.min[axis] as f64;
        let upper = bound.max[axis] as f64;
        poly = clip_half_space(&poly, axis, lower, false)?;
        poly = clip_half_space(&poly, axis, upper, true)?;
    }

    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for v in &poly {
        for i in 0..3 {
            min[i] = min[i].min(v[i]);
            max[i] = max[i].max(v[i]);
        }
    }

    Some(Bounds3f::with_bounds(
        Point3f::new(min[0] as Float, min[1] as Float, min[2] as Float),
        Point3f::new(max[0] as Float, max[1] as Float, max[2] as Float),
    ))
}

fn clip_half_space(poly: &Polygon, axis: usize, plane: f64, keep_below: bool) -> Option<Polygon> {
    let inside = |v: &ClipVertex| {
        if keep_below {
            v[axis] <= plane
        } else {
            v[axis] >= plane
        }
    };

    let mut out = Polygon::new();
    if poly.is_empty() {
        return None;
    }

    for i in 0..poly.len() {
        let current = poly[i];
        let next = poly[(i + 1) % poly.len()];
        let cur_in = inside(&current);
        let next_in = inside(&next);

        if cur_in {
            out.push(current);
        }
        if cur_in != next_in {
            let denom = next[axis] - current[axis];
            // denom can't be zero here: the two vertices sit on opposite
            // sides of the plane
            let t = (plane - current[axis]) / denom;
            let mut isect = [0.0; 3];
            for k in 0..3 {
                isect[k] = current[k] + t * (next[k] - current[k]);
            }
            isect[axis] = plane;
            out.push(isect);
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_box() -> Bounds3f {
        Bounds3f::with_bounds(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn fully_inside_keeps_bound() {
        let tri = [
            Point3f::new(0.1, 0.1, 0.5),
            Point3f::new(0.9, 0.1, 0.5),
            Point3f::new(0.5, 0.9, 0.5),
        ];
        let clipped = clip_polygon_to_bound(&tri, &unit_box()).unwrap();
        assert_abs_diff_eq!(clipped.min.x, 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(clipped.max.y, 0.9, epsilon = 1e-6);
    }

    #[test]
    fn straddling_triangle_is_tightened() {
        // the triangle spans y up to 2.0 but within x <= 1 never rises above
        // y = 0.5; the naive bound intersection would report y up to 1.0
        let tri = [
            Point3f::new(0.0, 0.0, 0.5),
            Point3f::new(4.0, 0.0, 0.5),
            Point3f::new(4.0, 2.0, 0.5),
        ];
        let clipped = clip_polygon_to_bound(&tri, &unit_box()).unwrap();
        assert!(clipped.max.x <= 1.0 + 1e-6);
        assert_abs_diff_eq!(clipped.max.y, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn outside_triangle_rejected() {
        let tri = [
            Point3f::new(2.0, 2.0, 2.0),
            Point3f::new(3.0, 2.0, 2.0),
            Point3f::new(2.0, 3.0, 2.0),
        ];
        assert!(clip_polygon_to_bound(&tri, &unit_box()).is_none());
    }

    #[test]
    fn clip_is_exact_on_plane_crossing() {
        let tri = [
            Point3f::new(-1.0, 0.5, 0.5),
            Point3f::new(2.0, 0.5, 0.5),
            Point3f::new(0.5, 0.6, 0.5),
        ];
        let clipped = clip_polygon_to_bound(&tri, &unit_box()).unwrap();
        assert_abs_diff_eq!(clipped.min.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(clipped.max.x, 1.0, epsilon = 1e-6);
    }
}
