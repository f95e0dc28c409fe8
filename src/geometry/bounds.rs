use crate::geometry::Ray;
use crate::math::{gamma, Scalar};
use crate::{Float, Point2i, Point3f, Vec3f};
use cgmath::{Point2, Point3, Vector2, Vector3};
use num::Bounded;
use std::fmt::Error;
use std::mem::swap;

pub type Bounds2f = Bounds2<f32>;
pub type Bounds2i = Bounds2<i32>;
pub type Bounds3f = Bounds3<f32>;

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bounds2<S: Scalar> {
    pub min: Point2<S>,
    pub max: Point2<S>,
}

impl<S: Scalar> Bounds2<S> {
    pub fn empty() -> Self {
        Self {
            min: Point2::max_value(),
            max: Point2::min_value(),
        }
    }

    pub fn with_bounds(min: Point2<S>, max: Point2<S>) -> Self {
        Self { min, max }
    }

    pub fn diagonal(&self) -> Vector2<S> {
        self.max - self.min
    }

    pub fn area(&self) -> S {
        let d = self.diagonal();
        d.x * d.y
    }

    pub fn intersection(&self, other: &Bounds2<S>) -> Bounds2<S> {
        Self::with_bounds(
            Point2::new(
                Scalar::max(self.min.x, other.min.x),
                Scalar::max(self.min.y, other.min.y),
            ),
            Point2::new(
                Scalar::min(self.max.x, other.max.x),
                Scalar::min(self.max.y, other.max.y),
            ),
        )
    }

    pub fn contains(&self, p: Point2<S>) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }

    pub fn dimensions(&self) -> (S, S) {
        (self.max.x - self.min.x, self.max.y - self.min.y)
    }
}

impl<S: Scalar, T> From<(T, T)> for Bounds2<S>
where
    Point2<S>: From<T>,
{
    fn from(t: (T, T)) -> Self {
        Self::with_bounds(t.0.into(), t.1.into())
    }
}

impl Bounds2<i32> {
    pub fn iter_points(self) -> impl Iterator<Item = (i32, i32)> {
        let (x1, x2, y1, y2) = (self.min.x, self.max.x, self.min.y, self.max.y);
        (y1..y2).flat_map(move |y| (x1..x2).map(move |x| (x, y)))
    }

    /// Scanline-ordered tiles covering the bounds; edge tiles are clipped so
    /// tile areas always sum to the full area.
    pub fn iter_tiles(self, tile_size: usize) -> impl Iterator<Item = Bounds2i> {
        let (xmin, xmax, ymin, ymax) = (self.min.x, self.max.x, self.min.y, self.max.y);

        (ymin..ymax).step_by(tile_size).flat_map(move |y| {
            (xmin..xmax).step_by(tile_size).map(move |x| {
                let min = Point2i::new(x, y);
                let max = Point2i::new(
                    Ord::min(x + tile_size as i32, xmax),
                    Ord::min(y + tile_size as i32, ymax),
                );
                Bounds2i::with_bounds(min, max)
            })
        })
    }
}

#[derive(Clone, Copy, PartialEq)]
pub struct Bounds3<S: Scalar> {
    pub min: Point3<S>,
    pub max: Point3<S>,
}

impl<S: Scalar> Bounds3<S> {
    pub fn with_bounds(min: Point3<S>, max: Point3<S>) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self::with_bounds(Point3::max_value(), Point3::min_value())
    }

    pub fn join(&self, other: &Self) -> Self {
        Self::with_bounds(
            Point3::new(
                Scalar::min(self.min.x, other.min.x),
                Scalar::min(self.min.y, other.min.y),
                Scalar::min(self.min.z, other.min.z),
            ),
            Point3::new(
                Scalar::max(self.max.x, other.max.x),
                Scalar::max(self.max.y, other.max.y),
                Scalar::max(self.max.z, other.max.z),
            ),
        )
    }

    pub fn join_point(&self, point: Point3<S>) -> Self {
        Self::with_bounds(
            Point3::new(
                Scalar::min(self.min.x, point.x),
                Scalar::min(self.min.y, point.y),
                Scalar::min(self.min.z, point.z),
            ),
            Point3::new(
                Scalar::max(self.max.x, point.x),
                Scalar::max(self.max.y, point.y),
                Scalar::max(self.max.z, point.z),
            ),
        )
    }

    pub fn diagonal(&self) -> Vector3<S> {
        self.max - self.min
    }

    pub fn maximum_extent(&self) -> usize {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    pub fn is_point(&self) -> bool {
        self.max == self.min
    }
}

impl Bounds3<f32> {
    pub fn centroid(&self) -> Point3f {
        self.min + self.diagonal() * 0.5
    }

    pub fn surface_area(&self) -> Float {
        let d = self.diagonal();
        if d.x < 0.0 || d.y < 0.0 || d.z < 0.0 {
            return 0.0;
        }
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    pub fn volume(&self) -> Float {
        let d = self.diagonal();
        d.x * d.y * d.z
    }

    pub fn contains(&self, p: Point3f) -> bool {
        p.x >= self.min.x && p.x <= self.max.x
            && p.y >= self.min.y && p.y <= self.max.y
            && p.z >= self.min.z && p.z <= self.max.z
    }

    pub fn offset(&self, p: Point3f) -> Vec3f {
        let mut o = p - self.min;
        if self.max.x > self.min.x { o.x /= self.max.x - self.min.x }
        if self.max.y > self.min.y { o.y /= self.max.y - self.min.y }
        if self.max.z > self.min.z { o.z /= self.max.z - self.min.z }
        o
    }

    pub fn bounding_sphere(&self) -> (Point3f, Float) {
        let center = self.centroid();
        let radius = if self.contains(center) {
            let d = self.max - center;
            (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
        } else {
            0.0
        };
        (center, radius)
    }

    /// Slab test against a precomputed reciprocal direction. `inv_dir`
    /// components may be ±∞ for axis-parallel rays; the min/max ordering
    /// still resolves those correctly.
    pub fn intersect_p(&self, ray: &Ray, inv_dir: Vec3f) -> Option<(Float, Float)> {
        let mut t0 = ray.tmin;
        let mut t1 = ray.tmax;

        for i in 0..3 {
            let mut t_near = (self.min[i] - ray.from[i]) * inv_dir[i];
            let mut t_far = (self.max[i] - ray.from[i]) * inv_dir[i];
            if t_near > t_far {
                swap(&mut t_near, &mut t_far);
            }

            // expand t_far to account for fp error in the product above
            t_far *= 1.0 + 2.0 * gamma(3);

            t0 = Float::max(t0, t_near);
            t1 = Float::min(t1, t_far);
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }

    pub fn intersect_test(&self, ray: &Ray) -> Option<(Float, Float)> {
        self.intersect_p(ray, ray.inv_dir())
    }

    /// Clip against another bound; `None` when the boxes are disjoint.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let min = Point3f::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.min.z.max(other.min.z),
        );
        let max = Point3f::new(
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
            self.max.z.min(other.max.z),
        );
        if min.x <= max.x && min.y <= max.y && min.z <= max.z {
            Some(Self::with_bounds(min, max))
        } else {
            None
        }
    }

    pub fn grow(&self, delta: Float) -> Self {
        Self::with_bounds(
            Point3f::new(self.min.x - delta, self.min.y - delta, self.min.z - delta),
            Point3f::new(self.max.x + delta, self.max.y + delta, self.max.z + delta),
        )
    }
}

impl<S: Scalar> std::fmt::Debug for Bounds3<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), Error> {
        let arrmin: [S; 3] = self.min.into();
        let arrmax: [S; 3] = self.max.into();
        write!(f, "Bounds3[{:?}, {:?}]", arrmin, arrmax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_cover_exactly() {
        let bounds = Bounds2i::with_bounds(Point2i::new(0, 0), Point2i::new(100, 70));
        for &tile_size in &[1, 5, 7, 16, 32] {
            let total: i32 = bounds.iter_tiles(tile_size).map(|t| t.area()).sum();
            assert_eq!(bounds.area(), total);
        }
    }

    #[test]
    fn slab_test() {
        let bounds = Bounds3f::with_bounds(
            Point3f::new(1.0, 1.0, 1.0),
            Point3f::new(2.0, 2.0, 2.0),
        );
        let ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(1.0, 1.0, 1.0));
        let (t0, _t1) = bounds.intersect_test(&ray).unwrap();
        assert_eq!(t0, 1.0);

        let miss = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(-1.0, 1.0, 1.0));
        assert!(bounds.intersect_test(&miss).is_none());

        // axis-parallel ray with zero components
        let axis = Ray::new(Point3f::new(1.5, 1.5, 0.0), Vec3f::new(0.0, 0.0, 1.0));
        assert!(bounds.intersect_test(&axis).is_some());
    }

    #[test]
    fn surface_area_of_empty_is_zero() {
        assert_eq!(Bounds3f::empty().surface_area(), 0.0);
    }

    #[test]
    fn intersection_disjoint() {
        let a = Bounds3f::with_bounds(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0));
        let b = Bounds3f::with_bounds(Point3f::new(2.0, 2.0, 2.0), Point3f::new(3.0, 3.0, 3.0));
        assert!(a.intersection(&b).is_none());
        assert!(a.intersection(&a).is_some());
    }
}
