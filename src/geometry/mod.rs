use crate::{Float, Point3f, Vec3f};

pub mod bounds;
pub mod transform;

pub use bounds::{Bounds2, Bounds2f, Bounds2i, Bounds3, Bounds3f};
pub use transform::Transform;

pub const INFINITY: Float = std::f32::INFINITY;

/// Semi-infinite ray. `tmin` guards against self-intersection, `tmax` is
/// pulled in as intersections are found.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub from: Point3f,
    pub dir: Vec3f,
    pub tmin: Float,
    pub tmax: Float,
    pub time: Float,
}

impl Ray {
    pub fn new(from: Point3f, dir: Vec3f) -> Self {
        Self {
            from,
            dir,
            tmin: 0.0,
            tmax: INFINITY,
            time: 0.0,
        }
    }

    pub fn with_bounds(from: Point3f, dir: Vec3f, tmin: Float, tmax: Float) -> Self {
        Self { from, dir, tmin, tmax, time: 0.0 }
    }

    pub fn at(&self, t: Float) -> Point3f {
        self.from + self.dir * t
    }

    /// Reciprocal direction for the slab test; zero components map to ±∞ so
    /// the comparisons still order correctly.
    pub fn inv_dir(&self) -> Vec3f {
        Vec3f::new(1.0 / self.dir.x, 1.0 / self.dir.y, 1.0 / self.dir.z)
    }
}

/// Screen-space neighbour rays for texture filtering.
#[derive(Clone, Copy, Debug)]
pub struct Differential {
    pub rx_from: Point3f,
    pub rx_dir: Vec3f,
    pub ry_from: Point3f,
    pub ry_dir: Vec3f,
}

#[derive(Clone, Copy, Debug)]
pub struct RayDifferential {
    pub ray: Ray,
    pub diff: Option<Differential>,
}

impl RayDifferential {
    pub fn new(ray: Ray) -> Self {
        Self { ray, diff: None }
    }

    pub fn scale_differentials(&mut self, s: Float) {
        if let Some(d) = &mut self.diff {
            d.rx_from = self.ray.from + (d.rx_from - self.ray.from) * s;
            d.ry_from = self.ray.from + (d.ry_from - self.ray.from) * s;
            d.rx_dir = self.ray.dir + (d.rx_dir - self.ray.dir) * s;
            d.ry_dir = self.ray.dir + (d.ry_dir - self.ray.dir) * s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inv_dir_zero_component() {
        let r = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 1.0, 0.0));
        let inv = r.inv_dir();
        assert!(inv.x.is_infinite());
        assert_eq!(inv.y, 1.0);
    }
}
