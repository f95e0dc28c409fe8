use crate::geometry::{Bounds3f, Ray};
use crate::primitive::{LightId, MaterialId, PrimId, Primitive, RawHit, SurfacePoint};
use crate::{Float, Point2f, Point3f, Vec3f};
use cgmath::InnerSpace;
use std::f32::consts::PI;

pub struct Sphere {
    pub center: Point3f,
    pub radius: Float,
    pub material: MaterialId,
    pub light: Option<LightId>,
}

impl Sphere {
    pub fn new(center: Point3f, radius: Float, material: MaterialId) -> Self {
        Self { center, radius, material, light: None }
    }
}

impl Primitive for Sphere {
    fn bound(&self) -> Bounds3f {
        let r = Vec3f::new(self.radius, self.radius, self.radius);
        Bounds3f::with_bounds(self.center - r, self.center + r)
    }

    fn intersect(&self, ray: &Ray) -> Option<RawHit> {
        let oc = ray.from - self.center;
        let a = ray.dir.magnitude2();
        let b = 2.0 * oc.dot(ray.dir);
        let c = oc.magnitude2() - self.radius * self.radius;

        let discrim = b as f64 * b as f64 - 4.0 * a as f64 * c as f64;
        if discrim < 0.0 {
            return None;
        }
        let root = discrim.sqrt() as Float;
        let q = if b < 0.0 { -0.5 * (b - root) } else { -0.5 * (b + root) };
        let (t0, t1) = {
            let t0 = q / a;
            let t1 = c / q;
            if t0 <= t1 { (t0, t1) } else { (t1, t0) }
        };

        let t = if t0 >= ray.tmin && t0 <= ray.tmax {
            t0
        } else if t1 >= ray.tmin && t1 <= ray.tmax {
            t1
        } else {
            return None;
        };

        // spherical parametrization for (u, v)
        let p = ray.at(t);
        let d = (p - self.center).normalize();
        let u = 0.5 + d.z.atan2(d.x) / (2.0 * PI);
        let v = d.y.max(-1.0).min(1.0).acos() / PI;
        Some(RawHit { t, u, v })
    }

    fn fill_surface(&self, ray: &Ray, hit: RawHit, prim: PrimId) -> SurfacePoint {
        let p = ray.at(hit.t);
        let ng = (p - self.center).normalize();
        let (nu, nv) = SurfacePoint::make_frame(ng, None);
        SurfacePoint {
            p,
            ng,
            ns: ng,
            nu,
            nv,
            uv: Point2f::new(hit.u, hit.v),
            orco: p,
            material: self.material,
            light: self.light,
            prim,
        }
    }

    fn material_id(&self) -> MaterialId {
        self.material
    }

    fn light_id(&self) -> Option<LightId> {
        self.light
    }
}
