use crate::geometry::{Bounds3f, Ray};
use crate::math::coordinate_system;
use crate::{Float, Point2f, Point3f, Vec3f};
use cgmath::InnerSpace;

pub mod clip;
pub mod instance;
pub mod mesh;
pub mod sphere;

pub use instance::Instance;
pub use mesh::{Triangle, TriangleMesh};
pub use sphere::Sphere;

pub type MaterialId = usize;
pub type LightId = usize;
pub type ObjectId = usize;

/// Index of a primitive in the accelerator's array; doubles as the identity
/// used for self-intersection suppression on secondary rays.
pub type PrimId = u32;

/// Raw hit from a primitive's intersection routine: distance along the ray
/// plus surface parameters (barycentrics for triangles).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawHit {
    pub t: Float,
    pub u: Float,
    pub v: Float,
}

/// Result of an accelerator query; immutable once created.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntersectData {
    pub t: Float,
    pub u: Float,
    pub v: Float,
    pub prim: PrimId,
}

impl IntersectData {
    pub fn new(hit: RawHit, prim: PrimId) -> Self {
        Self { t: hit.t, u: hit.u, v: hit.v, prim }
    }

    pub fn raw(&self) -> RawHit {
        RawHit { t: self.t, u: self.u, v: self.v }
    }
}

/// Fully shaded hit point: position, geometric and shading normals, tangent
/// frame, surface parameters and back-references into the scene arenas.
#[derive(Clone, Copy, Debug)]
pub struct SurfacePoint {
    pub p: Point3f,
    /// Geometric normal (true face normal).
    pub ng: Vec3f,
    /// Shading normal (interpolated / bumped).
    pub ns: Vec3f,
    /// Tangent frame around `ns`; `(nu, nv, ns)` is right-handed and
    /// `ns·nu ≈ 0`.
    pub nu: Vec3f,
    pub nv: Vec3f,
    pub uv: Point2f,
    /// Original (object-space) coordinates, for solid texturing.
    pub orco: Point3f,
    pub material: MaterialId,
    pub light: Option<LightId>,
    pub prim: PrimId,
}

impl SurfacePoint {
    /// Completes the tangent frame from a shading normal and a candidate
    /// tangent, projecting out any normal component.
    pub fn make_frame(ns: Vec3f, tangent: Option<Vec3f>) -> (Vec3f, Vec3f) {
        if let Some(t) = tangent {
            let nu = t - ns * ns.dot(t);
            if nu.magnitude2() > 1e-8 {
                let nu = nu.normalize();
                return (nu, ns.cross(nu));
            }
        }
        coordinate_system(ns)
    }

    /// Express a world direction in the local shading frame (z = ns).
    pub fn to_local(&self, w: Vec3f) -> Vec3f {
        Vec3f::new(w.dot(self.nu), w.dot(self.nv), w.dot(self.ns))
    }

    pub fn from_local(&self, w: Vec3f) -> Vec3f {
        self.nu * w.x + self.nv * w.y + self.ns * w.z
    }
}

pub trait Primitive: Send + Sync {
    fn bound(&self) -> Bounds3f;

    fn intersect(&self, ray: &Ray) -> Option<RawHit>;

    fn fill_surface(&self, ray: &Ray, hit: RawHit, prim: PrimId) -> SurfacePoint;

    /// Tightened bound of the part of the primitive inside `bound`; used by
    /// the k-d builder for straddling primitives. The default falls back to
    /// the plain bound intersection.
    fn clip_to_bound(&self, bound: &Bounds3f) -> Option<Bounds3f> {
        self.bound().intersection(bound)
    }

    fn material_id(&self) -> MaterialId;

    fn light_id(&self) -> Option<LightId> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn frame_is_orthonormal_right_handed() {
        let ns = Vec3f::new(0.2, 0.9, -0.3).normalize();
        let (nu, nv) = SurfacePoint::make_frame(ns, Some(Vec3f::new(1.0, 0.0, 0.0)));
        assert_abs_diff_eq!(ns.dot(nu), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ns.dot(nv), 0.0, epsilon = 1e-6);
        let cross = nu.cross(nv);
        assert_abs_diff_eq!(cross.x, ns.x, epsilon = 1e-5);
        assert_abs_diff_eq!(cross.y, ns.y, epsilon = 1e-5);
        assert_abs_diff_eq!(cross.z, ns.z, epsilon = 1e-5);
    }

    #[test]
    fn frame_degenerate_tangent_falls_back() {
        let ns = Vec3f::new(0.0, 0.0, 1.0);
        // tangent parallel to the normal carries no frame information
        let (nu, nv) = SurfacePoint::make_frame(ns, Some(ns * 2.0));
        assert_abs_diff_eq!(ns.dot(nu), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(nu.dot(nv), 0.0, epsilon = 1e-6);
    }
}
