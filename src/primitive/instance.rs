use crate::geometry::{Bounds3f, Ray, Transform};
use crate::primitive::{LightId, MaterialId, PrimId, Primitive, RawHit, SurfacePoint};
use cgmath::InnerSpace;
use std::sync::Arc;

/// Transformed reference to a shared base primitive. The ray is taken into
/// object space with an unnormalized direction so `t` values carry over
/// unchanged; the surface point comes back out through the forward
/// transform.
pub struct Instance {
    base: Arc<dyn Primitive>,
    obj_to_world: Transform,
    world_bound: Bounds3f,
}

impl Instance {
    pub fn new(base: Arc<dyn Primitive>, obj_to_world: Transform) -> Self {
        let world_bound = obj_to_world.bounds(&base.bound());
        Self { base, obj_to_world, world_bound }
    }
}

impl Primitive for Instance {
    fn bound(&self) -> Bounds3f {
        self.world_bound
    }

    fn intersect(&self, ray: &Ray) -> Option<RawHit> {
        let local = self.obj_to_world.inverse().ray(ray);
        self.base.intersect(&local)
    }

    fn fill_surface(&self, ray: &Ray, hit: RawHit, prim: PrimId) -> SurfacePoint {
        let local_ray = self.obj_to_world.inverse().ray(ray);
        let local = self.base.fill_surface(&local_ray, hit, prim);

        let ns = self.obj_to_world.normal(local.ns).normalize();
        let ng = self.obj_to_world.normal(local.ng).normalize();
        let (nu, nv) = SurfacePoint::make_frame(ns, Some(self.obj_to_world.vector(local.nu)));

        SurfacePoint {
            p: self.obj_to_world.point(local.p),
            ng,
            ns,
            nu,
            nv,
            // orco keeps the object-space coordinates, which is its point
            orco: local.orco,
            ..local
        }
    }

    fn material_id(&self) -> MaterialId {
        self.base.material_id()
    }

    fn light_id(&self) -> Option<LightId> {
        self.base.light_id()
    }
}
