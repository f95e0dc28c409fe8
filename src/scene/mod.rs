use crate::accel::KdTree;
use crate::background::Background;
use crate::camera::Camera;
use crate::color::Rgb;
use crate::geometry::{Bounds3f, Ray};
use crate::light::Light;
use crate::material::{Material, NodeStack, ShaderNode, ShadingCtx};
use crate::primitive::{MaterialId, SurfacePoint};
use crate::volume::{AttenuationGrid, VolumeRegion};
use crate::Float;

pub mod builder;

pub use builder::SceneBuilder;

/// A volume region together with its per-light precomputed shadow
/// attenuation (indexed like `Scene::lights`; `None` where the light has no
/// position to march towards).
pub struct VolumeEntry {
    pub region: Box<dyn VolumeRegion>,
    pub attenuation: Vec<Option<AttenuationGrid>>,
}

/// Everything the integrators read. Immutable once built; workers share it
/// by plain borrow.
pub struct Scene {
    pub materials: Vec<Material>,
    pub nodes: Vec<ShaderNode>,
    pub lights: Vec<Box<dyn Light>>,
    pub volumes: Vec<VolumeEntry>,
    pub background: Option<Background>,
    pub camera: Box<dyn Camera>,
    /// Monotonic id of the builder state this scene was produced from;
    /// photon maps remember it so a rebuilt scene invalidates them.
    pub revision: u64,
    accel: KdTree,
    world_bound: Bounds3f,
    shadow_bias: Float,
    ray_min_dist: Float,
}

impl Scene {
    pub(crate) fn from_parts(
        materials: Vec<Material>,
        nodes: Vec<ShaderNode>,
        lights: Vec<Box<dyn Light>>,
        volumes: Vec<VolumeEntry>,
        background: Option<Background>,
        camera: Box<dyn Camera>,
        accel: KdTree,
        revision: u64,
        shadow_bias: Float,
        ray_min_dist: Float,
    ) -> Self {
        let world_bound = accel.world_bound();
        // scale the biases with the scene so large worlds do not re-hit
        // their own geometry
        let scale = {
            let d = world_bound.diagonal();
            if d.x.is_finite() && d.x >= 0.0 {
                use cgmath::InnerSpace;
                d.magnitude().max(1.0)
            } else {
                1.0
            }
        };
        Self {
            materials,
            nodes,
            lights,
            volumes,
            background,
            camera,
            revision,
            accel,
            world_bound,
            shadow_bias: shadow_bias * scale,
            ray_min_dist: ray_min_dist * scale,
        }
    }

    pub fn world_bound(&self) -> Bounds3f {
        self.world_bound
    }

    pub fn accel(&self) -> &KdTree {
        &self.accel
    }

    pub fn shadow_bias(&self) -> Float {
        self.shadow_bias
    }

    pub fn ray_min_dist(&self) -> Float {
        self.ray_min_dist
    }

    pub fn material(&self, id: MaterialId) -> &Material {
        &self.materials[id]
    }

    pub fn shading(&self) -> ShadingCtx {
        ShadingCtx {
            materials: &self.materials,
            nodes: &self.nodes,
        }
    }

    pub fn background(&self, ray: &Ray) -> Rgb {
        self.background
            .as_ref()
            .map_or(Rgb::BLACK, |bg| bg.eval(ray.dir))
    }

    /// Nearest surface along the ray. On a hit the ray's `tmax` is pulled in
    /// to the hit distance.
    pub fn intersect(&self, ray: &mut Ray) -> Option<SurfacePoint> {
        let hit = self.accel.intersect(ray)?;
        ray.tmax = hit.t;
        Some(self.accel.prim(hit.prim).fill_surface(ray, hit.raw(), hit.prim))
    }

    /// Secondary ray leaving `sp` in direction `dir`, offset by the scene's
    /// numerical policy.
    pub fn spawn_ray(&self, sp: &SurfacePoint, dir: crate::Vec3f) -> Ray {
        let mut ray = Ray::new(sp.p, dir);
        ray.tmin = self.ray_min_dist;
        ray
    }

    /// Binary shadow query towards a light sample `dist` away.
    pub fn is_shadowed(&self, sp: &SurfacePoint, wi: crate::Vec3f, dist: Float) -> bool {
        let ray = Ray::with_bounds(
            sp.p,
            wi,
            self.shadow_bias,
            dist - self.shadow_bias,
        );
        if ray.tmax <= ray.tmin {
            return false;
        }
        self.accel.intersect_shadow(&ray, Some(sp.prim))
    }

    /// Transparent shadow query: `Some(filter)` with the accumulated
    /// attenuation, `None` when fully occluded. `max_depth` bounds the
    /// transparent chain only (see `shadow_depth`).
    pub fn transparent_shadow(
        &self,
        sp: &SurfacePoint,
        wi: crate::Vec3f,
        dist: Float,
        max_depth: usize,
    ) -> Option<Rgb> {
        let ray = Ray::with_bounds(
            sp.p,
            wi,
            self.shadow_bias,
            dist - self.shadow_bias,
        );
        if ray.tmax <= ray.tmin {
            return Some(Rgb::WHITE);
        }

        let ctx = self.shading();
        // occluder shading must not clobber the caller's node stack
        let mut stack = NodeStack::new();
        self.accel
            .intersect_transparent_shadow(&ray, Some(sp.prim), max_depth, |hit| {
                let prim = self.accel.prim(hit.prim);
                let material = &self.materials[prim.material_id()];
                if !material.is_transparent(&ctx) {
                    return None;
                }
                let osp = prim.fill_surface(&ray, hit.raw(), hit.prim);
                stack.eval_all(&self.nodes, &osp);
                let filter = material.transparency(&ctx, &stack, &osp, -wi);
                if filter.is_black() {
                    None
                } else {
                    Some(filter)
                }
            })
    }

    /// Total transmittance of all volume regions along a ray.
    pub fn volume_transmittance(&self, ray: &Ray, step: Float, offset: Float) -> Rgb {
        let mut tau = Rgb::BLACK;
        for entry in &self.volumes {
            tau += entry.region.tau(ray, step, offset);
        }
        (-tau).exp()
    }
}
