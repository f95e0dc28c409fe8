use crate::color::Rgb;
use crate::geometry::Ray;
use crate::integrator::VolumeIntegrator;
use crate::scene::Scene;
use crate::state::RenderState;
use crate::Float;
use cgmath::InnerSpace;

/// Emission-only media: transmittance plus ray-marched glow, no scattering.
pub struct EmissionIntegrator {
    step_size: Float,
}

impl EmissionIntegrator {
    pub fn new(step_size: Float) -> Self {
        Self { step_size }
    }
}

impl Default for EmissionIntegrator {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl VolumeIntegrator for EmissionIntegrator {
    fn transmittance(&self, state: &mut RenderState, scene: &Scene, ray: &Ray) -> Rgb {
        if scene.volumes.is_empty() || ray.tmax <= ray.tmin {
            return Rgb::WHITE;
        }
        scene.volume_transmittance(ray, self.step_size, state.random())
    }

    fn integrate(&self, state: &mut RenderState, scene: &Scene, ray: &Ray) -> Rgb {
        let mut result = Rgb::BLACK;

        for entry in &scene.volumes {
            let region = entry.region.as_ref();
            let (t0, t1) = match region.intersect(ray) {
                Some(t) => t,
                None => continue,
            };
            let t0 = t0.max(ray.tmin);
            let t1 = t1.min(ray.tmax);
            if t1 <= t0 {
                continue;
            }

            let mut transmitted = Rgb::WHITE;
            let mut t = t0 + state.random() * self.step_size;
            while t < t1 {
                let ds = self.step_size.min(t1 - t);
                let p = ray.at(t);
                result += transmitted * region.emission(p, ray.dir) * ds;
                transmitted *= (-(region.sigma_t(p, ray.dir)) * ds).exp();
                t += self.step_size;
            }
        }

        result
    }
}

/// Single-scatter marching: at each step the medium is lit directly, with
/// the phase function and shadow transmittance applied. Steps whose
/// estimated contribution is large are refined with sub-steps.
pub struct SingleScatterIntegrator {
    step_size: Float,
    adaptive: bool,
    /// Use the precomputed per-light attenuation grids instead of marching
    /// shadow rays through the medium.
    optimize: bool,
    adaptive_threshold: Float,
}

impl SingleScatterIntegrator {
    pub fn new(step_size: Float, adaptive: bool, optimize: bool) -> Self {
        Self {
            step_size,
            adaptive,
            optimize,
            adaptive_threshold: 0.05,
        }
    }

    /// Direct light reaching `p` inside `region`, already phase-weighted for
    /// scattering into `wo`.
    fn in_scatter(
        &self,
        state: &mut RenderState,
        scene: &Scene,
        entry: &crate::scene::VolumeEntry,
        p: crate::Point3f,
        wo: crate::Vec3f,
    ) -> Rgb {
        let region = entry.region.as_ref();
        let mut result = Rgb::BLACK;

        for (light_id, light) in scene.lights.iter().enumerate() {
            let fake_sp = probe_point(p);
            let ls = match light.illum_sample(&fake_sp, state.random(), state.random()) {
                Some(ls) => ls,
                None => continue,
            };
            if ls.pdf <= 0.0 || ls.color.is_black() {
                continue;
            }

            // geometry occlusion
            let shadow_ray = Ray::with_bounds(
                p,
                ls.wi,
                scene.shadow_bias(),
                ls.dist - scene.shadow_bias(),
            );
            if shadow_ray.tmax > shadow_ray.tmin
                && scene.accel().intersect_shadow(&shadow_ray, None)
            {
                continue;
            }

            // medium attenuation towards the light
            let medium_tr = if self.optimize {
                match entry.attenuation.get(light_id).and_then(|g| g.as_ref()) {
                    Some(grid) => grid.attenuation(p),
                    None => {
                        (-region.tau(&shadow_ray, self.step_size * 4.0, 0.5).energy()).exp()
                    }
                }
            } else {
                (-region.tau(&shadow_ray, self.step_size, 0.5).energy()).exp()
            };

            let phase = region.phase(ls.wi, wo);
            result += ls.color * (phase * medium_tr / ls.pdf);
        }

        result
    }

    fn march_region(
        &self,
        state: &mut RenderState,
        scene: &Scene,
        entry: &crate::scene::VolumeEntry,
        ray: &Ray,
        t0: Float,
        t1: Float,
        step: Float,
        depth: u8,
    ) -> Rgb {
        let region = entry.region.as_ref();
        let wo = -ray.dir.normalize();
        let mut result = Rgb::BLACK;
        let mut transmitted = Rgb::WHITE;

        let mut t = t0 + state.random() * step;
        while t < t1 {
            let ds = step.min(t1 - t);
            let p = ray.at(t);

            let sigma_s = region.sigma_s(p, ray.dir);
            let emission = region.emission(p, ray.dir);

            if !sigma_s.is_black() {
                let inscatter = self.in_scatter(state, scene, entry, p, wo);
                let contribution = transmitted * sigma_s * inscatter * ds;

                if self.adaptive
                    && depth == 0
                    && contribution.energy() > self.adaptive_threshold
                {
                    // refine this segment with quarter steps
                    result += transmitted
                        * self.march_region(
                            state,
                            scene,
                            entry,
                            ray,
                            t,
                            (t + ds).min(t1),
                            step * 0.25,
                            1,
                        );
                } else {
                    result += contribution;
                }
            }
            result += transmitted * emission * ds;

            transmitted *= (-(region.sigma_t(p, ray.dir)) * ds).exp();
            t += step;
        }

        result
    }
}

impl Default for SingleScatterIntegrator {
    fn default() -> Self {
        Self::new(0.2, false, true)
    }
}

impl VolumeIntegrator for SingleScatterIntegrator {
    fn transmittance(&self, state: &mut RenderState, scene: &Scene, ray: &Ray) -> Rgb {
        if scene.volumes.is_empty() || ray.tmax <= ray.tmin {
            return Rgb::WHITE;
        }
        scene.volume_transmittance(ray, self.step_size, state.random())
    }

    fn integrate(&self, state: &mut RenderState, scene: &Scene, ray: &Ray) -> Rgb {
        let mut result = Rgb::BLACK;
        for entry in &scene.volumes {
            let (t0, t1) = match entry.region.intersect(ray) {
                Some(t) => t,
                None => continue,
            };
            let t0 = t0.max(ray.tmin);
            let t1 = t1.min(ray.tmax);
            if t1 <= t0 {
                continue;
            }
            result += self.march_region(state, scene, entry, ray, t0, t1, self.step_size, 0);
        }
        result
    }
}

/// Lights sample towards surface points; a volume sample point stands in
/// with a unit frame that no light actually reads.
fn probe_point(p: crate::Point3f) -> crate::primitive::SurfacePoint {
    crate::primitive::SurfacePoint {
        p,
        ng: crate::Vec3f::new(0.0, 1.0, 0.0),
        ns: crate::Vec3f::new(0.0, 1.0, 0.0),
        nu: crate::Vec3f::new(1.0, 0.0, 0.0),
        nv: crate::Vec3f::new(0.0, 0.0, 1.0),
        uv: crate::Point2f::new(0.0, 0.0),
        orco: p,
        material: 0,
        light: None,
        prim: crate::primitive::PrimId::max_value(),
    }
}
