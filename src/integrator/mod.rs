use crate::color::{Rgb, Rgba};
use crate::error::RenderError;
use crate::geometry::{Ray, RayDifferential};
use crate::light::Light;
use crate::material::{BsdfFlags, Material, NodeStack, Sample};
use crate::params::RenderParams;
use crate::primitive::SurfacePoint;
use crate::sampler::lowdiscrepancy::{sample02, van_der_corput};
use crate::sampler::mix_seed;
use crate::sampling::power_heuristic;
use crate::scene::Scene;
use crate::state::RenderState;
use crate::{Float, Vec3f};
use cgmath::InnerSpace;

pub mod direct;
pub mod path;
pub mod photon;
pub mod tiled;
pub mod volume;

pub use direct::DirectLightingIntegrator;
pub use path::PathIntegrator;
pub use photon::PhotonIntegrator;
pub use tiled::{RenderStats, TiledDriver};
pub use volume::{EmissionIntegrator, SingleScatterIntegrator};

/// Surface light-transport estimator. `integrate` pulls the ray's `tmax` in
/// to the primary hit so the volume integrator can march the same segment.
pub trait SurfaceIntegrator: Send + Sync {
    fn preprocess(&mut self, _scene: &Scene, _params: &RenderParams) -> Result<(), RenderError> {
        Ok(())
    }

    fn integrate(&self, state: &mut RenderState, ray: &mut RayDifferential, scene: &Scene) -> Rgba;
}

pub trait VolumeIntegrator: Send + Sync {
    /// Transmittance over the ray segment `[tmin, tmax]`.
    fn transmittance(&self, state: &mut RenderState, scene: &Scene, ray: &Ray) -> Rgb;

    /// In-scattered (and emitted) radiance along the segment.
    fn integrate(&self, state: &mut RenderState, scene: &Scene, ray: &Ray) -> Rgb;
}

/// Deterministic per-bounce sample pair from the scrambled (0,2)-sequence.
/// The scramble mixes the pixel identity with the bounce so consecutive
/// bounces decorrelate while staying reproducible.
pub fn bounce_sample(state: &RenderState, bounce: u16, offset: u64) -> (Float, Float) {
    let n = (state.pixel_sample + state.sampling_offs) as u32;
    let scramble = mix_seed(
        state.pixel_number ^ ((bounce as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15)) ^ offset,
    );
    let p = sample02(n, (scramble as u32, (scramble >> 32) as u32));
    (p.x, p.y)
}

pub fn bounce_sample_1d(state: &RenderState, bounce: u16, offset: u64) -> Float {
    let n = (state.pixel_sample + state.sampling_offs) as u32;
    let scramble = mix_seed(
        state.pixel_number
            ^ (bounce as u64 + 0x51).wrapping_mul(0x2545_f491_4f6c_dd1d)
            ^ offset,
    );
    van_der_corput(n, scramble as u32)
}

/// Shadow attenuation towards a light sample: binary when transparent
/// shadows are off, filter-coloured when on; `None` means fully occluded.
fn shadow_attenuation(
    scene: &Scene,
    sp: &SurfacePoint,
    wi: Vec3f,
    dist: Float,
    params: &RenderParams,
) -> Option<Rgb> {
    if params.transparent_shadows {
        scene.transparent_shadow(sp, wi, dist, params.shadow_depth)
    } else if scene.is_shadowed(sp, wi, dist) {
        None
    } else {
        Some(Rgb::WHITE)
    }
}

/// Direct lighting at `sp` from every scene light, light sampling and BSDF
/// sampling combined with the power heuristic. Dirac lights skip MIS.
#[allow(clippy::too_many_arguments)]
pub fn estimate_direct(
    state: &mut RenderState,
    scene: &Scene,
    sp: &SurfacePoint,
    wo: Vec3f,
    material: &Material,
    params: &RenderParams,
) -> Rgb {
    let ctx = scene.shading();
    let flags = BsdfFlags::ALL & !BsdfFlags::SPECULAR;
    let mut total = Rgb::BLACK;

    for (light_id, light) in scene.lights.iter().enumerate() {
        let n = light.n_samples().max(1);
        let inv_n = 1.0 / n as Float;
        let mut col = Rgb::BLACK;

        for _ in 0..n {
            let s1 = state.random();
            let s2 = state.random();

            // light sampling strategy
            if let Some(ls) = light.illum_sample(sp, s1, s2) {
                if ls.pdf > 0.0 && !ls.color.is_black() {
                    let f = material.eval(&ctx, &state.node_stack, sp, wo, ls.wi, flags);
                    if !f.is_black() {
                        if let Some(filter) =
                            shadow_attenuation(scene, sp, ls.wi, ls.dist, params)
                        {
                            if light.is_delta() {
                                col += f * ls.color * filter / ls.pdf;
                            } else {
                                let bsdf_pdf =
                                    material.pdf(&ctx, &state.node_stack, sp, wo, ls.wi, flags);
                                let weight = power_heuristic(1.0, ls.pdf, 1.0, bsdf_pdf);
                                col += f * ls.color * filter * weight / ls.pdf;
                            }
                        }
                    }
                }
            }

            // BSDF sampling strategy; a Dirac light can never be hit this way
            if !light.is_delta() {
                let mut sample = Sample::new(state.random(), state.random(), flags);
                if let Some(result) = material.sample(&ctx, &state.node_stack, sp, wo, &mut sample)
                {
                    if sample.pdf > 0.0 && !result.weight.is_black() {
                        let mut ray = scene.spawn_ray(sp, result.wi);
                        let hit = scene.intersect(&mut ray);

                        match hit {
                            Some(sp_light) if sp_light.light == Some(light_id) => {
                                let mut stack = NodeStack::new();
                                stack.eval_all(&scene.nodes, &sp_light);
                                let emitted = scene.material(sp_light.material).emit(
                                    &ctx,
                                    &stack,
                                    &sp_light,
                                    -result.wi,
                                );
                                if !emitted.is_black() {
                                    let light_pdf = light.illum_pdf(sp.p, &sp_light);
                                    if light_pdf > 0.0 {
                                        let weight =
                                            power_heuristic(1.0, sample.pdf, 1.0, light_pdf);
                                        col += result.weight * emitted * weight;
                                    }
                                }
                            }
                            Some(_) => {}
                            None => {
                                if let Some((env_col, env_pdf)) = light.intersect_env(result.wi) {
                                    if env_pdf > 0.0 && !env_col.is_black() {
                                        let weight =
                                            power_heuristic(1.0, sample.pdf, 1.0, env_pdf);
                                        col += result.weight * env_col * weight;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        total += col * inv_n;
    }

    total
}

/// Emission picked up when a ray hits an emissive surface directly (camera
/// rays and specular chains, where no light sampling preceded the hit).
pub fn surface_emission(
    state: &RenderState,
    scene: &Scene,
    sp: &SurfacePoint,
    wo: Vec3f,
) -> Rgb {
    let ctx = scene.shading();
    scene
        .material(sp.material)
        .emit(&ctx, &state.node_stack, sp, wo)
}

/// Recurse through the material's delta lobes. Shared by the direct-light
/// and photon integrators; the path integrator folds speculars into its
/// bounce loop instead.
pub fn trace_specular<F>(
    state: &mut RenderState,
    scene: &Scene,
    sp: &SurfacePoint,
    wo: Vec3f,
    max_depth: u16,
    trace: &mut F,
) -> Rgb
where
    F: FnMut(&mut RenderState, &mut RayDifferential, &Scene) -> Rgba,
{
    if state.ray_level >= max_depth {
        return Rgb::BLACK;
    }
    let ctx = scene.shading();
    let lobes = scene
        .material(sp.material)
        .specular(&ctx, &state.node_stack, sp, wo);

    let mut col = Rgb::BLACK;
    for (dir, tint) in lobes.reflect.into_iter().chain(lobes.refract) {
        if tint.is_black() {
            continue;
        }
        let mut ray = RayDifferential::new(scene.spawn_ray(sp, dir));
        state.ray_level += 1;
        let li = trace(state, &mut ray, scene);
        state.ray_level -= 1;
        col += tint * li.rgb();
    }
    col
}

/// Cosine of `wi` against the shading normal oriented towards `wo`.
pub fn oriented_cos(sp: &SurfacePoint, wo: Vec3f, wi: Vec3f) -> Float {
    let n = if sp.ns.dot(wo) >= 0.0 { sp.ns } else { -sp.ns };
    n.dot(wi)
}
