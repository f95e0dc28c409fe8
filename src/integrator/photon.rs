use crate::color::{Rgb, Rgba};
use crate::error::RenderError;
use crate::geometry::RayDifferential;
use crate::integrator::{
    estimate_direct, surface_emission, trace_specular, SurfaceIntegrator,
};
use crate::light::Distribution1d;
use crate::material::{BsdfFlags, Material, NodeStack, PhotonSample};
use crate::params::RenderParams;
use crate::photon::{Photon, PhotonMap};
use crate::primitive::SurfacePoint;
use crate::sampler::lowdiscrepancy::radical_inverse;
use crate::sampler::mix_seed;
use crate::sampling::cosine_sample_hemisphere;
use crate::scene::Scene;
use crate::state::RenderState;
use crate::{Float, Vec3f};
use cgmath::InnerSpace;
use rayon::prelude::*;
use std::f32::consts::PI;
use tracing::{info, warn};

/// Which transport paths a map stores: caustic photons crossed at least one
/// specular surface before landing on a diffuse one; diffuse photons never
/// touched a specular surface.
#[derive(Clone, Copy, PartialEq)]
pub enum ShootMode {
    Caustic,
    Diffuse,
}

const SHOOT_CHUNK: usize = 4096;
/// Jensen cone-filter constant; weights fall off linearly to the gather
/// radius.
const CONE_K: Float = 1.0;

/// Emit `count` photons from the scene's lights and return the built map.
/// Photon indices drive Halton sequences, so the result does not depend on
/// how rayon schedules the chunks.
pub fn shoot_map(
    scene: &Scene,
    count: usize,
    max_bounces: u16,
    mode: ShootMode,
) -> Result<PhotonMap, RenderError> {
    let mut map = PhotonMap::new();
    if count == 0 || scene.lights.is_empty() {
        return Err(RenderError::PhotonMapEmpty);
    }

    let light_power = Distribution1d::new(
        scene
            .lights
            .iter()
            .map(|l| l.total_energy().energy())
            .collect(),
    );
    if light_power.is_empty() {
        return Err(RenderError::PhotonMapEmpty);
    }

    let chunks: Vec<(usize, usize)> = (0..count)
        .step_by(SHOOT_CHUNK)
        .map(|start| (start, (start + SHOOT_CHUNK).min(count)))
        .collect();

    let stored: Vec<Vec<Photon>> = chunks
        .par_iter()
        .map(|&(start, end)| {
            let mut local = Vec::new();
            let mut stack = NodeStack::new();
            for i in start..end {
                shoot_one(scene, &light_power, i, max_bounces, mode, &mut stack, &mut local);
            }
            local
        })
        .collect();

    for chunk in stored {
        map.append(chunk);
    }

    if map.is_empty() {
        return Err(RenderError::PhotonMapEmpty);
    }

    // power carried per photon is flux over emitted paths
    let scale = 1.0 / count as Float;
    let scaled: Vec<Photon> = map
        .photons()
        .iter()
        .map(|p| Photon { power: p.power * scale, ..*p })
        .collect();
    let mut map = PhotonMap::new();
    map.append(scaled);
    map.set_n_paths(count);
    map.build();

    info!(photons = map.len(), emitted = count, "photon map built");
    Ok(map)
}

fn shoot_one(
    scene: &Scene,
    light_power: &Distribution1d,
    index: usize,
    max_bounces: u16,
    mode: ShootMode,
    stack: &mut NodeStack,
    out: &mut Vec<Photon>,
) {
    let n = index as u64 + 1;
    // Halton dimensions 2..11 cover light choice, emission and the first
    // bounces; deeper bounces switch to a hash-seeded remainder
    let pick = radical_inverse(0, n);
    let (light_idx, light_pdf) = light_power.sample(pick);
    if light_pdf <= 0.0 {
        return;
    }

    let s1 = radical_inverse(1, n);
    let s2 = radical_inverse(2, n);
    let s3 = radical_inverse(3, n);
    let s4 = radical_inverse(4, n);

    let emit = scene.lights[light_idx].emit_photon(s1, s2, s3, s4);
    let mut power = emit.flux / light_pdf;
    if power.is_black() {
        return;
    }

    let ctx = scene.shading();
    let mut ray = emit.ray;
    ray.tmin = scene.ray_min_dist();
    // true while every bounce so far was specular
    let mut specular_chain = true;
    let mut any_specular = false;

    for bounce in 0..max_bounces {
        let sp = match scene.intersect(&mut ray) {
            Some(sp) => sp,
            None => return,
        };

        let material = scene.material(sp.material);
        stack.eval_all(&scene.nodes, &sp);
        let flags = material.flags(&ctx);

        let diffuse_here = flags.contains(BsdfFlags::DIFFUSE) || flags.contains(BsdfFlags::GLOSSY);
        if diffuse_here {
            let store = match mode {
                ShootMode::Caustic => any_specular && specular_chain,
                ShootMode::Diffuse => !any_specular,
            };
            if store {
                out.push(Photon {
                    pos: sp.p,
                    dir: ray.dir,
                    power,
                    normal: sp.ng,
                });
                if mode == ShootMode::Caustic {
                    // the chain is no longer a pure caustic path
                    return;
                }
            }
        }

        // scatter
        let dim = 5 + 3 * bounce as usize;
        let (b1, b2, b3) = if dim + 2 < 32 {
            (
                radical_inverse(dim, n),
                radical_inverse(dim + 1, n),
                radical_inverse(dim + 2, n),
            )
        } else {
            let h = mix_seed(n ^ ((bounce as u64) << 32));
            (
                (h & 0xffff) as Float / 65536.0,
                ((h >> 16) & 0xffff) as Float / 65536.0,
                ((h >> 32) & 0xffff) as Float / 65536.0,
            )
        };

        let mut ps = PhotonSample::new(b1, b2, b3, BsdfFlags::ALL);
        let wi = -ray.dir;
        let wo = match material.scatter_photon(&ctx, stack, &sp, wi, &mut ps) {
            Some(wo) => wo,
            None => return,
        };

        let tint = ps.color;
        if tint.is_black() {
            return;
        }

        // Russian roulette with power compensation
        let survival = tint.max_component().min(0.95);
        let rr = {
            let h = mix_seed(n.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ (bounce as u64 + 7));
            (h & 0xffff_ffff) as Float / 4_294_967_296.0
        };
        if rr >= survival {
            return;
        }
        power = power * tint / survival;

        let was_specular = ps
            .s
            .sampled_flags
            .intersects(BsdfFlags::SPECULAR | BsdfFlags::FILTER);
        any_specular = any_specular || was_specular;
        specular_chain = specular_chain && was_specular;

        ray = scene.spawn_ray(&sp, wo);
    }
}

/// Density estimate `L_r ≈ (1/πr²)·Σ f·Φ` over the k nearest photons, cone
/// filtered, front-facing photons only.
pub fn radiance_estimate(
    map: &PhotonMap,
    scene: &Scene,
    stack: &NodeStack,
    sp: &SurfacePoint,
    wo: Vec3f,
    material: &Material,
    n_search: usize,
    max_radius: Float,
) -> Rgb {
    if map.is_empty() {
        return Rgb::BLACK;
    }
    let (found, r2) = map.gather(sp.p, n_search, max_radius * max_radius);
    if found.len() < 3 || r2 <= 0.0 {
        return Rgb::BLACK;
    }

    let ctx = scene.shading();
    let r = r2.sqrt();
    let norm = 1.0 - 2.0 / (3.0 * CONE_K);
    let mut sum = Rgb::BLACK;

    for f in &found {
        let photon = map.photon(f.idx);
        // only photons arriving on the shading side contribute
        if photon.dir.dot(sp.ns) >= 0.0 {
            continue;
        }
        let wi = -photon.dir;
        let bsdf = material.eval(&ctx, stack, sp, wo, wi, BsdfFlags::ALL & !BsdfFlags::SPECULAR);
        if bsdf.is_black() {
            continue;
        }
        let cone = 1.0 - f.dist2.sqrt() / (CONE_K * r);
        // eval includes the cosine which the density estimate does not want
        let cos_wi = sp.ns.dot(wi).abs().max(1e-4);
        sum += bsdf * (cone / cos_wi) * photon.power;
    }

    sum / (PI * r2 * norm)
}

/// Final gather: N hemisphere rays reading the diffuse map at whatever they
/// hit; specular surfaces pass the gather ray along up to `bounces` times.
#[allow(clippy::too_many_arguments)]
pub fn final_gather(
    state: &mut RenderState,
    scene: &Scene,
    map: &PhotonMap,
    sp: &SurfacePoint,
    wo: Vec3f,
    n_samples: usize,
    bounces: u16,
    params: &RenderParams,
) -> Rgb {
    let ctx = scene.shading();
    let material = scene.material(sp.material);
    let n_oriented = if sp.ns.dot(wo) >= 0.0 { sp.ns } else { -sp.ns };
    let (nu, nv) = SurfacePoint::make_frame(n_oriented, Some(sp.nu));

    let albedo = material.eval(
        &ctx,
        &state.node_stack,
        sp,
        wo,
        n_oriented,
        BsdfFlags::DIFFUSE | BsdfFlags::REFLECT,
    );
    if albedo.is_black() {
        return Rgb::BLACK;
    }

    let mut sum = Rgb::BLACK;
    let mut gather_stack = NodeStack::new();

    for _ in 0..n_samples {
        let u = crate::Point2f::new(state.random(), state.random());
        let local = cosine_sample_hemisphere(u);
        let dir = nu * local.x + nv * local.y + n_oriented * local.z;

        let mut ray = scene.spawn_ray(sp, dir);
        let mut throughput = Rgb::WHITE;
        let mut current_dir = dir;

        for _ in 0..=bounces {
            let hit = match scene.intersect(&mut ray) {
                Some(hit) => hit,
                None => break,
            };
            let hit_material = scene.material(hit.material);
            gather_stack.eval_all(&scene.nodes, &hit);
            let flags = hit_material.flags(&ctx);

            if flags.intersects(BsdfFlags::DIFFUSE | BsdfFlags::GLOSSY) {
                let li = radiance_estimate(
                    map,
                    scene,
                    &gather_stack,
                    &hit,
                    -current_dir,
                    hit_material,
                    params.search,
                    params.photon_radius,
                );
                sum += throughput * li;
                break;
            }

            // pass through delta surfaces so gather rays see caustics targets
            let lobes = hit_material.specular(&ctx, &gather_stack, &hit, -current_dir);
            let next = lobes.refract.or(lobes.reflect);
            match next {
                Some((next_dir, tint)) if !tint.is_black() => {
                    throughput *= tint;
                    current_dir = next_dir;
                    ray = scene.spawn_ray(&hit, next_dir);
                }
                _ => break,
            }
        }
    }

    // cosine pdf cancels the gather cosine; π folds the lambertian f into
    // the albedo returned by eval
    albedo * PI * (sum / n_samples as Float)
}

/// Photon-mapping surface integrator: MIS direct light, caustic map lookup,
/// diffuse map either read directly or refined through final gather.
pub struct PhotonIntegrator {
    params: RenderParams,
    caustic_map: Option<PhotonMap>,
    diffuse_map: Option<PhotonMap>,
    scene_revision: u64,
}

impl PhotonIntegrator {
    pub fn new(params: RenderParams) -> Self {
        Self {
            params,
            caustic_map: None,
            diffuse_map: None,
            scene_revision: u64::max_value(),
        }
    }

    fn radiance(
        &self,
        state: &mut RenderState,
        ray: &mut RayDifferential,
        scene: &Scene,
    ) -> Rgba {
        let sp = match scene.intersect(&mut ray.ray) {
            Some(sp) => sp,
            None => {
                let bg = scene.background(&ray.ray);
                return Rgba::new(bg.r, bg.g, bg.b, 0.0);
            }
        };

        let ctx = scene.shading();
        let material = scene.material(sp.material);
        let wo = -ray.ray.dir;
        let flags = material.init_bsdf(&ctx, state, &sp);

        let mut col = surface_emission(state, scene, &sp, wo);

        if flags.intersects(BsdfFlags::DIFFUSE | BsdfFlags::GLOSSY) {
            col += estimate_direct(state, scene, &sp, wo, material, &self.params);

            if let Some(caustics) = &self.caustic_map {
                col += radiance_estimate(
                    caustics,
                    scene,
                    &state.node_stack,
                    &sp,
                    wo,
                    material,
                    self.params.search.min(self.params.caustic_mix),
                    self.params.photon_radius,
                );
            }

            if let Some(diffuse) = &self.diffuse_map {
                if self.params.final_gather {
                    col += final_gather(
                        state,
                        scene,
                        diffuse,
                        &sp,
                        wo,
                        self.params.fg_samples,
                        self.params.fg_bounces,
                        &self.params,
                    );
                } else {
                    col += radiance_estimate(
                        diffuse,
                        scene,
                        &state.node_stack,
                        &sp,
                        wo,
                        material,
                        self.params.search,
                        self.params.photon_radius,
                    );
                }
            }
        }

        col += trace_specular(
            state,
            scene,
            &sp,
            wo,
            self.params.ray_depth,
            &mut |state, ray, scene| self.radiance(state, ray, scene),
        );

        let alpha = material.alpha(&ctx, &state.node_stack, &sp, wo);
        let mut out: Rgba = col.into();
        out.a = alpha;
        out
    }
}

impl SurfaceIntegrator for PhotonIntegrator {
    fn preprocess(&mut self, scene: &Scene, params: &RenderParams) -> Result<(), RenderError> {
        self.params = params.clone();

        // a scene rebuild invalidates any maps from earlier renders
        if self.scene_revision == scene.revision
            && (self.caustic_map.is_some() || self.diffuse_map.is_some())
        {
            return Ok(());
        }
        self.scene_revision = scene.revision;

        self.caustic_map = match shoot_map(
            scene,
            params.caustic_photons,
            params.ray_depth.max(4),
            ShootMode::Caustic,
        ) {
            Ok(map) => Some(map),
            Err(RenderError::PhotonMapEmpty) => {
                warn!("caustic photon pass stored nothing, caustics disabled");
                None
            }
            Err(e) => return Err(e),
        };

        self.diffuse_map = match shoot_map(
            scene,
            params.diffuse_photons,
            params.ray_depth.max(4),
            ShootMode::Diffuse,
        ) {
            Ok(map) => Some(map),
            Err(RenderError::PhotonMapEmpty) => {
                warn!("diffuse photon pass stored nothing, indirect diffuse disabled");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(())
    }

    fn integrate(&self, state: &mut RenderState, ray: &mut RayDifferential, scene: &Scene) -> Rgba {
        self.radiance(state, ray, scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Camera, PerspectiveCamera};
    use crate::light::PointLight;
    use crate::material::ColorInput;
    use crate::scene::SceneBuilder;
    use crate::{Point2i, Point3f};

    fn camera() -> Box<dyn Camera> {
        Box::new(PerspectiveCamera::new(
            Point3f::new(0.0, 1.0, 4.0),
            Point3f::new(0.0, 0.0, 0.0),
            Vec3f::new(0.0, 1.0, 0.0),
            60.0,
            Point2i::new(16, 16),
            None,
        ))
    }

    fn floor_scene() -> Scene {
        let mut builder = SceneBuilder::new();
        builder.set_camera(camera());
        let floor = builder.add_material(
            "floor",
            Material::Lambert {
                diffuse: ColorInput::Value(Rgb::uniform(0.8)),
                emit: Rgb::BLACK,
            },
        );
        builder.set_current_material(floor);
        builder.create_object("floor");
        builder.add_vertex(Point3f::new(-5.0, 0.0, -5.0));
        builder.add_vertex(Point3f::new(5.0, 0.0, -5.0));
        builder.add_vertex(Point3f::new(5.0, 0.0, 5.0));
        builder.add_vertex(Point3f::new(-5.0, 0.0, 5.0));
        builder.add_face(&[0, 2, 1]);
        builder.add_face(&[0, 3, 2]);
        builder.end_object();
        builder.add_light(Box::new(PointLight::new(
            Point3f::new(0.0, 4.0, 0.0),
            Rgb::uniform(20.0),
        )));
        builder.build().unwrap()
    }

    #[test]
    fn diffuse_shoot_stores_photons() {
        let scene = floor_scene();
        let map = shoot_map(&scene, 2000, 4, ShootMode::Diffuse).unwrap();
        assert!(map.len() > 100, "only {} photons stored", map.len());
        assert_eq!(map.n_paths(), 2000);
        // photons land on the floor
        for p in map.photons().iter().take(20) {
            assert!(p.pos.y.abs() < 1e-3);
            // arriving from above
            assert!(p.dir.y < 0.0);
        }
    }

    #[test]
    fn caustic_shoot_without_specular_is_empty() {
        let scene = floor_scene();
        match shoot_map(&scene, 500, 4, ShootMode::Caustic) {
            Err(RenderError::PhotonMapEmpty) => {}
            other => panic!("expected empty caustic map, got {:?}", other.map(|m| m.len())),
        }
    }

    #[test]
    fn shooting_is_deterministic() {
        let scene = floor_scene();
        let a = shoot_map(&scene, 1000, 4, ShootMode::Diffuse).unwrap();
        let b = shoot_map(&scene, 1000, 4, ShootMode::Diffuse).unwrap();
        assert_eq!(a.len(), b.len());
        assert_eq!(a.photons()[0], b.photons()[0]);
    }

    #[test]
    fn photon_integrator_end_to_end() {
        let scene = floor_scene();
        let mut params = RenderParams::default();
        params.diffuse_photons = 5000;
        params.caustic_photons = 1000;
        params.search = 32;
        params.photon_radius = 2.0;

        let mut integrator = PhotonIntegrator::new(params.clone());
        integrator.preprocess(&scene, &params).unwrap();

        let mut state = RenderState::new(2);
        let mut ray = RayDifferential::new(crate::geometry::Ray::new(
            Point3f::new(0.0, 2.0, 0.0),
            Vec3f::new(0.0, -1.0, 0.0),
        ));
        let out = integrator.integrate(&mut state, &mut ray, &scene);
        assert!(out.is_finite());
        // direct light plus the diffuse-map estimate must light the floor
        assert!(out.r > 0.0);
        assert_eq!(out.a, 1.0);
    }

    #[test]
    fn radiance_estimate_sees_light() {
        let scene = floor_scene();
        let map = shoot_map(&scene, 20_000, 4, ShootMode::Diffuse).unwrap();

        let mut state = RenderState::new(1);
        let mut ray = RayDifferential::new(crate::geometry::Ray::new(
            Point3f::new(0.0, 2.0, 0.0),
            Vec3f::new(0.0, -1.0, 0.0),
        ));
        let sp = scene.intersect(&mut ray.ray).unwrap();
        let ctx = scene.shading();
        let material = scene.material(sp.material);
        material.init_bsdf(&ctx, &mut state, &sp);

        let l = radiance_estimate(
            &map,
            &scene,
            &state.node_stack,
            &sp,
            Vec3f::new(0.0, 1.0, 0.0),
            material,
            64,
            2.0,
        );
        assert!(l.r > 0.0, "estimate should be positive under a lit floor");
    }
}
