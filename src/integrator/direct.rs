use crate::color::{Rgb, Rgba};
use crate::error::RenderError;
use crate::geometry::RayDifferential;
use crate::integrator::photon::{final_gather, shoot_map, ShootMode};
use crate::integrator::{
    estimate_direct, surface_emission, trace_specular, SurfaceIntegrator,
};
use crate::material::BsdfFlags;
use crate::params::RenderParams;
use crate::photon::PhotonMap;
use crate::scene::Scene;
use crate::state::RenderState;
use tracing::warn;

/// Direct lighting only: emission, next-event estimation and specular
/// continuation. Indirect diffuse comes from a photon map via final gather
/// when enabled, otherwise it is simply absent.
pub struct DirectLightingIntegrator {
    params: RenderParams,
    diffuse_map: Option<PhotonMap>,
    scene_revision: u64,
}

impl DirectLightingIntegrator {
    pub fn new(params: RenderParams) -> Self {
        Self {
            params,
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

        let mut col: Rgb = surface_emission(state, scene, &sp, wo);

        if flags.intersects(BsdfFlags::DIFFUSE | BsdfFlags::GLOSSY) {
            col += estimate_direct(state, scene, &sp, wo, material, &self.params);

            if let Some(map) = &self.diffuse_map {
                col += final_gather(
                    state,
                    scene,
                    map,
                    &sp,
                    wo,
                    self.params.fg_samples,
                    self.params.fg_bounces,
                    &self.params,
                );
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

impl SurfaceIntegrator for DirectLightingIntegrator {
    fn preprocess(&mut self, scene: &Scene, params: &RenderParams) -> Result<(), RenderError> {
        self.params = params.clone();
        if !params.final_gather {
            self.diffuse_map = None;
            return Ok(());
        }
        if self.scene_revision == scene.revision && self.diffuse_map.is_some() {
            return Ok(());
        }
        self.scene_revision = scene.revision;

        self.diffuse_map = match shoot_map(
            scene,
            params.diffuse_photons,
            params.ray_depth.max(4),
            ShootMode::Diffuse,
        ) {
            Ok(map) => Some(map),
            Err(RenderError::PhotonMapEmpty) => {
                warn!("final gather requested but no diffuse photons stored");
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
    use crate::background::Background;
    use crate::camera::{Camera, PerspectiveCamera};
    use crate::geometry::Ray;
    use crate::light::PointLight;
    use crate::material::{ColorInput, Material};
    use crate::scene::SceneBuilder;
    use crate::{Float, Point2i, Point3f, Vec3f};
    use approx::assert_abs_diff_eq;

    fn camera() -> Box<dyn Camera> {
        Box::new(PerspectiveCamera::new(
            Point3f::new(0.0, 0.0, 5.0),
            Point3f::new(0.0, 0.0, 0.0),
            Vec3f::new(0.0, 1.0, 0.0),
            60.0,
            Point2i::new(8, 8),
            None,
        ))
    }

    fn two_triangle_floor(builder: &mut SceneBuilder) {
        builder.create_object("floor");
        builder.add_vertex(Point3f::new(-4.0, 0.0, -4.0));
        builder.add_vertex(Point3f::new(4.0, 0.0, -4.0));
        builder.add_vertex(Point3f::new(4.0, 0.0, 4.0));
        builder.add_vertex(Point3f::new(-4.0, 0.0, 4.0));
        builder.add_face(&[0, 2, 1]);
        builder.add_face(&[0, 3, 2]);
        builder.end_object();
    }

    #[test]
    fn shared_edge_shadow_ray_unoccluded() {
        // two coplanar triangles sharing an edge must not shadow a point on
        // either of them
        let mut builder = SceneBuilder::new();
        builder.set_camera(camera());
        let white = builder.add_material(
            "white",
            Material::Lambert {
                diffuse: ColorInput::Value(Rgb::uniform(1.0)),
                emit: Rgb::BLACK,
            },
        );
        builder.set_current_material(white);
        two_triangle_floor(&mut builder);
        builder.add_light(Box::new(PointLight::new(
            Point3f::new(0.0, 3.0, 0.0),
            Rgb::uniform(9.0),
        )));
        let scene = builder.build().unwrap();

        // hit near the shared diagonal
        let integrator = DirectLightingIntegrator::new(RenderParams::default());
        let mut state = RenderState::new(5);
        let mut ray = RayDifferential::new(Ray::new(
            Point3f::new(0.01, 2.0, 0.0),
            Vec3f::new(0.0, -1.0, 0.0),
        ));
        let out = integrator.integrate(&mut state, &mut ray, &scene);

        // lit from 3 units up: intensity 9 / 9 = 1, cos = 1
        let expected = 1.0 / std::f32::consts::PI;
        assert_abs_diff_eq!(out.r, expected, epsilon = 1e-3);
    }

    #[test]
    fn mirror_chain_respects_ray_depth() {
        let mut builder = SceneBuilder::new();
        builder.set_camera(camera());
        let mirror = builder.add_material(
            "mirror",
            Material::Mirror { color: Rgb::WHITE, reflectance: 1.0 },
        );
        builder.add_sphere("m1", Point3f::new(0.0, 0.0, 0.0), 1.0, mirror);
        builder.set_background(Background::Constant { color: Rgb::uniform(0.5) }, None);
        let scene = builder.build().unwrap();

        let mut params = RenderParams::default();
        params.ray_depth = 3;
        let integrator = DirectLightingIntegrator::new(params);
        let mut state = RenderState::new(5);
        let mut ray = RayDifferential::new(Ray::new(
            Point3f::new(0.0, 0.0, 5.0),
            Vec3f::new(0.0, 0.0, -1.0),
        ));
        let out = integrator.integrate(&mut state, &mut ray, &scene);
        // head-on mirror reflects the ray straight back to the background
        assert_abs_diff_eq!(out.r, 0.5, epsilon = 1e-4);

        // with no recursion budget the mirror contributes nothing
        let mut params = RenderParams::default();
        params.ray_depth = 0;
        let integrator = DirectLightingIntegrator::new(params);
        let mut ray = RayDifferential::new(Ray::new(
            Point3f::new(0.0, 0.0, 5.0),
            Vec3f::new(0.0, 0.0, -1.0),
        ));
        let out = integrator.integrate(&mut state, &mut ray, &scene);
        assert_abs_diff_eq!(out.r, 0.0, epsilon = 1e-6);
        let _: Float = out.a;
    }
}
