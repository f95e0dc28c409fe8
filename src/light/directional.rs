use crate::color::Rgb;
use crate::geometry::{Bounds3f, Ray};
use crate::light::{Light, LightSample, PhotonEmit};
use crate::math::coordinate_system;
use crate::primitive::SurfacePoint;
use crate::sampling::concentric_sample_disk;
use crate::{Float, Point2f, Point3f, Vec3f};
use cgmath::InnerSpace;
use std::f32::consts::PI;

pub struct DirectionalLight {
    /// Direction towards the light.
    dir: Vec3f,
    radiance: Rgb,
    world_center: Point3f,
    world_radius: Float,
}

impl DirectionalLight {
    pub fn new(dir_to_light: Vec3f, radiance: Rgb) -> Self {
        Self {
            dir: dir_to_light.normalize(),
            radiance,
            world_center: Point3f::new(0.0, 0.0, 0.0),
            world_radius: 1.0,
        }
    }
}

impl Light for DirectionalLight {
    fn is_delta(&self) -> bool {
        true
    }

    fn init(&mut self, world_bound: Bounds3f) {
        let (center, radius) = world_bound.bounding_sphere();
        self.world_center = center;
        self.world_radius = radius.max(1e-3);
    }

    fn total_energy(&self) -> Rgb {
        self.radiance * (PI * self.world_radius * self.world_radius)
    }

    fn illum_sample(&self, _sp: &SurfacePoint, _s1: Float, _s2: Float) -> Option<LightSample> {
        Some(LightSample {
            wi: self.dir,
            dist: 2.0 * self.world_radius,
            pdf: 1.0,
            color: self.radiance,
        })
    }

    /// Photons start on a disc of the scene's bounding-sphere radius, placed
    /// against the light direction outside the scene.
    fn emit_photon(&self, s1: Float, s2: Float, _s3: Float, _s4: Float) -> PhotonEmit {
        let (du, dv) = coordinate_system(self.dir);
        let d = concentric_sample_disk(Point2f::new(s1, s2)) * self.world_radius;
        let from = self.world_center + self.dir * (2.0 * self.world_radius) + du * d.x + dv * d.y;
        let area = PI * self.world_radius * self.world_radius;
        PhotonEmit {
            ray: Ray::new(from, -self.dir),
            flux: self.radiance * area,
        }
    }

    fn emit_pdf(&self, _n_light: Vec3f, _wo: Vec3f) -> (Float, Float, Float) {
        let area = PI * self.world_radius * self.world_radius;
        (1.0 / area, 1.0, 1.0)
    }
}
