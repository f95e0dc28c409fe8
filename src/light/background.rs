use crate::background::Background;
use crate::color::Rgb;
use crate::geometry::{Bounds3f, Ray};
use crate::light::{Light, LightSample, PhotonEmit};
use crate::math::coordinate_system;
use crate::primitive::SurfacePoint;
use crate::sampling::{
    concentric_sample_disk, uniform_sample_sphere, UNIFORM_SPHERE_PDF,
};
use crate::{Float, Point2f, Point3f, Vec3f};
use std::f32::consts::PI;

/// Environment acting as an infinite-area light. Directions are sampled
/// uniformly over the sphere so the pdf is available in closed form for MIS
/// from both directions.
pub struct BackgroundLight {
    background: Background,
    samples: u32,
    world_center: Point3f,
    world_radius: Float,
}

impl BackgroundLight {
    pub fn new(background: Background, samples: u32) -> Self {
        Self {
            background,
            samples: samples.max(1),
            world_center: Point3f::new(0.0, 0.0, 0.0),
            world_radius: 1.0,
        }
    }
}

impl Light for BackgroundLight {
    fn is_delta(&self) -> bool {
        false
    }

    fn can_intersect(&self) -> bool {
        true
    }

    fn n_samples(&self) -> u32 {
        self.samples
    }

    fn init(&mut self, world_bound: Bounds3f) {
        let (center, radius) = world_bound.bounding_sphere();
        self.world_center = center;
        self.world_radius = radius.max(1e-3);
    }

    fn total_energy(&self) -> Rgb {
        let r = self.world_radius;
        self.background.power() * (4.0 * PI * PI * r * r)
    }

    fn illum_sample(&self, _sp: &SurfacePoint, s1: Float, s2: Float) -> Option<LightSample> {
        let wi = uniform_sample_sphere(Point2f::new(s1, s2));
        Some(LightSample {
            wi,
            dist: 2.0 * self.world_radius,
            pdf: UNIFORM_SPHERE_PDF,
            color: self.background.eval(wi),
        })
    }

    fn intersect_env(&self, dir: Vec3f) -> Option<(Rgb, Float)> {
        Some((self.background.eval(dir), UNIFORM_SPHERE_PDF))
    }

    /// Photons come from the bounding sphere inward: pick an entry direction
    /// then a point on the disc it projects onto.
    fn emit_photon(&self, s1: Float, s2: Float, s3: Float, s4: Float) -> PhotonEmit {
        let toward = uniform_sample_sphere(Point2f::new(s1, s2));
        let (du, dv) = coordinate_system(toward);
        let disk = concentric_sample_disk(Point2f::new(s3, s4)) * self.world_radius;
        let from =
            self.world_center - toward * (2.0 * self.world_radius) + du * disk.x + dv * disk.y;

        let disc_area = PI * self.world_radius * self.world_radius;
        PhotonEmit {
            ray: Ray::new(from, toward),
            flux: self.background.eval(-toward) * (disc_area / UNIFORM_SPHERE_PDF),
        }
    }

    fn emit_pdf(&self, _n_light: Vec3f, _wo: Vec3f) -> (Float, Float, Float) {
        let disc_area = PI * self.world_radius * self.world_radius;
        (1.0 / disc_area, UNIFORM_SPHERE_PDF, 1.0)
    }
}
