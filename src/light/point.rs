use crate::color::Rgb;
use crate::geometry::Ray;
use crate::light::{Light, LightSample, PhotonEmit};
use crate::primitive::SurfacePoint;
use crate::sampling::{uniform_sample_sphere, UNIFORM_SPHERE_PDF};
use crate::{Float, Point2f, Point3f};
use cgmath::InnerSpace;
use std::f32::consts::PI;

pub struct PointLight {
    pos: Point3f,
    intensity: Rgb,
}

impl PointLight {
    pub fn new(pos: Point3f, intensity: Rgb) -> Self {
        Self { pos, intensity }
    }
}

impl Light for PointLight {
    fn is_delta(&self) -> bool {
        true
    }

    fn total_energy(&self) -> Rgb {
        self.intensity * (4.0 * PI)
    }

    fn position(&self) -> Option<Point3f> {
        Some(self.pos)
    }

    fn illum_sample(&self, sp: &SurfacePoint, _s1: Float, _s2: Float) -> Option<LightSample> {
        let to_light = self.pos - sp.p;
        let dist2 = to_light.magnitude2();
        if dist2 == 0.0 {
            return None;
        }
        let dist = dist2.sqrt();
        Some(LightSample {
            wi: to_light / dist,
            dist,
            pdf: 1.0,
            color: self.intensity / dist2,
        })
    }

    fn emit_photon(&self, s1: Float, s2: Float, _s3: Float, _s4: Float) -> PhotonEmit {
        let dir = uniform_sample_sphere(Point2f::new(s1, s2));
        PhotonEmit {
            ray: Ray::new(self.pos, dir),
            flux: self.intensity / UNIFORM_SPHERE_PDF,
        }
    }

    fn emit_pdf(&self, _n_light: crate::Vec3f, _wo: crate::Vec3f) -> (Float, Float, Float) {
        (1.0, UNIFORM_SPHERE_PDF, 1.0)
    }
}
