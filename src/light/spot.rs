use crate::color::Rgb;
use crate::geometry::Ray;
use crate::light::{Light, LightSample, PhotonEmit};
use crate::math::coordinate_system;
use crate::primitive::SurfacePoint;
use crate::sampling::{uniform_cone_pdf, uniform_sample_cone};
use crate::{Float, Point2f, Point3f, Vec3f};
use cgmath::InnerSpace;
use std::f32::consts::PI;

/// Spot with a hard outer cone and a smoothstep falloff from the inner cone
/// outward.
pub struct SpotLight {
    pos: Point3f,
    dir: Vec3f,
    du: Vec3f,
    dv: Vec3f,
    intensity: Rgb,
    cos_inner: Float,
    cos_outer: Float,
}

impl SpotLight {
    pub fn new(
        pos: Point3f,
        target: Point3f,
        intensity: Rgb,
        cone_angle_degrees: Float,
        falloff_fraction: Float,
    ) -> Self {
        let dir = (target - pos).normalize();
        let (du, dv) = coordinate_system(dir);
        let cos_outer = cone_angle_degrees.to_radians().cos();
        let cos_inner = (cone_angle_degrees.to_radians() * (1.0 - falloff_fraction)).cos();
        Self {
            pos,
            dir,
            du,
            dv,
            intensity,
            cos_inner,
            cos_outer,
        }
    }

    fn falloff(&self, w: Vec3f) -> Float {
        // w points from the light outward
        let cos_theta = self.dir.dot(w);
        if cos_theta < self.cos_outer {
            return 0.0;
        }
        if cos_theta >= self.cos_inner {
            return 1.0;
        }
        let d = (cos_theta - self.cos_outer) / (self.cos_inner - self.cos_outer);
        d * d * (3.0 - 2.0 * d)
    }
}

impl Light for SpotLight {
    fn is_delta(&self) -> bool {
        true
    }

    fn total_energy(&self) -> Rgb {
        // solid angle of the outer cone
        self.intensity * (2.0 * PI * (1.0 - 0.5 * (self.cos_inner + self.cos_outer)))
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
        let wi = to_light / dist;
        let atten = self.falloff(-wi);
        if atten <= 0.0 {
            return None;
        }
        Some(LightSample {
            wi,
            dist,
            pdf: 1.0,
            color: self.intensity * (atten / dist2),
        })
    }

    fn emit_photon(&self, s1: Float, s2: Float, _s3: Float, _s4: Float) -> PhotonEmit {
        let local = uniform_sample_cone(Point2f::new(s1, s2), self.cos_outer);
        let dir = self.du * local.x + self.dv * local.y + self.dir * local.z;
        let ipdf = 1.0 / uniform_cone_pdf(self.cos_outer);
        PhotonEmit {
            ray: Ray::new(self.pos, dir),
            flux: self.intensity * self.falloff(dir) * ipdf,
        }
    }

    fn emit_pdf(&self, _n_light: Vec3f, wo: Vec3f) -> (Float, Float, Float) {
        let dir_pdf = if self.dir.dot(wo) >= self.cos_outer {
            uniform_cone_pdf(self.cos_outer)
        } else {
            0.0
        };
        (1.0, dir_pdf, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sp_at(p: Point3f) -> SurfacePoint {
        SurfacePoint {
            p,
            ng: Vec3f::new(0.0, 1.0, 0.0),
            ns: Vec3f::new(0.0, 1.0, 0.0),
            nu: Vec3f::new(1.0, 0.0, 0.0),
            nv: Vec3f::new(0.0, 0.0, 1.0),
            uv: Point2f::new(0.0, 0.0),
            orco: p,
            material: 0,
            light: None,
            prim: 0,
        }
    }

    #[test]
    fn inside_cone_full_intensity() {
        let light = SpotLight::new(
            Point3f::new(0.0, 4.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
            Rgb::uniform(16.0),
            30.0,
            0.2,
        );
        // directly below the light, on axis
        let s = light
            .illum_sample(&sp_at(Point3f::new(0.0, 0.0, 0.0)), 0.0, 0.0)
            .unwrap();
        assert_abs_diff_eq!(s.color.r, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn outside_cone_dark() {
        let light = SpotLight::new(
            Point3f::new(0.0, 4.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
            Rgb::uniform(16.0),
            20.0,
            0.2,
        );
        // far off axis
        assert!(light
            .illum_sample(&sp_at(Point3f::new(10.0, 0.0, 0.0)), 0.0, 0.0)
            .is_none());
    }

    #[test]
    fn photons_stay_in_cone() {
        let light = SpotLight::new(
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.0, 0.0, -1.0),
            Rgb::WHITE,
            25.0,
            0.3,
        );
        for i in 0..32 {
            let u = (i as Float + 0.5) / 32.0;
            let e = light.emit_photon(u, (u * 7.0) % 1.0, 0.0, 0.0);
            assert!(light.dir.dot(e.ray.dir) >= light.cos_outer - 1e-5);
        }
    }
}
