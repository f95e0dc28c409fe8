use crate::color::Rgb;
use crate::geometry::Ray;
use crate::light::{Light, LightSample, PhotonEmit};
use crate::primitive::SurfacePoint;
use crate::sampling::cosine_sample_hemisphere;
use crate::{Float, Point2f, Point3f, Vec3f};
use cgmath::InnerSpace;
use std::f32::consts::{FRAC_1_PI, PI};

/// One-sided parallelogram emitter: corner plus two edge vectors. The scene
/// builder pairs it with a two-triangle mesh carrying an emissive material
/// so BSDF-sampled rays can hit it.
pub struct AreaLight {
    corner: Point3f,
    to_x: Vec3f,
    to_y: Vec3f,
    normal: Vec3f,
    color: Rgb,
    samples: u32,
    area: Float,
    inv_area: Float,
}

impl AreaLight {
    pub fn new(corner: Point3f, to_x: Vec3f, to_y: Vec3f, color: Rgb, samples: u32) -> Self {
        let cross = to_x.cross(to_y);
        let area = cross.magnitude().max(1e-8);
        Self {
            corner,
            to_x,
            to_y,
            normal: cross / area,
            color,
            samples: samples.max(1),
            area,
            inv_area: 1.0 / area,
        }
    }

    pub fn corners(&self) -> [Point3f; 4] {
        [
            self.corner,
            self.corner + self.to_x,
            self.corner + self.to_x + self.to_y,
            self.corner + self.to_y,
        ]
    }

    pub fn emitted_radiance(&self) -> Rgb {
        self.color
    }
}

impl Light for AreaLight {
    fn is_delta(&self) -> bool {
        false
    }

    fn can_intersect(&self) -> bool {
        true
    }

    fn n_samples(&self) -> u32 {
        self.samples
    }

    fn total_energy(&self) -> Rgb {
        self.color * (self.area * PI)
    }

    fn illum_sample(&self, sp: &SurfacePoint, s1: Float, s2: Float) -> Option<LightSample> {
        let p_light = self.corner + self.to_x * s1 + self.to_y * s2;
        let to_light = p_light - sp.p;
        let dist2 = to_light.magnitude2();
        if dist2 == 0.0 {
            return None;
        }
        let dist = dist2.sqrt();
        let wi = to_light / dist;

        let cos_light = -self.normal.dot(wi);
        if cos_light <= 1e-6 {
            // behind the emitting face
            return None;
        }

        Some(LightSample {
            wi,
            dist,
            pdf: dist2 * self.inv_area / cos_light,
            color: self.color,
        })
    }

    fn illum_pdf(&self, p: Point3f, sp_light: &SurfacePoint) -> Float {
        let to_light = sp_light.p - p;
        let dist2 = to_light.magnitude2();
        if dist2 == 0.0 {
            return 0.0;
        }
        let wi = to_light / dist2.sqrt();
        let cos_light = -self.normal.dot(wi);
        if cos_light <= 1e-6 {
            return 0.0;
        }
        dist2 * self.inv_area / cos_light
    }

    fn emit_photon(&self, s1: Float, s2: Float, s3: Float, s4: Float) -> PhotonEmit {
        let from = self.corner + self.to_x * s1 + self.to_y * s2;
        let local = cosine_sample_hemisphere(Point2f::new(s3, s4));
        let du = self.to_x.normalize();
        let dv = self.normal.cross(du);
        let dir = du * local.x + dv * local.y + self.normal * local.z;
        PhotonEmit {
            ray: Ray::new(from, dir),
            // L·cos / (pdf_pos·pdf_dir) = color·π·area
            flux: self.color * (PI * self.area),
        }
    }

    fn emit_pdf(&self, n_light: Vec3f, wo: Vec3f) -> (Float, Float, Float) {
        let cos_wo = n_light.dot(wo).max(0.0);
        (self.inv_area, cos_wo * FRAC_1_PI, cos_wo)
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

    fn ceiling_light() -> AreaLight {
        // unit square at y=2 facing down (-y)
        AreaLight::new(
            Point3f::new(0.0, 2.0, 0.0),
            Vec3f::new(0.0, 0.0, 1.0),
            Vec3f::new(1.0, 0.0, 0.0),
            Rgb::uniform(5.0),
            4,
        )
    }

    #[test]
    fn normal_points_down() {
        let light = ceiling_light();
        assert_abs_diff_eq!(light.normal.y, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn sample_pdf_matches_illum_pdf() {
        let light = ceiling_light();
        let sp = sp_at(Point3f::new(0.3, 0.0, 0.4));
        let s = light.illum_sample(&sp, 0.25, 0.75).unwrap();

        let sp_light = sp_at(sp.p + s.wi * s.dist);
        let pdf = light.illum_pdf(sp.p, &sp_light);
        assert_abs_diff_eq!(s.pdf, pdf, epsilon = 1e-3);
    }

    #[test]
    fn backside_gets_nothing() {
        let light = ceiling_light();
        // point above the panel looks at its back face
        let sp = sp_at(Point3f::new(0.5, 4.0, 0.5));
        assert!(light.illum_sample(&sp, 0.5, 0.5).is_none());
    }

    #[test]
    fn photon_flux_is_pi_area_l() {
        let light = ceiling_light();
        let e = light.emit_photon(0.5, 0.5, 0.3, 0.3);
        assert_abs_diff_eq!(e.flux.r, 5.0 * PI, epsilon = 1e-4);
        // photons leave the emitting side
        assert!(e.ray.dir.y < 0.0);
    }
}
