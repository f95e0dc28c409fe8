use crate::color::Rgb;
use crate::geometry::Ray;
use crate::light::{Distribution1d, Light, LightSample, PhotonEmit};
use crate::primitive::mesh::{Triangle, TriangleMesh};
use crate::primitive::SurfacePoint;
use crate::sampling::{cosine_sample_hemisphere, uniform_sample_triangle};
use crate::{Float, Point2f, Point3f, Vec3f};
use cgmath::InnerSpace;
use std::f32::consts::{FRAC_1_PI, PI};
use std::sync::Arc;

/// Turns an arbitrary triangle mesh into an emitter: triangles are picked
/// proportionally to area, points uniformly within a triangle.
pub struct MeshLight {
    mesh: Arc<TriangleMesh>,
    color: Rgb,
    samples: u32,
    double_sided: bool,
    area_dist: Distribution1d,
    total_area: Float,
}

impl MeshLight {
    pub fn new(mesh: Arc<TriangleMesh>, color: Rgb, samples: u32, double_sided: bool) -> Self {
        let areas: Vec<Float> = (0..mesh.n_triangles()).map(|i| mesh.face_area(i)).collect();
        let total_area: Float = areas.iter().sum();
        Self {
            mesh,
            color,
            samples: samples.max(1),
            double_sided,
            area_dist: Distribution1d::new(areas),
            total_area,
        }
    }

    pub fn emitted_radiance(&self) -> Rgb {
        self.color
    }

    fn sample_surface(&self, s1: Float, s2: Float) -> Option<(Point3f, Vec3f)> {
        if self.area_dist.is_empty() {
            return None;
        }
        let (tri_idx, _) = self.area_dist.sample(s1);
        // reuse s1's remainder would correlate; stretch s2 over the triangle
        let (b1, b2) = uniform_sample_triangle(Point2f::new(s2, (s1 * 7919.0).fract()));
        let tri = Triangle::new(Arc::clone(&self.mesh), tri_idx as u32);
        Some(tri.sample_point(b1, b2))
    }
}

impl Light for MeshLight {
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
        let sides = if self.double_sided { 2.0 } else { 1.0 };
        self.color * (self.total_area * PI * sides)
    }

    fn illum_sample(&self, sp: &SurfacePoint, s1: Float, s2: Float) -> Option<LightSample> {
        let (p_light, n_light) = self.sample_surface(s1, s2)?;

        let to_light = p_light - sp.p;
        let dist2 = to_light.magnitude2();
        if dist2 == 0.0 {
            return None;
        }
        let dist = dist2.sqrt();
        let wi = to_light / dist;

        let mut cos_light = -n_light.dot(wi);
        if self.double_sided {
            cos_light = cos_light.abs();
        }
        if cos_light <= 1e-6 {
            return None;
        }

        Some(LightSample {
            wi,
            dist,
            pdf: dist2 / (self.total_area * cos_light),
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
        let mut cos_light = -sp_light.ng.dot(wi);
        if self.double_sided {
            cos_light = cos_light.abs();
        }
        if cos_light <= 1e-6 {
            return 0.0;
        }
        dist2 / (self.total_area * cos_light)
    }

    fn emit_photon(&self, s1: Float, s2: Float, s3: Float, s4: Float) -> PhotonEmit {
        let (from, mut normal) = match self.sample_surface(s1, s2) {
            Some(x) => x,
            None => {
                return PhotonEmit {
                    ray: Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 0.0, 1.0)),
                    flux: Rgb::BLACK,
                }
            }
        };

        let mut s3 = s3;
        if self.double_sided {
            // use the lobe-choice half of s3 to pick the emitting side
            if s3 < 0.5 {
                s3 *= 2.0;
                normal = -normal;
            } else {
                s3 = 2.0 * s3 - 1.0;
            }
        }

        let local = cosine_sample_hemisphere(Point2f::new(s3, s4));
        let (du, dv) = crate::math::coordinate_system(normal);
        let dir = du * local.x + dv * local.y + normal * local.z;

        let sides = if self.double_sided { 2.0 } else { 1.0 };
        PhotonEmit {
            ray: Ray::new(from, dir),
            flux: self.color * (PI * self.total_area * sides),
        }
    }

    fn emit_pdf(&self, n_light: Vec3f, wo: Vec3f) -> (Float, Float, Float) {
        let mut cos_wo = n_light.dot(wo);
        if self.double_sided {
            cos_wo = cos_wo.abs();
        }
        let cos_wo = cos_wo.max(0.0);
        (1.0 / self.total_area, cos_wo * FRAC_1_PI, cos_wo)
    }
}
