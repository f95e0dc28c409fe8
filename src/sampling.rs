use crate::{Float, Point2f, Point3f, Vec2f, Vec3f};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

pub fn concentric_sample_disk(u: Point2f) -> Point2f {
    // map sample from [0, 1] to [-1, 1]
    let u_offset = 2.0 * u - Vec2f::new(1.0, 1.0);
    if u_offset == Point2f::new(0.0, 0.0) {
        return Point2f::new(0.0, 0.0);
    }

    let (r, theta) = if u_offset.x.abs() > u_offset.y.abs() {
        (u_offset.x, FRAC_PI_4 * (u_offset.y / u_offset.x))
    } else {
        (u_offset.y, FRAC_PI_2 - FRAC_PI_4 * (u_offset.x / u_offset.y))
    };

    r * Point2f::new(theta.cos(), theta.sin())
}

/// Cosine-weighted hemisphere sample around +z; pdf is `cosθ/π`.
pub fn cosine_sample_hemisphere(u: Point2f) -> Vec3f {
    let d = concentric_sample_disk(u);
    let z = Float::sqrt(Float::max(0.0, 1.0 - d.x * d.x - d.y * d.y));
    Vec3f::new(d.x, d.y, z)
}

pub fn cosine_hemisphere_pdf(cos_theta: Float) -> Float {
    cos_theta * std::f32::consts::FRAC_1_PI
}

pub fn uniform_sample_sphere(u: Point2f) -> Vec3f {
    let z = 1.0 - 2.0 * u.x;
    let r = Float::max(0.0, 1.0 - z * z).sqrt();
    let phi = 2.0 * PI * u.y;
    Vec3f::new(r * phi.cos(), r * phi.sin(), z)
}

pub const UNIFORM_SPHERE_PDF: Float = 1.0 / (4.0 * PI);

pub fn uniform_sample_hemisphere(u: Point2f) -> Vec3f {
    let z = u.x;
    let r = Float::max(0.0, 1.0 - z * z).sqrt();
    let phi = 2.0 * PI * u.y;
    Vec3f::new(r * phi.cos(), r * phi.sin(), z)
}

/// Uniform direction inside a cone of half-angle `acos(cos_max)` around +z.
pub fn uniform_sample_cone(u: Point2f, cos_max: Float) -> Vec3f {
    let cos_theta = (1.0 - u.x) + u.x * cos_max;
    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
    let phi = u.y * 2.0 * PI;
    Vec3f::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

pub fn uniform_cone_pdf(cos_max: Float) -> Float {
    1.0 / (2.0 * PI * (1.0 - cos_max))
}

/// Barycentric coordinates of a uniform triangle sample.
pub fn uniform_sample_triangle(u: Point2f) -> (Float, Float) {
    let su0 = u.x.sqrt();
    (1.0 - su0, u.y * su0)
}

/// Power heuristic with β=2 for combining two sampling strategies.
pub fn power_heuristic(nf: Float, f_pdf: Float, ng: Float, g_pdf: Float) -> Float {
    let f = nf * f_pdf;
    let g = ng * g_pdf;
    if f == 0.0 && g == 0.0 {
        return 0.0;
    }
    (f * f) / (f * f + g * g)
}

/// Henyey-Greenstein phase function for asymmetry parameter `g`.
pub fn phase_hg(cos_theta: Float, g: Float) -> Float {
    let denom = 1.0 + g * g + 2.0 * g * cos_theta;
    (1.0 - g * g) / (4.0 * PI * denom * denom.max(1e-7).sqrt())
}

/// Area of a parallelogram spanned by two edges, for area-light pdfs.
pub fn parallelogram_area(e1: Vec3f, e2: Vec3f) -> Float {
    use cgmath::InnerSpace;
    e1.cross(e2).magnitude()
}

pub fn triangle_area(a: Point3f, b: Point3f, c: Point3f) -> Float {
    use cgmath::InnerSpace;
    0.5 * (b - a).cross(c - a).magnitude()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use cgmath::InnerSpace;

    #[test]
    fn cosine_hemisphere_above_horizon() {
        for i in 0..64 {
            let u = Point2f::new((i as Float + 0.5) / 64.0, ((i * 7 % 64) as Float + 0.5) / 64.0);
            let w = cosine_sample_hemisphere(u);
            assert!(w.z >= 0.0);
            assert_abs_diff_eq!(w.magnitude(), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn cone_sample_inside_cone() {
        let cos_max = 0.9;
        for i in 0..32 {
            let u = Point2f::new((i as Float + 0.5) / 32.0, ((i * 11 % 32) as Float + 0.5) / 32.0);
            let w = uniform_sample_cone(u, cos_max);
            assert!(w.z >= cos_max - 1e-5);
        }
    }

    #[test]
    fn power_heuristic_degenerate() {
        assert_eq!(power_heuristic(1.0, 0.0, 1.0, 0.0), 0.0);
        assert_abs_diff_eq!(power_heuristic(1.0, 1.0, 1.0, 0.0), 1.0);
    }

    #[test]
    fn hg_isotropic_matches_uniform() {
        assert_abs_diff_eq!(phase_hg(0.3, 0.0), UNIFORM_SPHERE_PDF, epsilon = 1e-6);
    }
}
