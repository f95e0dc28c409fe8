use crate::{Float, Point2f, Vec3f};
use cgmath::InnerSpace;

pub const MACHINE_EPSILON: Float = std::f32::EPSILON * 0.5;

/// Conservative floating-point error bound for a chain of `n` operations.
pub const fn gamma(n: i32) -> Float {
    let n = n as Float;
    (n * MACHINE_EPSILON) / (1.0 - n * MACHINE_EPSILON)
}

/// Scalar type usable in `Bounds2`/`Bounds3`.
pub trait Scalar: cgmath::BaseNum + num::Bounded {
    fn min(self, other: Self) -> Self;
    fn max(self, other: Self) -> Self;
}

impl Scalar for f32 {
    fn min(self, other: Self) -> Self {
        f32::min(self, other)
    }
    fn max(self, other: Self) -> Self {
        f32::max(self, other)
    }
}

impl Scalar for i32 {
    fn min(self, other: Self) -> Self {
        Ord::min(self, other)
    }
    fn max(self, other: Self) -> Self {
        Ord::max(self, other)
    }
}

pub fn lerp(t: Float, v1: Float, v2: Float) -> Float {
    (1.0 - t) * v1 + t * v2
}

pub fn clamp(v: Float, low: Float, high: Float) -> Float {
    v.max(low).min(high)
}

pub fn abs_dot(v1: Vec3f, v2: Vec3f) -> Float {
    v1.dot(v2).abs()
}

/// Build an orthonormal frame around `v1` (assumed unit length).
pub fn coordinate_system(v1: Vec3f) -> (Vec3f, Vec3f) {
    let v2 = if v1.x.abs() > v1.y.abs() {
        Vec3f::new(-v1.z, 0.0, v1.x) / (v1.x * v1.x + v1.z * v1.z).sqrt()
    } else {
        Vec3f::new(0.0, v1.z, -v1.y) / (v1.y * v1.y + v1.z * v1.z).sqrt()
    };
    (v2, v1.cross(v2))
}

/// Direction from spherical coordinates in the frame `(x, y, z)`.
pub fn spherical_direction(
    sin_theta: Float,
    cos_theta: Float,
    phi: Float,
    x: Vec3f,
    y: Vec3f,
    z: Vec3f,
) -> Vec3f {
    x * (sin_theta * phi.cos()) + y * (sin_theta * phi.sin()) + z * cos_theta
}

pub fn reflect_dir(wo: Vec3f, n: Vec3f) -> Vec3f {
    -wo + n * (2.0 * wo.dot(n))
}

/// Refraction of `wi` about `n` with relative IOR `eta`; `None` on total
/// internal reflection.
pub fn refract_dir(wi: Vec3f, n: Vec3f, eta: Float) -> Option<Vec3f> {
    let cos_theta_i = n.dot(wi);
    let sin2_theta_i = Float::max(0.0, 1.0 - cos_theta_i * cos_theta_i);
    let sin2_theta_t = eta * eta * sin2_theta_i;
    if sin2_theta_t >= 1.0 {
        return None;
    }
    let cos_theta_t = (1.0 - sin2_theta_t).sqrt();
    Some(-wi * eta + n * (eta * cos_theta_i - cos_theta_t))
}

/// Unpolarized Fresnel reflectance for a dielectric boundary.
pub fn fresnel_dielectric(cos_theta_i: Float, eta_i: Float, eta_t: Float) -> Float {
    let cos_theta_i = clamp(cos_theta_i, -1.0, 1.0);
    let (eta_i, eta_t, cos_theta_i) = if cos_theta_i > 0.0 {
        (eta_i, eta_t, cos_theta_i)
    } else {
        (eta_t, eta_i, -cos_theta_i)
    };

    let sin_theta_i = Float::max(0.0, 1.0 - cos_theta_i * cos_theta_i).sqrt();
    let sin_theta_t = eta_i / eta_t * sin_theta_i;
    if sin_theta_t >= 1.0 {
        return 1.0;
    }
    let cos_theta_t = Float::max(0.0, 1.0 - sin_theta_t * sin_theta_t).sqrt();

    let r_parl = ((eta_t * cos_theta_i) - (eta_i * cos_theta_t))
        / ((eta_t * cos_theta_i) + (eta_i * cos_theta_t));
    let r_perp = ((eta_i * cos_theta_i) - (eta_t * cos_theta_t))
        / ((eta_i * cos_theta_i) + (eta_t * cos_theta_t));
    (r_parl * r_parl + r_perp * r_perp) / 2.0
}

pub fn distance_squared(a: crate::Point3f, b: crate::Point3f) -> Float {
    let d = b - a;
    d.dot(d)
}

/// Elementwise min/max over 2d points, used by the film splat loop.
pub fn point2_min(a: Point2f, b: Point2f) -> Point2f {
    Point2f::new(a.x.min(b.x), a.y.min(b.y))
}

pub fn point2_max(a: Point2f, b: Point2f) -> Point2f {
    Point2f::new(a.x.max(b.x), a.y.max(b.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn coordinate_system_orthonormal() {
        let v1 = Vec3f::new(0.3, -0.6, 0.74).normalize();
        let (v2, v3) = coordinate_system(v1);
        assert_abs_diff_eq!(v1.dot(v2), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(v1.dot(v3), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(v2.dot(v3), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(v2.magnitude(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn fresnel_grazing_is_total() {
        assert_abs_diff_eq!(fresnel_dielectric(0.0, 1.0, 1.5), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn refract_tir() {
        // shallow angle from dense to thin medium reflects totally
        let n = Vec3f::new(0.0, 0.0, 1.0);
        let wi = Vec3f::new(0.99, 0.0, 0.14).normalize();
        assert!(refract_dir(wi, n, 1.5).is_none());
    }
}
