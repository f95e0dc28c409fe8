use crate::{Float, Point3f, Vec3f};
use crate::geometry::{Bounds3f, Ray};
use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Rad, SquareMatrix, Transform as CgTransform};

/// Affine transform carried together with its inverse so normals and rays
/// can go both ways without re-inverting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub m: Matrix4<Float>,
    pub m_inv: Matrix4<Float>,
}

const IDENTITY_MAT4: Matrix4<Float> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
);

impl Transform {
    pub const IDENTITY: Self = Transform { m: IDENTITY_MAT4, m_inv: IDENTITY_MAT4 };

    pub const fn new(m: Matrix4<Float>, m_inv: Matrix4<Float>) -> Self {
        Self { m, m_inv }
    }

    pub fn from_mat(m: Matrix4<Float>) -> Option<Self> {
        m.invert().map(|m_inv| Self { m, m_inv })
    }

    pub fn translate(delta: Vec3f) -> Self {
        Self::new(
            Matrix4::from_translation(delta),
            Matrix4::from_translation(-delta),
        )
    }

    pub fn scale(sx: Float, sy: Float, sz: Float) -> Self {
        Self::new(
            Matrix4::from_nonuniform_scale(sx, sy, sz),
            Matrix4::from_nonuniform_scale(1.0 / sx, 1.0 / sy, 1.0 / sz),
        )
    }

    pub fn rotate_y(theta: impl Into<Rad<Float>>) -> Self {
        let m = Matrix4::from_angle_y(theta);
        let m_inv = m.inverse_transform().unwrap();
        Self::new(m, m_inv)
    }

    pub fn look_at(pos: Point3f, target: Point3f, up: Vec3f) -> Self {
        let dir = (target - pos).normalize();
        let right = up.normalize().cross(dir).normalize();
        let new_up = dir.cross(right);

        let mat = Matrix4::from_cols(
            right.extend(0.0),
            new_up.extend(0.0),
            dir.extend(0.0),
            pos.to_homogeneous(),
        );
        let m_inv = mat.inverse_transform().unwrap();
        Self::new(mat, m_inv)
    }

    pub fn inverse(&self) -> Self {
        Self::new(self.m_inv, self.m)
    }

    pub fn swaps_handedness(&self) -> bool {
        self.m.determinant() < 0.0
    }

    pub fn point(&self, p: Point3f) -> Point3f {
        self.m.transform_point(p)
    }

    pub fn vector(&self, v: Vec3f) -> Vec3f {
        self.m.transform_vector(v)
    }

    // transpose of the inverse, so non-uniform scales keep normals normal
    pub fn normal(&self, n: Vec3f) -> Vec3f {
        let i = &self.m_inv;
        Vec3f::new(
            i[0][0] * n.x + i[0][1] * n.y + i[0][2] * n.z,
            i[1][0] * n.x + i[1][1] * n.y + i[1][2] * n.z,
            i[2][0] * n.x + i[2][1] * n.y + i[2][2] * n.z,
        )
    }

    pub fn ray(&self, r: &Ray) -> Ray {
        Ray {
            from: self.point(r.from),
            dir: self.vector(r.dir),
            ..*r
        }
    }

    pub fn bounds(&self, b: &Bounds3f) -> Bounds3f {
        let mut out = Bounds3f::empty();
        for i in 0..8 {
            let corner = Point3f::new(
                if i & 1 == 0 { b.min.x } else { b.max.x },
                if i & 2 == 0 { b.min.y } else { b.max.y },
                if i & 4 == 0 { b.min.z } else { b.max.z },
            );
            out = out.join_point(self.point(corner));
        }
        out
    }
}

impl std::ops::Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        Transform::new(self.m * rhs.m, rhs.m_inv * self.m_inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn round_trip() {
        let t = Transform::translate(Vec3f::new(1.0, 2.0, 3.0))
            * Transform::scale(2.0, 2.0, 2.0);
        let p = Point3f::new(1.0, 1.0, 1.0);
        let q = t.inverse().point(t.point(p));
        assert_abs_diff_eq!(q.x, p.x, epsilon = 1e-5);
        assert_abs_diff_eq!(q.y, p.y, epsilon = 1e-5);
        assert_abs_diff_eq!(q.z, p.z, epsilon = 1e-5);
    }

    #[test]
    fn normal_under_nonuniform_scale() {
        let t = Transform::scale(2.0, 1.0, 1.0);
        // a plane normal must stay perpendicular to transformed tangents
        let n = t.normal(Vec3f::new(1.0, 1.0, 0.0)).normalize();
        let tangent = t.vector(Vec3f::new(1.0, -1.0, 0.0));
        assert_abs_diff_eq!(n.dot(tangent), 0.0, epsilon = 1e-6);
    }
}
