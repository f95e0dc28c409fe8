use crate::geometry::{Bounds3f, Ray};
use crate::primitive::clip::clip_polygon_to_bound;
use crate::primitive::{LightId, MaterialId, PrimId, Primitive, RawHit, SurfacePoint};
use crate::{Float, Point2f, Point3f, Vec3f};
use cgmath::{EuclideanSpace, InnerSpace};
use std::sync::Arc;

/// Shared vertex arena for an indexed triangle mesh. Triangles are light
/// index views into this; objects own meshes through `Arc` so instances can
/// share them.
#[derive(Debug)]
pub struct TriangleMesh {
    pub positions: Vec<Point3f>,
    /// Per-vertex normals, either supplied by the builder or computed by
    /// `smooth_normals`.
    pub vertex_normals: Option<Vec<Vec3f>>,
    /// Per-corner normals (3 per triangle); produced by angle-limited
    /// smoothing where some corners stay faceted. Takes precedence over
    /// `vertex_normals`.
    pub corner_normals: Option<Vec<Vec3f>>,
    pub uvs: Option<Vec<Point2f>>,
    /// Original object-space coordinates for solid texturing.
    pub orco: Option<Vec<Point3f>>,
    pub indices: Vec<[u32; 3]>,
    pub material: MaterialId,
    pub light: Option<LightId>,
}

impl TriangleMesh {
    pub fn new(positions: Vec<Point3f>, indices: Vec<[u32; 3]>, material: MaterialId) -> Self {
        Self {
            positions,
            vertex_normals: None,
            corner_normals: None,
            uvs: None,
            orco: None,
            indices,
            material,
            light: None,
        }
    }

    pub fn n_triangles(&self) -> usize {
        self.indices.len()
    }

    pub fn face_normal(&self, tri: usize) -> Vec3f {
        let [a, b, c] = self.indices[tri];
        let p0 = self.positions[a as usize];
        let p1 = self.positions[b as usize];
        let p2 = self.positions[c as usize];
        let n = (p1 - p0).cross(p2 - p0);
        if n.magnitude2() > 0.0 {
            n.normalize()
        } else {
            Vec3f::new(0.0, 0.0, 1.0)
        }
    }

    pub fn face_area(&self, tri: usize) -> Float {
        let [a, b, c] = self.indices[tri];
        let p0 = self.positions[a as usize];
        let p1 = self.positions[b as usize];
        let p2 = self.positions[c as usize];
        0.5 * (p1 - p0).cross(p2 - p0).magnitude()
    }

    pub fn total_area(&self) -> Float {
        (0..self.n_triangles()).map(|i| self.face_area(i)).sum()
    }

    /// Angle-limited normal smoothing. Each corner averages the face normals
    /// of the vertex's incident faces that deviate from its own face normal
    /// by at most `angle_degrees`; a corner whose neighbours all exceed the
    /// limit stays faceted.
    pub fn smooth_normals(&mut self, angle_degrees: Float) {
        let cos_limit = angle_degrees.to_radians().cos();
        let face_normals: Vec<Vec3f> = (0..self.n_triangles()).map(|i| self.face_normal(i)).collect();

        let mut incident: Vec<Vec<u32>> = vec![Vec::new(); self.positions.len()];
        for (tri, idx) in self.indices.iter().enumerate() {
            for &v in idx {
                incident[v as usize].push(tri as u32);
            }
        }

        let mut corners = Vec::with_capacity(self.n_triangles() * 3);
        for (tri, idx) in self.indices.iter().enumerate() {
            let own = face_normals[tri];
            for &v in idx {
                let mut acc = Vec3f::new(0.0, 0.0, 0.0);
                for &other in &incident[v as usize] {
                    let fn_other = face_normals[other as usize];
                    if own.dot(fn_other) >= cos_limit {
                        acc += fn_other;
                    }
                }
                corners.push(if acc.magnitude2() > 0.0 { acc.normalize() } else { own });
            }
        }
        self.corner_normals = Some(corners);
    }

    fn shading_normals(&self, tri: usize) -> Option<[Vec3f; 3]> {
        if let Some(corners) = &self.corner_normals {
            let base = tri * 3;
            return Some([corners[base], corners[base + 1], corners[base + 2]]);
        }
        self.vertex_normals.as_ref().map(|normals| {
            let [a, b, c] = self.indices[tri];
            [normals[a as usize], normals[b as usize], normals[c as usize]]
        })
    }
}

#[derive(Clone)]
pub struct Triangle {
    mesh: Arc<TriangleMesh>,
    tri: u32,
}

impl Triangle {
    pub fn new(mesh: Arc<TriangleMesh>, tri: u32) -> Self {
        Self { mesh, tri }
    }

    pub fn vertices(&self) -> [Point3f; 3] {
        let [a, b, c] = self.mesh.indices[self.tri as usize];
        [
            self.mesh.positions[a as usize],
            self.mesh.positions[b as usize],
            self.mesh.positions[c as usize],
        ]
    }

    fn uvs(&self) -> Option<[Point2f; 3]> {
        self.mesh.uvs.as_ref().map(|uvs| {
            let [a, b, c] = self.mesh.indices[self.tri as usize];
            [uvs[a as usize], uvs[b as usize], uvs[c as usize]]
        })
    }

    /// Uniform point on the triangle from a pre-warped barycentric pair;
    /// used by mesh lights.
    pub fn sample_point(&self, b1: Float, b2: Float) -> (Point3f, Vec3f) {
        let [p0, p1, p2] = self.vertices();
        let p = Point3f::from_vec(
            p0.to_vec() * (1.0 - b1 - b2) + p1.to_vec() * b1 + p2.to_vec() * b2,
        );
        (p, self.mesh.face_normal(self.tri as usize))
    }
}

impl Primitive for Triangle {
    fn bound(&self) -> Bounds3f {
        let [p0, p1, p2] = self.vertices();
        Bounds3f::empty()
            .join_point(p0)
            .join_point(p1)
            .join_point(p2)
    }

    /// Moller-Trumbore. Barycentrics are returned relative to the edges from
    /// the first vertex.
    fn intersect(&self, ray: &Ray) -> Option<RawHit> {
        let [a, b, c] = self.vertices();
        let edge1 = b - a;
        let edge2 = c - a;
        let pvec = ray.dir.cross(edge2);
        let det = edge1.dot(pvec);
        if det == 0.0 {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = ray.from - a;
        let u = tvec.dot(pvec) * inv_det;
        if u < 0.0 || u > 1.0 {
            return None;
        }
        let qvec = tvec.cross(edge1);
        let v = ray.dir.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = edge2.dot(qvec) * inv_det;
        if t < ray.tmin || t > ray.tmax {
            return None;
        }
        Some(RawHit { t, u, v })
    }

    fn fill_surface(&self, ray: &Ray, hit: RawHit, prim: PrimId) -> SurfacePoint {
        let [p0, p1, p2] = self.vertices();
        let ng = {
            let n = (p1 - p0).cross(p2 - p0);
            if n.magnitude2() > 0.0 { n.normalize() } else { Vec3f::new(0.0, 0.0, 1.0) }
        };

        let (u, v) = (hit.u, hit.v);
        let w = 1.0 - u - v;

        let ns = match self.mesh.shading_normals(self.tri as usize) {
            Some([n0, n1, n2]) => {
                let n = n0 * w + n1 * u + n2 * v;
                if n.magnitude2() > 0.0 { n.normalize() } else { ng }
            }
            None => ng,
        };

        let (uv, tangent) = match self.uvs() {
            Some([uv0, uv1, uv2]) => {
                let uv = Point2f::new(
                    w * uv0.x + u * uv1.x + v * uv2.x,
                    w * uv0.y + u * uv1.y + v * uv2.y,
                );
                // dp/du from the uv parametrization when it is non-degenerate
                let duv1 = uv1 - uv0;
                let duv2 = uv2 - uv0;
                let det = duv1.x * duv2.y - duv1.y * duv2.x;
                let tangent = if det.abs() > 1e-12 {
                    let inv = 1.0 / det;
                    Some(((p1 - p0) * duv2.y - (p2 - p0) * duv1.y) * inv)
                } else {
                    None
                };
                (uv, tangent)
            }
            None => (Point2f::new(u, v), Some(p1 - p0)),
        };

        let (nu, nv) = SurfacePoint::make_frame(ns, tangent);

        let p = ray.at(hit.t);
        let orco = match &self.mesh.orco {
            Some(orco) => {
                let [a, b, c] = self.mesh.indices[self.tri as usize];
                let o0 = orco[a as usize].to_vec();
                let o1 = orco[b as usize].to_vec();
                let o2 = orco[c as usize].to_vec();
                Point3f::from_vec(o0 * w + o1 * u + o2 * v)
            }
            None => p,
        };

        SurfacePoint {
            p,
            ng,
            ns,
            nu,
            nv,
            uv,
            orco,
            material: self.mesh.material,
            light: self.mesh.light,
            prim,
        }
    }

    fn clip_to_bound(&self, bound: &Bounds3f) -> Option<Bounds3f> {
        clip_polygon_to_bound(&self.vertices(), bound)
    }

    fn material_id(&self) -> MaterialId {
        self.mesh.material
    }

    fn light_id(&self) -> Option<LightId> {
        self.mesh.light
    }
}
