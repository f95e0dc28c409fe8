use crate::color::Rgb;
use crate::geometry::Ray;
use crate::primitive::{IntersectData, PrimId, Primitive};
use std::sync::Arc;

pub mod kdtree;

pub use kdtree::KdTree;

/// Linear-scan reference accelerator. The k-d tree must agree with this on
/// every query; it also stands in for tiny scenes where building a tree is
/// not worth it.
pub struct BruteForce {
    prims: Vec<Arc<dyn Primitive>>,
}

impl BruteForce {
    pub fn new(prims: Vec<Arc<dyn Primitive>>) -> Self {
        Self { prims }
    }

    pub fn intersect(&self, ray: &Ray) -> Option<IntersectData> {
        let mut r = *ray;
        let mut best = None;
        for (i, prim) in self.prims.iter().enumerate() {
            if let Some(hit) = prim.intersect(&r) {
                r.tmax = hit.t;
                best = Some(IntersectData::new(hit, i as PrimId));
            }
        }
        best
    }

    pub fn intersect_shadow(&self, ray: &Ray, origin: Option<PrimId>) -> bool {
        self.prims.iter().enumerate().any(|(i, prim)| {
            origin != Some(i as PrimId) && prim.intersect(ray).is_some()
        })
    }

    pub fn intersect_transparent_shadow(
        &self,
        ray: &Ray,
        origin: Option<PrimId>,
        max_hits: usize,
        mut filter: impl FnMut(IntersectData) -> Option<Rgb>,
    ) -> Option<Rgb> {
        let mut hits: Vec<IntersectData> = self
            .prims
            .iter()
            .enumerate()
            .filter(|(i, _)| origin != Some(*i as PrimId))
            .filter_map(|(i, prim)| prim.intersect(ray).map(|h| IntersectData::new(h, i as PrimId)))
            .collect();
        hits.sort_unstable_by(|a, b| a.t.partial_cmp(&b.t).unwrap());

        let mut attenuation = Rgb::WHITE;
        for (n, hit) in hits.into_iter().enumerate() {
            if n >= max_hits {
                return None;
            }
            attenuation *= filter(hit)?;
        }
        Some(attenuation)
    }
}
