use crate::color::Rgb;
use crate::geometry::{Bounds3f, Ray};
use crate::primitive::{IntersectData, PrimId, Primitive};
use crate::Float;
use arrayvec::ArrayVec;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

const TRAVERSAL_COST: Float = 1.0;
const INTERSECT_COST: Float = 0.8;
const EMPTY_BONUS: Float = 0.2;
const MAX_LEAF_PRIMS: usize = 1;
const STACK_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq)]
enum KdNode {
    Interior {
        axis: u8,
        split: Float,
        above_child: u32,
    },
    Leaf {
        first: u32,
        count: u32,
    },
}

/// SAH-built k-d tree over the scene's primitives. Built once, immutable
/// during rendering.
pub struct KdTree {
    nodes: Vec<KdNode>,
    prim_index: Vec<PrimId>,
    prims: Vec<Arc<dyn Primitive>>,
    bound: Bounds3f,
}

#[derive(Clone, Copy, PartialEq)]
enum EdgeKind {
    Start,
    End,
}

#[derive(Clone, Copy)]
struct BoundEdge {
    pos: Float,
    kind: EdgeKind,
}

struct BuildCtx<'a> {
    nodes: Vec<KdNode>,
    prim_index: Vec<PrimId>,
    prims: &'a [Arc<dyn Primitive>],
}

impl KdTree {
    pub fn build(prims: Vec<Arc<dyn Primitive>>) -> Self {
        if prims.is_empty() {
            return Self {
                nodes: Vec::new(),
                prim_index: Vec::new(),
                prims,
                bound: Bounds3f::empty(),
            };
        }

        let prim_bounds: Vec<Bounds3f> = prims.iter().map(|p| p.bound()).collect();
        let bound = prim_bounds
            .iter()
            .fold(Bounds3f::empty(), |acc, b| acc.join(b));

        let n = prims.len();
        let max_depth = (8.0 + 1.3 * (n as Float).log2()).round() as u32;

        let mut ctx = BuildCtx {
            nodes: Vec::with_capacity(2 * n),
            prim_index: Vec::with_capacity(n),
            prims: &prims,
        };

        let ids: Vec<PrimId> = (0..n as PrimId).collect();
        build_node(&mut ctx, bound, &ids, &prim_bounds, max_depth);

        debug!(
            nodes = ctx.nodes.len(),
            prim_refs = ctx.prim_index.len(),
            max_depth,
            "kd-tree built"
        );

        Self {
            nodes: ctx.nodes,
            prim_index: ctx.prim_index,
            prims,
            bound,
        }
    }

    pub fn world_bound(&self) -> Bounds3f {
        self.bound
    }

    pub fn prim(&self, id: PrimId) -> &dyn Primitive {
        self.prims[id as usize].as_ref()
    }

    pub fn n_prims(&self) -> usize {
        self.prims.len()
    }

    /// Nearest hit along the ray within `[tmin, tmax]`.
    pub fn intersect(&self, ray: &Ray) -> Option<IntersectData> {
        if self.nodes.is_empty() {
            return None;
        }

        let inv_dir = ray.inv_dir();
        let (mut t_near, mut t_far) = self.bound.intersect_p(ray, inv_dir)?;

        let mut r = *ray;
        let mut best: Option<IntersectData> = None;
        let mut stack = ArrayVec::<[(u32, Float, Float); STACK_SIZE]>::new();
        let mut current = 0u32;

        loop {
            if r.tmax < t_near {
                // remaining nodes start past the closest hit so far
                match stack.pop() {
                    Some((node, near, far)) => {
                        current = node;
                        t_near = near;
                        t_far = far;
                        continue;
                    }
                    None => break,
                }
            }

            match self.nodes[current as usize] {
                KdNode::Interior { axis, split, above_child } => {
                    let ax = axis as usize;
                    let t_plane = (split - r.from[ax]) * inv_dir[ax];

                    let below_first = r.from[ax] < split
                        || (r.from[ax] == split && r.dir[ax] <= 0.0);
                    let (near_child, far_child) = if below_first {
                        (current + 1, above_child)
                    } else {
                        (above_child, current + 1)
                    };

                    if t_plane > t_far || t_plane <= 0.0 {
                        current = near_child;
                    } else if t_plane < t_near {
                        current = far_child;
                    } else {
                        stack.push((far_child, t_plane, t_far));
                        current = near_child;
                        t_far = t_plane;
                    }
                }

                KdNode::Leaf { first, count } => {
                    for i in first..first + count {
                        let id = self.prim_index[i as usize];
                        if let Some(hit) = self.prims[id as usize].intersect(&r) {
                            r.tmax = hit.t;
                            best = Some(IntersectData::new(hit, id));
                        }
                    }

                    match stack.pop() {
                        Some((node, near, far)) => {
                            current = node;
                            t_near = near;
                            t_far = far;
                        }
                        None => break,
                    }
                }
            }
        }

        best
    }

    /// Any-hit query for opaque shadow rays. `origin` suppresses
    /// self-intersection with the primitive that spawned the ray.
    pub fn intersect_shadow(&self, ray: &Ray, origin: Option<PrimId>) -> bool {
        if self.nodes.is_empty() {
            return false;
        }

        let inv_dir = ray.inv_dir();
        let bounds_hit = self.bound.intersect_p(ray, inv_dir);
        let (mut t_near, mut t_far) = match bounds_hit {
            Some(t) => t,
            None => return false,
        };

        let mut stack = ArrayVec::<[(u32, Float, Float); STACK_SIZE]>::new();
        let mut current = 0u32;

        loop {
            match self.nodes[current as usize] {
                KdNode::Interior { axis, split, above_child } => {
                    let ax = axis as usize;
                    let t_plane = (split - ray.from[ax]) * inv_dir[ax];

                    let below_first = ray.from[ax] < split
                        || (ray.from[ax] == split && ray.dir[ax] <= 0.0);
                    let (near_child, far_child) = if below_first {
                        (current + 1, above_child)
                    } else {
                        (above_child, current + 1)
                    };

                    if t_plane > t_far || t_plane <= 0.0 {
                        current = near_child;
                    } else if t_plane < t_near {
                        current = far_child;
                    } else {
                        stack.push((far_child, t_plane, t_far));
                        current = near_child;
                        t_far = t_plane;
                    }
                }

                KdNode::Leaf { first, count } => {
                    for i in first..first + count {
                        let id = self.prim_index[i as usize];
                        if origin == Some(id) {
                            continue;
                        }
                        if self.prims[id as usize].intersect(ray).is_some() {
                            return true;
                        }
                    }

                    match stack.pop() {
                        Some((node, near, far)) => {
                            current = node;
                            t_near = near;
                            t_far = far;
                        }
                        None => break,
                    }
                }
            }
        }

        false
    }

    /// Transparent-shadow query: `filter` returns the attenuation of one
    /// occluder, or `None` for an opaque one. The result is the product of
    /// all attenuations, or `None` when the ray is fully shadowed. Chains
    /// longer than `max_hits` count as opaque.
    pub fn intersect_transparent_shadow(
        &self,
        ray: &Ray,
        origin: Option<PrimId>,
        max_hits: usize,
        mut filter: impl FnMut(IntersectData) -> Option<Rgb>,
    ) -> Option<Rgb> {
        if self.nodes.is_empty() {
            return Some(Rgb::WHITE);
        }

        let inv_dir = ray.inv_dir();
        let (mut t_near, mut t_far) = match self.bound.intersect_p(ray, inv_dir) {
            Some(t) => t,
            None => return Some(Rgb::WHITE),
        };

        let mut stack = ArrayVec::<[(u32, Float, Float); STACK_SIZE]>::new();
        let mut current = 0u32;
        let mut attenuation = Rgb::WHITE;
        let mut n_hits = 0usize;
        // primitives straddling a split plane appear in several leaves; each
        // may attenuate only once
        let mut seen = SmallVec::<[PrimId; 32]>::new();

        loop {
            match self.nodes[current as usize] {
                KdNode::Interior { axis, split, above_child } => {
                    let ax = axis as usize;
                    let t_plane = (split - ray.from[ax]) * inv_dir[ax];

                    let below_first = ray.from[ax] < split
                        || (ray.from[ax] == split && ray.dir[ax] <= 0.0);
                    let (near_child, far_child) = if below_first {
                        (current + 1, above_child)
                    } else {
                        (above_child, current + 1)
                    };

                    if t_plane > t_far || t_plane <= 0.0 {
                        current = near_child;
                    } else if t_plane < t_near {
                        current = far_child;
                    } else {
                        stack.push((far_child, t_plane, t_far));
                        current = near_child;
                        t_far = t_plane;
                    }
                }

                KdNode::Leaf { first, count } => {
                    for i in first..first + count {
                        let id = self.prim_index[i as usize];
                        if origin == Some(id) || seen.contains(&id) {
                            continue;
                        }
                        if let Some(hit) = self.prims[id as usize].intersect(ray) {
                            seen.push(id);
                            n_hits += 1;
                            if n_hits > max_hits {
                                return None;
                            }
                            attenuation *= filter(IntersectData::new(hit, id))?;
                        }
                    }

                    match stack.pop() {
                        Some((node, near, far)) => {
                            current = node;
                            t_near = near;
                            t_far = far;
                        }
                        None => break,
                    }
                }
            }
        }

        Some(attenuation)
    }
}

/// `prim_ids` and `prim_bounds` are parallel; bounds are already clipped to
/// this node's volume for straddling primitives.
fn build_node(
    ctx: &mut BuildCtx,
    node_bound: Bounds3f,
    prim_ids: &[PrimId],
    prim_bounds: &[Bounds3f],
    depth: u32,
) {
    if prim_ids.len() <= MAX_LEAF_PRIMS || depth == 0 {
        make_leaf(ctx, prim_ids);
        return;
    }

    let (axis, split_pos) = match select_split(node_bound, prim_bounds) {
        Some(s) => s,
        None => {
            make_leaf(ctx, prim_ids);
            return;
        }
    };

    let mut below_bound = node_bound;
    below_bound.max[axis] = split_pos;
    let mut above_bound = node_bound;
    above_bound.min[axis] = split_pos;

    // distribute, clipping straddlers to the child bound so their tightened
    // extents drive deeper splits
    let mut below_ids = Vec::new();
    let mut below_bounds = Vec::new();
    let mut above_ids = Vec::new();
    let mut above_bounds = Vec::new();

    for (&id, b) in prim_ids.iter().zip(prim_bounds) {
        if b.max[axis] <= split_pos {
            below_ids.push(id);
            below_bounds.push(*b);
        } else if b.min[axis] >= split_pos {
            above_ids.push(id);
            above_bounds.push(*b);
        } else {
            if let Some(clipped) = ctx.prims[id as usize].clip_to_bound(&below_bound) {
                below_ids.push(id);
                below_bounds.push(clipped);
            }
            if let Some(clipped) = ctx.prims[id as usize].clip_to_bound(&above_bound) {
                above_ids.push(id);
                above_bounds.push(clipped);
            }
        }
    }

    // a split that separates nothing would recurse forever
    if below_ids.len() == prim_ids.len() && above_ids.is_empty()
        || above_ids.len() == prim_ids.len() && below_ids.is_empty()
    {
        make_leaf(ctx, prim_ids);
        return;
    }

    let node_idx = ctx.nodes.len();
    ctx.nodes.push(KdNode::Interior {
        axis: axis as u8,
        split: split_pos,
        above_child: 0, // fixed up after the below subtree is emitted
    });

    build_node(ctx, below_bound, &below_ids, &below_bounds, depth - 1);

    let above_idx = ctx.nodes.len() as u32;
    if let KdNode::Interior { above_child, .. } = &mut ctx.nodes[node_idx] {
        *above_child = above_idx;
    }

    build_node(ctx, above_bound, &above_ids, &above_bounds, depth - 1);
}

fn make_leaf(ctx: &mut BuildCtx, prim_ids: &[PrimId]) {
    let first = ctx.prim_index.len() as u32;
    ctx.prim_index.extend(prim_ids.iter().copied());
    ctx.nodes.push(KdNode::Leaf {
        first,
        count: prim_ids.len() as u32,
    });
}

/// Sweep bound edges on every axis and return the SAH-optimal `(axis, pos)`,
/// or `None` when no candidate beats the cost of leaving a leaf.
fn select_split(node_bound: Bounds3f, prim_bounds: &[Bounds3f]) -> Option<(usize, Float)> {
    let n = prim_bounds.len();
    let leaf_cost = INTERSECT_COST * n as Float;
    let total_sa = node_bound.surface_area();
    if total_sa == 0.0 {
        return None;
    }
    let inv_total_sa = 1.0 / total_sa;
    let diag = node_bound.diagonal();

    let mut best: Option<(usize, Float, Float)> = None;

    for axis in 0..3 {
        let mut edges: Vec<BoundEdge> = Vec::with_capacity(2 * n);
        for b in prim_bounds {
            edges.push(BoundEdge { pos: b.min[axis], kind: EdgeKind::Start });
            edges.push(BoundEdge { pos: b.max[axis], kind: EdgeKind::End });
        }
        edges.sort_unstable_by(|a, b| {
            a.pos
                .partial_cmp(&b.pos)
                .unwrap()
                .then_with(|| match (a.kind, b.kind) {
                    (EdgeKind::Start, EdgeKind::End) => std::cmp::Ordering::Less,
                    (EdgeKind::End, EdgeKind::Start) => std::cmp::Ordering::Greater,
                    _ => std::cmp::Ordering::Equal,
                })
        });

        let (other0, other1) = ((axis + 1) % 3, (axis + 2) % 3);
        let mut n_below = 0usize;
        let mut n_above = n;

        for edge in &edges {
            if edge.kind == EdgeKind::End {
                n_above -= 1;
            }

            let pos = edge.pos;
            if pos > node_bound.min[axis] && pos < node_bound.max[axis] {
                let below_sa = 2.0
                    * (diag[other0] * diag[other1]
                        + (pos - node_bound.min[axis]) * (diag[other0] + diag[other1]));
                let above_sa = 2.0
                    * (diag[other0] * diag[other1]
                        + (node_bound.max[axis] - pos) * (diag[other0] + diag[other1]));

                let p_below = below_sa * inv_total_sa;
                let p_above = above_sa * inv_total_sa;
                let bonus = if n_below == 0 || n_above == 0 { EMPTY_BONUS } else { 0.0 };
                let cost = TRAVERSAL_COST
                    + INTERSECT_COST
                        * (1.0 - bonus)
                        * (p_below * n_below as Float + p_above * n_above as Float);

                if best.map_or(cost < leaf_cost, |(_, _, c)| cost < c) {
                    best = Some((axis, pos, cost));
                }
            }

            if edge.kind == EdgeKind::Start {
                n_below += 1;
            }
        }
    }

    best.map(|(axis, pos, _)| (axis, pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::mesh::{Triangle, TriangleMesh};
    use crate::primitive::sphere::Sphere;
    use crate::{Point3f, Vec3f};
    use pretty_assertions::assert_eq;

    fn sphere_grid() -> Vec<Arc<dyn Primitive>> {
        let mut prims: Vec<Arc<dyn Primitive>> = Vec::new();
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..4 {
                    prims.push(Arc::new(Sphere::new(
                        Point3f::new(x as Float * 3.0, y as Float * 3.0, z as Float * 3.0),
                        1.0,
                        0,
                    )));
                }
            }
        }
        prims
    }

    #[test]
    fn empty_tree_misses() {
        let tree = KdTree::build(Vec::new());
        let ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 0.0, 1.0));
        assert!(tree.intersect(&ray).is_none());
        assert!(!tree.intersect_shadow(&ray, None));
        assert_eq!(
            tree.intersect_transparent_shadow(&ray, None, 4, |_| None),
            Some(Rgb::WHITE)
        );
    }

    #[test]
    fn nearest_picks_closest_sphere() {
        let tree = KdTree::build(sphere_grid());
        // shoot down the x axis through the row y=0, z=0
        let ray = Ray::new(Point3f::new(-5.0, 0.0, 0.0), Vec3f::new(1.0, 0.0, 0.0));
        let hit = tree.intersect(&ray).unwrap();
        // first sphere is at x=0 with radius 1 -> t = 4
        assert!((hit.t - 4.0).abs() < 1e-4);
    }

    #[test]
    fn shadow_origin_prim_excluded() {
        let mesh = Arc::new(TriangleMesh::new(
            vec![
                Point3f::new(-1.0, 0.0, -1.0),
                Point3f::new(1.0, 0.0, -1.0),
                Point3f::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 1, 2]],
            0,
        ));
        let prims: Vec<Arc<dyn Primitive>> = vec![Arc::new(Triangle::new(mesh, 0))];
        let tree = KdTree::build(prims);

        // grazing ray that re-hits the same triangle numerically
        let ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(0.0, 1.0, 0.0));
        assert!(!tree.intersect_shadow(&ray, Some(0)));
    }

    #[test]
    fn transparent_shadow_accumulates() {
        let tree = KdTree::build(sphere_grid());
        let ray = Ray::new(Point3f::new(-5.0, 0.0, 0.0), Vec3f::new(1.0, 0.0, 0.0));

        // every occluder passes half the light; the ray crosses 4 spheres
        let result = tree
            .intersect_transparent_shadow(&ray, None, 16, |_| Some(Rgb::uniform(0.5)))
            .unwrap();
        assert!((result.r - 0.5f32.powi(4)).abs() < 1e-5);

        // opaque occluder shadows completely
        assert!(tree
            .intersect_transparent_shadow(&ray, None, 16, |_| None)
            .is_none());

        // chains longer than the depth limit count as opaque
        assert!(tree
            .intersect_transparent_shadow(&ray, None, 2, |_| Some(Rgb::uniform(0.9)))
            .is_none());
    }

    #[test]
    fn agrees_with_brute_force_on_grid() {
        use crate::accel::BruteForce;
        use rand::{Rng, SeedableRng};
        use rand_xoshiro::Xoshiro256Plus;

        let prims = sphere_grid();
        let tree = KdTree::build(prims.clone());
        let brute = BruteForce::new(prims);

        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        for _ in 0..500 {
            let from = Point3f::new(
                rng.gen_range(-12.0, 20.0),
                rng.gen_range(-12.0, 20.0),
                rng.gen_range(-12.0, 20.0),
            );
            let dir = Vec3f::new(
                rng.gen_range(-1.0, 1.0f32),
                rng.gen_range(-1.0, 1.0),
                rng.gen_range(-1.0, 1.0),
            );
            if dir.x == 0.0 && dir.y == 0.0 && dir.z == 0.0 {
                continue;
            }
            let ray = Ray::new(from, dir);

            let kd = tree.intersect(&ray);
            let bf = brute.intersect(&ray);
            match (kd, bf) {
                (Some(a), Some(b)) => {
                    assert!((a.t - b.t).abs() < 1e-3, "t mismatch: {} vs {}", a.t, b.t);
                    assert_eq!(a.prim, b.prim);
                }
                (None, None) => {}
                other => panic!("kd/brute disagree: {:?}", other),
            }

            assert_eq!(
                tree.intersect_shadow(&ray, None),
                brute.intersect_shadow(&ray, None)
            );
        }
    }
}
