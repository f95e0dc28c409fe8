use crate::geometry::Bounds3f;
use crate::photon::{FoundPhoton, Photon};
use crate::{Float, Point3f, Vec3f};
use cgmath::InnerSpace;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

/// Balanced median-split k-d tree over the photon array, stored heap-style:
/// children of slot `i` live at `2i+1` and `2i+2`. Built once after
/// shooting; queries are lock-free reads.
pub struct PhotonMap {
    photons: Vec<Photon>,
    /// Split axis per heap slot; `LEAF` where a slot has no children.
    axes: Vec<u8>,
    n_paths: usize,
    built: bool,
}

const LEAF: u8 = 3;

struct HeapEntry {
    dist2: Float,
    idx: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist2 == other.dist2
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.dist2.partial_cmp(&other.dist2)
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

impl Default for PhotonMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PhotonMap {
    pub fn new() -> Self {
        Self {
            photons: Vec::new(),
            axes: Vec::new(),
            n_paths: 0,
            built: false,
        }
    }

    pub fn push(&mut self, photon: Photon) {
        debug_assert!(!self.built);
        self.photons.push(photon);
    }

    pub fn append(&mut self, mut photons: Vec<Photon>) {
        debug_assert!(!self.built);
        self.photons.append(&mut photons);
    }

    pub fn len(&self) -> usize {
        self.photons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photons.is_empty()
    }

    /// Number of emitted paths the stored photons came from; estimates scale
    /// by `1/n_paths`.
    pub fn set_n_paths(&mut self, n: usize) {
        self.n_paths = n;
    }

    pub fn n_paths(&self) -> usize {
        self.n_paths
    }

    pub fn photon(&self, idx: u32) -> &Photon {
        &self.photons[idx as usize]
    }

    pub fn photons(&self) -> &[Photon] {
        &self.photons
    }

    pub fn split_axes(&self) -> &[u8] {
        &self.axes
    }

    pub(crate) fn from_parts(photons: Vec<Photon>, axes: Vec<u8>, n_paths: usize) -> Self {
        let built = !photons.is_empty() && axes.len() == photons.len();
        Self { photons, axes, n_paths, built }
    }

    /// Sort the photons into the balanced tree. Idempotent; call after all
    /// pushes.
    pub fn build(&mut self) {
        let n = self.photons.len();
        self.axes = vec![LEAF; n];
        if n == 0 {
            self.built = true;
            return;
        }

        let placeholder = self.photons[0];
        let mut source = std::mem::replace(&mut self.photons, vec![placeholder; n]);
        balance(&mut source, &mut self.photons, &mut self.axes, 0);
        self.built = true;
        debug!(photons = n, "photon map balanced");
    }

    /// The `k` nearest photons within `sqrt(max_dist2)` of `p`. Returns the
    /// photons and the squared distance of the farthest one kept.
    pub fn gather(&self, p: Point3f, k: usize, max_dist2: Float) -> (Vec<FoundPhoton>, Float) {
        assert!(self.built, "gather before build");
        if self.photons.is_empty() || k == 0 {
            return (Vec::new(), 0.0);
        }

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);
        let mut limit = max_dist2;
        self.gather_node(0, p, k, &mut heap, &mut limit);

        let achieved = heap.peek().map_or(0.0, |e| e.dist2);
        let found = heap
            .into_iter()
            .map(|e| FoundPhoton { idx: e.idx, dist2: e.dist2 })
            .collect();
        (found, achieved)
    }

    fn gather_node(
        &self,
        node: usize,
        p: Point3f,
        k: usize,
        heap: &mut BinaryHeap<HeapEntry>,
        limit: &mut Float,
    ) {
        let axis = self.axes[node];
        if axis != LEAF {
            let delta = p[axis as usize] - self.photons[node].pos[axis as usize];
            let (near, far) = if delta < 0.0 {
                (2 * node + 1, 2 * node + 2)
            } else {
                (2 * node + 2, 2 * node + 1)
            };
            if near < self.photons.len() {
                self.gather_node(near, p, k, heap, limit);
            }
            if delta * delta < *limit && far < self.photons.len() {
                self.gather_node(far, p, k, heap, limit);
            }
        }

        let d = self.photons[node].pos - p;
        let dist2 = d.magnitude2();
        if dist2 < *limit {
            heap.push(HeapEntry { dist2, idx: node as u32 });
            if heap.len() > k {
                heap.pop();
            }
            if heap.len() == k {
                // shrink the search radius to the current k-th distance
                *limit = heap.peek().unwrap().dist2;
            }
        }
    }

    /// Closest photon to `p` whose incoming direction lies on the `n` side.
    pub fn nearest(&self, p: Point3f, n: Vec3f, max_dist2: Float) -> Option<&Photon> {
        assert!(self.built, "nearest before build");
        if self.photons.is_empty() {
            return None;
        }
        let mut best: Option<u32> = None;
        let mut limit = max_dist2;
        self.nearest_node(0, p, n, &mut best, &mut limit);
        best.map(|i| &self.photons[i as usize])
    }

    fn nearest_node(
        &self,
        node: usize,
        p: Point3f,
        n: Vec3f,
        best: &mut Option<u32>,
        limit: &mut Float,
    ) {
        let axis = self.axes[node];
        if axis != LEAF {
            let delta = p[axis as usize] - self.photons[node].pos[axis as usize];
            let (near, far) = if delta < 0.0 {
                (2 * node + 1, 2 * node + 2)
            } else {
                (2 * node + 2, 2 * node + 1)
            };
            if near < self.photons.len() {
                self.nearest_node(near, p, n, best, limit);
            }
            if delta * delta < *limit && far < self.photons.len() {
                self.nearest_node(far, p, n, best, limit);
            }
        }

        let photon = &self.photons[node];
        let dist2 = (photon.pos - p).magnitude2();
        if dist2 < *limit && photon.dir.dot(n) > 0.0 {
            *limit = dist2;
            *best = Some(node as u32);
        }
    }
}

/// Heap slot count of the left subtree of a left-balanced tree of `n` nodes.
fn left_subtree_size(n: usize) -> usize {
    debug_assert!(n >= 2);
    let h = (n as f64).log2().floor() as u32;
    let full_above = (1usize << h) - 1;
    let bottom = n - full_above;
    let half = 1usize << (h - 1);
    (half - 1) + bottom.min(half)
}

fn balance(items: &mut [Photon], heap: &mut [Photon], axes: &mut [u8], node: usize) {
    if items.len() == 1 {
        heap[node] = items[0];
        axes[node] = LEAF;
        return;
    }

    let bound = items
        .iter()
        .fold(Bounds3f::empty(), |b, ph| b.join_point(ph.pos));
    let axis = bound.maximum_extent();

    let median = left_subtree_size(items.len());
    items.select_nth_unstable_by(median, |a, b| {
        a.pos[axis].partial_cmp(&b.pos[axis]).unwrap_or(Ordering::Equal)
    });

    heap[node] = items[median];
    axes[node] = axis as u8;

    let (below, rest) = items.split_at_mut(median);
    let above = &mut rest[1..];
    balance(below, heap, axes, 2 * node + 1);
    if !above.is_empty() {
        balance(above, heap, axes, 2 * node + 2);
    }
}
