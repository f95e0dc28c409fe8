use crate::geometry::Bounds3f;
use crate::photon::{FoundPhoton, Photon};
use crate::{Float, Point3f};
use cgmath::InnerSpace;

/// Uniform spatial hash over the photon cloud, sized so one cell matches the
/// current query radius. Preferred over the balanced tree by progressive
/// estimators, which rebuild the index every iteration with a shrinking
/// radius.
pub struct HashGrid {
    cell_size: Float,
    inv_cell_size: Float,
    grid_size: usize,
    bound: Bounds3f,
    photons: Vec<Photon>,
    cells: Vec<Vec<u32>>,
}

impl HashGrid {
    pub fn new(cell_size: Float, grid_size: usize, bound: Bounds3f) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            grid_size: grid_size.max(1),
            bound,
            photons: Vec::new(),
            cells: Vec::new(),
        }
    }

    fn hash(&self, ix: i64, iy: i64, iz: i64) -> usize {
        let h = (ix.wrapping_mul(73_856_093))
            ^ (iy.wrapping_mul(19_349_663))
            ^ (iz.wrapping_mul(83_492_791));
        (h as u64 % self.grid_size as u64) as usize
    }

    fn cell_coords(&self, p: Point3f) -> (i64, i64, i64) {
        let rel = (p - self.bound.min) * self.inv_cell_size;
        (
            rel.x.abs() as i64,
            rel.y.abs() as i64,
            rel.z.abs() as i64,
        )
    }

    pub fn push_photon(&mut self, photon: Photon) {
        self.photons.push(photon);
    }

    pub fn clear(&mut self) {
        self.photons.clear();
        self.cells.clear();
    }

    pub fn len(&self) -> usize {
        self.photons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photons.is_empty()
    }

    pub fn photon(&self, idx: u32) -> &Photon {
        &self.photons[idx as usize]
    }

    /// (Re)build the cell lists; each photon lands in exactly one cell.
    pub fn update_grid(&mut self) {
        self.cells = vec![Vec::new(); self.grid_size];
        for (i, photon) in self.photons.iter().enumerate() {
            let (ix, iy, iz) = self.cell_coords(photon.pos);
            let idx = self.hash(ix, iy, iz);
            self.cells[idx].push(i as u32);
        }
    }

    /// All photons within `sqrt(sq_radius)` of `p`, bounded by `max_found`.
    pub fn gather(&self, p: Point3f, max_found: usize, sq_radius: Float) -> Vec<FoundPhoton> {
        let mut found = Vec::new();
        if self.cells.is_empty() {
            return found;
        }
        let radius = sq_radius.sqrt();

        let (x0, y0, z0) = self.cell_coords(Point3f::new(p.x - radius, p.y - radius, p.z - radius));
        let (x1, y1, z1) = self.cell_coords(Point3f::new(p.x + radius, p.y + radius, p.z + radius));

        for iz in z0.min(z1)..=z0.max(z1) {
            for iy in y0.min(y1)..=y0.max(y1) {
                for ix in x0.min(x1)..=x0.max(x1) {
                    let cell = &self.cells[self.hash(ix, iy, iz)];
                    for &idx in cell {
                        let d2 = (self.photons[idx as usize].pos - p).magnitude2();
                        if d2 < sq_radius {
                            found.push(FoundPhoton { idx, dist2: d2 });
                            if found.len() >= max_found {
                                return found;
                            }
                        }
                    }
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::Vec3f;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256Plus;

    fn grid_with_photons(n: usize, seed: u64, radius: Float) -> HashGrid {
        let bound = Bounds3f::with_bounds(
            Point3f::new(-10.0, -10.0, -10.0),
            Point3f::new(10.0, 10.0, 10.0),
        );
        let mut grid = HashGrid::new(radius, n, bound);
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        for _ in 0..n {
            grid.push_photon(Photon {
                pos: Point3f::new(
                    rng.gen_range(-10.0, 10.0),
                    rng.gen_range(-10.0, 10.0),
                    rng.gen_range(-10.0, 10.0),
                ),
                dir: Vec3f::new(0.0, 1.0, 0.0),
                power: Rgb::WHITE,
                normal: Vec3f::new(0.0, 1.0, 0.0),
            });
        }
        grid.update_grid();
        grid
    }

    #[test]
    fn gather_matches_linear_scan() {
        let radius: Float = 1.5;
        let grid = grid_with_photons(400, 17, radius);
        let mut rng = Xoshiro256Plus::seed_from_u64(23);

        for _ in 0..30 {
            let q = Point3f::new(
                rng.gen_range(-8.0, 8.0),
                rng.gen_range(-8.0, 8.0),
                rng.gen_range(-8.0, 8.0),
            );
            let sq = radius * radius;
            let mut got: Vec<u32> = grid.gather(q, usize::max_value(), sq).iter().map(|f| f.idx).collect();
            got.sort_unstable();

            let mut want: Vec<u32> = grid
                .photons
                .iter()
                .enumerate()
                .filter(|(_, ph)| (ph.pos - q).magnitude2() < sq)
                .map(|(i, _)| i as u32)
                .collect();
            want.sort_unstable();
            assert_eq!(got, want);
        }
    }

    #[test]
    fn rebuild_after_clear() {
        let mut grid = grid_with_photons(50, 2, 1.0);
        assert!(!grid.is_empty());
        grid.clear();
        assert!(grid.is_empty());
        grid.update_grid();
        assert!(grid.gather(Point3f::new(0.0, 0.0, 0.0), 10, 4.0).is_empty());
    }
}
