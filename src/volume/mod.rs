use crate::color::Rgb;
use crate::geometry::{Bounds3f, Ray};
use crate::sampling::phase_hg;
use crate::{Float, Point3f, Vec3f};
use cgmath::InnerSpace;
use ndarray::Array3;

/// AABB-bounded participating medium. Coefficients are position-dependent;
/// `tau` integrates extinction along a ray segment by marching.
pub trait VolumeRegion: Send + Sync {
    fn bound(&self) -> Bounds3f;

    /// Entry/exit distances of the ray through the region's bound.
    fn intersect(&self, ray: &Ray) -> Option<(Float, Float)> {
        self.bound().intersect_test(ray)
    }

    fn sigma_a(&self, p: Point3f, v: Vec3f) -> Rgb;

    fn sigma_s(&self, p: Point3f, v: Vec3f) -> Rgb;

    fn emission(&self, p: Point3f, v: Vec3f) -> Rgb;

    fn sigma_t(&self, p: Point3f, v: Vec3f) -> Rgb {
        self.sigma_a(p, v) + self.sigma_s(p, v)
    }

    /// Optical thickness along the ray, clipped to the region. `offset`
    /// jitters the first step to turn banding into noise.
    fn tau(&self, ray: &Ray, step: Float, offset: Float) -> Rgb {
        let (t0, t1) = match self.intersect(ray) {
            Some(t) => t,
            None => return Rgb::BLACK,
        };
        let t0 = t0.max(ray.tmin);
        let t1 = t1.min(ray.tmax);
        if t1 <= t0 {
            return Rgb::BLACK;
        }

        let mut tau = Rgb::BLACK;
        let mut t = t0 + offset * step;
        while t < t1 {
            let p = ray.at(t);
            let ds = step.min(t1 - t);
            tau += self.sigma_t(p, ray.dir) * ds;
            t += step;
        }
        tau
    }

    /// Henyey-Greenstein asymmetry parameter; ignored by regions that
    /// override `phase`.
    fn g(&self) -> Float {
        0.0
    }

    fn phase(&self, w_l: Vec3f, w_s: Vec3f) -> Float {
        phase_hg(w_l.dot(w_s), self.g())
    }
}

/// Common fields of all stock regions.
#[derive(Clone, Debug)]
pub struct RegionBase {
    pub sigma_a: Rgb,
    pub sigma_s: Rgb,
    pub emission: Rgb,
    pub g: Float,
    pub bound: Bounds3f,
}

impl RegionBase {
    pub fn new(sigma_a: Rgb, sigma_s: Rgb, emission: Rgb, g: Float, bound: Bounds3f) -> Self {
        Self { sigma_a, sigma_s, emission, g, bound }
    }
}

pub struct UniformVolume {
    pub base: RegionBase,
}

impl VolumeRegion for UniformVolume {
    fn bound(&self) -> Bounds3f {
        self.base.bound
    }

    fn sigma_a(&self, p: Point3f, _v: Vec3f) -> Rgb {
        if self.base.bound.contains(p) { self.base.sigma_a } else { Rgb::BLACK }
    }

    fn sigma_s(&self, p: Point3f, _v: Vec3f) -> Rgb {
        if self.base.bound.contains(p) { self.base.sigma_s } else { Rgb::BLACK }
    }

    fn emission(&self, p: Point3f, _v: Vec3f) -> Rgb {
        if self.base.bound.contains(p) { self.base.emission } else { Rgb::BLACK }
    }

    fn g(&self) -> Float {
        self.base.g
    }
}

/// Density falling off exponentially with height: `a·exp(-b·h)` measured
/// from the bottom face.
pub struct ExpDensityVolume {
    pub base: RegionBase,
    pub a: Float,
    pub b: Float,
}

impl ExpDensityVolume {
    fn density(&self, p: Point3f) -> Float {
        if !self.base.bound.contains(p) {
            return 0.0;
        }
        let h = p.y - self.base.bound.min.y;
        self.a * (-self.b * h).exp()
    }
}

impl VolumeRegion for ExpDensityVolume {
    fn bound(&self) -> Bounds3f {
        self.base.bound
    }

    fn sigma_a(&self, p: Point3f, _v: Vec3f) -> Rgb {
        self.base.sigma_a * self.density(p)
    }

    fn sigma_s(&self, p: Point3f, _v: Vec3f) -> Rgb {
        self.base.sigma_s * self.density(p)
    }

    fn emission(&self, p: Point3f, _v: Vec3f) -> Rgb {
        self.base.emission * self.density(p)
    }

    fn g(&self) -> Float {
        self.base.g
    }
}

/// Density sampled trilinearly from a 3d grid spanning the bound.
pub struct GridVolume {
    pub base: RegionBase,
    grid: Array3<Float>,
}

impl GridVolume {
    pub fn new(base: RegionBase, grid: Array3<Float>) -> Self {
        Self { base, grid }
    }

    fn density(&self, p: Point3f) -> Float {
        if !self.base.bound.contains(p) {
            return 0.0;
        }
        let o = self.base.bound.offset(p);
        let (nx, ny, nz) = self.grid.dim();

        let fx = (o.x * (nx as Float - 1.0)).max(0.0);
        let fy = (o.y * (ny as Float - 1.0)).max(0.0);
        let fz = (o.z * (nz as Float - 1.0)).max(0.0);

        let x0 = (fx as usize).min(nx - 1);
        let y0 = (fy as usize).min(ny - 1);
        let z0 = (fz as usize).min(nz - 1);
        let x1 = (x0 + 1).min(nx - 1);
        let y1 = (y0 + 1).min(ny - 1);
        let z1 = (z0 + 1).min(nz - 1);

        let (dx, dy, dz) = (fx - x0 as Float, fy - y0 as Float, fz - z0 as Float);

        let lerp = |a: Float, b: Float, t: Float| a + (b - a) * t;
        let c00 = lerp(self.grid[[x0, y0, z0]], self.grid[[x1, y0, z0]], dx);
        let c10 = lerp(self.grid[[x0, y1, z0]], self.grid[[x1, y1, z0]], dx);
        let c01 = lerp(self.grid[[x0, y0, z1]], self.grid[[x1, y0, z1]], dx);
        let c11 = lerp(self.grid[[x0, y1, z1]], self.grid[[x1, y1, z1]], dx);
        lerp(lerp(c00, c10, dy), lerp(c01, c11, dy), dz)
    }
}

impl VolumeRegion for GridVolume {
    fn bound(&self) -> Bounds3f {
        self.base.bound
    }

    fn sigma_a(&self, p: Point3f, _v: Vec3f) -> Rgb {
        self.base.sigma_a * self.density(p)
    }

    fn sigma_s(&self, p: Point3f, _v: Vec3f) -> Rgb {
        self.base.sigma_s * self.density(p)
    }

    fn emission(&self, p: Point3f, _v: Vec3f) -> Rgb {
        self.base.emission * self.density(p)
    }

    fn g(&self) -> Float {
        self.base.g
    }
}

/// Procedural density source for `NoiseVolume`. Noise generators live
/// outside the core; any `Send + Sync` field plugs in.
pub trait DensityField: Send + Sync {
    fn density(&self, p: Point3f) -> Float;
}

impl<F: Fn(Point3f) -> Float + Send + Sync> DensityField for F {
    fn density(&self, p: Point3f) -> Float {
        self(p)
    }
}

pub struct NoiseVolume {
    pub base: RegionBase,
    field: Box<dyn DensityField>,
    cover: Float,
    sharpness: Float,
    density_scale: Float,
}

impl NoiseVolume {
    pub fn new(
        base: RegionBase,
        field: Box<dyn DensityField>,
        cover: Float,
        sharpness: Float,
        density_scale: Float,
    ) -> Self {
        Self {
            base,
            field,
            cover,
            sharpness: sharpness * sharpness,
            density_scale,
        }
    }

    fn density(&self, p: Point3f) -> Float {
        if !self.base.bound.contains(p) {
            return 0.0;
        }
        let mut d = self.field.density(p) + self.cover - 1.0;
        if d <= 0.0 {
            return 0.0;
        }
        d = d.powf(self.sharpness);
        d * self.density_scale
    }
}

impl VolumeRegion for NoiseVolume {
    fn bound(&self) -> Bounds3f {
        self.base.bound
    }

    fn sigma_a(&self, p: Point3f, _v: Vec3f) -> Rgb {
        self.base.sigma_a * self.density(p)
    }

    fn sigma_s(&self, p: Point3f, _v: Vec3f) -> Rgb {
        self.base.sigma_s * self.density(p)
    }

    fn emission(&self, p: Point3f, _v: Vec3f) -> Rgb {
        self.base.emission * self.density(p)
    }

    fn g(&self) -> Float {
        self.base.g
    }
}

/// Atmosphere-style region mixing Rayleigh and Mie scattering instead of a
/// single HG lobe.
pub struct SkyVolume {
    pub base: RegionBase,
    s_ray: Rgb,
    s_mie: Rgb,
}

impl SkyVolume {
    pub fn new(bound: Bounds3f, s_ray: Rgb, s_mie: Rgb, emission: Rgb) -> Self {
        Self {
            base: RegionBase::new(Rgb::BLACK, s_ray + s_mie, emission, 0.0, bound),
            s_ray,
            s_mie,
        }
    }

    fn phase_rayleigh(cos_theta: Float) -> Float {
        3.0 / (16.0 * std::f32::consts::PI) * (1.0 + cos_theta * cos_theta)
    }

    fn phase_mie(cos_theta: Float) -> Float {
        // Schlick approximation with k tuned for haze
        let k = 0.8;
        let d = 1.0 + k * cos_theta;
        (1.0 - k * k) / (4.0 * std::f32::consts::PI * d * d)
    }
}

impl VolumeRegion for SkyVolume {
    fn bound(&self) -> Bounds3f {
        self.base.bound
    }

    fn sigma_a(&self, _p: Point3f, _v: Vec3f) -> Rgb {
        Rgb::BLACK
    }

    fn sigma_s(&self, p: Point3f, _v: Vec3f) -> Rgb {
        if self.base.bound.contains(p) {
            self.s_ray + self.s_mie
        } else {
            Rgb::BLACK
        }
    }

    fn emission(&self, p: Point3f, _v: Vec3f) -> Rgb {
        if self.base.bound.contains(p) { self.base.emission } else { Rgb::BLACK }
    }

    fn phase(&self, w_l: Vec3f, w_s: Vec3f) -> Float {
        let cos_theta = w_l.dot(w_s);
        let wr = self.s_ray.energy();
        let wm = self.s_mie.energy();
        let total = (wr + wm).max(1e-8);
        (wr * Self::phase_rayleigh(cos_theta) + wm * Self::phase_mie(cos_theta)) / total
    }
}

/// Precomputed shadow optical depth toward one light, sampled over the
/// region's bound; turns per-step shadow marching into a lookup.
pub struct AttenuationGrid {
    tau: Array3<Float>,
    bound: Bounds3f,
}

pub const ATTENUATION_GRID_RES: usize = 16;

impl AttenuationGrid {
    pub fn build(region: &dyn VolumeRegion, light_pos: Point3f, step: Float) -> Self {
        let bound = region.bound();
        let n = ATTENUATION_GRID_RES;
        let mut tau = Array3::zeros((n, n, n));
        let d = bound.diagonal();

        for ix in 0..n {
            for iy in 0..n {
                for iz in 0..n {
                    let p = Point3f::new(
                        bound.min.x + d.x * (ix as Float + 0.5) / n as Float,
                        bound.min.y + d.y * (iy as Float + 0.5) / n as Float,
                        bound.min.z + d.z * (iz as Float + 0.5) / n as Float,
                    );
                    let to_light = light_pos - p;
                    let dist = to_light.magnitude();
                    if dist > 0.0 {
                        let ray = Ray::with_bounds(p, to_light / dist, 0.0, dist);
                        tau[[ix, iy, iz]] = region.tau(&ray, step, 0.5).energy();
                    }
                }
            }
        }

        Self { tau, bound }
    }

    /// Transmittance from `p` towards the grid's light.
    pub fn attenuation(&self, p: Point3f) -> Float {
        if !self.bound.contains(p) {
            return 1.0;
        }
        let o = self.bound.offset(p);
        let n = ATTENUATION_GRID_RES;
        let ix = ((o.x * n as Float) as usize).min(n - 1);
        let iy = ((o.y * n as Float) as usize).min(n - 1);
        let iz = ((o.z * n as Float) as usize).min(n - 1);
        (-self.tau[[ix, iy, iz]]).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_region() -> UniformVolume {
        UniformVolume {
            base: RegionBase::new(
                Rgb::uniform(0.5),
                Rgb::uniform(0.25),
                Rgb::BLACK,
                0.0,
                Bounds3f::with_bounds(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0)),
            ),
        }
    }

    #[test]
    fn tau_of_degenerate_ray_is_zero() {
        let vol = unit_region();
        let mut ray = Ray::new(Point3f::new(-1.0, 0.5, 0.5), Vec3f::new(1.0, 0.0, 0.0));
        ray.tmax = 0.0;
        assert_eq!(vol.tau(&ray, 0.1, 0.0), Rgb::BLACK);
    }

    #[test]
    fn tau_across_unit_cube() {
        let vol = unit_region();
        let ray = Ray::new(Point3f::new(-1.0, 0.5, 0.5), Vec3f::new(1.0, 0.0, 0.0));
        let tau = vol.tau(&ray, 0.01, 0.5);
        // sigma_t = 0.75 over a unit path
        assert_abs_diff_eq!(tau.r, 0.75, epsilon = 0.02);
    }

    #[test]
    fn tau_is_additive_over_split() {
        let vol = unit_region();
        let dir = Vec3f::new(1.0, 0.0, 0.0);
        let from = Point3f::new(-1.0, 0.5, 0.5);

        let full = vol.tau(&Ray::with_bounds(from, dir, 0.0, 3.0), 0.01, 0.5);
        let first = vol.tau(&Ray::with_bounds(from, dir, 0.0, 1.5), 0.01, 0.5);
        let second = vol.tau(&Ray::with_bounds(from, dir, 1.5, 3.0), 0.01, 0.5);
        assert_abs_diff_eq!(full.r, first.r + second.r, epsilon = 0.03);
    }

    #[test]
    fn exp_density_decays_with_height() {
        let vol = ExpDensityVolume {
            base: RegionBase::new(
                Rgb::uniform(1.0),
                Rgb::BLACK,
                Rgb::BLACK,
                0.0,
                Bounds3f::with_bounds(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 2.0, 1.0)),
            ),
            a: 1.0,
            b: 1.0,
        };
        let low = vol.sigma_a(Point3f::new(0.5, 0.0, 0.5), Vec3f::new(0.0, 1.0, 0.0));
        let high = vol.sigma_a(Point3f::new(0.5, 1.0, 0.5), Vec3f::new(0.0, 1.0, 0.0));
        assert_abs_diff_eq!(low.r, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(high.r, (-1.0f32).exp(), epsilon = 1e-5);
    }

    #[test]
    fn grid_trilinear_interpolates() {
        let mut grid = Array3::zeros((2, 2, 2));
        grid[[1, 0, 0]] = 1.0;
        grid[[1, 1, 0]] = 1.0;
        grid[[1, 0, 1]] = 1.0;
        grid[[1, 1, 1]] = 1.0;
        let vol = GridVolume::new(
            RegionBase::new(
                Rgb::uniform(1.0),
                Rgb::BLACK,
                Rgb::BLACK,
                0.0,
                Bounds3f::with_bounds(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0)),
            ),
            grid,
        );
        // halfway in x the density interpolates to 0.5
        let mid = vol.sigma_a(Point3f::new(0.5, 0.5, 0.5), Vec3f::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(mid.r, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn noise_volume_respects_cover() {
        let base = RegionBase::new(
            Rgb::uniform(1.0),
            Rgb::BLACK,
            Rgb::BLACK,
            0.0,
            Bounds3f::with_bounds(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0)),
        );
        let vol = NoiseVolume::new(base, Box::new(|_p: Point3f| 0.4), 0.5, 1.0, 1.0);
        // 0.4 + 0.5 - 1.0 < 0 -> fully cut away
        assert_eq!(
            vol.sigma_a(Point3f::new(0.5, 0.5, 0.5), Vec3f::new(1.0, 0.0, 0.0)),
            Rgb::BLACK
        );
    }

    #[test]
    fn sky_phase_normalizes_mixture() {
        let vol = SkyVolume::new(
            Bounds3f::with_bounds(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0)),
            Rgb::uniform(0.1),
            Rgb::uniform(0.1),
            Rgb::BLACK,
        );
        let p = vol.phase(Vec3f::new(0.0, 1.0, 0.0), Vec3f::new(1.0, 0.0, 0.0));
        assert!(p > 0.0);
    }

    #[test]
    fn attenuation_grid_matches_direct_tau() {
        let vol = unit_region();
        let light_pos = Point3f::new(0.5, 5.0, 0.5);
        let grid = AttenuationGrid::build(&vol, light_pos, 0.02);

        let p = Point3f::new(0.5, 0.1, 0.5);
        let to_light = light_pos - p;
        let dist = to_light.magnitude();
        let ray = Ray::with_bounds(p, to_light / dist, 0.0, dist);
        let direct = (-vol.tau(&ray, 0.02, 0.5).energy()).exp();

        assert_abs_diff_eq!(grid.attenuation(p), direct, epsilon = 0.05);
    }
}
