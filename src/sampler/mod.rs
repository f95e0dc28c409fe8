use cgmath::EuclideanSpace;

use crate::{Float, Point2f, Point2i};

pub mod lowdiscrepancy;
pub mod random;

pub use lowdiscrepancy::LowDiscrepancySampler;
pub use random::RandomSampler;

#[derive(Clone, Copy)]
pub struct CameraSample {
    pub p_film: Point2f,
    pub p_lens: Point2f,
    pub time: Float,
}

/// Per-worker sample stream. Implementations must be deterministic under
/// `clone_with_seed`: the same seed and request sequence yields the same
/// values, which is what makes whole renders reproducible.
pub trait Sampler: Send {
    /// `pixel_id` feeds the per-pixel scramble so neighbouring pixels do not
    /// share low-discrepancy patterns.
    fn start_pixel(&mut self, pixel: Point2i, pixel_id: u64);

    fn start_next_sample(&mut self) -> bool;

    /// Base sample index for adaptive passes: pass `n` continues the pixel's
    /// sequence where pass `n-1` stopped instead of replaying it.
    fn set_sample_base(&mut self, base: u64);

    fn get_1d(&mut self) -> Float;

    fn get_2d(&mut self) -> Point2f;

    fn clone_with_seed(&self, seed: u64) -> Box<dyn Sampler>;

    fn samples_per_pixel(&self) -> u64;

    fn get_camera_sample(&mut self, p_raster: Point2i) -> CameraSample {
        let p_film = Point2f::new(p_raster.x as Float, p_raster.y as Float) + self.get_2d().to_vec();
        CameraSample {
            p_film,
            p_lens: self.get_2d(),
            time: self.get_1d(),
        }
    }
}

/// SplitMix64 finalizer; used to derive per-dimension scrambles from
/// `(seed, pixel, dimension)` without any shared state.
pub fn mix_seed(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_seed_differs_per_input() {
        assert_ne!(mix_seed(0), mix_seed(1));
        assert_ne!(mix_seed(1), mix_seed(2));
    }

    #[test]
    fn camera_sample_in_pixel() {
        let mut sampler = LowDiscrepancySampler::new(4, 1);
        sampler.start_pixel(Point2i::new(3, 7), 3 + 7 * 64);
        assert!(sampler.start_next_sample());
        let cs = sampler.get_camera_sample(Point2i::new(3, 7));
        assert!(cs.p_film.x >= 3.0 && cs.p_film.x < 4.0);
        assert!(cs.p_film.y >= 7.0 && cs.p_film.y < 8.0);
    }
}
