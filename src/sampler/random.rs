use crate::sampler::Sampler;
use crate::{Float, Point2f, Point2i};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// Plain pseudo-random sampler; kept for tests and for comparing variance
/// against the low-discrepancy sampler.
pub struct RandomSampler {
    samples_per_pixel: u64,
    seed: u64,
    rng: Xoshiro256Plus,
    current_sample: u64,
    started: bool,
}

impl RandomSampler {
    pub fn new_with_seed(samples_per_pixel: u64, seed: u64) -> Self {
        Self {
            samples_per_pixel,
            seed,
            rng: Xoshiro256Plus::seed_from_u64(seed),
            current_sample: 0,
            started: false,
        }
    }
}

impl Sampler for RandomSampler {
    fn start_pixel(&mut self, _pixel: Point2i, pixel_id: u64) {
        self.rng = Xoshiro256Plus::seed_from_u64(self.seed ^ pixel_id.wrapping_mul(0x9e37_79b9));
        self.current_sample = 0;
        self.started = false;
    }

    fn start_next_sample(&mut self) -> bool {
        if self.started {
            self.current_sample += 1;
        }
        self.started = true;
        self.current_sample < self.samples_per_pixel
    }

    fn set_sample_base(&mut self, _base: u64) {}

    fn get_1d(&mut self) -> Float {
        self.rng.gen()
    }

    fn get_2d(&mut self) -> Point2f {
        Point2f::new(self.rng.gen(), self.rng.gen())
    }

    fn clone_with_seed(&self, seed: u64) -> Box<dyn Sampler> {
        Box::new(Self::new_with_seed(self.samples_per_pixel, seed))
    }

    fn samples_per_pixel(&self) -> u64 {
        self.samples_per_pixel
    }
}
