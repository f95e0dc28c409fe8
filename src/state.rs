use crate::material::nodes::NodeStack;
use crate::primitive::MaterialId;
use crate::Float;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use smallvec::SmallVec;

/// Per-ray scratch carried down the shading recursion. One lives in each
/// worker; nothing here is shared.
pub struct RenderState {
    /// Bounce depth of the current ray (0 for camera rays). Bounds all
    /// recursion except transparent-shadow chains, which have their own
    /// limit.
    pub ray_level: u16,
    /// Index of the sample within its pixel, across passes.
    pub pixel_sample: u64,
    /// Offset into the quasi-random sequences, derived from the pass; keeps
    /// adaptive passes from replaying earlier samples.
    pub sampling_offs: u64,
    pub pass: usize,
    pub pixel_number: u64,
    pub time: Float,
    /// Per-shade-point node evaluation buffer.
    pub node_stack: NodeStack,
    /// Stack of media the ray is currently inside, outermost first.
    pub inside: SmallVec<[MaterialId; 4]>,
    prng: Xoshiro256Plus,
}

impl RenderState {
    pub fn new(seed: u64) -> Self {
        Self {
            ray_level: 0,
            pixel_sample: 0,
            sampling_offs: 0,
            pass: 0,
            pixel_number: 0,
            time: 0.0,
            node_stack: NodeStack::new(),
            inside: SmallVec::new(),
            prng: Xoshiro256Plus::seed_from_u64(seed),
        }
    }

    pub fn random(&mut self) -> Float {
        self.prng.gen()
    }

    /// Reset the per-ray random stream. The driver reseeds from
    /// `(pixel, sample, pass)` before every camera sample so results do not
    /// depend on tile shape or scheduling.
    pub fn reseed(&mut self, seed: u64) {
        self.prng = Xoshiro256Plus::seed_from_u64(seed);
    }

    pub fn enter_medium(&mut self, material: MaterialId) {
        self.inside.push(material);
    }

    pub fn leave_medium(&mut self, material: MaterialId) {
        if let Some(idx) = self.inside.iter().rposition(|&m| m == material) {
            self.inside.remove(idx);
        }
    }

    pub fn current_medium(&self) -> Option<MaterialId> {
        self.inside.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_stack_is_lifo() {
        let mut state = RenderState::new(1);
        state.enter_medium(3);
        state.enter_medium(5);
        assert_eq!(state.current_medium(), Some(5));
        state.leave_medium(5);
        assert_eq!(state.current_medium(), Some(3));
        // leaving a medium we never entered is a no-op
        state.leave_medium(9);
        assert_eq!(state.current_medium(), Some(3));
    }

    #[test]
    fn seeded_random_reproducible() {
        let mut a = RenderState::new(99);
        let mut b = RenderState::new(99);
        for _ in 0..16 {
            assert_eq!(a.random(), b.random());
        }
    }
}
