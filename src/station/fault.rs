use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Decides whether a clean single reception is treated as a collision
///
/// A robustness hook for exercising the release-and-reacquire path. Production
/// stations use [`NeverCollide`].
pub trait CollisionInjector: Send + 'static {
    fn simulate_collision(&mut self, slot: usize) -> bool;
}

/// Never simulates a collision
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCollide;

impl CollisionInjector for NeverCollide {
    fn simulate_collision(&mut self, _slot: usize) -> bool {
        false
    }
}

/// Simulates a collision with a fixed probability per clean reception
#[derive(Debug)]
pub struct RandomCollisions {
    probability: f64,
    rng: StdRng,
}

impl RandomCollisions {
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        RandomCollisions {
            probability: probability.clamp(0.0, 1.0),
            rng,
        }
    }
}

impl CollisionInjector for RandomCollisions {
    fn simulate_collision(&mut self, _slot: usize) -> bool {
        self.rng.gen_bool(self.probability)
    }
}

impl<F> CollisionInjector for F
where
    F: FnMut(usize) -> bool + Send + 'static,
{
    fn simulate_collision(&mut self, slot: usize) -> bool {
        self(slot)
    }
}
