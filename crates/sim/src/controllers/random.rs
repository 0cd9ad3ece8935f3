use balancebot_shared::{Observation, FORCE_MAG};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::policy::{Policy, PolicyError};

/// Seeded random force, as a lower baseline for evaluation runs.
pub struct RandomController {
    rng: Pcg64,
    force_mag: f64,
}

impl RandomController {
    pub fn new(seed: u64, force_mag: f64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
            force_mag,
        }
    }
}

impl Default for RandomController {
    fn default() -> Self {
        Self::new(0, FORCE_MAG)
    }
}

impl Policy for RandomController {
    fn name(&self) -> &str {
        "random"
    }

    fn act(&mut self, _obs: &Observation) -> Result<f64, PolicyError> {
        Ok(self.rng.gen_range(-self.force_mag..self.force_mag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_sequence_is_deterministic() {
        let obs = Observation {
            data: [0.0; balancebot_shared::OBS_SIZE],
        };
        let mut a = RandomController::new(9, FORCE_MAG);
        let mut b = RandomController::new(9, FORCE_MAG);
        for _ in 0..10 {
            assert_eq!(a.act(&obs).unwrap(), b.act(&obs).unwrap());
        }
    }

    #[test]
    fn test_output_within_magnitude() {
        let obs = Observation {
            data: [0.0; balancebot_shared::OBS_SIZE],
        };
        let mut c = RandomController::default();
        for _ in 0..100 {
            let f = c.act(&obs).unwrap();
            assert!(f.abs() <= FORCE_MAG);
        }
    }
}
