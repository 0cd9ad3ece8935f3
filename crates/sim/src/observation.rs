use balancebot_shared::*;

use crate::simulator::CartPoleSimulator;

impl CartPoleSimulator {
    /// Build the policy observation from the current state: raw
    /// `[x, x_dot, theta, theta_dot]`, the layout the exported models were
    /// trained on. No normalization.
    pub fn observe(&self) -> Observation {
        let s = self.state();
        Observation {
            data: [s.x, s.x_dot, s.theta, s.theta_dot],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_mirrors_state() {
        let sim = CartPoleSimulator::with_defaults(42);
        let s = sim.state();
        let obs = sim.observe();
        assert_eq!(obs.data, [s.x, s.x_dot, s.theta, s.theta_dot]);
    }

    #[test]
    fn test_observation_size() {
        let sim = CartPoleSimulator::with_defaults(0);
        assert_eq!(sim.observe().data.len(), OBS_SIZE);
    }

    #[test]
    fn test_observation_is_a_copy() {
        let mut sim = CartPoleSimulator::with_defaults(7);
        let obs = sim.observe();
        sim.set_force(10.0);
        sim.advance(TAU);
        assert_ne!(obs.data, sim.observe().data);
    }
}
