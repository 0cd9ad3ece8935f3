use balancebot_shared::*;

use crate::policy::{Policy, PolicyError};

/// Relay controller: full force toward the side the pole is falling.
///
/// The lead term anticipates the fall direction from angular velocity, which
/// keeps the pole in a small chattering limit cycle around upright. The cart
/// drifts, but drift never terminates an episode.
pub struct BangBangController {
    force_mag: f64,
    lead: f64,
}

impl BangBangController {
    pub fn new(force_mag: f64) -> Self {
        Self {
            force_mag,
            lead: 0.5,
        }
    }
}

impl Default for BangBangController {
    fn default() -> Self {
        Self::new(FORCE_MAG)
    }
}

impl Policy for BangBangController {
    fn name(&self) -> &str {
        "bang_bang"
    }

    fn act(&mut self, obs: &Observation) -> Result<f64, PolicyError> {
        let theta = obs.data[2];
        let theta_dot = obs.data[3];
        let falling = theta + self.lead * theta_dot;
        Ok(if falling >= 0.0 {
            self.force_mag
        } else {
            -self.force_mag
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pushes_toward_fall_side() {
        let mut c = BangBangController::default();
        let right = Observation {
            data: [0.0, 0.0, 0.1, 0.0],
        };
        let left = Observation {
            data: [0.0, 0.0, -0.1, 0.0],
        };
        assert_eq!(c.act(&right).unwrap(), FORCE_MAG);
        assert_eq!(c.act(&left).unwrap(), -FORCE_MAG);
    }

    #[test]
    fn test_lead_term_anticipates_fall() {
        let mut c = BangBangController::default();
        // Upright but falling fast to the left: push left.
        let obs = Observation {
            data: [0.0, 0.0, 0.01, -0.5],
        };
        assert_eq!(c.act(&obs).unwrap(), -FORCE_MAG);
    }
}
