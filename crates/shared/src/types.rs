use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;

/// Cart-pole state: cart position/velocity, pole angle/angular velocity.
///
/// Always handed out by value; the simulator owns the only mutable copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub x: f64,
    pub x_dot: f64,
    pub theta: f64,
    pub theta_dot: f64,
}

impl SimulationState {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.x_dot.is_finite()
            && self.theta.is_finite()
            && self.theta_dot.is_finite()
    }
}

/// Per-field reset override. `None` fields get fresh reset noise.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StateOverride {
    pub x: Option<f64>,
    pub x_dot: Option<f64>,
    pub theta: Option<f64>,
    pub theta_dot: Option<f64>,
}

/// Raw policy observation: `[x, x_dot, theta, theta_dot]`, the layout the
/// exported models were trained on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Observation {
    pub data: [f64; OBS_SIZE],
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("non-finite value for {0}")]
    NonFinite(&'static str),
    #[error("gravity must be positive, got {0}")]
    NonPositiveGravity(f64),
    #[error("cart mass must be at least {min}, got {got}")]
    CartMassTooSmall { got: f64, min: f64 },
    #[error("pole mass must be positive, got {0}")]
    NonPositivePoleMass(f64),
    #[error("pole length must be positive, got {0}")]
    NonPositivePoleLength(f64),
    #[error("force magnitude must be positive, got {0}")]
    NonPositiveForceMag(f64),
    #[error("timestep must be positive, got {0}")]
    NonPositiveTau(f64),
    #[error("angle threshold must be positive, got {0}")]
    NonPositiveThetaThreshold(f64),
    #[error("max episode steps must be nonzero")]
    ZeroMaxEpisodeSteps,
}

/// Partial parameter update. Applied atomically via [`SimParams::with`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ParamOverrides {
    pub gravity: Option<f64>,
    pub cart_mass: Option<f64>,
    pub pole_mass: Option<f64>,
    pub pole_length: Option<f64>,
    pub force_mag: Option<f64>,
    pub tau: Option<f64>,
    pub theta_threshold: Option<f64>,
    pub max_episode_steps: Option<u32>,
}

/// Physical parameters, immutable during an episode.
///
/// Derived quantities (`total_mass`, `half_pole_length`, `pole_mass_length`)
/// are computed at construction and can never be observed out of sync with
/// the primaries: the only way to change a primary is [`SimParams::with`],
/// which validates and rebuilds the whole value or leaves the old one intact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    gravity: f64,
    cart_mass: f64,
    pole_mass: f64,
    pole_length: f64,
    force_mag: f64,
    tau: f64,
    theta_threshold: f64,
    max_episode_steps: u32,

    total_mass: f64,
    half_pole_length: f64,
    pole_mass_length: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        // The defaults are physically sane by construction.
        Self::validated(
            GRAVITY,
            CART_MASS,
            POLE_MASS,
            POLE_LENGTH,
            FORCE_MAG,
            TAU,
            THETA_THRESHOLD_RADIANS,
            MAX_EPISODE_STEPS,
        )
        .expect("default parameters are valid")
    }
}

impl SimParams {
    #[allow(clippy::too_many_arguments)]
    fn validated(
        gravity: f64,
        cart_mass: f64,
        pole_mass: f64,
        pole_length: f64,
        force_mag: f64,
        tau: f64,
        theta_threshold: f64,
        max_episode_steps: u32,
    ) -> Result<Self, ParamError> {
        for (name, value) in [
            ("gravity", gravity),
            ("cart_mass", cart_mass),
            ("pole_mass", pole_mass),
            ("pole_length", pole_length),
            ("force_mag", force_mag),
            ("tau", tau),
            ("theta_threshold", theta_threshold),
        ] {
            if !value.is_finite() {
                return Err(ParamError::NonFinite(name));
            }
        }
        if gravity <= 0.0 {
            return Err(ParamError::NonPositiveGravity(gravity));
        }
        if cart_mass < MIN_CART_MASS {
            return Err(ParamError::CartMassTooSmall {
                got: cart_mass,
                min: MIN_CART_MASS,
            });
        }
        if pole_mass <= 0.0 {
            return Err(ParamError::NonPositivePoleMass(pole_mass));
        }
        if pole_length <= 0.0 {
            return Err(ParamError::NonPositivePoleLength(pole_length));
        }
        if force_mag <= 0.0 {
            return Err(ParamError::NonPositiveForceMag(force_mag));
        }
        if tau <= 0.0 {
            return Err(ParamError::NonPositiveTau(tau));
        }
        if theta_threshold <= 0.0 {
            return Err(ParamError::NonPositiveThetaThreshold(theta_threshold));
        }
        if max_episode_steps == 0 {
            return Err(ParamError::ZeroMaxEpisodeSteps);
        }

        let half_pole_length = pole_length / 2.0;
        Ok(Self {
            gravity,
            cart_mass,
            pole_mass,
            pole_length,
            force_mag,
            tau,
            theta_threshold,
            max_episode_steps,
            total_mass: cart_mass + pole_mass,
            half_pole_length,
            pole_mass_length: pole_mass * half_pole_length,
        })
    }

    /// Build a new parameter set with the given overrides applied.
    ///
    /// Validation and derived-constant recomputation happen together; on
    /// error `self` is untouched and no half-updated value ever exists.
    pub fn with(&self, overrides: &ParamOverrides) -> Result<Self, ParamError> {
        Self::validated(
            overrides.gravity.unwrap_or(self.gravity),
            overrides.cart_mass.unwrap_or(self.cart_mass),
            overrides.pole_mass.unwrap_or(self.pole_mass),
            overrides.pole_length.unwrap_or(self.pole_length),
            overrides.force_mag.unwrap_or(self.force_mag),
            overrides.tau.unwrap_or(self.tau),
            overrides.theta_threshold.unwrap_or(self.theta_threshold),
            overrides.max_episode_steps.unwrap_or(self.max_episode_steps),
        )
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    pub fn cart_mass(&self) -> f64 {
        self.cart_mass
    }

    pub fn pole_mass(&self) -> f64 {
        self.pole_mass
    }

    pub fn pole_length(&self) -> f64 {
        self.pole_length
    }

    pub fn force_mag(&self) -> f64 {
        self.force_mag
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn theta_threshold(&self) -> f64 {
        self.theta_threshold
    }

    pub fn max_episode_steps(&self) -> u32 {
        self.max_episode_steps
    }

    pub fn total_mass(&self) -> f64 {
        self.total_mass
    }

    pub fn half_pole_length(&self) -> f64 {
        self.half_pole_length
    }

    pub fn pole_mass_length(&self) -> f64 {
        self.pole_mass_length
    }
}

/// Configuration for one offline episode run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeConfig {
    pub seed: u64,
    pub policy_name: String,
    /// Consult the policy every this many integration steps.
    pub control_period: u32,
    pub params: SimParams,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            policy_name: "zero_force".into(),
            control_period: DEFAULT_CONTROL_PERIOD,
            params: SimParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TraceFrame {
    pub step: u32,
    pub x: f64,
    pub x_dot: f64,
    pub theta: f64,
    pub theta_dot: f64,
    pub applied_force: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeEndReason {
    /// `|theta|` exceeded the termination threshold.
    AngleLimit,
    /// The step counter reached `max_episode_steps`.
    StepLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub reason: EpisodeEndReason,
    pub steps: u32,
}

/// Recorded episode: config, per-step frames, outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeTrace {
    pub config: EpisodeConfig,
    pub frames: Vec<TraceFrame>,
    pub result: EpisodeResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_derived_quantities() {
        let p = SimParams::default();
        assert_eq!(p.total_mass(), CART_MASS + POLE_MASS);
        assert_eq!(p.half_pole_length(), POLE_LENGTH / 2.0);
        assert_eq!(p.pole_mass_length(), POLE_MASS * POLE_LENGTH / 2.0);
    }

    #[test]
    fn test_with_recomputes_derived() {
        let p = SimParams::default()
            .with(&ParamOverrides {
                pole_mass: Some(0.2),
                pole_length: Some(2.0),
                ..Default::default()
            })
            .expect("valid overrides");
        assert_eq!(p.total_mass(), CART_MASS + 0.2);
        assert_eq!(p.half_pole_length(), 1.0);
        assert_eq!(p.pole_mass_length(), 0.2);
    }

    #[test]
    fn test_with_rejects_tiny_cart_mass() {
        let err = SimParams::default()
            .with(&ParamOverrides {
                cart_mass: Some(0.001),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ParamError::CartMassTooSmall { .. }));
    }

    #[test]
    fn test_with_rejects_non_finite() {
        let err = SimParams::default()
            .with(&ParamOverrides {
                gravity: Some(f64::NAN),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, ParamError::NonFinite("gravity"));
    }

    #[test]
    fn test_failed_update_leaves_original_usable() {
        let p = SimParams::default();
        let before = p;
        let _ = p.with(&ParamOverrides {
            tau: Some(-1.0),
            ..Default::default()
        });
        assert_eq!(p, before);
    }

    #[test]
    fn test_params_serde_round_trip() {
        let p = SimParams::default()
            .with(&ParamOverrides {
                gravity: Some(3.7),
                ..Default::default()
            })
            .unwrap();
        let json = serde_json::to_string(&p).unwrap();
        let back: SimParams = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
