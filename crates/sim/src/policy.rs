use balancebot_shared::Observation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Maps an observation to a corrective force.
///
/// The returned force is raw; the simulator clamps it on intake, so
/// implementations do not pre-clamp. Failure is a first-class outcome: the
/// driving loop logs it and keeps the previously applied force.
pub trait Policy: Send {
    fn name(&self) -> &str;
    fn act(&mut self, obs: &Observation) -> Result<f64, PolicyError>;
}

/// Policy that applies no force - useful for testing.
pub struct ZeroForcePolicy;

impl Policy for ZeroForcePolicy {
    fn name(&self) -> &str {
        "zero_force"
    }

    fn act(&mut self, _obs: &Observation) -> Result<f64, PolicyError> {
        Ok(0.0)
    }
}
