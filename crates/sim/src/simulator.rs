use balancebot_shared::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// Fixed-timestep cart-pole simulator.
///
/// Owns the only mutable copy of the state; every accessor returns a value
/// copy. Wall-clock time fed to [`advance`](Self::advance) is consumed in
/// exact multiples of `tau`, so the trajectory is independent of caller
/// cadence.
#[derive(Debug, Clone)]
pub struct CartPoleSimulator {
    params: SimParams,
    state: SimulationState,
    accumulator: f64,
    steps_since_reset: u32,
    applied_force: f64,
    reset_flag: bool,
    last_episode: Option<EpisodeResult>,
    rng: Pcg64,
}

impl CartPoleSimulator {
    pub fn new(params: SimParams, seed: u64) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        let state = random_start(&mut rng);
        Self {
            params,
            state,
            accumulator: 0.0,
            steps_since_reset: 0,
            applied_force: 0.0,
            reset_flag: false,
            last_episode: None,
            rng,
        }
    }

    pub fn with_defaults(seed: u64) -> Self {
        Self::new(SimParams::default(), seed)
    }

    /// Consume `dt` seconds of wall-clock time, integrating in fixed steps
    /// of `tau` and carrying any remainder to the next call.
    ///
    /// Negative or non-finite `dt` is clamped to zero; this never panics
    /// across the caller's loop boundary. If the episode is terminal after
    /// the integration batch (checked once per call, not per sub-step), the
    /// simulator resets before returning, so the snapshot returned is the
    /// post-reset state.
    pub fn advance(&mut self, dt: f64) -> SimulationState {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.accumulator += dt;

        while self.accumulator >= self.params.tau() {
            self.integrate_step();
            self.accumulator -= self.params.tau();
            self.steps_since_reset += 1;
        }

        if let Some(reason) = self.termination_reason() {
            self.last_episode = Some(EpisodeResult {
                reason,
                steps: self.steps_since_reset,
            });
            self.reset(StateOverride::default());
        }

        self.state
    }

    /// One forward-Euler step at the fixed timestep.
    ///
    /// Accelerations come from the pre-step snapshot and all four fields
    /// update from that same snapshot; this ordering is load-bearing for
    /// trajectory parity and must not be reordered.
    fn integrate_step(&mut self) {
        let SimulationState {
            x,
            x_dot,
            theta,
            theta_dot,
        } = self.state;
        let p = &self.params;
        let force = self.applied_force;

        let cos_theta = theta.cos();
        let sin_theta = theta.sin();

        let temp =
            (force + p.pole_mass_length() * theta_dot * theta_dot * sin_theta) / p.total_mass();
        let theta_acc = (p.gravity() * sin_theta - cos_theta * temp)
            / (p.half_pole_length()
                * (4.0 / 3.0 - p.pole_mass() * cos_theta * cos_theta / p.total_mass()));
        let x_acc = temp - p.pole_mass_length() * theta_acc * cos_theta / p.total_mass();

        let tau = p.tau();
        self.state = SimulationState {
            x: x + tau * x_dot,
            x_dot: x_dot + tau * x_acc,
            theta: theta + tau * theta_dot,
            theta_dot: theta_dot + tau * theta_acc,
        };
    }

    fn termination_reason(&self) -> Option<EpisodeEndReason> {
        if self.state.theta.abs() > self.params.theta_threshold() {
            Some(EpisodeEndReason::AngleLimit)
        } else if self.steps_since_reset >= self.params.max_episode_steps() {
            Some(EpisodeEndReason::StepLimit)
        } else {
            None
        }
    }

    /// Store the force used by subsequent integration steps, clamped to
    /// `±force_mag`. Non-finite input is treated as zero.
    pub fn set_force(&mut self, force: f64) {
        let force = if force.is_finite() { force } else { 0.0 };
        let mag = self.params.force_mag();
        self.applied_force = force.clamp(-mag, mag);
    }

    /// Start a fresh episode. Overridden fields are taken as-is; the rest
    /// get uniform noise in `±RESET_NOISE`. Clears the accumulator, step
    /// counter, and applied force, and arms the reset flag.
    pub fn reset(&mut self, overrides: StateOverride) {
        let x = match overrides.x {
            Some(v) => v,
            None => self.noise(),
        };
        let x_dot = match overrides.x_dot {
            Some(v) => v,
            None => self.noise(),
        };
        let theta = match overrides.theta {
            Some(v) => v,
            None => self.noise(),
        };
        let theta_dot = match overrides.theta_dot {
            Some(v) => v,
            None => self.noise(),
        };

        self.state = SimulationState {
            x,
            x_dot,
            theta,
            theta_dot,
        };
        self.accumulator = 0.0;
        self.steps_since_reset = 0;
        self.applied_force = 0.0;
        self.reset_flag = true;
    }

    /// One-shot edge detector for "an episode ended this cycle": returns
    /// the flag and clears it, so the second of two consecutive calls is
    /// always false.
    pub fn consume_reset_flag(&mut self) -> bool {
        std::mem::take(&mut self.reset_flag)
    }

    /// Instantaneous impulse on the pole (and cart), scaled by `strength`.
    ///
    /// `direction` is sign-normalized to {-1, 0, +1}; zero is a no-op.
    /// `strength` is clamped to `[0, NUDGE_MAX_STRENGTH]`. Afterwards theta
    /// is clamped to `±NUDGE_THETA_CLAMP * theta_threshold` so a nudge on
    /// its own never terminates the episode. No rate limiting here; that is
    /// a UI concern.
    pub fn nudge_pole(&mut self, direction: f64, strength: f64) {
        let dir = if direction > 0.0 {
            1.0
        } else if direction < 0.0 {
            -1.0
        } else {
            return;
        };
        let strength = if strength.is_finite() {
            strength.clamp(0.0, NUDGE_MAX_STRENGTH)
        } else {
            return;
        };
        if strength == 0.0 {
            return;
        }

        self.state.theta += dir * strength * NUDGE_THETA_IMPULSE;
        self.state.theta_dot += dir * strength * NUDGE_THETA_DOT_IMPULSE;
        self.state.x_dot += dir * strength * NUDGE_X_DOT_IMPULSE;

        let clamp = NUDGE_THETA_CLAMP * self.params.theta_threshold();
        self.state.theta = self.state.theta.clamp(-clamp, clamp);
    }

    /// Apply partial parameter overrides atomically: validation and derived
    /// recomputation succeed together or the current parameters survive
    /// unchanged.
    pub fn update_params(&mut self, overrides: &ParamOverrides) -> Result<(), ParamError> {
        self.params = self.params.with(overrides)?;
        Ok(())
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn params(&self) -> SimParams {
        self.params
    }

    pub fn applied_force(&self) -> f64 {
        self.applied_force
    }

    pub fn force_magnitude(&self) -> f64 {
        self.params.force_mag()
    }

    pub fn steps_since_reset(&self) -> u32 {
        self.steps_since_reset
    }

    /// Outcome of the most recent auto-terminated episode, if any.
    pub fn last_episode(&self) -> Option<EpisodeResult> {
        self.last_episode
    }

    fn noise(&mut self) -> f64 {
        self.rng.gen_range(-RESET_NOISE..RESET_NOISE)
    }
}

fn random_start(rng: &mut Pcg64) -> SimulationState {
    SimulationState {
        x: rng.gen_range(-RESET_NOISE..RESET_NOISE),
        x_dot: rng.gen_range(-RESET_NOISE..RESET_NOISE),
        theta: rng.gen_range(-RESET_NOISE..RESET_NOISE),
        theta_dot: rng.gen_range(-RESET_NOISE..RESET_NOISE),
    }
}
