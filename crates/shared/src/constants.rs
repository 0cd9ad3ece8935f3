// Integration
pub const TAU: f64 = 0.02;
pub const TAU_DURATION_US: u64 = 20_000;

// Episode
pub const MAX_EPISODE_STEPS: u32 = 500;

// Physics defaults (classic cart-pole)
pub const GRAVITY: f64 = 9.8;
pub const CART_MASS: f64 = 1.0;
pub const POLE_MASS: f64 = 0.1;
pub const POLE_LENGTH: f64 = 1.0;
pub const FORCE_MAG: f64 = 10.0;
pub const THETA_THRESHOLD_RADIANS: f64 = 12.0 * std::f64::consts::PI / 180.0;

// Cart mass below this is rejected as non-physical: the theta-acceleration
// denominator degenerates when the pole dominates the cart.
pub const MIN_CART_MASS: f64 = 0.05;

// Reset noise: each state field starts in [-RESET_NOISE, RESET_NOISE]
pub const RESET_NOISE: f64 = 0.05;

// Nudge impulses, per unit strength. Tuned for feel, not physics-derived.
pub const NUDGE_MAX_STRENGTH: f64 = 5.0;
pub const NUDGE_THETA_IMPULSE: f64 = 0.02;
pub const NUDGE_THETA_DOT_IMPULSE: f64 = 0.35;
pub const NUDGE_X_DOT_IMPULSE: f64 = 0.15;
// A nudge may push theta to at most this fraction of the termination
// threshold, so a nudge alone never ends the episode.
pub const NUDGE_THETA_CLAMP: f64 = 0.99;

// UI-level nudge rate limit. The simulator itself never throttles.
pub const NUDGE_COOLDOWN_SECS: f64 = 1.0;

// Policy interface
pub const OBS_SIZE: usize = 4;
pub const ACTION_SIZE: usize = 2;
pub const DEFAULT_CONTROL_PERIOD: u32 = 1;

// ONNX validation
pub const MAX_MODEL_SIZE_BYTES: usize = 50 * 1024 * 1024; // 50 MB
pub const MAX_PARAMETERS: usize = 10_000_000;
pub const MAX_INFERENCE_TIME_MS: u64 = 1000;
pub const CALIBRATION_WARMUP: usize = 10;
pub const CALIBRATION_RUNS: usize = 100;
