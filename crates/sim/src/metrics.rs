use balancebot_shared::*;

/// Aggregate metrics quantifying balance quality over one episode.
#[derive(Debug, Clone)]
pub struct BalanceMetrics {
    /// Steps survived before termination.
    pub steps_survived: u32,
    /// Mean |theta| across the trace.
    pub mean_abs_theta: f64,
    /// Largest |theta| reached.
    pub max_abs_theta: f64,
    /// Largest cart excursion from center.
    pub max_abs_x: f64,
    /// Mean |applied force|.
    pub mean_abs_force: f64,
    /// Number of sign changes in the applied force.
    pub force_reversals: u32,
    /// True when the episode ended by the step limit rather than falling.
    pub ended_by_step_limit: bool,
}

/// Analyze a recorded episode.
pub fn analyze(trace: &EpisodeTrace) -> BalanceMetrics {
    let frames = &trace.frames;
    if frames.is_empty() {
        return BalanceMetrics {
            steps_survived: trace.result.steps,
            mean_abs_theta: 0.0,
            max_abs_theta: 0.0,
            max_abs_x: 0.0,
            mean_abs_force: 0.0,
            force_reversals: 0,
            ended_by_step_limit: trace.result.reason == EpisodeEndReason::StepLimit,
        };
    }

    let mut theta_sum = 0.0;
    let mut max_abs_theta: f64 = 0.0;
    let mut max_abs_x: f64 = 0.0;
    let mut force_sum = 0.0;
    let mut force_reversals = 0u32;
    let mut prev_sign = 0.0f64;

    for f in frames {
        theta_sum += f.theta.abs();
        max_abs_theta = max_abs_theta.max(f.theta.abs());
        max_abs_x = max_abs_x.max(f.x.abs());
        force_sum += f.applied_force.abs();

        let sign = f.applied_force.signum();
        if sign != 0.0 && prev_sign != 0.0 && sign != prev_sign {
            force_reversals += 1;
        }
        if sign != 0.0 {
            prev_sign = sign;
        }
    }

    let n = frames.len() as f64;
    BalanceMetrics {
        steps_survived: trace.result.steps,
        mean_abs_theta: theta_sum / n,
        max_abs_theta,
        max_abs_x,
        mean_abs_force: force_sum / n,
        force_reversals,
        ended_by_step_limit: trace.result.reason == EpisodeEndReason::StepLimit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::{BangBangController, PdController};
    use crate::episode_loop::run_episode;
    use crate::policy::ZeroForcePolicy;

    fn config(seed: u64, name: &str) -> EpisodeConfig {
        EpisodeConfig {
            seed,
            policy_name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_pd_metrics_show_stable_balance() {
        let trace = run_episode(&config(42, "pd"), &mut PdController::default());
        let m = analyze(&trace);

        assert!(m.ended_by_step_limit);
        assert_eq!(m.steps_survived, MAX_EPISODE_STEPS);
        assert!(
            m.max_abs_theta < THETA_THRESHOLD_RADIANS,
            "balanced episode never approaches the threshold, got {}",
            m.max_abs_theta
        );
        assert!(m.mean_abs_theta < 0.05);
    }

    #[test]
    fn test_zero_force_metrics_show_fall() {
        let trace = run_episode(&config(42, "zero_force"), &mut ZeroForcePolicy);
        let m = analyze(&trace);

        assert!(!m.ended_by_step_limit);
        assert_eq!(m.mean_abs_force, 0.0);
        assert_eq!(m.force_reversals, 0);
    }

    #[test]
    fn test_bang_bang_chatters() {
        let trace = run_episode(&config(7, "bang_bang"), &mut BangBangController::default());
        let m = analyze(&trace);

        assert!(m.ended_by_step_limit);
        assert!(
            m.force_reversals > 10,
            "relay control reverses often, got {}",
            m.force_reversals
        );
        assert!(m.mean_abs_force > 0.0);
    }

    #[test]
    fn test_empty_trace_yields_zeroed_metrics() {
        let trace = EpisodeTrace {
            config: EpisodeConfig::default(),
            frames: Vec::new(),
            result: EpisodeResult {
                reason: EpisodeEndReason::AngleLimit,
                steps: 0,
            },
        };
        let m = analyze(&trace);
        assert_eq!(m.mean_abs_theta, 0.0);
        assert_eq!(m.force_reversals, 0);
    }
}
