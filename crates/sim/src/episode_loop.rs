use balancebot_shared::*;

use crate::policy::Policy;
use crate::simulator::CartPoleSimulator;

/// Run a single episode to its natural end, recording every step.
///
/// The policy is consulted every `control_period` steps; a failing policy is
/// logged and the previously applied force stays in effect. The loop stops
/// when the simulator auto-resets, so the recorded frames all belong to one
/// episode (the post-reset state is not part of the trace).
pub fn run_episode(config: &EpisodeConfig, policy: &mut dyn Policy) -> EpisodeTrace {
    let mut sim = CartPoleSimulator::new(config.params, config.seed);
    let control_period = config.control_period.max(1);
    let tau = config.params.tau();

    let mut frames = Vec::new();
    frames.push(frame(0, sim.state(), sim.applied_force()));

    let mut step = 0u32;
    loop {
        if step % control_period == 0 {
            let obs = sim.observe();
            match policy.act(&obs) {
                Ok(force) => sim.set_force(force),
                Err(e) => eprintln!(
                    "policy '{}' failed, keeping previous force: {e}",
                    policy.name()
                ),
            }
        }

        let state = sim.advance(tau);
        step += 1;

        if sim.consume_reset_flag() {
            break;
        }
        frames.push(frame(step, state, sim.applied_force()));
    }

    let result = sim
        .last_episode()
        .expect("loop exits only after the simulator records a result");

    EpisodeTrace {
        config: config.clone(),
        frames,
        result,
    }
}

fn frame(step: u32, state: SimulationState, applied_force: f64) -> TraceFrame {
    TraceFrame {
        step,
        x: state.x,
        x_dot: state.x_dot,
        theta: state.theta,
        theta_dot: state.theta_dot,
        applied_force,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::{BangBangController, PdController};
    use crate::policy::ZeroForcePolicy;

    #[test]
    fn test_zero_force_falls_over() {
        let config = EpisodeConfig {
            seed: 42,
            policy_name: "zero_force".into(),
            ..Default::default()
        };
        let mut policy = ZeroForcePolicy;

        let trace = run_episode(&config, &mut policy);

        assert_eq!(
            trace.result.reason,
            EpisodeEndReason::AngleLimit,
            "an unforced pole should fall, got {:?} after {} steps",
            trace.result.reason,
            trace.result.steps
        );
        assert!(trace.result.steps < MAX_EPISODE_STEPS);
        assert!(trace.result.steps > 10, "falling takes more than 10 steps");
    }

    #[test]
    fn test_pd_reaches_step_limit() {
        let config = EpisodeConfig {
            seed: 42,
            policy_name: "pd".into(),
            ..Default::default()
        };
        let mut policy = PdController::default();

        let trace = run_episode(&config, &mut policy);

        assert_eq!(
            trace.result.reason,
            EpisodeEndReason::StepLimit,
            "pd should balance to the step limit, fell after {} steps",
            trace.result.steps
        );
        assert_eq!(trace.result.steps, MAX_EPISODE_STEPS);
    }

    #[test]
    fn test_bang_bang_reaches_step_limit() {
        let config = EpisodeConfig {
            seed: 7,
            policy_name: "bang_bang".into(),
            ..Default::default()
        };
        let mut policy = BangBangController::default();

        let trace = run_episode(&config, &mut policy);

        assert_eq!(trace.result.reason, EpisodeEndReason::StepLimit);
    }

    #[test]
    fn test_trace_has_one_frame_per_surviving_step() {
        let config = EpisodeConfig {
            seed: 3,
            policy_name: "zero_force".into(),
            ..Default::default()
        };
        let mut policy = ZeroForcePolicy;

        let trace = run_episode(&config, &mut policy);

        // Initial frame plus one per step except the terminating one.
        assert_eq!(trace.frames.len() as u32, trace.result.steps);
        assert_eq!(trace.frames[0].step, 0);
        assert_eq!(
            trace.frames.last().unwrap().step,
            trace.result.steps - 1
        );
    }

    #[test]
    fn test_episodes_are_deterministic() {
        let config = EpisodeConfig {
            seed: 123,
            policy_name: "pd".into(),
            ..Default::default()
        };

        let trace1 = run_episode(&config, &mut PdController::default());
        let trace2 = run_episode(&config, &mut PdController::default());

        assert_eq!(trace1.result, trace2.result);
        assert_eq!(trace1.frames.len(), trace2.frames.len());
        for (a, b) in trace1.frames.iter().zip(trace2.frames.iter()) {
            assert_eq!(a.x, b.x);
            assert_eq!(a.theta, b.theta);
        }
    }

    #[test]
    fn test_control_period_holds_force_between_decisions() {
        let config = EpisodeConfig {
            seed: 5,
            policy_name: "bang_bang".into(),
            control_period: 4,
            ..Default::default()
        };
        let mut policy = BangBangController::default();

        let trace = run_episode(&config, &mut policy);

        // Within each 4-step control window the applied force is constant.
        for window in trace.frames[1..].chunks(4) {
            let first = window[0].applied_force;
            for f in window {
                assert_eq!(f.applied_force, first);
            }
        }
    }
}
