use balancebot_shared::*;
use balancebot_sim::controllers::{BangBangController, PdController, RandomController};
use balancebot_sim::{run_episode, Policy, PolicyError, ZeroForcePolicy};

fn config(seed: u64, name: &str) -> EpisodeConfig {
    EpisodeConfig {
        seed,
        policy_name: name.into(),
        ..Default::default()
    }
}

#[test]
fn test_deterministic_traces() {
    let cfg = config(123, "bang_bang");

    let trace1 = run_episode(&cfg, &mut BangBangController::default());
    let trace2 = run_episode(&cfg, &mut BangBangController::default());

    assert_eq!(trace1.result, trace2.result);
    assert_eq!(trace1.frames.len(), trace2.frames.len());
    for (a, b) in trace1.frames.iter().zip(trace2.frames.iter()) {
        assert_eq!(a.x, b.x, "x diverged at step {}", a.step);
        assert_eq!(a.theta, b.theta, "theta diverged at step {}", a.step);
    }
}

#[test]
fn test_trace_serialization_round_trip() {
    let cfg = config(1, "pd");
    let trace = run_episode(&cfg, &mut PdController::default());

    let json = serde_json::to_string(&trace).expect("trace should serialize");
    assert!(json.len() > 100);

    let back: EpisodeTrace = serde_json::from_str(&json).expect("trace should deserialize");
    assert_eq!(back.result, trace.result);
    assert_eq!(back.frames.len(), trace.frames.len());
    assert_eq!(back.frames[0].x, trace.frames[0].x);
}

#[test]
fn test_controllers_outlast_baselines() {
    let pd = run_episode(&config(42, "pd"), &mut PdController::default());
    let zero = run_episode(&config(42, "zero_force"), &mut ZeroForcePolicy);
    let random = run_episode(
        &config(42, "random"),
        &mut RandomController::new(42, FORCE_MAG),
    );

    assert_eq!(pd.result.steps, MAX_EPISODE_STEPS);
    assert!(
        pd.result.steps > zero.result.steps,
        "pd ({}) should outlast zero force ({})",
        pd.result.steps,
        zero.result.steps
    );
    assert!(
        pd.result.steps > random.result.steps,
        "pd ({}) should outlast random forcing ({})",
        pd.result.steps,
        random.result.steps
    );
}

#[test]
fn test_euler_update_relation_holds_across_trace() {
    // Positions update from pre-step velocities: consecutive frames must
    // satisfy the explicit-Euler relation exactly, proving accelerations
    // never leak into the same step's position update.
    let trace = run_episode(&config(9, "bang_bang"), &mut BangBangController::default());

    for pair in trace.frames.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            (b.x - a.x - TAU * a.x_dot).abs() < 1e-12,
            "x update broke the Euler relation at step {}",
            b.step
        );
        assert!(
            (b.theta - a.theta - TAU * a.theta_dot).abs() < 1e-12,
            "theta update broke the Euler relation at step {}",
            b.step
        );
    }
}

struct FailingPolicy;

impl Policy for FailingPolicy {
    fn name(&self) -> &str {
        "failing"
    }

    fn act(&mut self, _obs: &Observation) -> Result<f64, PolicyError> {
        Err(PolicyError::Inference("synthetic failure".into()))
    }
}

/// Succeeds once with a fixed force, then fails forever.
struct FailAfterFirst {
    called: bool,
}

impl Policy for FailAfterFirst {
    fn name(&self) -> &str {
        "fail_after_first"
    }

    fn act(&mut self, _obs: &Observation) -> Result<f64, PolicyError> {
        if self.called {
            Err(PolicyError::Inference("synthetic failure".into()))
        } else {
            self.called = true;
            Ok(7.5)
        }
    }
}

#[test]
fn test_always_failing_policy_behaves_like_zero_force() {
    let failing = run_episode(&config(42, "failing"), &mut FailingPolicy);
    let zero = run_episode(&config(42, "zero_force"), &mut ZeroForcePolicy);

    assert_eq!(failing.result, zero.result);
    assert_eq!(failing.frames.len(), zero.frames.len());
}

#[test]
fn test_failure_keeps_previously_applied_force() {
    let trace = run_episode(
        &config(42, "fail_after_first"),
        &mut FailAfterFirst { called: false },
    );

    for f in &trace.frames[1..] {
        assert_eq!(
            f.applied_force, 7.5,
            "force applied before the failure should persist at step {}",
            f.step
        );
    }
}
