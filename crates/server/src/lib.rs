use std::path::Path;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use balancebot_shared::*;
use balancebot_sim::controllers::{BangBangController, PdController, RandomController};
use balancebot_sim::{CartPoleSimulator, Policy, PolicyError, PolicyGate, ZeroForcePolicy};
use balancebot_validator::OnnxPolicy;

/// Discover ONNX model names from a single directory.
fn discover_onnx_in(dir: &str) -> Vec<String> {
    let mut names = Vec::new();
    let dir_path = Path::new(dir);
    if let Ok(entries) = std::fs::read_dir(dir_path) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "onnx") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
    }
    names.sort();
    names
}

/// Scripted controller names always available in the GUI.
const SCRIPTED_CONTROLLERS: &[&str] = &["zero_force", "bang_bang", "pd", "random"];

/// Structured policy lists for the GUI.
#[derive(Debug, Clone, Serialize)]
struct PolicyLists {
    user_models: Vec<String>,
    controllers: Vec<String>,
}

static POLICY_LISTS: LazyLock<PolicyLists> = LazyLock::new(|| {
    let user_models = discover_onnx_in("models");

    let mut controllers: Vec<String> =
        SCRIPTED_CONTROLLERS.iter().map(|s| s.to_string()).collect();
    controllers.sort();

    PolicyLists {
        user_models,
        controllers,
    }
});

// ---------------------------------------------------------------------------
// Nudge throttling (UI-layer; the simulator itself never rate-limits)
// ---------------------------------------------------------------------------

/// Per-direction cooldown for UI-originated nudges, so a held key cannot
/// destabilize the cart faster than once per cooldown window per side.
pub struct NudgeThrottle {
    cooldown: Duration,
    last_left: Option<Instant>,
    last_right: Option<Instant>,
}

impl NudgeThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_left: None,
            last_right: None,
        }
    }

    /// Returns true and records the nudge when the direction's cooldown has
    /// elapsed. Zero direction is never allowed through.
    pub fn allow(&mut self, direction: f64, now: Instant) -> bool {
        let slot = if direction > 0.0 {
            &mut self.last_right
        } else if direction < 0.0 {
            &mut self.last_left
        } else {
            return false;
        };

        match slot {
            Some(last) if now.duration_since(*last) < self.cooldown => false,
            _ => {
                *slot = Some(now);
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Serde types for WebSocket messages
// ---------------------------------------------------------------------------

/// Configuration message sent by the client when connecting to /api/session.
#[derive(Debug, Deserialize)]
struct SessionRequest {
    policy: String,
    seed: Option<u64>,
    params: Option<ParamOverrides>,
}

/// Messages the client may send while the session runs.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Nudge {
        direction: f64,
        #[serde(default = "default_nudge_strength")]
        strength: f64,
    },
    Reset,
    SetParams { params: ParamOverrides },
    Stop,
}

fn default_nudge_strength() -> f64 {
    1.0
}

/// A single frame streamed to the client.
#[derive(Debug, Serialize)]
struct FrameMessage {
    #[serde(rename = "type")]
    msg_type: &'static str,
    step: u32,
    x: f64,
    x_dot: f64,
    theta: f64,
    theta_dot: f64,
    applied_force: f64,
}

/// Sent when an episode terminates and the simulator auto-resets.
#[derive(Debug, Serialize)]
struct EpisodeMessage {
    #[serde(rename = "type")]
    msg_type: &'static str,
    reason: EpisodeEndReason,
    steps: u32,
}

/// Error message sent to the client.
#[derive(Debug, Serialize)]
struct ErrorMessage {
    #[serde(rename = "type")]
    msg_type: &'static str,
    error: String,
}

// ---------------------------------------------------------------------------
// Policy resolution
// ---------------------------------------------------------------------------

/// Resolve a policy by name, returning `None` for unknown names.
///
/// Priority: scripted controllers > models/ ONNX > .onnx path.
fn resolve_policy(name: &str, force_mag: f64) -> Option<Box<dyn Policy>> {
    match name {
        "zero_force" => return Some(Box::new(ZeroForcePolicy)),
        "bang_bang" => return Some(Box::new(BangBangController::new(force_mag))),
        "pd" => return Some(Box::new(PdController::default())),
        "random" => return Some(Box::new(RandomController::new(0, force_mag))),
        _ => {}
    }

    let model_path = Path::new("models").join(format!("{name}.onnx"));
    if model_path.exists() {
        return load_onnx_policy(&model_path, force_mag);
    }

    if name.ends_with(".onnx") {
        return load_onnx_policy(Path::new(name), force_mag);
    }

    None
}

fn load_onnx_policy(path: &Path, force_mag: f64) -> Option<Box<dyn Policy>> {
    match OnnxPolicy::load_with_force_magnitude(path, force_mag) {
        Ok(p) => {
            println!("Loaded ONNX policy from {}", path.display());
            Some(Box::new(p))
        }
        Err(e) => {
            eprintln!("Failed to load ONNX policy from {}: {e}", path.display());
            None
        }
    }
}

fn is_valid_policy(name: &str) -> bool {
    let lists = &*POLICY_LISTS;
    lists.controllers.iter().any(|p| p == name)
        || lists.user_models.iter().any(|p| p == name)
        || name.ends_with(".onnx")
}

// ---------------------------------------------------------------------------
// HTTP / WebSocket handlers
// ---------------------------------------------------------------------------

/// GET /api/policies -- returns structured { user_models, controllers }.
async fn get_policies() -> Json<PolicyLists> {
    Json(POLICY_LISTS.clone())
}

/// GET /api/params -- returns the default physical parameters.
async fn get_params() -> Json<SimParams> {
    Json(SimParams::default())
}

/// GET /api/session -- WebSocket upgrade endpoint.
async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

/// Handle an individual WebSocket session.
///
/// The simulator advances on a fixed-period interval while the policy runs
/// on a dedicated blocking task; the `PolicyGate` keeps at most one
/// evaluation in flight, and no evaluation is requested on the frame right
/// after a reset. A result that raced a reset is applied to the new episode
/// as an ordinary force; the next frame requests a fresh decision anyway.
async fn handle_socket(mut socket: WebSocket) {
    // 1. Wait for the client's config message.
    let config_msg = match socket.recv().await {
        Some(Ok(Message::Text(text))) => text,
        Some(Ok(Message::Close(_))) | None => return,
        Some(Ok(_)) => {
            let _ = send_error(&mut socket, "expected a JSON text message").await;
            return;
        }
        Some(Err(_)) => return,
    };

    let req: SessionRequest = match serde_json::from_str(&config_msg) {
        Ok(r) => r,
        Err(e) => {
            let _ = send_error(&mut socket, &format!("invalid config JSON: {e}")).await;
            return;
        }
    };

    if !is_valid_policy(&req.policy) {
        let _ = send_error(&mut socket, &format!("unknown policy: {}", req.policy)).await;
        return;
    }

    let params = match req.params {
        Some(overrides) => match SimParams::default().with(&overrides) {
            Ok(p) => p,
            Err(e) => {
                let _ = send_error(&mut socket, &format!("invalid parameters: {e}")).await;
                return;
            }
        },
        None => SimParams::default(),
    };

    // 2. Spin up the inference task. The policy lives on a blocking thread
    //    so ONNX inference never stalls the session loop.
    let (obs_tx, obs_rx) = std::sync::mpsc::channel::<Observation>();
    let (force_tx, mut force_rx) =
        tokio::sync::mpsc::unbounded_channel::<Result<f64, PolicyError>>();
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<(), String>>();

    let policy_name = req.policy.clone();
    let force_mag = params.force_mag();
    let inference = tokio::task::spawn_blocking(move || {
        let mut policy = match resolve_policy(&policy_name, force_mag) {
            Some(p) => {
                let _ = ready_tx.send(Ok(()));
                p
            }
            None => {
                let _ = ready_tx.send(Err(format!("failed to load policy '{policy_name}'")));
                return;
            }
        };
        while let Ok(obs) = obs_rx.recv() {
            if force_tx.send(policy.act(&obs)).is_err() {
                break;
            }
        }
    });

    match ready_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let _ = send_error(&mut socket, &e).await;
            return;
        }
        Err(_) => return,
    }

    // 3. Session loop.
    let mut sim = CartPoleSimulator::new(params, req.seed.unwrap_or(0));
    let mut gate = PolicyGate::new();
    let mut throttle = NudgeThrottle::new(Duration::from_secs_f64(NUDGE_COOLDOWN_SECS));
    let mut interval = tokio::time::interval(Duration::from_secs_f64(params.tau()));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut manual_reset = false;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Apply any resolved decision.
                while let Ok(result) = force_rx.try_recv() {
                    match result {
                        Ok(force) => {
                            if gate.begin_apply() {
                                sim.set_force(force);
                                gate.finish();
                            }
                        }
                        Err(e) => {
                            eprintln!("policy failed, keeping previous force: {e}");
                            gate.abort();
                        }
                    }
                }

                let state = sim.advance(sim.params().tau());
                let just_reset = sim.consume_reset_flag();

                if just_reset && !manual_reset {
                    if let Some(result) = sim.last_episode() {
                        if send_json(&mut socket, &EpisodeMessage {
                            msg_type: "episode",
                            reason: result.reason,
                            steps: result.steps,
                        }).await.is_err() {
                            break;
                        }
                    }
                }
                if just_reset {
                    manual_reset = false;
                }

                let frame = FrameMessage {
                    msg_type: "frame",
                    step: sim.steps_since_reset(),
                    x: state.x,
                    x_dot: state.x_dot,
                    theta: state.theta,
                    theta_dot: state.theta_dot,
                    applied_force: sim.applied_force(),
                };
                if send_json(&mut socket, &frame).await.is_err() {
                    break;
                }

                // Request the next decision: at most one in flight, and none
                // on the frame that just produced a randomized reset state.
                if !just_reset && gate.try_acquire() {
                    if obs_tx.send(sim.observe()).is_err() {
                        gate.abort();
                    }
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Nudge { direction, strength }) => {
                                if throttle.allow(direction, Instant::now()) {
                                    sim.nudge_pole(direction, strength);
                                }
                            }
                            Ok(ClientMessage::Reset) => {
                                sim.reset(StateOverride::default());
                                manual_reset = true;
                            }
                            Ok(ClientMessage::SetParams { params }) => {
                                match sim.update_params(&params) {
                                    Ok(()) => {
                                        interval = tokio::time::interval(
                                            Duration::from_secs_f64(sim.params().tau()),
                                        );
                                        interval.set_missed_tick_behavior(
                                            tokio::time::MissedTickBehavior::Delay,
                                        );
                                    }
                                    Err(e) => {
                                        let _ = send_error(
                                            &mut socket,
                                            &format!("rejected parameters: {e}"),
                                        ).await;
                                    }
                                }
                            }
                            Ok(ClientMessage::Stop) => break,
                            Err(e) => {
                                let _ = send_error(
                                    &mut socket,
                                    &format!("invalid message: {e}"),
                                ).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Dropping the observation sender stops the inference thread.
    drop(obs_tx);
    let _ = inference.await;
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, msg: &T) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(_) => return Ok(()),
    };
    socket.send(Message::Text(json.into())).await
}

/// Send a JSON error message over the WebSocket.
async fn send_error(socket: &mut WebSocket, error: &str) -> Result<(), axum::Error> {
    send_json(
        socket,
        &ErrorMessage {
            msg_type: "error",
            error: error.to_string(),
        },
    )
    .await
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Build the axum `Router`.
pub fn app() -> Router {
    Router::new()
        .route("/api/policies", get(get_policies))
        .route("/api/params", get(get_params))
        .route("/api/session", get(ws_handler))
        .layer(CorsLayer::permissive())
}

/// Start the server on the given port.
pub async fn run_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = app();
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    println!("balancebot server listening on port {port}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_blocks_within_cooldown() {
        let mut throttle = NudgeThrottle::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(throttle.allow(1.0, t0));
        assert!(!throttle.allow(1.0, t0 + Duration::from_millis(500)));
        assert!(throttle.allow(1.0, t0 + Duration::from_millis(1500)));
    }

    #[test]
    fn test_throttle_tracks_directions_independently() {
        let mut throttle = NudgeThrottle::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(throttle.allow(1.0, t0));
        assert!(throttle.allow(-1.0, t0), "left cooldown is independent");
        assert!(!throttle.allow(-1.0, t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_throttle_rejects_zero_direction() {
        let mut throttle = NudgeThrottle::new(Duration::from_secs(1));
        assert!(!throttle.allow(0.0, Instant::now()));
    }

    #[test]
    fn test_scripted_policies_resolve() {
        for name in SCRIPTED_CONTROLLERS {
            assert!(
                resolve_policy(name, FORCE_MAG).is_some(),
                "controller '{name}' should resolve"
            );
        }
        assert!(resolve_policy("no_such_policy", FORCE_MAG).is_none());
    }
}
