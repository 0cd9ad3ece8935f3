use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use balancebot_shared::*;
use balancebot_sim::controllers::{BangBangController, PdController, RandomController};
use balancebot_sim::{metrics, run_episode, Policy, ZeroForcePolicy};
use balancebot_validator::{calibrate_inference, validate_model_file, OnnxPolicy};

mod sweep;

#[derive(Parser)]
#[command(name = "balancebot", about = "Cart-pole balancing CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more episodes with a policy
    Run {
        /// Policy (zero_force, bang_bang, pd, random, or .onnx path)
        #[arg(long)]
        policy: String,

        /// Base random seed (episode i uses seed + i)
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Number of episodes to run
        #[arg(long, default_value_t = 1)]
        episodes: u32,

        /// Output path for the last episode's trace JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Evaluate policies over many seeded episodes
    Evaluate {
        /// Comma-separated list of policy names
        #[arg(long)]
        policies: String,

        /// Episodes per policy
        #[arg(long, default_value_t = 20)]
        episodes: u32,
    },

    /// Validate an ONNX model
    Validate {
        /// Path to the .onnx model file
        model_path: PathBuf,
    },

    /// Start the session server
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 3001)]
        port: u16,
    },

    /// Sweep physical parameters and measure balance quality
    Sweep {
        /// Grid points per parameter
        #[arg(long, default_value_t = 9)]
        points: usize,

        /// Episodes per grid point
        #[arg(long, default_value_t = 5)]
        episodes: u32,

        /// Output path for CSV results (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Resolve a policy name to a boxed Policy trait object.
///
/// Supported names:
/// - "zero_force" / "bang_bang" / "pd" / "random" -> scripted controllers
/// - A path ending in ".onnx" -> OnnxPolicy
fn resolve_policy(name: &str) -> Box<dyn Policy> {
    match name {
        "zero_force" => Box::new(ZeroForcePolicy),
        "bang_bang" => Box::new(BangBangController::default()),
        "pd" => Box::new(PdController::default()),
        "random" => Box::new(RandomController::default()),
        path if path.ends_with(".onnx") => match OnnxPolicy::load(Path::new(path)) {
            Ok(p) => Box::new(p),
            Err(e) => {
                eprintln!("Failed to load ONNX policy from '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        other => {
            eprintln!(
                "Unknown policy '{}'. Valid options: zero_force, bang_bang, pd, random, or a .onnx file path.",
                other
            );
            std::process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            policy,
            seed,
            episodes,
            output,
        } => cmd_run(&policy, seed, episodes, output),

        Commands::Evaluate { policies, episodes } => cmd_evaluate(&policies, episodes),

        Commands::Validate { model_path } => cmd_validate(&model_path),

        Commands::Serve { port } => cmd_serve(port),

        Commands::Sweep {
            points,
            episodes,
            output,
        } => sweep::cmd_sweep(points, episodes, output),
    }
}

fn cmd_run(policy_name: &str, seed: u64, episodes: u32, output: Option<PathBuf>) {
    let mut policy = resolve_policy(policy_name);

    println!(
        "Running {} episode(s): {} (seed={})",
        episodes,
        policy.name(),
        seed
    );

    let mut last_trace = None;
    for e in 0..episodes {
        let config = EpisodeConfig {
            seed: seed + e as u64,
            policy_name: policy.name().to_string(),
            ..Default::default()
        };

        let trace = run_episode(&config, policy.as_mut());
        let m = metrics::analyze(&trace);

        println!();
        println!("=== Episode {} (seed={}) ===", e, config.seed);
        println!("Reason:       {:?}", trace.result.reason);
        println!(
            "Steps:        {} ({:.1}s)",
            trace.result.steps,
            trace.result.steps as f64 * config.params.tau()
        );
        println!("Mean |theta|: {:.4} rad", m.mean_abs_theta);
        println!("Max |x|:      {:.3} m", m.max_abs_x);
        println!("Reversals:    {}", m.force_reversals);

        last_trace = Some(trace);
    }

    if let (Some(path), Some(trace)) = (output, last_trace) {
        match serde_json::to_string_pretty(&trace) {
            Ok(json) => match std::fs::write(&path, json) {
                Ok(()) => println!("\nTrace written to {}", path.display()),
                Err(e) => eprintln!("\nFailed to write trace: {}", e),
            },
            Err(e) => eprintln!("\nFailed to serialize trace: {}", e),
        }
    }
}

fn cmd_evaluate(policies_str: &str, episodes: u32) {
    let policy_names: Vec<&str> = policies_str.split(',').map(|s| s.trim()).collect();

    if policy_names.is_empty() || episodes == 0 {
        eprintln!("Evaluation requires at least 1 policy and 1 episode.");
        std::process::exit(1);
    }

    println!(
        "Evaluating {} policies, {} episodes each",
        policy_names.len(),
        episodes
    );
    println!("Policies: {}", policy_names.join(", "));
    println!();

    struct Row {
        name: String,
        mean_steps: f64,
        balanced: u32,
    }

    let mut rows = Vec::new();
    for name in &policy_names {
        let mut policy = resolve_policy(name);
        let mut total_steps = 0u64;
        let mut balanced = 0u32;

        for seed in 0..episodes as u64 {
            let config = EpisodeConfig {
                seed,
                policy_name: policy.name().to_string(),
                ..Default::default()
            };
            let trace = run_episode(&config, policy.as_mut());
            total_steps += trace.result.steps as u64;
            if trace.result.reason == EpisodeEndReason::StepLimit {
                balanced += 1;
            }
        }

        rows.push(Row {
            name: name.to_string(),
            mean_steps: total_steps as f64 / episodes as f64,
            balanced,
        });
    }

    rows.sort_by(|a, b| b.mean_steps.total_cmp(&a.mean_steps));

    println!("=== Evaluation Scoreboard ===");
    println!("{:<16} {:>12} {:>12}", "Policy", "Mean steps", "Balanced");
    println!("{:-<16} {:-<12} {:-<12}", "", "", "");
    for row in &rows {
        println!(
            "{:<16} {:>12.1} {:>9}/{}",
            row.name, row.mean_steps, row.balanced, episodes
        );
    }
}

fn cmd_validate(model_path: &PathBuf) {
    match validate_model_file(model_path) {
        Ok(report) => {
            println!("Model OK: {}", model_path.display());
            println!("  File size:      {} bytes", report.file_size_bytes);
            println!("  Input shape:    {:?}", report.input_shape);
            println!("  Output shape:   {:?}", report.output_shape);
            println!("  Params (est.):  {}", report.parameter_count);

            match OnnxPolicy::load(model_path) {
                Ok(mut policy) => {
                    let period = calibrate_inference(&mut policy);
                    println!("  Control period: {} step(s) per decision", period);
                }
                Err(e) => eprintln!("Failed to reload model for calibration: {e}"),
            }
        }
        Err(e) => {
            eprintln!("Validation failed: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_serve(port: u16) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    rt.block_on(async {
        if let Err(e) = balancebot_server::run_server(port).await {
            eprintln!("Server error: {}", e);
            std::process::exit(1);
        }
    });
}
