use std::io::Write;
use std::path::PathBuf;

use rayon::prelude::*;

use balancebot_shared::*;
use balancebot_sim::controllers::PdController;
use balancebot_sim::{metrics, run_episode};

/// A sweepable physics parameter with its name, range, and override setter.
struct SweepParam {
    name: &'static str,
    min: f64,
    max: f64,
    /// Apply this parameter value to a set of overrides.
    apply: fn(&mut ParamOverrides, f64),
}

const SWEEP_PARAMS: &[SweepParam] = &[
    SweepParam {
        name: "gravity",
        min: 1.0,
        max: 25.0,
        apply: |o, v| o.gravity = Some(v),
    },
    SweepParam {
        name: "cart_mass",
        min: 0.2,
        max: 5.0,
        apply: |o, v| o.cart_mass = Some(v),
    },
    SweepParam {
        name: "pole_mass",
        min: 0.02,
        max: 0.5,
        apply: |o, v| o.pole_mass = Some(v),
    },
    SweepParam {
        name: "pole_length",
        min: 0.2,
        max: 3.0,
        apply: |o, v| o.pole_length = Some(v),
    },
    SweepParam {
        name: "force_mag",
        min: 4.0,
        max: 30.0,
        apply: |o, v| o.force_mag = Some(v),
    },
];

struct SweepRow {
    param: &'static str,
    value: f64,
    mean_steps: f64,
    balanced: u32,
    mean_abs_theta: f64,
}

/// Grid-sweep each physical parameter and measure how well the pd controller
/// balances at each value. One row per (parameter, value) point.
pub fn cmd_sweep(points: usize, episodes: u32, output: Option<PathBuf>) {
    let points = points.max(2);
    let episodes = episodes.max(1);

    let mut grid = Vec::new();
    for param in SWEEP_PARAMS {
        for i in 0..points {
            let t = i as f64 / (points - 1) as f64;
            grid.push((param, param.min + t * (param.max - param.min)));
        }
    }

    println!(
        "Sweeping {} parameter points, {} episodes each (pd controller)",
        grid.len(),
        episodes
    );

    let rows: Vec<SweepRow> = grid
        .par_iter()
        .map(|(param, value)| {
            let mut overrides = ParamOverrides::default();
            (param.apply)(&mut overrides, *value);

            let params = match SimParams::default().with(&overrides) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("skipping {}={:.3}: {}", param.name, value, e);
                    return SweepRow {
                        param: param.name,
                        value: *value,
                        mean_steps: 0.0,
                        balanced: 0,
                        mean_abs_theta: 0.0,
                    };
                }
            };

            let mut total_steps = 0u64;
            let mut balanced = 0u32;
            let mut theta_sum = 0.0;

            for seed in 0..episodes as u64 {
                let config = EpisodeConfig {
                    seed,
                    policy_name: "pd".into(),
                    control_period: DEFAULT_CONTROL_PERIOD,
                    params,
                };
                let trace = run_episode(&config, &mut PdController::default());
                let m = metrics::analyze(&trace);

                total_steps += trace.result.steps as u64;
                if m.ended_by_step_limit {
                    balanced += 1;
                }
                theta_sum += m.mean_abs_theta;
            }

            SweepRow {
                param: param.name,
                value: *value,
                mean_steps: total_steps as f64 / episodes as f64,
                balanced,
                mean_abs_theta: theta_sum / episodes as f64,
            }
        })
        .collect();

    let mut csv = String::from("param,value,mean_steps,balanced,mean_abs_theta\n");
    for r in &rows {
        csv.push_str(&format!(
            "{},{:.4},{:.1},{},{:.5}\n",
            r.param, r.value, r.mean_steps, r.balanced, r.mean_abs_theta
        ));
    }

    match output {
        Some(path) => {
            let result = std::fs::File::create(&path).and_then(|mut f| f.write_all(csv.as_bytes()));
            match result {
                Ok(()) => println!("Sweep results written to {}", path.display()),
                Err(e) => eprintln!("Failed to write sweep results: {e}"),
            }
        }
        None => print!("{csv}"),
    }
}
