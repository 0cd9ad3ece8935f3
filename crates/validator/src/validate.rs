use std::path::Path;
use std::time::Instant;

use balancebot_shared::{
    Observation, ACTION_SIZE, CALIBRATION_RUNS, CALIBRATION_WARMUP, FORCE_MAG,
    MAX_MODEL_SIZE_BYTES, MAX_PARAMETERS, OBS_SIZE, TAU_DURATION_US,
};
use balancebot_sim::{Policy, PolicyError};
use ort::session::Session;
use ort::value::TensorElementType;
use ort::value::{Tensor, ValueType};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Model file too large: {0} bytes (max {1})")]
    FileTooLarge(usize, usize),
    #[error("Invalid input shape: expected [1, 4] or [N, 4], got {0:?}")]
    InvalidInputShape(Vec<i64>),
    #[error("Invalid output shape: expected [1, 2] or [N, 2], got {0:?}")]
    InvalidOutputShape(Vec<i64>),
    #[error("Too many parameters: {0} (max {1})")]
    TooManyParameters(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ONNX runtime error: {0}")]
    OrtError(String),
}

impl From<ort::Error> for ValidationError {
    fn from(e: ort::Error) -> Self {
        ValidationError::OrtError(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// ValidationReport
// ---------------------------------------------------------------------------

/// Summary of a validated ONNX policy model.
pub struct ValidationReport {
    pub file_size_bytes: usize,
    pub input_shape: Vec<i64>,
    pub output_shape: Vec<i64>,
    pub parameter_count: usize,
}

// ---------------------------------------------------------------------------
// validate_model_file
// ---------------------------------------------------------------------------

/// Validate an ONNX policy model file at the given path.
///
/// Checks performed:
/// 1. File size <= MAX_MODEL_SIZE_BYTES
/// 2. Model can be loaded by ONNX Runtime (valid protobuf, supported ops)
/// 3. Input shape is `[1, 4]` or `[N, 4]` (dynamic batch with -1) float32
/// 4. First output is action logits `[1, 2]` or `[N, 2]` float32; the
///    exported REINFORCE head also emits a value output, which is ignored
/// 5. Estimated parameter count <= MAX_PARAMETERS
pub fn validate_model_file(path: &Path) -> Result<ValidationReport, ValidationError> {
    // 1. File size check
    let metadata = std::fs::metadata(path)?;
    let file_size_bytes = metadata.len() as usize;
    if file_size_bytes > MAX_MODEL_SIZE_BYTES {
        return Err(ValidationError::FileTooLarge(
            file_size_bytes,
            MAX_MODEL_SIZE_BYTES,
        ));
    }

    // 2. Load the model via ort Session (validates protobuf + ops)
    let session = Session::builder()
        .map_err(ValidationError::from)?
        .commit_from_file(path)
        .map_err(ValidationError::from)?;

    // 3. Validate input shape: one Tensor<f32> input of [1, OBS_SIZE] or [-1, OBS_SIZE]
    let inputs = session.inputs();
    if inputs.is_empty() {
        return Err(ValidationError::InvalidInputShape(vec![]));
    }
    let input_shape = validate_tensor_shape(inputs[0].dtype(), OBS_SIZE as i64, true)?;

    // 4. Validate the logits output: [1, ACTION_SIZE] or [-1, ACTION_SIZE]
    let outputs = session.outputs();
    if outputs.is_empty() {
        return Err(ValidationError::InvalidOutputShape(vec![]));
    }
    let output_shape = validate_tensor_shape(outputs[0].dtype(), ACTION_SIZE as i64, false)?;

    // 5. Parameter count estimation based on file size.
    //    ONNX files store weights as raw float32 (4 bytes each) plus some
    //    protobuf overhead, so every 4 bytes could be a parameter.
    // TODO: When ort exposes the model graph proto, walk initializer tensors
    //       for an exact count instead of this heuristic.
    let parameter_count = file_size_bytes / 4;
    if parameter_count > MAX_PARAMETERS {
        return Err(ValidationError::TooManyParameters(
            parameter_count,
            MAX_PARAMETERS,
        ));
    }

    Ok(ValidationReport {
        file_size_bytes,
        input_shape,
        output_shape,
        parameter_count,
    })
}

/// Helper: validate that a `ValueType` is `Tensor<Float32>` with shape
/// `[1, expected_dim]` or `[-1, expected_dim]` and return the shape.
fn validate_tensor_shape(
    dtype: &ValueType,
    expected_dim: i64,
    is_input: bool,
) -> Result<Vec<i64>, ValidationError> {
    let shape_error = |dims: Vec<i64>| -> ValidationError {
        if is_input {
            ValidationError::InvalidInputShape(dims)
        } else {
            ValidationError::InvalidOutputShape(dims)
        }
    };

    match dtype {
        ValueType::Tensor { ty, shape, .. } => {
            let dims: Vec<i64> = shape.iter().copied().collect();

            if *ty != TensorElementType::Float32 {
                return Err(shape_error(dims));
            }
            if dims.len() != 2 {
                return Err(shape_error(dims));
            }
            // Batch dim must be 1 or -1 (dynamic)
            if dims[0] != 1 && dims[0] != -1 {
                return Err(shape_error(dims));
            }
            if dims[1] != expected_dim {
                return Err(shape_error(dims));
            }

            Ok(dims)
        }
        _ => Err(shape_error(vec![])),
    }
}

// ---------------------------------------------------------------------------
// OnnxPolicy
// ---------------------------------------------------------------------------

/// A wrapper around an ort `Session` that implements the `Policy` trait,
/// letting an exported model drive the simulator.
///
/// The model emits action logits over {left, right}; the argmax is mapped to
/// a force of `-force_mag` or `+force_mag`. Inference failures surface as
/// `PolicyError`, so the driving loop keeps the previously applied force.
pub struct OnnxPolicy {
    session: Session,
    name: String,
    force_mag: f64,
}

impl OnnxPolicy {
    /// Load an ONNX model from disk and wrap it as a `Policy`.
    ///
    /// This does **not** run the full validation suite
    /// (`validate_model_file`). Call that separately if you need the report.
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        Self::load_with_force_magnitude(path, FORCE_MAG)
    }

    /// Load with a non-default force magnitude, matching the simulator the
    /// policy will drive.
    pub fn load_with_force_magnitude(
        path: &Path,
        force_mag: f64,
    ) -> Result<Self, ValidationError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx_policy")
            .to_string();

        let session = Session::builder()
            .map_err(ValidationError::from)?
            .commit_from_file(path)
            .map_err(ValidationError::from)?;

        Ok(Self {
            session,
            name,
            force_mag,
        })
    }
}

impl Policy for OnnxPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn act(&mut self, obs: &Observation) -> Result<f64, PolicyError> {
        // Build a [1, OBS_SIZE] float32 input tensor from the observation.
        let input_data: Vec<f32> = obs.data.iter().map(|&v| v as f32).collect();
        let input_tensor =
            Tensor::from_array(([1usize, OBS_SIZE], input_data.into_boxed_slice()))
                .map_err(|e| PolicyError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| PolicyError::Inference(e.to_string()))?;

        // Output 0 carries the [1, ACTION_SIZE] action logits.
        let (_shape, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PolicyError::Inference(e.to_string()))?;

        if logits.len() < ACTION_SIZE {
            return Err(PolicyError::Inference(format!(
                "logits tensor has {} elements, expected at least {}",
                logits.len(),
                ACTION_SIZE
            )));
        }

        // Argmax over {left, right}: action 1 pushes right.
        let force = if logits[1] > logits[0] {
            self.force_mag
        } else {
            -self.force_mag
        };
        Ok(force)
    }
}

// ---------------------------------------------------------------------------
// Calibration
// ---------------------------------------------------------------------------

/// Run a series of dummy inferences to measure the average inference
/// latency, then return a *control period* (integration steps per decision).
///
/// control_period = ceil(mean_inference_us / TAU_DURATION_US)
///
/// A control period of 1 means the policy keeps up with every step.
pub fn calibrate_inference(policy: &mut OnnxPolicy) -> u32 {
    let dummy_obs = Observation {
        data: [0.0f64; OBS_SIZE],
    };

    // Warmup
    for _ in 0..CALIBRATION_WARMUP {
        let _ = policy.act(&dummy_obs);
    }

    // Timed runs
    let start = Instant::now();
    for _ in 0..CALIBRATION_RUNS {
        let _ = policy.act(&dummy_obs);
    }
    let elapsed_us = start.elapsed().as_micros() as u64;
    let mean_us = elapsed_us / CALIBRATION_RUNS as u64;

    let period = mean_us.div_ceil(TAU_DURATION_US).max(1);
    period as u32
}
