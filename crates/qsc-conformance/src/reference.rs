//! Optional native reference binary and golden-source selection.
//!
//! A separately built reference may be invoked as `program <W> <H> <SCALE>`
//! and must print the golden sequence as whitespace-separated integers on
//! stdout. When one is available its output has to agree bit for bit with the
//! image model; otherwise the model is the only golden source.

use crate::RunRequest;
use crate::error::HarnessError;
use qsc_image::ModelOutput;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoldenSource {
    Model,
    ModelCrossChecked { reference: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenCrossCheck {
    pub model_len: usize,
    pub reference_len: usize,
    pub first_difference: Option<usize>,
}

impl GoldenCrossCheck {
    #[must_use]
    pub fn agrees(&self) -> bool {
        self.first_difference.is_none()
    }
}

#[must_use]
pub fn cross_check(model: &[i64], reference: &[i64]) -> GoldenCrossCheck {
    let first_difference = model
        .iter()
        .zip(reference)
        .position(|(m, r)| m != r)
        .or_else(|| (model.len() != reference.len()).then(|| model.len().min(reference.len())));
    GoldenCrossCheck {
        model_len: model.len(),
        reference_len: reference.len(),
        first_difference,
    }
}

pub fn run_reference(program: &Path, request: &RunRequest) -> Result<Vec<i64>, HarnessError> {
    let failed = |detail: String| HarnessError::ReferenceFailed {
        program: program.display().to_string(),
        detail,
    };

    let output = Command::new(program)
        .arg(request.dims.width().to_string())
        .arg(request.dims.height().to_string())
        .arg(request.scale.to_string())
        .stdin(Stdio::null())
        .output()
        .map_err(|err| failed(format!("failed to invoke: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failed(format!(
            "status={} stderr={}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .split_whitespace()
        .enumerate()
        .map(|(idx, token)| {
            token
                .parse::<i64>()
                .map_err(|_| failed(format!("token {idx} is not an integer: '{token}'")))
        })
        .collect()
}

/// Picks the golden sequence for a run.
///
/// An unconfigured or absent reference falls back to the model. A reference
/// that exists but fails, or disagrees with the model, ends the run.
pub fn resolve_golden(
    reference: Option<&Path>,
    model: &ModelOutput,
    request: &RunRequest,
) -> Result<(Vec<i64>, GoldenSource), HarnessError> {
    let golden = model.golden_as_ints();

    let Some(program) = reference else {
        info!("no native reference configured; image model is the sole golden source");
        return Ok((golden, GoldenSource::Model));
    };
    if !program.exists() {
        warn!(
            reference = %program.display(),
            "native reference not found; image model is the sole golden source"
        );
        return Ok((golden, GoldenSource::Model));
    }

    let from_reference = run_reference(program, request)?;
    let check = cross_check(&golden, &from_reference);
    if !check.agrees() {
        return Err(HarnessError::GoldenDisagreement {
            model_len: check.model_len,
            reference_len: check.reference_len,
            first_difference: check.first_difference,
        });
    }
    info!(
        reference = %program.display(),
        values = golden.len(),
        "native reference agrees with image model"
    );
    Ok((
        golden,
        GoldenSource::ModelCrossChecked {
            reference: program.display().to_string(),
        },
    ))
}
