//! On-disk artifacts: golden captures and run reports.

use crate::error::HarnessError;
use crate::reference::GoldenSource;
use crate::report::{ValidationReport, Verdict};
use crate::{CandidateOrigin, RunOutcome};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use qsc_image::{ImageDims, ModelOutput, ScaleFactor};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub const GOLDEN_CAPTURE_SCHEMA_VERSION: u8 = 1;
pub const RUN_ARTIFACT_SCHEMA_VERSION: u8 = 1;

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// Golden sequence of one configuration, frozen for offline replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenCapture {
    pub schema_version: u8,
    pub input: ImageDims,
    pub output_width: usize,
    pub output_height: usize,
    pub scale: ScaleFactor,
    pub scale_hex: String,
    pub input_sha256: String,
    pub golden_sha256: String,
    pub golden_b64: String,
}

impl GoldenCapture {
    #[must_use]
    pub fn from_model(model: &ModelOutput) -> Self {
        let plan = model.plan();
        Self {
            schema_version: GOLDEN_CAPTURE_SCHEMA_VERSION,
            input: plan.input(),
            output_width: plan.output_width(),
            output_height: plan.output_height(),
            scale: plan.scale(),
            scale_hex: plan.scale().hex(),
            input_sha256: sha256_hex(model.input()),
            golden_sha256: sha256_hex(model.golden()),
            golden_b64: BASE64.encode(model.golden()),
        }
    }

    pub fn decode_golden(&self) -> Result<Vec<u8>, String> {
        let bytes = BASE64
            .decode(&self.golden_b64)
            .map_err(|err| format!("base64 decode failed: {err}"))?;
        let actual = sha256_hex(&bytes);
        if actual != self.golden_sha256 {
            return Err(format!(
                "sha256 mismatch expected={} actual={actual}",
                self.golden_sha256
            ));
        }
        Ok(bytes)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| HarnessError::artifact(parent, err))?;
    }
    let raw = serde_json::to_string_pretty(value).map_err(|err| HarnessError::artifact(path, err))?;
    fs::write(path, raw).map_err(|err| HarnessError::artifact(path, err))
}

pub fn write_golden_capture(path: &Path, capture: &GoldenCapture) -> Result<(), HarnessError> {
    write_json(path, capture)
}

/// Loads a capture and verifies the golden payload against its digest.
pub fn load_golden_capture(path: &Path) -> Result<GoldenCapture, HarnessError> {
    let raw = fs::read_to_string(path).map_err(|err| HarnessError::artifact(path, err))?;
    let capture: GoldenCapture =
        serde_json::from_str(&raw).map_err(|err| HarnessError::artifact(path, err))?;
    let bytes = BASE64
        .decode(&capture.golden_b64)
        .map_err(|err| HarnessError::artifact(path, err))?;
    let actual = sha256_hex(&bytes);
    if actual != capture.golden_sha256 {
        return Err(HarnessError::CaptureIntegrity {
            path: path.display().to_string(),
            expected: capture.golden_sha256,
            actual,
        });
    }
    Ok(capture)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub schema_version: u8,
    pub generated_at_unix_ms: u64,
    pub input: ImageDims,
    pub scale: ScaleFactor,
    pub scale_hex: String,
    pub golden_source: GoldenSource,
    pub golden_sha256: String,
    pub origin: CandidateOrigin,
    pub timed_out: bool,
    pub verdict: Verdict,
    pub report: ValidationReport,
}

impl RunArtifact {
    #[must_use]
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            schema_version: RUN_ARTIFACT_SCHEMA_VERSION,
            generated_at_unix_ms: crate::now_unix_ms(),
            input: outcome.request.dims,
            scale: outcome.request.scale,
            scale_hex: outcome.request.scale.hex(),
            golden_source: outcome.golden_source.clone(),
            golden_sha256: sha256_hex(outcome.model.golden()),
            origin: outcome.origin.clone(),
            timed_out: outcome.timed_out,
            verdict: outcome.report.verdict,
            report: outcome.report.clone(),
        }
    }
}

pub fn write_run_artifact(path: &Path, artifact: &RunArtifact) -> Result<(), HarnessError> {
    write_json(path, artifact)
}

pub fn load_run_artifact(path: &Path) -> Result<RunArtifact, HarnessError> {
    let raw = fs::read_to_string(path).map_err(|err| HarnessError::artifact(path, err))?;
    serde_json::from_str(&raw).map_err(|err| HarnessError::artifact(path, err))
}
