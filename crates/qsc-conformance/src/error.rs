use qsc_image::ImageError;
use thiserror::Error;

pub const HARNESS_REASON_CODES: [&str; 9] = [
    "harness_invalid_input",
    "harness_config_invalid",
    "harness_toolchain_unavailable",
    "harness_toolchain_failed",
    "harness_toolchain_io",
    "harness_reference_failed",
    "harness_golden_disagreement",
    "harness_artifact_io",
    "harness_capture_integrity",
];

/// Terminal failures of a validation run.
///
/// A golden/candidate mismatch is not an error: it is reported through
/// [`crate::report::Verdict`].
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid input: {0}")]
    Input(#[from] ImageError),
    #[error("invalid configuration {key}: {detail}")]
    Config { key: &'static str, detail: String },
    #[error("toolchain '{program}' unavailable: {detail}")]
    ToolchainUnavailable { program: String, detail: String },
    #[error("toolchain exited with {status}; stderr: {stderr}")]
    ToolchainFailed { status: String, stderr: String },
    #[error("toolchain stream failed: {detail}")]
    ToolchainIo { detail: String },
    #[error("native reference '{program}' failed: {detail}")]
    ReferenceFailed { program: String, detail: String },
    #[error(
        "golden sources disagree: model_len={model_len} reference_len={reference_len} first_difference={first_difference:?}"
    )]
    GoldenDisagreement {
        model_len: usize,
        reference_len: usize,
        first_difference: Option<usize>,
    },
    #[error("artifact {path}: {detail}")]
    Artifact { path: String, detail: String },
    #[error("capture {path} failed integrity check: expected sha256={expected} actual={actual}")]
    CaptureIntegrity {
        path: String,
        expected: String,
        actual: String,
    },
}

impl HarnessError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Input(_) => HARNESS_REASON_CODES[0],
            Self::Config { .. } => HARNESS_REASON_CODES[1],
            Self::ToolchainUnavailable { .. } => HARNESS_REASON_CODES[2],
            Self::ToolchainFailed { .. } => HARNESS_REASON_CODES[3],
            Self::ToolchainIo { .. } => HARNESS_REASON_CODES[4],
            Self::ReferenceFailed { .. } => HARNESS_REASON_CODES[5],
            Self::GoldenDisagreement { .. } => HARNESS_REASON_CODES[6],
            Self::Artifact { .. } => HARNESS_REASON_CODES[7],
            Self::CaptureIntegrity { .. } => HARNESS_REASON_CODES[8],
        }
    }

    pub(crate) fn artifact(path: &std::path::Path, detail: impl std::fmt::Display) -> Self {
        Self::Artifact {
            path: path.display().to_string(),
            detail: detail.to_string(),
        }
    }
}
