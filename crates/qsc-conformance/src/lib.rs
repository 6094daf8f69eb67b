#![forbid(unsafe_code)]

pub mod capture;
pub mod capture_log;
pub mod error;
pub mod reference;
pub mod report;
pub mod telemetry;
pub mod toolchain;

use crate::capture_log::{ResultTag, StreamStats, collect_from_reader};
use crate::reference::{GoldenSource, resolve_golden};
use crate::report::{ValidationReport, compare};
use crate::toolchain::{ToolchainSpec, run_toolchain};
use qsc_image::{ImageDims, ModelOutput, ScaleFactor, generate_with, parse_dimension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

pub use crate::error::HarnessError;

pub const ENV_TOOLCHAIN_BIN: &str = "QSC_TOOLCHAIN_BIN";
pub const ENV_TOOLCHAIN_ARGS: &str = "QSC_TOOLCHAIN_ARGS";
pub const ENV_TOOLCHAIN_DIR: &str = "QSC_TOOLCHAIN_DIR";
pub const ENV_TOOLCHAIN_TIMEOUT_SECS: &str = "QSC_TOOLCHAIN_TIMEOUT_SECS";
pub const ENV_REFERENCE_BIN: &str = "QSC_REFERENCE_BIN";
pub const ENV_RESULT_TAGS: &str = "QSC_RESULT_TAGS";
pub const ENV_ARTIFACT_ROOT: &str = "QSC_ARTIFACT_ROOT";
pub const ENV_RUN_LOG_PATH: &str = "QSC_RUN_LOG_PATH";

static RUN_LOG_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub artifact_root: PathBuf,
    pub toolchain: Option<ToolchainSpec>,
    pub reference_bin: Option<PathBuf>,
    pub tags: Vec<ResultTag>,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let repo_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
        Self {
            artifact_root: repo_root.join("artifacts/runs"),
            toolchain: None,
            reference_bin: None,
            tags: ResultTag::defaults(),
        }
    }

    /// Defaults overlaid with the `QSC_*` environment variables.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarnessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let mut config = Self::default_paths();
        if let Some(root) = value(ENV_ARTIFACT_ROOT) {
            config.artifact_root = PathBuf::from(root);
        }
        config.reference_bin = value(ENV_REFERENCE_BIN).map(PathBuf::from);

        if let Some(program) = value(ENV_TOOLCHAIN_BIN) {
            let mut spec = ToolchainSpec::new(program);
            if let Some(args) = value(ENV_TOOLCHAIN_ARGS) {
                spec = spec.with_args(args.split_whitespace());
            }
            spec.working_dir = value(ENV_TOOLCHAIN_DIR).map(PathBuf::from);
            if let Some(raw) = value(ENV_TOOLCHAIN_TIMEOUT_SECS) {
                let secs = raw.parse::<u64>().map_err(|err| HarnessError::Config {
                    key: ENV_TOOLCHAIN_TIMEOUT_SECS,
                    detail: format!("'{raw}': {err}"),
                })?;
                spec.timeout = Some(Duration::from_secs(secs));
            }
            config.toolchain = Some(spec);
        }

        if let Some(raw) = value(ENV_RESULT_TAGS) {
            config.tags = parse_tag_bindings(&raw)?;
        }

        Ok(config)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

/// `MARKER=label,MARKER=label`
pub fn parse_tag_bindings(raw: &str) -> Result<Vec<ResultTag>, HarnessError> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            ResultTag::parse_binding(entry).ok_or_else(|| HarnessError::Config {
                key: ENV_RESULT_TAGS,
                detail: format!("expected MARKER=label, got '{}'", entry.trim()),
            })
        })
        .collect()
}

/// Validated scalars of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub dims: ImageDims,
    pub scale: ScaleFactor,
}

impl RunRequest {
    pub fn new(width: usize, height: usize, scale: f64) -> Result<Self, HarnessError> {
        Ok(Self {
            dims: ImageDims::new(width, height)?,
            scale: ScaleFactor::new(scale)?,
        })
    }

    /// Parses raw text input; anything non-numeric or out of range is
    /// rejected before any computation happens.
    pub fn parse(width: &str, height: &str, scale: &str) -> Result<Self, HarnessError> {
        let width = parse_dimension("width", width)?;
        let height = parse_dimension("height", height)?;
        let scale: ScaleFactor = scale.parse()?;
        Ok(Self {
            dims: ImageDims::new(width, height)?,
            scale,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateOrigin {
    Toolchain {
        program: String,
        exit_code: Option<i32>,
        elapsed_ms: u64,
    },
    Replay {
        log: String,
    },
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub request: RunRequest,
    pub model: ModelOutput,
    pub golden_source: GoldenSource,
    pub origin: CandidateOrigin,
    pub stream: StreamStats,
    pub timed_out: bool,
    pub report: ValidationReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunLogEntry {
    ts_unix_ms: u64,
    width: usize,
    height: usize,
    scale: ScaleFactor,
    scale_hex: String,
    golden_source: GoldenSource,
    golden_len: usize,
    verdict: String,
    mismatches: BTreeMap<String, usize>,
    malformed_lines: usize,
    timed_out: bool,
}

pub(crate) fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, millis)
}

/// Whole milliseconds, saturating. serde_json cannot read a `u128` inside an
/// internally tagged enum.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub fn set_run_log_path(path: Option<PathBuf>) {
    let cell = RUN_LOG_PATH.get_or_init(|| Mutex::new(None));
    if let Ok(mut slot) = cell.lock() {
        *slot = path;
    }
}

fn maybe_append_run_log(outcome: &RunOutcome) -> Result<(), HarnessError> {
    let configured = RUN_LOG_PATH
        .get()
        .and_then(|cell| cell.lock().ok())
        .and_then(|slot| slot.clone());
    let from_env = std::env::var_os(ENV_RUN_LOG_PATH).map(PathBuf::from);
    let Some(path) = configured.or(from_env) else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| HarnessError::artifact(parent, err))?;
    }

    let entry = RunLogEntry {
        ts_unix_ms: now_unix_ms(),
        width: outcome.request.dims.width(),
        height: outcome.request.dims.height(),
        scale: outcome.request.scale,
        scale_hex: outcome.request.scale.hex(),
        golden_source: outcome.golden_source.clone(),
        golden_len: outcome.report.golden_len,
        verdict: outcome.report.verdict.as_str().to_string(),
        mismatches: outcome
            .report
            .candidates
            .iter()
            .map(|c| (c.label.clone(), c.mismatches))
            .collect(),
        malformed_lines: outcome.stream.malformed_lines,
        timed_out: outcome.timed_out,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| HarnessError::artifact(&path, err))?;
    let line = serde_json::to_string(&entry).map_err(|err| HarnessError::artifact(&path, err))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| HarnessError::artifact(&path, err))
}

/// Full pipeline: model → golden selection → toolchain → comparison.
pub fn run_validation(
    config: &HarnessConfig,
    request: &RunRequest,
) -> Result<RunOutcome, HarnessError> {
    let spec = config
        .toolchain
        .as_ref()
        .ok_or_else(|| HarnessError::ToolchainUnavailable {
            program: "<unset>".to_string(),
            detail: format!("no toolchain configured (set {ENV_TOOLCHAIN_BIN})"),
        })?;

    let model = generate_model(request)?;
    let (golden, golden_source) =
        resolve_golden(config.reference_bin.as_deref(), &model, request)?;

    let run = run_toolchain(spec, request, &config.tags)?;
    let report = compare(&golden, &run.captured.candidates);

    let outcome = RunOutcome {
        request: *request,
        model,
        golden_source,
        origin: CandidateOrigin::Toolchain {
            program: spec.program.display().to_string(),
            exit_code: run.exit_code,
            elapsed_ms: run.elapsed_ms,
        },
        stream: run.captured.stats,
        timed_out: run.timed_out,
        report,
    };
    finish_run(outcome)
}

/// Compares a previously saved toolchain log without launching anything.
pub fn replay_log<R: BufRead>(
    config: &HarnessConfig,
    request: &RunRequest,
    log_name: &str,
    reader: R,
) -> Result<RunOutcome, HarnessError> {
    let model = generate_model(request)?;
    let (golden, golden_source) =
        resolve_golden(config.reference_bin.as_deref(), &model, request)?;

    let captured =
        collect_from_reader(reader, &config.tags).map_err(|err| HarnessError::Artifact {
            path: log_name.to_string(),
            detail: err.to_string(),
        })?;
    let report = compare(&golden, &captured.candidates);

    let outcome = RunOutcome {
        request: *request,
        model,
        golden_source,
        origin: CandidateOrigin::Replay {
            log: log_name.to_string(),
        },
        stream: captured.stats,
        timed_out: false,
        report,
    };
    finish_run(outcome)
}

pub fn replay_log_file(
    config: &HarnessConfig,
    request: &RunRequest,
    path: &Path,
) -> Result<RunOutcome, HarnessError> {
    let file = fs::File::open(path).map_err(|err| HarnessError::artifact(path, err))?;
    replay_log(
        config,
        request,
        &path.display().to_string(),
        std::io::BufReader::new(file),
    )
}

fn generate_model(request: &RunRequest) -> Result<ModelOutput, HarnessError> {
    info!(
        width = request.dims.width(),
        height = request.dims.height(),
        scale = %request.scale,
        scale_hex = %request.scale.hex(),
        "configuration"
    );
    let model = generate_with(request.dims, request.scale)?;
    debug!(
        output_width = model.plan().output_width(),
        output_height = model.plan().output_height(),
        step_raw = model.plan().step().raw(),
        "resize plan"
    );
    info!(pixels = model.golden().len(), "image model produced golden sequence");
    Ok(model)
}

fn finish_run(outcome: RunOutcome) -> Result<RunOutcome, HarnessError> {
    info!(
        verdict = outcome.report.verdict.as_str(),
        mismatches = outcome.report.total_mismatches(),
        "comparison finished"
    );
    maybe_append_run_log(&outcome)?;
    Ok(outcome)
}
