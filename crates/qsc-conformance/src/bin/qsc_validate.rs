#![forbid(unsafe_code)]

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use qsc_conformance::capture::{
    GoldenCapture, RunArtifact, load_golden_capture, write_golden_capture, write_run_artifact,
};
use qsc_conformance::telemetry::init_tracing;
use qsc_conformance::toolchain::ToolchainSpec;
use qsc_conformance::{
    HarnessConfig, HarnessError, RunOutcome, RunRequest, replay_log_file, run_validation,
    set_run_log_path,
};
use qsc_image::ScaleFactor;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Validates FPGA resizer output against the Q8.8 golden model"
)]
struct Cli {
    /// Append one JSON line per completed run to this file
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    run_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch the toolchain and compare its tagged results against the golden model
    Run(RunArgs),

    /// Compare a saved toolchain log without launching anything
    Replay(ReplayArgs),

    /// Print the hexadecimal scale encoding handed to the toolchain
    EncodeScale(EncodeScaleArgs),

    /// Check a golden capture against its recorded digest
    VerifyCapture(VerifyCaptureArgs),
}

#[derive(Args)]
struct Geometry {
    /// Input width in pixels
    #[arg(long)]
    width: String,

    /// Input height in pixels
    #[arg(long)]
    height: String,

    /// Scale factor in [0.5, 1.0]
    #[arg(long)]
    scale: String,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    geometry: Geometry,

    /// Toolchain executable (overrides QSC_TOOLCHAIN_BIN)
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    toolchain: Option<PathBuf>,

    /// Argument placed before the geometry; repeat for several
    #[arg(long = "toolchain-arg", action = ArgAction::Append, allow_hyphen_values = true)]
    toolchain_args: Vec<String>,

    /// Working directory of the toolchain process
    #[arg(long, value_hint = ValueHint::DirPath)]
    toolchain_dir: Option<PathBuf>,

    /// Kill the toolchain after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Native reference executable cross-checked against the model
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    reference: Option<PathBuf>,

    /// Write the run artifact (JSON) here
    #[arg(long, value_hint = ValueHint::FilePath)]
    report_json: Option<PathBuf>,

    /// Also write a golden capture under the artifact root
    #[arg(long)]
    capture: bool,
}

#[derive(Args)]
struct ReplayArgs {
    #[command(flatten)]
    geometry: Geometry,

    /// Saved toolchain log
    #[arg(long, value_hint = ValueHint::FilePath)]
    log: PathBuf,

    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    reference: Option<PathBuf>,

    #[arg(long, value_hint = ValueHint::FilePath)]
    report_json: Option<PathBuf>,
}

#[derive(Args)]
struct EncodeScaleArgs {
    #[arg(long)]
    scale: String,
}

#[derive(Args)]
struct VerifyCaptureArgs {
    #[arg(long, value_hint = ValueHint::FilePath)]
    path: PathBuf,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    if cli.run_log.is_some() {
        set_run_log_path(cli.run_log);
    }

    match dispatch(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!(reason_code = err.reason_code(), "{err}");
            eprintln!("qsc_validate failed: {err}");
            ExitCode::from(2)
        }
    }
}

/// `Ok(false)` is a completed run whose verdict is not success.
fn dispatch(command: Command) -> Result<bool, HarnessError> {
    match command {
        Command::Run(args) => {
            let request = parse_geometry(&args.geometry)?;
            let mut config = HarnessConfig::from_env()?;
            apply_run_overrides(&mut config, &args);
            let outcome = run_validation(&config, &request)?;
            if args.capture {
                let capture = GoldenCapture::from_model(&outcome.model);
                let path = config.artifact_root.join(format!(
                    "golden_{}x{}_{}.json",
                    request.dims.width(),
                    request.dims.height(),
                    capture.scale_hex
                ));
                write_golden_capture(&path, &capture)?;
                info!(path = %path.display(), "golden capture written");
            }
            finish(&outcome, args.report_json.as_deref())
        }
        Command::Replay(args) => {
            let request = parse_geometry(&args.geometry)?;
            let mut config = HarnessConfig::from_env()?;
            if args.reference.is_some() {
                config.reference_bin = args.reference;
            }
            let outcome = replay_log_file(&config, &request, &args.log)?;
            finish(&outcome, args.report_json.as_deref())
        }
        Command::EncodeScale(args) => {
            let scale: ScaleFactor = args.scale.parse()?;
            println!("{}", scale.hex());
            Ok(true)
        }
        Command::VerifyCapture(args) => {
            let capture = load_golden_capture(&args.path)?;
            println!(
                "{}: {}x{} scale={} ({}) golden_sha256={}",
                args.path.display(),
                capture.input.width(),
                capture.input.height(),
                capture.scale,
                capture.scale_hex,
                capture.golden_sha256
            );
            Ok(true)
        }
    }
}

fn parse_geometry(geometry: &Geometry) -> Result<RunRequest, HarnessError> {
    RunRequest::parse(&geometry.width, &geometry.height, &geometry.scale)
}

fn apply_run_overrides(config: &mut HarnessConfig, args: &RunArgs) {
    if let Some(program) = &args.toolchain {
        let mut spec = ToolchainSpec::new(program.clone());
        if let Some(previous) = &config.toolchain {
            spec.leading_args = previous.leading_args.clone();
            spec.working_dir = previous.working_dir.clone();
            spec.timeout = previous.timeout;
        }
        config.toolchain = Some(spec);
    }
    if let Some(spec) = config.toolchain.as_mut() {
        if !args.toolchain_args.is_empty() {
            spec.leading_args = args.toolchain_args.clone();
        }
        if let Some(dir) = &args.toolchain_dir {
            spec.working_dir = Some(dir.clone());
        }
        if let Some(secs) = args.timeout_secs {
            spec.timeout = Some(Duration::from_secs(secs));
        }
    }
    if let Some(reference) = &args.reference {
        config.reference_bin = Some(reference.clone());
    }
}

fn finish(outcome: &RunOutcome, report_json: Option<&Path>) -> Result<bool, HarnessError> {
    print!("{}", outcome.report);
    if let Some(path) = report_json {
        write_run_artifact(path, &RunArtifact::from_outcome(outcome))?;
        info!(path = %path.display(), "run artifact written");
    }
    Ok(outcome.report.is_success())
}
