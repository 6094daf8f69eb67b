#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use qsc_conformance::capture::{RunArtifact, load_run_artifact, write_run_artifact};
use qsc_conformance::reference::GoldenSource;
use qsc_conformance::report::{SEQUENTIAL_LABEL, SIMD_LABEL, Verdict};
use qsc_conformance::toolchain::ToolchainSpec;
use qsc_conformance::{CandidateOrigin, HarnessConfig, HarnessError, RunRequest, run_validation};

const GOLDEN_MODEL: &str = env!("CARGO_BIN_EXE_golden_model");

fn temp_path(name: &str, ext: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    std::env::temp_dir().join(format!("qsc_{name}_{ts}.{ext}"))
}

/// `sh -c <script> toolchain <golden_model>`; geometry lands in `$2..$4`.
fn shell_toolchain(script: &str) -> ToolchainSpec {
    ToolchainSpec::new("sh").with_args(["-c", script, "toolchain", GOLDEN_MODEL])
}

fn config_with(toolchain: ToolchainSpec) -> HarnessConfig {
    let mut config = HarnessConfig::default_paths();
    config.toolchain = Some(toolchain);
    config
}

#[test]
fn matching_hardware_streams_pass() {
    let script = r#"
        echo "Info: elaborating resize_top"
        echo "scale word $4"
        echo "DATA_SEQ: {$("$1" "$2" "$3" 1.0)}"
        echo "DATA_SIMD: {$("$1" "$2" "$3" 1.0) 0 0 0}"
        echo "DATA_SIMD: {17 x}"
    "#;
    let mut config = config_with(shell_toolchain(script));
    config.reference_bin = Some(PathBuf::from(GOLDEN_MODEL));
    let request = RunRequest::new(8, 4, 1.0).expect("request");

    let outcome = run_validation(&config, &request).expect("run");
    assert_eq!(outcome.report.verdict, Verdict::Success);
    assert_eq!(outcome.report.golden_len, 32);
    assert!(outcome.report.elided);
    assert_eq!(outcome.report.candidates[1].discarded_tail, 3);
    assert_eq!(outcome.stream.malformed_lines, 1);
    assert!(matches!(
        outcome.golden_source,
        GoldenSource::ModelCrossChecked { .. }
    ));
    assert!(matches!(
        outcome.origin,
        CandidateOrigin::Toolchain {
            exit_code: Some(0),
            ..
        }
    ));

    let text = outcome.report.render();
    assert!(text.contains("TOTAL SUCCESS"));
    assert!(text.contains("... (22 remaining entries correct) ..."));
}

#[test]
fn faulty_simd_stream_is_reported() {
    let script = r#"
        echo "DATA_SEQ: {16 18 20 22 48 50 52 54}"
        echo "DATA_SIMD: {16 18 20 22 48 50 52 0}"
    "#;
    let config = config_with(shell_toolchain(script));
    let request = RunRequest::new(8, 4, 0.5).expect("request");

    let outcome = run_validation(&config, &request).expect("run");
    assert_eq!(outcome.golden_source, GoldenSource::Model);
    assert_eq!(outcome.report.mismatches_for(SEQUENTIAL_LABEL), Some(0));
    assert_eq!(outcome.report.mismatches_for(SIMD_LABEL), Some(1));
    assert_eq!(outcome.report.verdict, Verdict::Failure);
    assert_eq!(outcome.report.candidates[1].first_mismatch, Some(7));

    let artifact_path = temp_path("run_artifact", "json");
    let artifact = RunArtifact::from_outcome(&outcome);
    write_run_artifact(&artifact_path, &artifact).expect("write");
    let loaded = load_run_artifact(&artifact_path).expect("load");
    assert_eq!(loaded, artifact);
    assert_eq!(loaded.scale_hex, "0x80");
    let _ = fs::remove_file(artifact_path);
}

#[test]
fn hung_toolchain_yields_empty_candidates() {
    let script = "echo 'DATA_SEQ: {16 18}'; exec sleep 5";
    let spec = shell_toolchain(script).with_timeout(Duration::from_millis(300));
    let request = RunRequest::new(8, 4, 0.5).expect("request");

    let outcome = run_validation(&config_with(spec), &request).expect("run");
    assert!(outcome.timed_out);
    assert_eq!(outcome.report.mismatches_for(SEQUENTIAL_LABEL), Some(8));
    assert_eq!(outcome.report.mismatches_for(SIMD_LABEL), Some(8));
    assert_eq!(outcome.report.verdict, Verdict::Failure);
}

#[test]
fn disagreeing_reference_stops_the_run() {
    // `echo 8 4 1` is a well-formed but wrong golden sequence.
    let reference = PathBuf::from("/bin/echo");
    if !reference.exists() {
        return;
    }
    let mut config = config_with(shell_toolchain("echo 'DATA_SEQ: {1 2 3}'"));
    config.reference_bin = Some(reference);
    let request = RunRequest::new(8, 4, 1.0).expect("request");

    let err = run_validation(&config, &request).expect_err("disagreement");
    match err {
        HarnessError::GoldenDisagreement {
            model_len,
            reference_len,
            first_difference,
        } => {
            assert_eq!(model_len, 32);
            assert_eq!(reference_len, 3);
            assert_eq!(first_difference, Some(0));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
