use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

const VALIDATE: &str = env!("CARGO_BIN_EXE_qsc_validate");
const GOLDEN_MODEL: &str = env!("CARGO_BIN_EXE_golden_model");

fn temp_path(name: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    std::env::temp_dir().join(format!("qsc_cli_{name}_{ts}.log"))
}

fn validate(args: &[&str]) -> Output {
    Command::new(VALIDATE)
        .args(args)
        .env_remove("QSC_TOOLCHAIN_BIN")
        .env_remove("QSC_REFERENCE_BIN")
        .env_remove("QSC_RESULT_TAGS")
        .env_remove("QSC_RUN_LOG_PATH")
        .output()
        .expect("spawn qsc_validate")
}

#[test]
fn golden_model_prints_one_line() {
    let output = Command::new(GOLDEN_MODEL)
        .args(["8", "4", "0.5"])
        .output()
        .expect("spawn golden_model");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "16 18 20 22 48 50 52 54\n"
    );
}

#[test]
fn golden_model_rejects_bad_scalars() {
    for args in [["8", "4", "2.0"], ["8", "four", "1.0"], ["1", "4", "1.0"]] {
        let output = Command::new(GOLDEN_MODEL)
            .args(args)
            .output()
            .expect("spawn golden_model");
        assert_eq!(output.status.code(), Some(1), "args {args:?}");
        assert!(output.stdout.is_empty());
    }
}

#[test]
fn encode_scale_truncates() {
    let output = validate(&["encode-scale", "--scale", "0.75"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0xC0");

    let output = validate(&["encode-scale", "--scale", "1.0"]);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0x100");
}

#[test]
fn replay_exit_codes_follow_verdict() {
    let good = temp_path("good");
    fs::write(
        &good,
        "# Info: run started\nDATA_SEQ: {16 18 20 22 48 50 52 54}\nDATA_SIMD: {16 18 20 22 48 50 52 54}\n",
    )
    .expect("write log");
    let output = validate(&[
        "replay", "--width", "8", "--height", "4", "--scale", "0.5", "--log",
        good.to_str().expect("utf8"),
    ]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("TOTAL SUCCESS"));

    let bad = temp_path("bad");
    fs::write(
        &bad,
        "DATA_SEQ: {16 18 20 22 48 50 52 54}\nDATA_SIMD: {16 18 20}\n",
    )
    .expect("write log");
    let output = validate(&[
        "replay", "--width", "8", "--height", "4", "--scale", "0.5", "--log",
        bad.to_str().expect("utf8"),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        String::from_utf8_lossy(&output.stdout)
            .contains("FAILURE: 5 mismatches (sequential=0, simd=5)")
    );

    let _ = fs::remove_file(good);
    let _ = fs::remove_file(bad);
}

#[test]
fn terminal_errors_exit_with_two() {
    let output = validate(&[
        "replay", "--width", "abc", "--height", "4", "--scale", "0.5", "--log", "/dev/null",
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());

    let output = validate(&["run", "--width", "8", "--height", "4", "--scale", "1.0"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unavailable"));
}
