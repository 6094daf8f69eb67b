//! Launches the synthesis/simulation toolchain and streams its log.
//!
//! The process is invoked as `program [leading_args..] <width> <height>
//! <scale_hex>`. Stdout is consumed line by line while the process runs;
//! tagged result lines accumulate in a [`TaggedResultCollector`] that is only
//! finished after the process has exited.

use crate::RunRequest;
use crate::capture_log::{CapturedCandidates, ResultTag, TaggedResultCollector, read_lossy_line};
use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const READER_GRACE: Duration = Duration::from_secs(2);
const JOIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainSpec {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ToolchainSpec {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn display_program(&self) -> String {
        self.program.display().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainRun {
    pub captured: CapturedCandidates,
    pub exit_code: Option<i32>,
    /// The deadline expired; every candidate is reported as unavailable.
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

pub fn run_toolchain(
    spec: &ToolchainSpec,
    request: &RunRequest,
    tags: &[ResultTag],
) -> Result<ToolchainRun, HarnessError> {
    let scale_hex = request.scale.hex();
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.leading_args)
        .arg(request.dims.width().to_string())
        .arg(request.dims.height().to_string())
        .arg(&scale_hex)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    info!(
        program = %spec.display_program(),
        width = request.dims.width(),
        height = request.dims.height(),
        %scale_hex,
        "launching toolchain"
    );
    let started = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|err| HarnessError::ToolchainUnavailable {
            program: spec.display_program(),
            detail: err.to_string(),
        })?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        terminate(&mut child);
        return Err(HarnessError::ToolchainIo {
            detail: "child pipes were not captured".to_string(),
        });
    };

    let stderr_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = BufReader::new(stderr).read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    });
    let (tx, rx) = mpsc::channel::<io::Result<String>>();
    let stdout_reader = thread::spawn(move || {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = read_lossy_line(&mut reader, &mut buf).transpose() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });

    let mut collector = TaggedResultCollector::new(tags.to_vec());
    let deadline = spec.timeout.map(|timeout| started + timeout);
    let mut timed_out = false;

    loop {
        let next = match deadline {
            Some(deadline) => {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(line) => line,
                    Err(RecvTimeoutError::Timeout) => {
                        timed_out = true;
                        break;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(line) => line,
                Err(_) => break,
            },
        };

        match next {
            Ok(line) => {
                let line = line.trim();
                info!(target: "qsc::toolchain", "toolchain> {line}");
                collector.observe(line);
            }
            Err(err) => {
                terminate(&mut child);
                drop(rx);
                join_bounded(stdout_reader, READER_GRACE);
                join_bounded(stderr_reader, READER_GRACE);
                return Err(HarnessError::ToolchainIo {
                    detail: err.to_string(),
                });
            }
        }
    }

    if timed_out {
        terminate(&mut child);
        drop(rx);
        join_bounded(stdout_reader, READER_GRACE);
        join_bounded(stderr_reader, READER_GRACE);
        let stats = collector.stats();
        warn!(
            program = %spec.display_program(),
            lines_seen = stats.lines_seen,
            "toolchain timed out; candidates reported as unavailable"
        );
        return Ok(ToolchainRun {
            captured: CapturedCandidates::unavailable(tags, stats),
            exit_code: None,
            timed_out: true,
            elapsed_ms: crate::millis(started.elapsed()),
        });
    }

    let status = child.wait().map_err(|err| HarnessError::ToolchainIo {
        detail: err.to_string(),
    })?;
    join_bounded(stdout_reader, READER_GRACE);
    let stderr = join_bounded(stderr_reader, READER_GRACE).unwrap_or_default();
    if !status.success() {
        return Err(HarnessError::ToolchainFailed {
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    let captured = collector.finish();
    info!(
        lines_seen = captured.stats.lines_seen,
        tagged_lines = captured.stats.tagged_lines,
        malformed_lines = captured.stats.malformed_lines,
        "toolchain finished"
    );
    Ok(ToolchainRun {
        captured,
        exit_code: status.code(),
        timed_out: false,
        elapsed_ms: crate::millis(started.elapsed()),
    })
}

/// Joins a pipe reader if it finishes within `grace`. A descendant that
/// inherited the pipe can hold it open past the child's exit; such a reader is
/// left detached and ends when that descendant closes the pipe.
fn join_bounded<T>(handle: JoinHandle<T>, grace: Duration) -> Option<T> {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("pipe reader still blocked after {grace:?}; detaching it");
            return None;
        }
        thread::sleep(JOIN_POLL);
    }
    handle.join().ok()
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::{ToolchainSpec, join_bounded, run_toolchain};
    use crate::RunRequest;
    use crate::capture_log::ResultTag;
    use crate::error::HarnessError;
    use crate::report::{SEQUENTIAL_LABEL, SIMD_LABEL};
    use std::thread;
    use std::time::{Duration, Instant};

    fn shell(script: &str) -> ToolchainSpec {
        ToolchainSpec::new("sh").with_args(["-c", script, "toolchain"])
    }

    #[test]
    fn passes_geometry_and_hex_scale() {
        let spec = shell("echo \"DATA_SEQ: {$1 $2}\"; echo \"args $3\"");
        let request = RunRequest::new(8, 4, 0.75).expect("request");
        let run = run_toolchain(&spec, &request, &ResultTag::defaults()).expect("run");
        assert_eq!(run.captured.candidates.get(SEQUENTIAL_LABEL), Some(&[8, 4][..]));
        assert_eq!(run.exit_code, Some(0));
        assert!(!run.timed_out);
        assert_eq!(run.captured.stats.lines_seen, 2);
    }

    #[test]
    fn malformed_lines_do_not_abort() {
        let spec = shell("echo 'DATA_SIMD: {1 2 three}'; echo 'DATA_SIMD: {4 5}'");
        let request = RunRequest::new(4, 4, 1.0).expect("request");
        let run = run_toolchain(&spec, &request, &ResultTag::defaults()).expect("run");
        assert_eq!(run.captured.candidates.get(SIMD_LABEL), Some(&[4, 5][..]));
        assert_eq!(run.captured.stats.malformed_lines, 1);
    }

    #[test]
    fn non_zero_exit_is_terminal() {
        let spec = shell("echo 'DATA_SEQ: {1}'; echo boom >&2; exit 3");
        let request = RunRequest::new(4, 4, 1.0).expect("request");
        let err = run_toolchain(&spec, &request, &ResultTag::defaults()).expect_err("failure");
        match err {
            HarnessError::ToolchainFailed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_unavailable() {
        let spec = ToolchainSpec::new("/nonexistent/qsc-toolchain-binary");
        let request = RunRequest::new(4, 4, 1.0).expect("request");
        let err = run_toolchain(&spec, &request, &ResultTag::defaults()).expect_err("missing");
        assert_eq!(err.reason_code(), "harness_toolchain_unavailable");
    }

    #[test]
    fn timeout_surfaces_empty_candidates() {
        let spec = shell("echo 'DATA_SEQ: {1 2}'; exec sleep 5")
            .with_timeout(Duration::from_millis(300));
        let request = RunRequest::new(4, 4, 1.0).expect("request");
        let run = run_toolchain(&spec, &request, &ResultTag::defaults()).expect("run");
        assert!(run.timed_out);
        assert_eq!(run.captured.candidates.get(SEQUENTIAL_LABEL), Some(&[][..]));
        assert_eq!(run.captured.candidates.len(), 2);
    }

    #[test]
    fn undecodable_log_line_is_tolerated() {
        let spec = shell("printf 'Info: caf\\351 loaded\\n'; echo 'DATA_SEQ: {16 17 18 19}'");
        let request = RunRequest::new(4, 4, 1.0).expect("request");
        let run = run_toolchain(&spec, &request, &ResultTag::defaults()).expect("run");
        assert_eq!(
            run.captured.candidates.get(SEQUENTIAL_LABEL),
            Some(&[16, 17, 18, 19][..])
        );
        assert_eq!(run.captured.stats.lines_seen, 2);
        assert_eq!(run.captured.stats.malformed_lines, 0);
    }

    #[test]
    fn timeout_does_not_wait_on_inherited_pipes() {
        // The background sleep keeps stdout open after its parent is killed.
        let spec = shell("sleep 10 & echo 'DATA_SEQ: {1}'; sleep 10")
            .with_timeout(Duration::from_millis(300));
        let request = RunRequest::new(4, 4, 1.0).expect("request");
        let started = Instant::now();
        let run = run_toolchain(&spec, &request, &ResultTag::defaults()).expect("run");
        assert!(run.timed_out);
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[test]
    fn bounded_join_returns_finished_values() {
        let quick = thread::spawn(|| 7);
        assert_eq!(join_bounded(quick, Duration::from_secs(2)), Some(7));

        let slow = thread::spawn(|| thread::sleep(Duration::from_secs(3)));
        let started = Instant::now();
        assert_eq!(join_bounded(slow, Duration::from_millis(50)), None);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
