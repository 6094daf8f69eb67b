//! Extraction of tagged result lines from a streamed toolchain log.
//!
//! The toolchain prints its results inline with ordinary log output, e.g.
//! `DATA_SEQ: {16 17 18 19}`. Each recognised line is parsed as a whole and
//! appended to the buffer owned for its label; a line that does not parse is
//! skipped without touching the buffer.

use crate::report::{CandidateSet, SEQUENTIAL_LABEL, SIMD_LABEL};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead};
use thiserror::Error;
use tracing::{debug, warn};

pub const SEQUENTIAL_MARKER: &str = "DATA_SEQ:";
pub const SIMD_MARKER: &str = "DATA_SIMD:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultTag {
    pub marker: String,
    pub label: String,
}

impl ResultTag {
    #[must_use]
    pub fn new(marker: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            label: label.into(),
        }
    }

    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(SEQUENTIAL_MARKER, SEQUENTIAL_LABEL),
            Self::new(SIMD_MARKER, SIMD_LABEL),
        ]
    }

    /// `marker=label`
    pub fn parse_binding(raw: &str) -> Option<Self> {
        let (marker, label) = raw.split_once('=')?;
        let (marker, label) = (marker.trim(), label.trim());
        if marker.is_empty() || label.is_empty() {
            return None;
        }
        Some(Self::new(marker, label))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogParseError {
    #[error("token {position} is not an integer: '{token}'")]
    InvalidInteger { position: usize, token: String },
}

/// Parses the text after a marker. Braces are list delimiters (Tcl syntax).
pub fn parse_tagged_payload(payload: &str) -> Result<Vec<i64>, LogParseError> {
    payload
        .split(|c: char| c.is_whitespace() || c == '{' || c == '}')
        .filter(|token| !token.is_empty())
        .enumerate()
        .map(|(position, token)| {
            token
                .parse::<i64>()
                .map_err(|_| LogParseError::InvalidInteger {
                    position,
                    token: token.to_string(),
                })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    pub lines_seen: usize,
    pub tagged_lines: usize,
    pub malformed_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Untagged,
    Captured { label: String, values: usize },
    Skipped { label: String, error: LogParseError },
}

/// Completed per-label buffers; only produced once the stream has ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedCandidates {
    pub candidates: CandidateSet,
    pub stats: StreamStats,
}

impl CapturedCandidates {
    /// Every label present with an empty sequence, as for a run that never
    /// delivered data.
    #[must_use]
    pub fn unavailable(tags: &[ResultTag], stats: StreamStats) -> Self {
        Self {
            candidates: tags
                .iter()
                .map(|tag| (tag.label.clone(), Vec::new()))
                .collect(),
            stats,
        }
    }
}

#[derive(Debug)]
pub struct TaggedResultCollector {
    tags: Vec<ResultTag>,
    buffers: Vec<Vec<i64>>,
    stats: StreamStats,
}

impl TaggedResultCollector {
    #[must_use]
    pub fn new(tags: Vec<ResultTag>) -> Self {
        let buffers = vec![Vec::new(); tags.len()];
        Self {
            tags,
            buffers,
            stats: StreamStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn observe(&mut self, line: &str) -> Observation {
        self.stats.lines_seen += 1;

        let Some((slot, payload)) = self.tags.iter().enumerate().find_map(|(slot, tag)| {
            line.find(tag.marker.as_str())
                .map(|at| (slot, &line[at + tag.marker.len()..]))
        }) else {
            return Observation::Untagged;
        };

        self.stats.tagged_lines += 1;
        let label = self.tags[slot].label.clone();
        match parse_tagged_payload(payload) {
            Ok(values) => {
                let count = values.len();
                self.buffers[slot].extend(values);
                debug!(%label, count, line = self.stats.lines_seen, "captured tagged result line");
                Observation::Captured {
                    label,
                    values: count,
                }
            }
            Err(error) => {
                self.stats.malformed_lines += 1;
                warn!(%label, line = self.stats.lines_seen, %error, "skipping malformed tagged result line");
                Observation::Skipped { label, error }
            }
        }
    }

    #[must_use]
    pub fn finish(self) -> CapturedCandidates {
        let candidates = self
            .tags
            .into_iter()
            .zip(self.buffers)
            .map(|(tag, values)| (tag.label, values))
            .collect();
        CapturedCandidates {
            candidates,
            stats: self.stats,
        }
    }
}

/// Reads one `\n`-terminated line, replacing undecodable bytes with U+FFFD.
/// `Ok(None)` at end of stream.
pub fn read_lossy_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Runs a complete saved log through a fresh collector.
pub fn collect_from_reader<R: BufRead>(
    mut reader: R,
    tags: &[ResultTag],
) -> io::Result<CapturedCandidates> {
    let mut collector = TaggedResultCollector::new(tags.to_vec());
    let mut buf = Vec::new();
    while let Some(line) = read_lossy_line(&mut reader, &mut buf)? {
        collector.observe(line.trim());
    }
    Ok(collector.finish())
}
