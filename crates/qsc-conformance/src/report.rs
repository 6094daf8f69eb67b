//! Golden-vs-candidate comparison and the console report.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Leading indices that are always shown, matching or not.
pub const DETAIL_HEAD_ROWS: usize = 10;
pub const SEQUENTIAL_LABEL: &str = "sequential";
pub const SIMD_LABEL: &str = "simd";

const INDEX_WIDTH: usize = 6;
const VALUE_WIDTH: usize = 10;

/// Candidate sequences keyed by label, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet {
    entries: Vec<(String, Vec<i64>)>,
}

impl CandidateSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sequence; an existing label keeps its position and is replaced.
    pub fn insert(&mut self, label: impl Into<String>, values: Vec<i64>) {
        let label = label.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, slot)) => *slot = values,
            None => self.entries.push((label, values)),
        }
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<&[i64]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, values)| values.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[i64])> {
        self.entries
            .iter()
            .map(|(label, values)| (label.as_str(), values.as_slice()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<L: Into<String>> FromIterator<(L, Vec<i64>)> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = (L, Vec<i64>)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (label, values) in iter {
            set.insert(label, values);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub index: usize,
    pub golden: i64,
    /// One slot per candidate; `None` past the end of a short sequence.
    pub values: Vec<Option<i64>>,
    pub matches: Vec<bool>,
}

impl ReportRow {
    #[must_use]
    pub fn has_mismatch(&self) -> bool {
        self.matches.contains(&false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub label: String,
    pub supplied_len: usize,
    pub compared_len: usize,
    /// Values past the golden length, dropped before comparison.
    pub discarded_tail: usize,
    pub mismatches: usize,
    pub first_mismatch: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    Failure,
    NoCandidates,
}

impl Verdict {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::NoCandidates => "no_candidates",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub golden_len: usize,
    pub candidates: Vec<CandidateSummary>,
    pub rows: Vec<ReportRow>,
    /// Set when every index past the head matched and was left out.
    pub elided: bool,
    pub verdict: Verdict,
}

impl ValidationReport {
    #[must_use]
    pub fn total_mismatches(&self) -> usize {
        self.candidates.iter().map(|c| c.mismatches).sum()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.verdict == Verdict::Success
    }

    #[must_use]
    pub fn mismatches_for(&self, label: &str) -> Option<usize> {
        self.candidates
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.mismatches)
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== VALIDATION REPORT ===");

        let mut header = format!("{:<INDEX_WIDTH$} {:<VALUE_WIDTH$}", "IDX", "GOLDEN");
        for candidate in &self.candidates {
            let _ = write!(
                header,
                " {:<VALUE_WIDTH$}",
                candidate.label.to_uppercase()
            );
        }
        header.push_str(" STATUS");
        let rule = "-".repeat(header.chars().count());
        let _ = writeln!(out, "{header}");
        let _ = writeln!(out, "{rule}");

        for row in &self.rows {
            let _ = write!(
                out,
                "{:<INDEX_WIDTH$} {:<VALUE_WIDTH$}",
                row.index, row.golden
            );
            for value in &row.values {
                let cell = value.map_or_else(|| "-".to_string(), |v| v.to_string());
                let _ = write!(out, " {cell:<VALUE_WIDTH$}");
            }
            let status: Vec<&str> = row
                .matches
                .iter()
                .map(|&ok| if ok { "✓" } else { "✗" })
                .collect();
            let _ = writeln!(out, " {}", status.join(" "));
        }

        if self.elided {
            let hidden = self.golden_len.saturating_sub(DETAIL_HEAD_ROWS);
            let _ = writeln!(out, "... ({hidden} remaining entries correct) ...");
        }
        let _ = writeln!(out, "{rule}");

        for candidate in &self.candidates {
            let first = candidate
                .first_mismatch
                .map_or_else(|| "none".to_string(), |idx| idx.to_string());
            let _ = writeln!(
                out,
                "  {}: supplied={} compared={} discarded_tail={} mismatches={} first_mismatch={first}",
                candidate.label,
                candidate.supplied_len,
                candidate.compared_len,
                candidate.discarded_tail,
                candidate.mismatches,
            );
        }

        match self.verdict {
            Verdict::Success => {
                let _ = writeln!(
                    out,
                    "TOTAL SUCCESS: {} candidate(s) match the golden model bit for bit ({} values)",
                    self.candidates.len(),
                    self.golden_len
                );
            }
            Verdict::Failure => {
                let counts: Vec<String> = self
                    .candidates
                    .iter()
                    .map(|c| format!("{}={}", c.label, c.mismatches))
                    .collect();
                let _ = writeln!(
                    out,
                    "FAILURE: {} mismatches ({})",
                    self.total_mismatches(),
                    counts.join(", ")
                );
            }
            Verdict::NoCandidates => {
                let _ = writeln!(out, "FAILURE: no candidate sequences supplied");
            }
        }

        out
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Compares every candidate against `golden`, index for index.
///
/// Candidates are cut to the golden length first; a missing value past the
/// end of a short candidate counts as a mismatch.
#[must_use]
pub fn compare(golden: &[i64], candidates: &CandidateSet) -> ValidationReport {
    let truncated: Vec<(&str, &[i64])> = candidates
        .iter()
        .map(|(label, values)| (label, &values[..values.len().min(golden.len())]))
        .collect();

    let mut mismatches = vec![0usize; truncated.len()];
    let mut first_mismatch: Vec<Option<usize>> = vec![None; truncated.len()];
    let mut rows = Vec::new();

    for (index, &expected) in golden.iter().enumerate() {
        let values: Vec<Option<i64>> = truncated
            .iter()
            .map(|(_, seq)| seq.get(index).copied())
            .collect();
        let matches: Vec<bool> = values.iter().map(|&v| v == Some(expected)).collect();

        for (slot, &ok) in matches.iter().enumerate() {
            if !ok {
                mismatches[slot] += 1;
                first_mismatch[slot].get_or_insert(index);
            }
        }

        let row = ReportRow {
            index,
            golden: expected,
            values,
            matches,
        };
        if index < DETAIL_HEAD_ROWS || row.has_mismatch() {
            rows.push(row);
        }
    }

    let summaries: Vec<CandidateSummary> = candidates
        .iter()
        .zip(&truncated)
        .enumerate()
        .map(|(slot, ((label, supplied), (_, compared)))| CandidateSummary {
            label: label.to_string(),
            supplied_len: supplied.len(),
            compared_len: compared.len(),
            discarded_tail: supplied.len() - compared.len(),
            mismatches: mismatches[slot],
            first_mismatch: first_mismatch[slot],
        })
        .collect();

    let total: usize = mismatches.iter().sum();
    let verdict = if summaries.is_empty() {
        Verdict::NoCandidates
    } else if total == 0 {
        Verdict::Success
    } else {
        Verdict::Failure
    };

    ValidationReport {
        golden_len: golden.len(),
        candidates: summaries,
        rows,
        elided: verdict == Verdict::Success && golden.len() > DETAIL_HEAD_ROWS,
        verdict,
    }
}
