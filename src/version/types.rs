//! Common version types shared by providers, the evaluator and the runner

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// A release version made of non-negative integer segments (major, minor, patch, ...)
///
/// Ordering is lexicographic by segment. Missing trailing segments compare as
/// zero, so `1.0` and `1.0.0` are equal.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "String")]
pub struct Version {
    segments: Vec<u64>,
}

impl Version {
    pub fn new(segments: Vec<u64>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Returns the segment at `index`, or 0 when the version is shorter
    pub fn segment(&self, index: usize) -> u64 {
        self.segments.get(index).copied().unwrap_or(0)
    }

    pub fn major(&self) -> u64 {
        self.segment(0)
    }

    pub fn minor(&self) -> u64 {
        self.segment(1)
    }

    pub fn patch(&self) -> u64 {
        self.segment(2)
    }

    fn significant_len(&self) -> usize {
        self.segments
            .iter()
            .rposition(|s| *s != 0)
            .map_or(0, |i| i + 1)
    }
}

/// Error returned when a string is not a purely numeric dotted version
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid version: {0}")]
pub struct ParseVersionError(pub String);

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(ParseVersionError(s.to_string()));
        }

        let segments = trimmed
            .split('.')
            .map(numeric_segment)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ParseVersionError(s.to_string()))?;

        Ok(Self { segments })
    }
}

impl Version {
    /// Parses the numeric release part of `s`, dropping any pre-release tail
    ///
    /// `8.0.0.beta1` yields `8.0.0`. Returns `None` when `s` has no leading
    /// numeric segment.
    pub fn release_prefix(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let segments: Vec<u64> = trimmed
            .split('.')
            .map_while(numeric_segment)
            .collect();

        (!segments.is_empty()).then_some(Self { segments })
    }
}

/// Digits only; `u64::from_str` alone would also take a leading `+`
fn numeric_segment(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| self.segment(i).cmp(&other.segment(i)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Consistent with Eq: trailing zeros do not participate
        self.segments[..self.significant_len()].hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Deduplicated candidate versions, kept sorted from newest to oldest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSet {
    versions: Vec<Version>,
}

impl VersionSet {
    pub fn new(versions: impl IntoIterator<Item = Version>) -> Self {
        let mut versions: Vec<Version> = versions.into_iter().collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions.dedup();
        Self { versions }
    }

    /// Parses raw provider strings, skipping anything that is not a plain numeric version
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(raw.into_iter().filter_map(|v| {
            v.as_ref()
                .parse::<Version>()
                .inspect_err(|e| tracing::debug!("Skipping candidate: {}", e))
                .ok()
        }))
    }

    /// Versions from newest to oldest
    pub fn descending(&self) -> &[Version] {
        &self.versions
    }

    pub fn max(&self) -> Option<&Version> {
        self.versions.first()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Zero-based recency rank of `version`, if it is one of the candidates
    pub fn rank_of(&self, version: &Version) -> Option<usize> {
        self.versions.iter().position(|v| v == version)
    }
}
