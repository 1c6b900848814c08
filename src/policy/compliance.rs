//! Threshold comparison between an installed version and its candidates

use std::collections::BTreeSet;
use std::ops::Bound;

use crate::policy::failure::FailureContext;
use crate::policy::threshold::{SemverDistance, ThresholdSpec};
use crate::version::types::{Version, VersionSet};

/// Outcome of checking one threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub compliant: bool,
    /// Default failure message; empty when compliant
    pub message: String,
    pub context: FailureContext,
}

/// Version segment checked by a semver distance threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Major,
    Minor,
    Patch,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Major => "major",
            Segment::Minor => "minor",
            Segment::Patch => "patch",
        }
    }
}

/// Checks `installed` against `candidates` under `threshold`
///
/// An empty candidate set is always compliant: there is nothing to lag behind.
pub fn evaluate(
    dependency: &str,
    installed: &Version,
    candidates: &VersionSet,
    threshold: &ThresholdSpec,
) -> Evaluation {
    let mut context = FailureContext {
        version: installed.clone(),
        max: candidates.max().cloned(),
        boundary: None,
        versions_behind: candidates.rank_of(installed),
    };

    let Some(max) = candidates.max() else {
        return Evaluation {
            compliant: true,
            message: String::new(),
            context,
        };
    };

    let failure = match threshold {
        ThresholdSpec::Insync => check_insync(dependency, installed, max),
        ThresholdSpec::ReleasesBehind(n) => {
            let boundary = releases_boundary(candidates, *n);
            context.boundary = Some(boundary.clone());
            check_releases(dependency, installed, candidates, &boundary, *n)
        }
        ThresholdSpec::SemverDistance(distance) => {
            check_semver(dependency, installed, candidates, distance)
        }
    };

    Evaluation {
        compliant: failure.is_none(),
        message: failure.unwrap_or_default(),
        context,
    }
}

fn check_insync(dependency: &str, installed: &Version, max: &Version) -> Option<String> {
    if installed >= max {
        return None;
    }

    Some(format!(
        "[{dependency}] Enforcer expects the most recent version. Version {installed}. Most Recent version {max}"
    ))
}

/// The `n`-th most recent candidate (0-indexed), or the oldest when `n` runs past the end
fn releases_boundary(candidates: &VersionSet, n: u64) -> Version {
    let versions = candidates.descending();
    let index = usize::try_from(n)
        .unwrap_or(usize::MAX)
        .min(versions.len().saturating_sub(1));
    versions[index].clone()
}

fn check_releases(
    dependency: &str,
    installed: &Version,
    candidates: &VersionSet,
    boundary: &Version,
    n: u64,
) -> Option<String> {
    // Value comparison: an unlisted installed version may still pass
    if installed >= boundary {
        return None;
    }

    let position = match candidates.rank_of(installed) {
        Some(rank) => format!("Version [{installed}] is {rank} releases behind the most recent version."),
        None => format!("Version [{installed}] was not found in the provided list."),
    };

    Some(format!(
        "[{dependency}] Enforcer expects the version to be within the most recent {n} versions. {position}"
    ))
}

fn check_semver(
    dependency: &str,
    installed: &Version,
    candidates: &VersionSet,
    distance: &SemverDistance,
) -> Option<String> {
    let versions = candidates.descending();
    let checks = [
        (Segment::Major, distance.major),
        (Segment::Minor, distance.minor),
        (Segment::Patch, distance.patch),
    ];

    for (segment, threshold) in checks {
        let Some(threshold) = threshold else {
            continue;
        };

        let values = versions.iter().filter_map(|v| match segment {
            Segment::Major => Some(v.major()),
            Segment::Minor => (v.major() == installed.major()).then(|| v.minor()),
            Segment::Patch => (v.major() == installed.major() && v.minor() == installed.minor())
                .then(|| v.patch()),
        });
        let installed_value = match segment {
            Segment::Major => installed.major(),
            Segment::Minor => installed.minor(),
            Segment::Patch => installed.patch(),
        };

        let rank = segment_rank(values, installed_value);
        if u64::try_from(rank).unwrap_or(u64::MAX) > threshold {
            return Some(format!(
                "[{dependency}] Enforcer expects the version to be within {threshold} {} version(s) of the most recent version. Version is {installed}",
                segment.as_str()
            ));
        }
    }

    None
}

/// Zero-based rank of `installed` among the distinct `values`, newest first
///
/// Counts the distinct values greater than `installed`, so a value missing
/// from the list is ranked where it would sit if it were present.
fn segment_rank(values: impl Iterator<Item = u64>, installed: u64) -> usize {
    let distinct: BTreeSet<u64> = values.collect();
    distinct
        .range((Bound::Excluded(installed), Bound::Unbounded))
        .count()
}
