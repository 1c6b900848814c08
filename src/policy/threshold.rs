//! `version_enforce` parsing into a typed threshold

use serde_yaml::{Mapping, Value};

use crate::policy::error::FieldError;
use crate::policy::type_name;

const INSYNC: &str = "insync";
const RELEASES: &str = "releases";
const SEMVER: [&str; 3] = ["major", "minor", "patch"];

/// How far behind the newest release an installed version may be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdSpec {
    /// Must be the newest known version
    Insync,
    /// Must be at least the `n`-th most recent version (0-indexed)
    ReleasesBehind(u64),
    /// Per-segment rank allowance among same-prefix candidates
    SemverDistance(SemverDistance),
}

/// Allowed rank per version segment; at least one is set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SemverDistance {
    pub major: Option<u64>,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
}

impl ThresholdSpec {
    /// Parses a `version_enforce` value found at `path`
    pub fn parse(path: &str, value: Option<&Value>) -> Result<Self, Vec<FieldError>> {
        let Some(Value::Mapping(map)) = value else {
            return Err(vec![FieldError::new(
                path,
                format!(
                    "Must be a hash containing [{INSYNC}] or [{RELEASES}] or any of [{}]",
                    SEMVER.join(", ")
                ),
            )]);
        };

        let keys: Vec<String> = map.keys().map(key_name).collect();
        let has = |key: &str| keys.iter().any(|k| k == key);

        if has(INSYNC) {
            expect_only_keys(path, &keys, &[INSYNC], INSYNC)?;
            return match map.get(INSYNC) {
                Some(Value::Bool(true)) => Ok(ThresholdSpec::Insync),
                other => Err(vec![FieldError::new(
                    format!("{path}.{INSYNC}"),
                    format!(
                        "When key is present, value must be true. Received [{}]",
                        display_value(other)
                    ),
                )]),
            };
        }

        if has(RELEASES) {
            expect_only_keys(path, &keys, &[RELEASES], RELEASES)?;
            return parse_uint(path, RELEASES, map)
                .map(ThresholdSpec::ReleasesBehind)
                .map_err(|e| vec![e]);
        }

        if SEMVER.iter().any(|k| has(k)) {
            expect_only_keys(path, &keys, &SEMVER, "SemVer")?;

            let mut errors = Vec::new();
            let mut segment = |name: &str| {
                if !map.contains_key(name) {
                    return None;
                }
                parse_uint(path, name, map)
                    .inspect_err(|e| errors.push(e.clone()))
                    .ok()
            };
            let distance = SemverDistance {
                major: segment("major"),
                minor: segment("minor"),
                patch: segment("patch"),
            };

            return if errors.is_empty() {
                Ok(ThresholdSpec::SemverDistance(distance))
            } else {
                Err(errors)
            };
        }

        Err(vec![FieldError::new(
            path,
            format!(
                "Invalid config. Hash must contain [{INSYNC}] or [{RELEASES}] or any of [{}]",
                SEMVER.join(", ")
            ),
        )])
    }
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| type_name(other).to_string()),
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| type_name(other).to_string()),
    }
}

fn expect_only_keys(
    path: &str,
    keys: &[String],
    allowed: &[&str],
    family: &str,
) -> Result<(), Vec<FieldError>> {
    let disallowed: Vec<&str> = keys
        .iter()
        .map(String::as_str)
        .filter(|k| !allowed.contains(k))
        .collect();

    if disallowed.is_empty() {
        return Ok(());
    }

    Err(vec![FieldError::new(
        path,
        format!(
            "Unexpected keys present for `{family}`. Allowed keys [{}] but received [{}]. [{}] is not allowed",
            allowed.join(", "),
            keys.join(", "),
            disallowed.join(", ")
        ),
    )])
}

fn parse_uint(path: &str, key: &str, map: &Mapping) -> Result<u64, FieldError> {
    let value = map.get(key);
    if let Some(Value::Number(n)) = value {
        if let Some(n) = n.as_u64() {
            return Ok(n);
        }
        if n.is_i64() {
            return Err(FieldError::new(
                format!("{path}.{key}"),
                format!("Expected value to be a non-negative Integer. Received [{n}]"),
            ));
        }
    }

    Err(FieldError::new(
        format!("{path}.{key}"),
        format!(
            "Expected value to be an Integer. Received type {} [{}]",
            value.map_or("null", type_name),
            display_value(value)
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PATH: &str = "rails.rules[0].version_enforce";

    fn parse(s: &str) -> Result<ThresholdSpec, Vec<FieldError>> {
        let value: Value = serde_yaml::from_str(s).unwrap();
        ThresholdSpec::parse(PATH, Some(&value))
    }

    #[rstest]
    #[case("{insync: true}", ThresholdSpec::Insync)]
    #[case("{releases: 5}", ThresholdSpec::ReleasesBehind(5))]
    #[case("{major: 1}", ThresholdSpec::SemverDistance(SemverDistance { major: Some(1), minor: None, patch: None }))]
    #[case("{minor: 2, patch: 3}", ThresholdSpec::SemverDistance(SemverDistance { major: None, minor: Some(2), patch: Some(3) }))]
    #[case("{major: 0, minor: 0, patch: 0}", ThresholdSpec::SemverDistance(SemverDistance { major: Some(0), minor: Some(0), patch: Some(0) }))]
    fn parse_accepts_valid_thresholds(#[case] input: &str, #[case] expected: ThresholdSpec) {
        assert_eq!(parse(input), Ok(expected));
    }

    #[rstest]
    #[case("[]", PATH, "Must be a hash containing")]
    #[case("{invalid: key}", PATH, "Invalid config. Hash must contain")]
    #[case("{insync: true, invalid_key: true}", PATH, "Unexpected keys present for `insync`")]
    #[case("{insync: true, major: 0}", PATH, "Unexpected keys present for `insync`")]
    #[case("{insync: false}", "rails.rules[0].version_enforce.insync", "When key is present, value must be true")]
    #[case("{releases: 5, major: 0}", PATH, "Unexpected keys present for `releases`")]
    #[case("{releases: '1'}", "rails.rules[0].version_enforce.releases", "Expected value to be an Integer")]
    #[case("{releases: -1}", "rails.rules[0].version_enforce.releases", "non-negative Integer")]
    #[case("{major: 0, security: 2}", PATH, "Unexpected keys present for `SemVer`")]
    #[case("{patch: s}", "rails.rules[0].version_enforce.patch", "Expected value to be an Integer")]
    fn parse_rejects_invalid_thresholds(
        #[case] input: &str,
        #[case] path: &str,
        #[case] reason: &str,
    ) {
        let errors = parse(input).unwrap_err();

        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].path, path);
        assert!(errors[0].reason.contains(reason), "{}", errors[0]);
    }

    #[test]
    fn parse_reports_every_invalid_semver_segment_in_order() {
        let errors = parse("{major: s, minor: t, patch: u}").unwrap_err();

        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "rails.rules[0].version_enforce.major",
                "rails.rules[0].version_enforce.minor",
                "rails.rules[0].version_enforce.patch",
            ]
        );
    }

    #[test]
    fn parse_rejects_missing_version_enforce() {
        let errors = ThresholdSpec::parse(PATH, None).unwrap_err();

        assert_eq!(errors[0].path, PATH);
    }
}
