//! Gemfile.lock parser
//!
//! Reads the resolved gem versions from the `specs:` blocks of a Bundler lockfile.
//!
//! Format example:
//! ```text
//! GEM
//!   remote: https://rubygems.org/
//!   specs:
//!     actionpack (7.1.3)
//!       rack (>= 2.2.4)
//!     nokogiri (1.16.0-x86_64-linux)
//!
//! PLATFORMS
//!   x86_64-linux
//! ```
//!
//! Only four-space entries are resolved gems; six-space lines are their
//! requirements and are ignored.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::parser::traits::{InstalledVersionLookup, ParseError};
use crate::version::types::Version;

/// Installed versions read from a Gemfile.lock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GemfileLock {
    versions: HashMap<String, Version>,
}

impl GemfileLock {
    /// Parses lockfile content
    pub fn parse(content: &str) -> Result<Self, ParseError> {
        // Match: `    name (version[-platform])`
        let spec_re = Regex::new(r"^ {4}([^\s(]+) \(([^)\s]+)\)$").unwrap();

        let mut versions = HashMap::new();
        let mut saw_specs = false;
        let mut in_specs = false;

        for line in content.lines() {
            if line.trim_end() == "  specs:" {
                saw_specs = true;
                in_specs = true;
                continue;
            }

            // A new top-level section or a blank line ends the block
            if line.trim().is_empty() || !line.starts_with("  ") {
                in_specs = false;
                continue;
            }

            if !in_specs {
                continue;
            }

            let Some(caps) = spec_re.captures(line) else {
                continue;
            };
            let name = &caps[1];
            let raw = &caps[2];
            let without_platform = raw.split_once('-').map_or(raw, |(v, _)| v);

            // A pre-release is still installed; enforce against its release part
            let version = without_platform.parse::<Version>().ok().or_else(|| {
                let release = Version::release_prefix(without_platform);
                if let Some(release) = &release {
                    debug!("Treating locked {} {} as {}", name, without_platform, release);
                }
                release
            });

            match version {
                Some(version) => {
                    versions.entry(name.to_string()).or_insert(version);
                }
                None => warn!("Ignoring unreadable locked version of {}: {}", name, raw),
            }
        }

        if !saw_specs && !content.trim().is_empty() {
            return Err(ParseError::InvalidSyntax(
                "no `specs:` section found".to_string(),
            ));
        }

        debug!("Parsed {} locked gems", versions.len());
        Ok(Self { versions })
    }

    /// Reads and parses the lockfile at `path`
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl InstalledVersionLookup for GemfileLock {
    fn installed_version(&self, name: &str) -> Option<Version> {
        self.versions.get(name).cloned()
    }
}
