//! Snapshot location naming and parsing.

use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const LTS_PREFIX: &str = "lts-";
const NIGHTLY_PREFIX: &str = "nightly-";

/// A published, curated snapshot from one of the two snapshot families.
///
/// Names are a pure function of the fields: `lts-{major}.{minor}` and
/// `nightly-{YYYY-MM-DD}`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum CuratedSnapshot {
    /// A numbered long-term-support snapshot.
    Lts {
        /// Major series number.
        major: u32,
        /// Minor release within the series.
        minor: u32,
    },
    /// A dated nightly snapshot.
    Nightly(NaiveDate),
}

impl fmt::Display for CuratedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CuratedSnapshot::Lts { major, minor } => write!(f, "{LTS_PREFIX}{major}.{minor}"),
            CuratedSnapshot::Nightly(date) => {
                write!(f, "{NIGHTLY_PREFIX}{}", date.format("%Y-%m-%d"))
            }
        }
    }
}

/// Error type for parsing snapshot names and locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLocationError {
    /// The input string that failed to parse.
    pub input: String,
    /// Why the input was rejected.
    pub reason: String,
}

impl fmt::Display for ParseLocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid snapshot location '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ParseLocationError {}

impl FromStr for CuratedSnapshot {
    type Err = ParseLocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| ParseLocationError {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        if s == "lts" || s == "nightly" {
            return Err(err(
                "refers to the latest snapshot, which requires a snapshot index lookup",
            ));
        }
        if let Some(rest) = s.strip_prefix(LTS_PREFIX) {
            let Some((major, minor)) = rest.split_once('.') else {
                if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(err(
                        "refers to the latest minor release, which requires a snapshot index lookup",
                    ));
                }
                return Err(err("expected 'lts-<major>.<minor>'"));
            };
            let number = |text: &str| {
                if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(err("expected 'lts-<major>.<minor>'"));
                }
                text.parse::<u32>().map_err(|_| err("number out of range"))
            };
            return Ok(CuratedSnapshot::Lts {
                major: number(major)?,
                minor: number(minor)?,
            });
        }
        if let Some(rest) = s.strip_prefix(NIGHTLY_PREFIX) {
            let date = NaiveDate::parse_from_str(rest, "%Y-%m-%d")
                .map_err(|_| err("expected 'nightly-<YYYY-MM-DD>'"))?;
            return Ok(CuratedSnapshot::Nightly(date));
        }
        Err(err("expected an 'lts-' or 'nightly-' snapshot name"))
    }
}

/// Where a parent snapshot comes from.
///
/// Curated snapshots are named; URLs are fetched by the network
/// collaborator; files are read from disk and may themselves be layers.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum SnapshotLocation {
    /// A curated LTS or nightly snapshot.
    Curated(CuratedSnapshot),
    /// A snapshot file published at a URL.
    Url(String),
    /// A snapshot file on the local filesystem.
    File(PathBuf),
}

impl fmt::Display for SnapshotLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotLocation::Curated(c) => write!(f, "{c}"),
            SnapshotLocation::Url(url) => f.write_str(url),
            SnapshotLocation::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<CuratedSnapshot> for SnapshotLocation {
    fn from(c: CuratedSnapshot) -> Self {
        SnapshotLocation::Curated(c)
    }
}

/// Parses the value of a `resolver` or `snapshot` key.
///
/// URLs are recognized by scheme, files by a `.yaml`/`.yml` extension or a
/// path separator. Relative files are resolved against `base` when given.
/// Everything else must be a curated snapshot name.
pub fn parse_location(text: &str, base: Option<&Path>) -> Result<SnapshotLocation, ParseLocationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseLocationError {
            input: String::new(),
            reason: "snapshot location is empty".to_string(),
        });
    }

    if text.starts_with("http://") || text.starts_with("https://") {
        return Ok(SnapshotLocation::Url(text.to_string()));
    }

    if text.ends_with(".yaml") || text.ends_with(".yml") || text.contains('/') {
        let path = Path::new(text);
        let resolved = match base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        return Ok(SnapshotLocation::File(resolved));
    }

    text.parse::<CuratedSnapshot>().map(SnapshotLocation::Curated)
}
