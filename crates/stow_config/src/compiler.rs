//! Compiler versions and toolchain descriptors.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A dotted version number such as `8.0.1`.
///
/// Always has at least one component. Ordering is lexicographic by
/// component, so `8.10` sorts after `8.2`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Version(Vec<u64>);

impl Version {
    /// Creates a version from its components.
    ///
    /// Returns `None` if `components` is empty.
    pub fn new(components: Vec<u64>) -> Option<Self> {
        if components.is_empty() {
            None
        } else {
            Some(Self(components))
        }
    }

    /// Returns the version components.
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{c}")?;
            first = false;
        }
        Ok(())
    }
}

/// Error type for parsing version strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError {
    /// The input string that failed to parse.
    pub input: String,
    /// Why the input was rejected.
    pub reason: &'static str,
}

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ParseVersionError {}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseVersionError {
            input: s.to_string(),
            reason,
        };
        let mut components = Vec::new();
        for part in s.split('.') {
            if part.is_empty() {
                return Err(err("empty component"));
            }
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err("components must be decimal digits"));
            }
            if part.len() > 1 && part.starts_with('0') {
                return Err(err("leading zero in component"));
            }
            let n: u64 = part.parse().map_err(|_| err("component out of range"))?;
            components.push(n);
        }
        // `split` always yields at least one part, so `components` is non-empty here.
        Ok(Self(components))
    }
}

/// Prefix of a plain compiler descriptor.
const GHC_PREFIX: &str = "ghc-";
/// Prefix of a cross-compiler descriptor.
const GHCJS_PREFIX: &str = "ghcjs-";
/// Separator between the cross and host versions of a cross-compiler.
const DUAL_SEPARATOR: &str = "_ghc-";

/// The toolchain a snapshot is built with.
///
/// Renders as `ghc-{version}` or `ghcjs-{ghcjs}_ghc-{ghc}`; parsing is the
/// exact inverse of rendering.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum CompilerDescriptor {
    /// A native compiler at a single version.
    Single(Version),
    /// A cross-compiler paired with the host compiler it was booted from.
    Dual {
        /// Version of the cross-compiler.
        ghcjs: Version,
        /// Version of the host compiler.
        ghc: Version,
    },
}

impl CompilerDescriptor {
    /// Returns the version of the host compiler.
    pub fn ghc_version(&self) -> &Version {
        match self {
            CompilerDescriptor::Single(v) => v,
            CompilerDescriptor::Dual { ghc, .. } => ghc,
        }
    }

    /// Returns `true` for cross-compiling toolchains.
    pub fn is_cross(&self) -> bool {
        matches!(self, CompilerDescriptor::Dual { .. })
    }
}

impl fmt::Display for CompilerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilerDescriptor::Single(v) => write!(f, "{GHC_PREFIX}{v}"),
            CompilerDescriptor::Dual { ghcjs, ghc } => {
                write!(f, "{GHCJS_PREFIX}{ghcjs}{DUAL_SEPARATOR}{ghc}")
            }
        }
    }
}

/// Error type for parsing compiler descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCompilerError {
    /// The input string that failed to parse.
    pub input: String,
    /// Why the input was rejected.
    pub reason: String,
}

impl fmt::Display for ParseCompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid compiler '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ParseCompilerError {}

impl FromStr for CompilerDescriptor {
    type Err = ParseCompilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: String| ParseCompilerError {
            input: s.to_string(),
            reason,
        };
        let version = |text: &str| text.parse::<Version>().map_err(|e| err(e.to_string()));

        if let Some(rest) = s.strip_prefix(GHCJS_PREFIX) {
            let (ghcjs, ghc) = rest.split_once(DUAL_SEPARATOR).ok_or_else(|| {
                err(format!(
                    "expected '{GHCJS_PREFIX}<version>{DUAL_SEPARATOR}<version>'"
                ))
            })?;
            return Ok(CompilerDescriptor::Dual {
                ghcjs: version(ghcjs)?,
                ghc: version(ghc)?,
            });
        }
        if let Some(rest) = s.strip_prefix(GHC_PREFIX) {
            return Ok(CompilerDescriptor::Single(version(rest)?));
        }
        Err(err(format!(
            "expected a '{GHC_PREFIX}' or '{GHCJS_PREFIX}' prefix"
        )))
    }
}

impl Serialize for CompilerDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CompilerDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
