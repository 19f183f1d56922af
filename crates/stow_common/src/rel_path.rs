//! Validated relative paths used as tree keys.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The canonical component separator.
pub const SEPARATOR: char = '/';

/// A relative path that cannot escape the directory it is resolved against.
///
/// Always holds at least one component. No component is empty, made only of
/// dots (`..`, `...`), or contains a backslash, NUL, or line break. A `.`
/// component is dropped during parsing since it names the current directory.
///
/// Ordering is component-wise, which is the canonical order of tree entries.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SafeRelPath {
    components: Vec<String>,
}

impl SafeRelPath {
    /// Parses a `/`-separated relative path.
    ///
    /// Returns `None` for absolute paths, empty segments (including a
    /// trailing separator), parent-directory segments, or forbidden
    /// characters.
    pub fn parse(text: &str) -> Option<Self> {
        Self::from_components(text.split(SEPARATOR))
    }

    /// Builds a path from individual components, validating each one.
    pub fn from_components<I, S>(parts: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut components = Vec::new();
        for part in parts {
            let part = part.as_ref();
            if part == "." {
                continue;
            }
            if !is_valid_component(part) {
                return None;
            }
            components.push(part.to_string());
        }
        if components.is_empty() {
            return None;
        }
        Some(Self { components })
    }

    /// Renders the path with the canonical separator.
    pub fn render(&self) -> String {
        self.components.join("/")
    }

    /// Returns the path components in order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Returns the last component.
    pub fn file_name(&self) -> &str {
        // Construction guarantees at least one component.
        self.components.last().map(String::as_str).unwrap_or_default()
    }

    /// Appends a relative path, returning `None` if `rest` is not safe.
    pub fn join(&self, rest: &str) -> Option<Self> {
        let tail = Self::parse(rest)?;
        let mut components = self.components.clone();
        components.extend(tail.components);
        Some(Self { components })
    }
}

fn is_valid_component(part: &str) -> bool {
    !part.is_empty()
        && !part.chars().all(|c| c == '.')
        && !part
            .chars()
            .any(|c| matches!(c, '\\' | '\0' | '\n' | '\r' | SEPARATOR))
}

impl fmt::Display for SafeRelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for SafeRelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SafeRelPath({:?})", self.render())
    }
}

impl Serialize for SafeRelPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.render())
    }
}

impl<'de> Deserialize<'de> for SafeRelPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        SafeRelPath::parse(&text)
            .ok_or_else(|| de::Error::custom(format!("unsafe relative path '{text}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let p = SafeRelPath::parse("src/Data/Map.hs").unwrap();
        assert_eq!(p.components(), ["src", "Data", "Map.hs"]);
        assert_eq!(p.render(), "src/Data/Map.hs");
        assert_eq!(p.file_name(), "Map.hs");
    }

    #[test]
    fn current_dir_segments_are_dropped() {
        let p = SafeRelPath::parse("./src/./lib.rs").unwrap();
        assert_eq!(p.render(), "src/lib.rs");
    }

    #[test]
    fn only_current_dir_is_rejected() {
        assert!(SafeRelPath::parse(".").is_none());
        assert!(SafeRelPath::parse("./.").is_none());
    }

    #[test]
    fn rejects_parent_traversal() {
        assert!(SafeRelPath::parse("..").is_none());
        assert!(SafeRelPath::parse("a/../b").is_none());
        assert!(SafeRelPath::parse("a/...").is_none());
    }

    #[test]
    fn rejects_absolute_and_empty_segments() {
        assert!(SafeRelPath::parse("").is_none());
        assert!(SafeRelPath::parse("/etc/passwd").is_none());
        assert!(SafeRelPath::parse("a//b").is_none());
        assert!(SafeRelPath::parse("a/").is_none());
    }

    #[test]
    fn rejects_forbidden_characters() {
        assert!(SafeRelPath::parse("a\\b").is_none());
        assert!(SafeRelPath::parse("a\0b").is_none());
        assert!(SafeRelPath::parse("a\nb").is_none());
    }

    #[test]
    fn dotfiles_are_allowed() {
        let p = SafeRelPath::parse(".github/workflows/ci.yaml").unwrap();
        assert_eq!(p.components()[0], ".github");
    }

    #[test]
    fn from_components_rejects_embedded_separator() {
        assert!(SafeRelPath::from_components(["a/b"]).is_none());
        assert!(SafeRelPath::from_components(["a", "b"]).is_some());
    }

    #[test]
    fn join_validates_tail() {
        let base = SafeRelPath::parse("src").unwrap();
        assert_eq!(base.join("lib.rs").unwrap().render(), "src/lib.rs");
        assert!(base.join("../escape").is_none());
    }

    #[test]
    fn ordering_is_component_wise() {
        let a = SafeRelPath::parse("a/b").unwrap();
        let b = SafeRelPath::parse("a-c").unwrap();
        assert!(a < b);
    }

    #[test]
    fn serde_rejects_unsafe_path() {
        let ok: SafeRelPath = serde_json::from_str("\"x/y\"").unwrap();
        assert_eq!(ok.render(), "x/y");
        assert!(serde_json::from_str::<SafeRelPath>("\"../y\"").is_err());
    }
}
