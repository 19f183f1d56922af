//! Snapshot layer file loading.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::location::SnapshotLocation;
use crate::resolve::resolve_snapshot_layer;
use crate::types::{ParentRef, RawSnapshotDoc, RawSnapshotLayer};

/// Loads and resolves a snapshot layer file.
///
/// `.toml` files are read as TOML and everything else as YAML. Relative
/// references inside the file resolve against the file's directory.
pub fn load_layer(path: &Path) -> Result<RawSnapshotLayer, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let base = path.parent();
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => load_layer_from_toml_str(&content, base),
        _ => load_layer_from_yaml_str(&content, base),
    }
}

/// Parses and resolves a snapshot layer from YAML text.
pub fn load_layer_from_yaml_str(
    content: &str,
    base: Option<&Path>,
) -> Result<RawSnapshotLayer, ConfigError> {
    let doc: RawSnapshotDoc =
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    resolve_snapshot_layer(doc, base)
}

/// Parses and resolves a snapshot layer from TOML text.
pub fn load_layer_from_toml_str(
    content: &str,
    base: Option<&Path>,
) -> Result<RawSnapshotLayer, ConfigError> {
    let doc: RawSnapshotDoc =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    resolve_snapshot_layer(doc, base)
}

/// Loads a layer and every local file layer beneath it.
///
/// The chain is returned child first. It stops at the first parent that is
/// not a local file (a curated snapshot, URL, or compiler), which the
/// caller resolves through its own collaborators.
pub fn load_layer_chain(path: &Path) -> Result<Vec<RawSnapshotLayer>, ConfigError> {
    let mut chain = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut next = Some(path.to_path_buf());

    while let Some(current) = next.take() {
        let key = current.canonicalize()?;
        if !seen.insert(key.clone()) {
            return Err(ConfigError::ParentCycle(key));
        }
        let layer = load_layer(&current)?;
        if let ParentRef::ByCuratedSnapshot(SnapshotLocation::File(parent)) = &layer.parent {
            next = Some(parent.clone());
        }
        debug!(layer = %layer.name, path = %current.display(), "loaded snapshot layer");
        chain.push(layer);
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerDescriptor;
    use crate::location::CuratedSnapshot;

    #[test]
    fn parse_yaml_layer() {
        let yaml = r#"
name: my-snapshot
resolver: lts-2.10
packages:
  - text-2.0.2
drop-packages:
  - old-time
flags:
  text:
    developer: true
hidden:
  text: false
ghc-options:
  text: -O2 -Wall
publish-time: 2024-03-01T12:00:00Z
"#;
        let layer = load_layer_from_yaml_str(yaml, None).unwrap();
        assert_eq!(layer.name, "my-snapshot");
        assert_eq!(
            layer.parent,
            ParentRef::ByCuratedSnapshot(SnapshotLocation::Curated(CuratedSnapshot::Lts {
                major: 2,
                minor: 10
            }))
        );
        assert_eq!(layer.overrides.packages.len(), 1);
        assert!(layer.overrides.drop_packages.contains("old-time"));
        assert!(layer.overrides.flags["text"]["developer"]);
        assert!(!layer.overrides.hidden["text"]);
        assert_eq!(layer.overrides.ghc_options["text"], ["-O2", "-Wall"]);
        assert!(layer.overrides.publish_time.is_some());
    }

    #[test]
    fn parse_toml_layer() {
        let toml = r#"
name = "toml-snapshot"
compiler = "ghc-9.4.7"
packages = ["aeson-2.2.1.0"]
"#;
        let layer = load_layer_from_toml_str(toml, None).unwrap();
        assert_eq!(layer.name, "toml-snapshot");
        assert_eq!(
            layer.parent,
            ParentRef::ByCompiler("ghc-9.4.7".parse::<CompilerDescriptor>().unwrap())
        );
    }

    #[test]
    fn toml_native_datetime_publish_time() {
        let toml = "name = \"t\"\nresolver = \"lts-2.10\"\npublish-time = 2024-03-01T12:00:00Z\n";
        let layer = load_layer_from_toml_str(toml, None).unwrap();
        let quoted = load_layer_from_toml_str(
            "name = \"t\"\nresolver = \"lts-2.10\"\npublish-time = \"2024-03-01T12:00:00Z\"\n",
            None,
        )
        .unwrap();
        assert!(layer.overrides.publish_time.is_some());
        assert_eq!(layer.overrides.publish_time, quoted.overrides.publish_time);

        let offset = "name = \"t\"\nresolver = \"lts-2.10\"\npublish-time = 2024-03-01T14:00:00+02:00\n";
        assert_eq!(
            load_layer_from_toml_str(offset, None).unwrap().overrides.publish_time,
            layer.overrides.publish_time
        );
    }

    #[test]
    fn toml_local_datetime_is_rejected() {
        let toml = "name = \"t\"\nresolver = \"lts-2.10\"\npublish-time = 2024-03-01T12:00:00\n";
        let err = load_layer_from_toml_str(toml, None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn yaml_with_both_synonyms_fails() {
        let yaml = "name: x\nresolver: lts-2.10\nsnapshot: lts-2.10\n";
        let err = load_layer_from_yaml_str(yaml, None).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousParent { .. }));
    }

    #[test]
    fn invalid_yaml_errors() {
        let err = load_layer_from_yaml_str("name: [unclosed", None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_layer_from_toml_str("this is not valid toml {{{}}}", None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn unknown_key_errors() {
        let err = load_layer_from_yaml_str("name: x\nresolvr: lts-2.10\n", None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_layer_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("snapshot.toml");
        std::fs::write(&toml_path, "name = \"t\"\nresolver = \"nightly-2024-01-15\"\n").unwrap();
        let yaml_path = dir.path().join("snapshot.yaml");
        std::fs::write(&yaml_path, "name: y\nresolver: nightly-2024-01-15\n").unwrap();

        assert_eq!(load_layer(&toml_path).unwrap().name, "t");
        assert_eq!(load_layer(&yaml_path).unwrap().name, "y");
    }

    #[test]
    fn io_error_from_missing_file() {
        let err = load_layer(Path::new("/nonexistent/dir/snapshot.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn chain_follows_file_parents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.yaml"), "name: base\nresolver: lts-22.7\n").unwrap();
        std::fs::write(dir.path().join("mid.yaml"), "name: mid\nresolver: base.yaml\n").unwrap();
        std::fs::write(dir.path().join("top.yaml"), "name: top\nsnapshot: mid.yaml\n").unwrap();

        let chain = load_layer_chain(&dir.path().join("top.yaml")).unwrap();
        let names: Vec<&str> = chain.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["top", "mid", "base"]);
        assert_eq!(
            chain[2].parent,
            ParentRef::ByCuratedSnapshot(SnapshotLocation::Curated(CuratedSnapshot::Lts {
                major: 22,
                minor: 7
            }))
        );
    }

    #[test]
    fn chain_detects_cycles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "name: a\nresolver: b.yaml\n").unwrap();
        std::fs::write(dir.path().join("b.yaml"), "name: b\nresolver: a.yaml\n").unwrap();

        let err = load_layer_chain(&dir.path().join("a.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ParentCycle(_)));
    }
}
