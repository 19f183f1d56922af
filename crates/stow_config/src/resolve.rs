//! Snapshot layer resolution: choosing the parent and resolving overrides.

use std::path::Path;

use tracing::debug;

use crate::compiler::CompilerDescriptor;
use crate::error::ConfigError;
use crate::location::parse_location;
use crate::types::{LocalOverrides, PackageSource, ParentRef, RawSnapshotDoc, RawSnapshotLayer};

/// Turns a raw snapshot document into a validated layer.
///
/// Exactly one of `resolver`, `snapshot`, or `compiler` must be present.
/// `resolver` and `snapshot` are synonyms with no precedence between them,
/// so supplying both is an error, as is combining either with `compiler`.
/// Relative file references (parent locations and local packages) are
/// resolved against `base` when one is given.
pub fn resolve_snapshot_layer(
    doc: RawSnapshotDoc,
    base: Option<&Path>,
) -> Result<RawSnapshotLayer, ConfigError> {
    let name = match doc.name {
        Some(name) if !name.trim().is_empty() => name,
        _ => return Err(ConfigError::MissingField("name".to_string())),
    };

    let parent = match (doc.resolver, doc.snapshot, doc.compiler) {
        (Some(location), None, None) | (None, Some(location), None) => {
            ParentRef::ByCuratedSnapshot(parse_location(&location, base)?)
        }
        (None, None, Some(compiler)) => {
            ParentRef::ByCompiler(compiler.parse::<CompilerDescriptor>()?)
        }
        (None, None, None) => return Err(ConfigError::MissingParent),
        (resolver, snapshot, compiler) => {
            let keys = [
                ("resolver", resolver.is_some()),
                ("snapshot", snapshot.is_some()),
                ("compiler", compiler.is_some()),
            ]
            .into_iter()
            .filter_map(|(key, present)| present.then_some(key))
            .collect();
            return Err(ConfigError::AmbiguousParent { keys });
        }
    };

    let overrides = LocalOverrides {
        packages: doc
            .packages
            .iter()
            .map(|p| classify_package(p, base))
            .collect(),
        drop_packages: doc.drop_packages,
        flags: doc.flags,
        hidden: doc.hidden,
        ghc_options: doc
            .ghc_options
            .into_iter()
            .map(|(pkg, opts)| (pkg, opts.0))
            .collect(),
        publish_time: doc.publish_time,
    };

    debug!(layer = %name, parent = ?parent, packages = overrides.packages.len(), "resolved snapshot layer");
    Ok(RawSnapshotLayer {
        name,
        parent,
        overrides,
    })
}

fn classify_package(text: &str, base: Option<&Path>) -> PackageSource {
    if text.starts_with("http://") || text.starts_with("https://") {
        return PackageSource::Url(text.to_string());
    }
    if text.starts_with('.') || text.starts_with('/') || text.contains('/') {
        let path = Path::new(text);
        let resolved = match base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        return PackageSource::Local(resolved);
    }
    PackageSource::Index(text.to_string())
}
