//! Snapshot configuration: compiler descriptors, snapshot names, and layers.
//!
//! This crate parses the parent-determining keys of a snapshot layer
//! document and produces a validated [`RawSnapshotLayer`]. Curated snapshot
//! names and compiler descriptors have canonical textual forms whose parsers
//! are exact inverses of their renderers.

#![warn(missing_docs)]

pub mod compiler;
pub mod error;
pub mod loader;
pub mod location;
pub mod resolve;
pub mod types;

pub use compiler::{CompilerDescriptor, ParseCompilerError, ParseVersionError, Version};
pub use error::{ConfigError, ConfigErrorKind};
pub use loader::{load_layer, load_layer_chain, load_layer_from_toml_str, load_layer_from_yaml_str};
pub use location::{parse_location, CuratedSnapshot, ParseLocationError, SnapshotLocation};
pub use resolve::resolve_snapshot_layer;
pub use types::*;
