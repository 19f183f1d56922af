//! Snapshot layer types, raw and resolved.

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::compiler::CompilerDescriptor;
use crate::location::SnapshotLocation;

/// A snapshot layer document as written by the user, before validation.
///
/// The parent-determining keys are all optional here; exactly one of them
/// must be present for [`resolve_snapshot_layer`](crate::resolve_snapshot_layer)
/// to succeed.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawSnapshotDoc {
    /// The layer's name.
    #[serde(default)]
    pub name: Option<String>,
    /// Parent snapshot location.
    #[serde(default)]
    pub resolver: Option<String>,
    /// Parent snapshot location; a synonym for `resolver`.
    #[serde(default)]
    pub snapshot: Option<String>,
    /// Parent compiler, for layers that start from a bare toolchain.
    #[serde(default)]
    pub compiler: Option<String>,
    /// Package locations added or replaced by this layer.
    #[serde(default)]
    pub packages: Vec<String>,
    /// Packages inherited from the parent that this layer removes.
    #[serde(default)]
    pub drop_packages: BTreeSet<String>,
    /// Cabal flag overrides, per package.
    #[serde(default)]
    pub flags: BTreeMap<String, BTreeMap<String, bool>>,
    /// Packages whose visibility is overridden.
    #[serde(default)]
    pub hidden: BTreeMap<String, bool>,
    /// Extra compiler options, per package.
    #[serde(default)]
    pub ghc_options: BTreeMap<String, StringOrVec>,
    /// When the layer was published.
    #[serde(default, deserialize_with = "deserialize_publish_time")]
    pub publish_time: Option<DateTime<Utc>>,
}

/// A value written either as a single string or as a list of strings.
///
/// A single string is split on whitespace, so `ghc-options: { foo: "-O2 -Wall" }`
/// and `ghc-options: { foo: ["-O2", "-Wall"] }` are equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringOrVec(pub Vec<String>);

impl<'de> Deserialize<'de> for StringOrVec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StringOrVecVisitor;

        impl<'de> Visitor<'de> for StringOrVecVisitor {
            type Value = StringOrVec;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a string or a list of strings")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(StringOrVec(v.split_whitespace().map(str::to_string).collect()))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut vec = Vec::new();
                while let Some(val) = seq.next_element::<String>()? {
                    vec.push(val);
                }
                Ok(StringOrVec(vec))
            }
        }

        deserializer.deserialize_any(StringOrVecVisitor)
    }
}

/// Accepts a timestamp string (YAML, JSON, quoted TOML) or a native TOML
/// datetime, which must carry an offset.
fn deserialize_publish_time<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    struct PublishTimeVisitor;

    impl<'de> Visitor<'de> for PublishTimeVisitor {
        type Value = Option<DateTime<Utc>>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("an RFC 3339 date and time")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.parse::<DateTime<Utc>>().map(Some).map_err(E::custom)
        }

        fn visit_map<A: de::MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
            let datetime =
                toml::value::Datetime::deserialize(de::value::MapAccessDeserializer::new(map))?;
            if datetime.offset.is_none() {
                return Err(de::Error::custom(format!(
                    "publish time '{datetime}' has no UTC offset"
                )));
            }
            self.visit_str(&datetime.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(PublishTimeVisitor)
}

/// Where a package overridden by a layer comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// A package identifier in the package index, e.g. `text-2.0.2`.
    Index(String),
    /// An archive fetched from a URL.
    Url(String),
    /// A directory on the local filesystem, resolved against the layer's base path.
    Local(PathBuf),
}

/// The package overrides a layer applies on top of its parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalOverrides {
    /// Packages added or replaced.
    pub packages: Vec<PackageSource>,
    /// Packages removed.
    pub drop_packages: BTreeSet<String>,
    /// Flag overrides per package.
    pub flags: BTreeMap<String, BTreeMap<String, bool>>,
    /// Visibility overrides per package.
    pub hidden: BTreeMap<String, bool>,
    /// Compiler options per package.
    pub ghc_options: BTreeMap<String, Vec<String>>,
    /// Publication timestamp.
    pub publish_time: Option<DateTime<Utc>>,
}

/// What a snapshot layer is built on top of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// Another snapshot, named by `resolver` or `snapshot`.
    ByCuratedSnapshot(SnapshotLocation),
    /// A bare compiler with an empty package set, named by `compiler`.
    ByCompiler(CompilerDescriptor),
}

/// A validated snapshot layer: a name, one parent, and local overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSnapshotLayer {
    /// The layer's name.
    pub name: String,
    /// The single parent this layer extends.
    pub parent: ParentRef,
    /// Package overrides applied on top of the parent.
    pub overrides: LocalOverrides,
}
