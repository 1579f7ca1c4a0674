//! Schema discovery over an existing corpus of paths.
//!
//! `key=value` directory names are counted per depth; pairs frequent enough
//! to be signal are reported per key. The output is a summary for schema
//! authors, not a routable schema.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_FREQUENCY: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedKey {
    /// Shallowest depth at which the key was seen with enough support.
    pub level: usize,
    pub values: Vec<String>,
    pub pattern: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedStats {
    pub path_count: usize,
    pub unique_keys: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedSchema {
    pub stats: DerivedStats,
    /// Discovered keys ordered by level, then name.
    pub structure: Vec<(String, DerivedKey)>,
}

impl DerivedSchema {
    pub fn get(&self, key: &str) -> Option<&DerivedKey> {
        self.structure
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, info)| info)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.structure.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.structure.is_empty()
    }
}

struct StructureMap<'a>(&'a [(String, DerivedKey)]);

impl Serialize for StructureMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, info)| (name, info)))
    }
}

impl Serialize for DerivedSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("_derived", &true)?;
        map.serialize_entry("_stats", &self.stats)?;
        map.serialize_entry("_structure", &StructureMap(&self.structure))?;
        map.end()
    }
}

fn path_segments(raw: &str) -> Vec<String> {
    Path::new(raw)
        .components()
        .filter_map(|component| match component {
            Component::CurDir => None,
            Component::RootDir => Some("/".to_string()),
            Component::ParentDir => Some("..".to_string()),
            Component::Prefix(prefix) => Some(prefix.as_os_str().to_string_lossy().into_owned()),
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        })
        .collect()
}

pub fn derive_schema<S: AsRef<str>>(paths: &[S], min_frequency: f64) -> DerivedSchema {
    let total = paths.len();
    if total == 0 {
        return DerivedSchema::default();
    }

    // level -> (key, value) -> occurrences
    let mut levels: BTreeMap<usize, BTreeMap<(String, String), usize>> = BTreeMap::new();
    for path in paths {
        for (level, segment) in path_segments(path.as_ref()).into_iter().enumerate() {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            *levels
                .entry(level)
                .or_default()
                .entry((key.to_string(), value.to_string()))
                .or_default() += 1;
        }
    }

    let mut discovered: BTreeMap<String, (usize, BTreeSet<String>)> = BTreeMap::new();
    for (level, pairs) in &levels {
        for ((key, value), count) in pairs {
            if key.is_empty() || (*count as f64 / total as f64) < min_frequency {
                continue;
            }
            discovered
                .entry(key.clone())
                .or_insert_with(|| (*level, BTreeSet::new()))
                .1
                .insert(value.clone());
        }
    }

    let mut structure: Vec<(String, DerivedKey)> = discovered
        .into_iter()
        .map(|(key, (level, values))| {
            let info = DerivedKey {
                level,
                values: values.into_iter().collect(),
                pattern: format!("{key}={{value}}"),
            };
            (key, info)
        })
        .collect();
    structure.sort_by(|(a_key, a), (b_key, b)| a.level.cmp(&b.level).then_with(|| a_key.cmp(b_key)));

    log::debug!(
        "Derived {} keys from {} paths (min_frequency={min_frequency})",
        structure.len(),
        total
    );

    DerivedSchema {
        stats: DerivedStats {
            path_count: total,
            unique_keys: structure.len(),
        },
        structure,
    }
}
