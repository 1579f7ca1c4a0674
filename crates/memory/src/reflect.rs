use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::engine::MemoryEngine;

const TRACKED_OUTCOMES: [&str; 3] = ["success", "failure", "learning"];
const MAX_HOTSPOTS: usize = 5;
const HOTSPOT_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotspot {
    /// First keyed segments below the outcome, e.g. `tool=code_interpreter/error_type=syntax`.
    pub area: String,
    pub count: usize,
}

/// Shape of the memory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    pub total_memories: usize,
    pub by_outcome: BTreeMap<String, usize>,
    pub failure_hotspots: Vec<Hotspot>,
    pub insights: Vec<String>,
}

fn directory_segments(rel: &Path) -> Vec<String> {
    let parent = rel.parent().unwrap_or_else(|| Path::new(""));
    parent
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

impl MemoryEngine {
    /// Reads the topology of stored memories: counts per outcome and the
    /// areas where failures cluster.
    pub fn reflect(&self) -> Reflection {
        let root = self.root();
        let mut by_outcome: BTreeMap<String, usize> = TRACKED_OUTCOMES
            .iter()
            .map(|outcome| (outcome.to_string(), 0))
            .collect();
        let mut failure_areas: HashMap<String, usize> = HashMap::new();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Failed to read entry: {err}");
                    continue;
                }
            };
            let path = entry.path();
            let is_json = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if !entry.file_type().is_file() || !is_json {
                continue;
            }
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            let segments = directory_segments(rel);

            for outcome in TRACKED_OUTCOMES {
                let marker = format!("outcome={outcome}");
                if segments.iter().any(|s| *s == marker) {
                    *by_outcome.entry(outcome.to_string()).or_default() += 1;
                }
            }

            if segments.iter().any(|s| s == "outcome=failure") {
                let keyed: Vec<&str> = segments
                    .iter()
                    .map(String::as_str)
                    .filter(|s| s.contains('=') && !s.contains("outcome"))
                    .take(HOTSPOT_DEPTH)
                    .collect();
                if !keyed.is_empty() {
                    *failure_areas.entry(keyed.join("/")).or_default() += 1;
                }
            }
        }

        let mut failure_hotspots: Vec<Hotspot> = failure_areas
            .into_iter()
            .map(|(area, count)| Hotspot { area, count })
            .collect();
        failure_hotspots.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.area.cmp(&b.area)));
        failure_hotspots.truncate(MAX_HOTSPOTS);

        let successes = by_outcome.get("success").copied().unwrap_or(0);
        let failures = by_outcome.get("failure").copied().unwrap_or(0);

        let mut insights = Vec::new();
        if failures > successes {
            insights.push("More failures than successes - consider reviewing approach".to_string());
        }
        if let Some(top) = failure_hotspots.first() {
            insights.push(format!("Frequent failures in: {} ({} times)", top.area, top.count));
        }

        Reflection {
            total_memories: by_outcome.values().sum(),
            by_outcome,
            failure_hotspots,
            insights,
        }
    }
}
