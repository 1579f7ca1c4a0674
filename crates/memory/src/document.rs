use std::path::PathBuf;

use coherence_router::{Packet, Scalar};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const SUMMARY_SOURCE_CHARS: usize = 30;
const SUMMARY_MAX_CHARS: usize = 50;

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\-.]").expect("valid filename regex"));

/// A memory as written to disk.
///
/// Unknown or missing fields are tolerated on read so hand-written files
/// under the root still recall.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryDocument {
    pub timestamp: String,
    pub outcome: String,
    pub tool: Option<String>,
    pub summary: String,
    pub content: Value,
    pub metadata: Map<String, Value>,
    #[serde(rename = "_path")]
    pub path: PathBuf,
}

/// Input to [`crate::MemoryEngine::remember`].
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: Value,
    pub outcome: String,
    pub tool: Option<String>,
    pub summary: Option<String>,
    /// Extra routing attributes (e.g. `task_type`, `error_type`).
    pub metadata: Packet,
}

impl NewMemory {
    pub fn new(content: impl Into<Value>, outcome: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            outcome: outcome.into(),
            tool: None,
            summary: None,
            metadata: Packet::new(),
        }
    }

    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Summary as it appears in filenames.
    pub(crate) fn filename_summary(&self) -> String {
        let raw = match (&self.summary, &self.content) {
            (Some(summary), _) => summary.clone(),
            (None, Value::String(text)) => text
                .chars()
                .take(SUMMARY_SOURCE_CHARS)
                .collect::<String>()
                .replace(' ', "_")
                .replace('/', "-"),
            (None, _) => "memory".to_string(),
        };
        sanitize_filename(&raw)
    }
}

pub(crate) fn sanitize_filename(raw: &str) -> String {
    UNSAFE_FILENAME_CHARS
        .replace_all(raw, "_")
        .chars()
        .take(SUMMARY_MAX_CHARS)
        .collect()
}
