use std::fs;
use std::path::{Path, PathBuf};

use coherence_router::{BuiltinSchema, Packet, RoutingSchema, SchemaRouter};
use serde_json::Value;

use crate::document::{MemoryDocument, NewMemory};
use crate::error::Result;

/// How to select memories.
#[derive(Debug, Clone)]
pub enum RecallQuery {
    /// A glob pattern used verbatim.
    Pattern(String),
    /// Routing attributes turned into a glob by the router.
    Intent(Packet),
}

/// Experience store whose directory layout is the routing schema.
///
/// Memories are plain JSON files; the tree can be browsed with `ls`.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    router: SchemaRouter,
}

impl MemoryEngine {
    pub fn new(root: impl Into<PathBuf>, schema: RoutingSchema) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            router: SchemaRouter::new(schema, root),
        })
    }

    /// Engine over the built-in `memory` schema.
    pub fn with_default_schema(root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(root, BuiltinSchema::Memory.load()?)
    }

    pub fn root(&self) -> &Path {
        self.router.root()
    }

    pub fn router(&self) -> &SchemaRouter {
        &self.router
    }

    /// Stores a memory where the schema routes it and returns the file path.
    pub fn remember(&self, memory: NewMemory) -> Result<PathBuf> {
        let now = chrono::Local::now();
        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let summary = memory.filename_summary();

        let mut packet = Packet::new();
        packet.insert("outcome", memory.outcome.as_str());
        packet.insert("timestamp", stamp.as_str());
        packet.insert("summary", summary.as_str());
        packet.extend(
            memory
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        if let Some(tool) = &memory.tool {
            packet.insert("tool", tool.as_str());
        }

        let mut path = self.router.transmit(&packet, false)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            path.push(format!("{stamp}_{summary}.json"));
        }

        let document = MemoryDocument {
            timestamp: now.to_rfc3339(),
            outcome: memory.outcome,
            tool: memory.tool,
            summary,
            content: memory.content,
            metadata: match memory.metadata.to_json() {
                Value::Object(map) => map,
                _ => Default::default(),
            },
            path: path.clone(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        log::info!("Remembered {}", path.display());
        Ok(path)
    }

    /// Glob for an intent: constrained levels from the router, every level
    /// after the last constrained one collapsed into `**`.
    pub fn intent_pattern(&self, intent: &Packet) -> String {
        let mut segments = self.router.receive_segments(intent);
        while segments.last().is_some_and(|s| s.ends_with("=*")) {
            segments.pop();
        }

        let mut pattern =
            PathBuf::from(glob::Pattern::escape(&self.router.root().to_string_lossy()));
        pattern.extend(segments);
        pattern.push("**");
        pattern.push("*.json");
        pattern.to_string_lossy().into_owned()
    }

    /// Up to `limit` memories matching the query, newest path first.
    ///
    /// Files that cannot be read or parsed are skipped.
    pub fn recall(&self, query: &RecallQuery, limit: usize) -> Result<Vec<MemoryDocument>> {
        let pattern = match query {
            RecallQuery::Pattern(pattern) => pattern.clone(),
            RecallQuery::Intent(intent) => self.intent_pattern(intent),
        };
        log::debug!("Recall pattern {pattern}");

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(path) if path.is_file() => paths.push(path),
                Ok(_) => {}
                Err(err) => log::warn!("Skipping unreadable recall match: {err}"),
            }
        }
        paths.sort_unstable_by(|a, b| b.cmp(a));

        let mut memories = Vec::with_capacity(paths.len().min(limit));
        for path in paths {
            if memories.len() >= limit {
                break;
            }
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    log::debug!("Skipping {}: {err}", path.display());
                    continue;
                }
            };
            match serde_json::from_str::<MemoryDocument>(&raw) {
                Ok(mut doc) => {
                    doc.path = path;
                    memories.push(doc);
                }
                Err(err) => log::debug!("Skipping {}: {err}", path.display()),
            }
        }
        Ok(memories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine(root: &Path) -> MemoryEngine {
        MemoryEngine::with_default_schema(root.join("memories")).unwrap()
    }

    #[test]
    fn remember_writes_document_at_routed_path() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());

        let path = engine
            .remember(NewMemory::new("looked it up", "success").tool("web_search").summary("lookup"))
            .unwrap();

        let rel = path.strip_prefix(engine.root()).unwrap();
        assert!(rel.starts_with("outcome=success/tool=web_search"), "{}", rel.display());
        assert!(path.file_name().unwrap().to_string_lossy().ends_with("_lookup.json"));

        let doc: MemoryDocument = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc.content, json!("looked it up"));
        assert_eq!(doc.tool.as_deref(), Some("web_search"));
        assert_eq!(doc.path, path);
    }

    #[test]
    fn unroutable_memories_get_a_json_name_in_intake() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());

        // code_interpreter failures need an error_type.
        let path = engine
            .remember(NewMemory::new("boom", "failure").tool("code_interpreter").summary("boom"))
            .unwrap();

        let rel = path.strip_prefix(engine.root()).unwrap();
        assert!(rel.starts_with("_intake/missing_metadata"), "{}", rel.display());
        assert_eq!(path.extension().unwrap(), "json");
        assert!(path.is_file());
    }

    #[test]
    fn intent_pattern_collapses_trailing_wildcards() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let root = glob::Pattern::escape(&engine.root().to_string_lossy());

        let intent = Packet::from_value(&json!({"outcome": "success"})).unwrap();
        assert_eq!(
            engine.intent_pattern(&intent),
            format!("{root}/outcome=success/**/*.json")
        );
        assert_eq!(engine.intent_pattern(&Packet::new()), format!("{root}/**/*.json"));
    }

    #[test]
    fn recall_skips_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .remember(NewMemory::new("ok", "learning").meta("insight_type", "pattern"))
            .unwrap();
        let junk = engine.root().join("outcome=learning/junk.json");
        fs::write(&junk, "not json").unwrap();

        let found = engine
            .recall(&RecallQuery::Intent(
                Packet::from_value(&json!({"outcome": "learning"})).unwrap(),
            ), 10)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, json!("ok"));
    }
}
