use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Result, RouterError};
use crate::predicate::Predicate;

const BUILTIN_AGENT: &str = include_str!("../schemas/agent.json");
const BUILTIN_MEMORY: &str = include_str!("../schemas/memory.json");

/// Reserved keys start with this prefix and never route.
pub const METADATA_PREFIX: char = '_';

/// One node of the routing decision tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Internal(RoutingNode),
    /// Path template with `{field}` / `{field=default}` placeholders.
    Leaf(String),
    /// Anything that is neither a mapping nor a template.
    Opaque(Value),
}

/// Internal node: routing keys in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingNode {
    pub routes: Vec<Route>,
    pub metadata: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Packet attribute consulted at this node.
    pub key: String,
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// Branch key exactly as authored.
    pub label: String,
    pub predicate: Predicate,
    pub child: SchemaNode,
}

impl Branch {
    pub fn new(label: impl Into<String>, child: SchemaNode) -> Self {
        let label = label.into();
        Self {
            predicate: Predicate::parse(&label),
            label,
            child,
        }
    }
}

impl SchemaNode {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::Internal(RoutingNode::from_map(map)),
            Value::String(template) => Self::Leaf(template.clone()),
            other => Self::Opaque(other.clone()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Internal(node) => node.to_value(),
            Self::Leaf(template) => Value::String(template.clone()),
            Self::Opaque(value) => value.clone(),
        }
    }

    pub fn as_internal(&self) -> Option<&RoutingNode> {
        match self {
            Self::Internal(node) => Some(node),
            _ => None,
        }
    }
}

impl RoutingNode {
    fn from_map(map: &Map<String, Value>) -> Self {
        let mut node = Self::default();
        for (key, value) in map {
            if key.starts_with(METADATA_PREFIX) {
                node.metadata.push((key.clone(), value.clone()));
                continue;
            }

            let branches = match value {
                Value::Object(branch_map) => branch_map
                    .iter()
                    .map(|(label, child)| Branch::new(label.clone(), SchemaNode::from_value(child)))
                    .collect(),
                other => {
                    log::warn!("Routing key {key} has no branch map ({other}); it will never match");
                    Vec::new()
                }
            };
            node.routes.push(Route {
                key: key.clone(),
                branches,
            });
        }
        node
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        for route in &self.routes {
            let branches: Map<String, Value> = route
                .branches
                .iter()
                .map(|b| (b.label.clone(), b.child.to_value()))
                .collect();
            map.insert(route.key.clone(), Value::Object(branches));
        }
        for (key, value) in &self.metadata {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// Schemas shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinSchema {
    /// Agent step logs: outcome, tool family, confidence.
    Agent,
    /// Experiential memories: outcome, tool, task/error/insight type.
    Memory,
}

impl BuiltinSchema {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(Self::Agent),
            "memory" => Ok(Self::Memory),
            other => Err(RouterError::UnknownBuiltin(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Memory => "memory",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Self::Agent => BUILTIN_AGENT,
            Self::Memory => BUILTIN_MEMORY,
        }
    }

    pub fn load(self) -> Result<RoutingSchema> {
        RoutingSchema::from_json_str(self.source())
    }
}

/// The routing decision tree. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingSchema {
    root: SchemaNode,
}

impl RoutingSchema {
    pub fn new(root: SchemaNode) -> Self {
        Self { root }
    }

    /// Builds a schema from a JSON value, keeping the map's key order.
    pub fn from_value(value: &Value) -> Self {
        Self::new(SchemaNode::from_value(value))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(&value))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let value: Value = toml::from_str(raw)?;
        Ok(Self::from_value(&value))
    }

    /// Loads a schema document; `.toml` files are TOML, everything else JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let schema = if is_toml {
            Self::from_toml_str(&raw)?
        } else {
            Self::from_json_str(&raw)?
        };
        log::debug!("Loaded routing schema from {}", path.display());
        Ok(schema)
    }

    /// Resolves `builtin:<name>` or a filesystem path.
    pub fn resolve(source: &str) -> Result<Self> {
        match source.strip_prefix("builtin:") {
            Some(name) => BuiltinSchema::from_name(name)?.load(),
            None => Self::load(source),
        }
    }

    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// Metadata entry (e.g. `_intake`) declared on the root node.
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.root.as_internal().and_then(|node| node.metadata(key))
    }

    pub fn to_value(&self) -> Value {
        self.root.to_value()
    }
}
