use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::derive::{derive_schema, DerivedSchema};
use crate::error::Result;
use crate::packet::{Packet, Scalar};
use crate::predicate::match_branch;
use crate::sanitize::sanitize_segment;
use crate::schema::{RoutingSchema, SchemaNode};
use crate::template::{render_template, TemplateError};

/// Quarantine area under the router root.
pub const INTAKE_DIR: &str = "_intake";

/// Packet attribute holding a pre-computed suffix such as `/high_conf`.
pub const CONFIDENCE_PATH_KEY: &str = "confidence_path";

/// Why a packet could not be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineReason {
    /// The packet had no value for a routing key the schema consulted.
    MissingMetadata { key: String },
    /// None of the node's routing keys matched a branch.
    NoMatch { keys: Vec<String> },
}

impl QuarantineReason {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::MissingMetadata { .. } => "missing_metadata",
            Self::NoMatch { .. } => "no_match",
        }
    }
}

impl fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMetadata { key } => write!(f, "missing metadata for '{key}'"),
            Self::NoMatch { keys } => write!(f, "no branch matched for [{}]", keys.join(", ")),
        }
    }
}

/// Where a packet ended up, and how.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingOutcome {
    Routed(PathBuf),
    /// Classified, but the leaf template could not be expanded; the filename
    /// is a generic `data_<timestamp>`.
    Fallback { path: PathBuf, error: TemplateError },
    Quarantined { reason: QuarantineReason, path: PathBuf },
}

impl RoutingOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Routed(path) => path,
            Self::Fallback { path, .. } | Self::Quarantined { path, .. } => path,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Self::Routed(path) => path,
            Self::Fallback { path, .. } | Self::Quarantined { path, .. } => path,
        }
    }

    pub fn is_routed(&self) -> bool {
        matches!(self, Self::Routed(_))
    }

    pub fn quarantine_reason(&self) -> Option<&QuarantineReason> {
        match self {
            Self::Quarantined { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Plain name components of a packet-derived path fragment. Root, prefix,
/// `.` and `..` components are dropped so the result stays under the root.
fn contained_parts(raw: &str) -> Vec<String> {
    raw.split(['/', '\\'])
        .flat_map(|piece| Path::new(piece).components())
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Maps packets to paths and intents to globs using a routing schema.
///
/// The router holds no mutable state; one instance can serve any number of
/// threads.
#[derive(Debug, Clone)]
pub struct SchemaRouter {
    root: PathBuf,
    schema: RoutingSchema,
}

impl SchemaRouter {
    pub fn new(schema: RoutingSchema, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            schema,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema(&self) -> &RoutingSchema {
        &self.schema
    }

    /// Classifies a packet without touching the filesystem.
    pub fn route(&self, packet: &Packet) -> RoutingOutcome {
        let mut segments = Vec::new();
        let mut node = self.schema.root();

        while let SchemaNode::Internal(internal) = node {
            let mut next = None;
            for route in &internal.routes {
                let Some(value) = packet.get(&route.key) else {
                    return self.quarantine(
                        packet,
                        QuarantineReason::MissingMetadata {
                            key: route.key.clone(),
                        },
                    );
                };

                if let Some(found) = match_branch(value, &route.branches) {
                    segments.push(format!("{}={}", route.key, sanitize_segment(found.label)));
                    next = Some(found.child);
                    break;
                }
                log::debug!("No branch of '{}' matched value {value}", route.key);
            }

            match next {
                Some(child) => node = child,
                None => {
                    let keys = internal.routes.iter().map(|r| r.key.clone()).collect();
                    return self.quarantine(packet, QuarantineReason::NoMatch { keys });
                }
            }
        }

        let (filename, fallback) = match node {
            SchemaNode::Leaf(template) => match render_template(template, packet) {
                Ok(name) => (name, None),
                Err(err) => {
                    log::warn!("Leaf template {template:?} not expanded: {err}");
                    (format!("data_{}", timestamp()), Some(err))
                }
            },
            SchemaNode::Internal(_) | SchemaNode::Opaque(_) => (
                format!("{}_{}", packet.text_or("id", "data"), timestamp()),
                None,
            ),
        };

        if let Some(Scalar::Text(suffix)) = packet.get(CONFIDENCE_PATH_KEY) {
            segments.extend(contained_parts(suffix));
        }
        segments.extend(contained_parts(&filename));

        let mut path = self.root.clone();
        path.extend(&segments);

        log::debug!("Routed packet to {}", path.display());
        match fallback {
            Some(error) => RoutingOutcome::Fallback { path, error },
            None => RoutingOutcome::Routed(path),
        }
    }

    fn quarantine(&self, packet: &Packet, reason: QuarantineReason) -> RoutingOutcome {
        let name = format!("{}_{}", packet.text_or("id", "unknown"), timestamp());
        let mut path = self.root.join(INTAKE_DIR).join(reason.dir_name());
        path.extend(contained_parts(&name));
        log::warn!("Quarantined packet ({reason}) at {}", path.display());
        RoutingOutcome::Quarantined { reason, path }
    }

    /// Routes a packet and, unless `dry_run`, creates the parent directories.
    ///
    /// Unclassifiable packets still yield a path (under `_intake/`); the only
    /// error is a failed directory creation.
    pub fn transmit(&self, packet: &Packet, dry_run: bool) -> Result<PathBuf> {
        Ok(self.transmit_outcome(packet, dry_run)?.into_path())
    }

    /// [`Self::transmit`], keeping how the packet was classified.
    pub fn transmit_outcome(&self, packet: &Packet, dry_run: bool) -> Result<RoutingOutcome> {
        let outcome = self.route(packet);
        if !dry_run {
            if let Some(parent) = outcome.path().parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(outcome)
    }

    /// Glob segments for an intent, below the root and without the trailing
    /// filename wildcard.
    ///
    /// Each internal node contributes its first routing key: constrained to the
    /// matched branch when the intent names it, `key=*` otherwise. Unconstrained
    /// levels follow the first branch to keep walking deeper.
    pub fn receive_segments(&self, intent: &Packet) -> Vec<String> {
        let mut segments = Vec::new();
        let mut node = self.schema.root();

        while let SchemaNode::Internal(internal) = node {
            let Some(route) = internal.routes.first() else {
                break;
            };
            let key = glob::Pattern::escape(&route.key);

            let matched = intent
                .get(&route.key)
                .and_then(|value| match_branch(value, &route.branches));
            match matched {
                Some(found) => {
                    segments.push(format!("{key}={}", sanitize_segment(found.label)));
                    node = found.child;
                }
                None => {
                    segments.push(format!("{key}=*"));
                    match route.branches.first() {
                        Some(branch) => node = &branch.child,
                        None => break,
                    }
                }
            }
        }

        segments
    }

    /// Glob pattern matching every record the intent could describe.
    ///
    /// The pattern is not expanded here.
    pub fn receive(&self, intent: &Packet) -> String {
        let mut pattern = PathBuf::from(glob::Pattern::escape(&self.root.to_string_lossy()));
        pattern.extend(self.receive_segments(intent));
        pattern.push("*");
        pattern.to_string_lossy().into_owned()
    }

    /// Infers key/value structure from a corpus of paths.
    pub fn derive<S: AsRef<str>>(paths: &[S], min_frequency: f64) -> DerivedSchema {
        derive_schema(paths, min_frequency)
    }
}
