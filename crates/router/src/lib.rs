//! # Coherence Router
//!
//! Filesystem paths as a classifier. A routing schema is a decision tree;
//! walking it with a record's attributes yields the directory the record
//! belongs in.
//!
//! ## Operations
//!
//! ```text
//! Packet ──> transmit ──> <root>/outcome=success/tool=search/3.json
//! Intent ──> receive  ──> <root>/outcome=*/tool=search/*
//! Paths  ──> derive   ──> { _derived, _stats, _structure }
//! ```
//!
//! Unclassifiable packets are never rejected: they land under
//! `<root>/_intake/missing_metadata/` or `<root>/_intake/no_match/`.
//!
//! ## Example
//!
//! ```rust
//! use coherence_router::{Packet, RoutingSchema, SchemaRouter};
//! use serde_json::json;
//!
//! let schema = RoutingSchema::from_value(&json!({
//!     "outcome": {
//!         "success": "{tool}/{step}.json",
//!         "failure": "{error_type=unknown}/{step}.json"
//!     }
//! }));
//! let router = SchemaRouter::new(schema, "lake");
//!
//! let packet = Packet::from_value(&json!({"outcome": "failure", "step": 4})).unwrap();
//! let path = router.transmit(&packet, true).unwrap();
//! assert_eq!(path, std::path::Path::new("lake/outcome=failure/unknown/4.json"));
//! ```

pub mod agent;
mod derive;
mod error;
mod packet;
mod predicate;
mod router;
mod sanitize;
mod schema;
mod template;

pub use agent::{
    compute_confidence_path, compute_episode_group, extract_tool_family, prepare_agent_packet,
};
pub use derive::{derive_schema, DerivedKey, DerivedSchema, DerivedStats, DEFAULT_MIN_FREQUENCY};
pub use error::{Result, RouterError};
pub use packet::{Packet, Scalar};
pub use predicate::{match_branch, BranchMatch, CompareOp, Predicate};
pub use router::{
    QuarantineReason, RoutingOutcome, SchemaRouter, CONFIDENCE_PATH_KEY, INTAKE_DIR,
};
pub use sanitize::sanitize_segment;
pub use schema::{BuiltinSchema, Branch, Route, RoutingNode, RoutingSchema, SchemaNode};
pub use template::{render_template, TemplateError};
