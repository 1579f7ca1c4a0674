//! # Coherence Memory
//!
//! Experience store built on [`coherence_router`]. Each memory is a JSON
//! document written to the path the routing schema picks for it, so the
//! directory tree itself is the index:
//!
//! ```text
//! <root>/outcome=failure/tool=code_interpreter/error_type=syntax/20260101_120000_fix.json
//! ```
//!
//! - [`MemoryEngine::remember`] stores a memory
//! - [`MemoryEngine::recall`] finds memories by glob or by routing intent
//! - [`MemoryEngine::reflect`] summarizes where outcomes and failures cluster

mod document;
mod engine;
mod error;
mod reflect;

pub use document::{MemoryDocument, NewMemory};
pub use engine::{MemoryEngine, RecallQuery};
pub use error::{MemoryError, Result};
pub use reflect::{Hotspot, Reflection};
