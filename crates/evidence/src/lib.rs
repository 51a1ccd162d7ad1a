//! Evidence store for Breachsim episodes.
//!
//! Each episode owns a fresh SQLite database holding five log tables
//! (`email_logs`, `auth_logs`, `netflow`, `process_events`, `alerts`) and
//! the auxiliary `prompt_injections` table. The store is append-only for
//! the lifetime of an episode: the compiler populates it from the scenario
//! seed at reset, and the emitter inserts additional rows as attacker
//! actions fire. The defender reads it through arbitrary `SELECT`s.

pub mod compiler;
pub mod error;
pub mod store;

pub use compiler::{
    compile_seed, emit_artifact, emit_graph_action_artifacts, emit_variant_artifacts, parse_kv,
};
pub use error::EvidenceError;
pub use store::{EvidenceStore, Row};
