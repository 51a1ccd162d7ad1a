//! Content-addressed replay cache for attacker decisions.
//!
//! Keyed by `(scenario_id, step, attacker_state, defender_action_hash,
//! attacker_context_hash)` where both hashes are SHA-256 over canonical
//! JSON. Identical episode positions therefore replay identical decisions,
//! making stochastic policies reproducible.

use std::path::Path;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use breachsim_core::hashing::hash_value;

use crate::error::PolicyError;

/// How the cache participates in an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayMode {
    /// No cache interaction.
    #[default]
    Off,
    /// Always call the policy; write the decision afterwards.
    Record,
    /// Prefer the cache; on a miss, call the policy and write.
    Replay,
}

impl FromStr for ReplayMode {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "record" => Ok(Self::Record),
            "replay" => Ok(Self::Replay),
            other => Err(PolicyError::Configuration(format!(
                "unknown replay mode: {other}"
            ))),
        }
    }
}

/// Hash of a defender action for cache keying.
#[must_use]
pub fn hash_defender_action(action: &Value) -> String {
    hash_value(action)
}

/// Hash of an attacker-context snapshot for cache keying.
///
/// `None` (and JSON null) hash to the literal `"none"`, matching rows
/// recorded before context-sensitive keying existed.
#[must_use]
pub fn hash_attacker_context(context: Option<&Value>) -> String {
    match context {
        None | Some(Value::Null) => "none".to_owned(),
        Some(value) => hash_value(value),
    }
}

/// SQLite-backed decision cache. Process-wide; safe to share across
/// episodes behind an `Arc`.
#[derive(Debug)]
pub struct ReplayCache {
    conn: Mutex<Connection>,
}

impl ReplayCache {
    /// Open (or create) a cache at the given path, migrating old schemas.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let conn = Connection::open(path).map_err(PolicyError::Cache)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory cache (tests).
    pub fn in_memory() -> Result<Self, PolicyError> {
        let conn = Connection::open_in_memory().map_err(PolicyError::Cache)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, PolicyError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Look up a cached decision.
    pub fn get(
        &self,
        scenario_id: &str,
        step: u32,
        attacker_state: &str,
        defender_action_hash: &str,
        attacker_context_hash: &str,
    ) -> Result<Option<Value>, PolicyError> {
        let conn = self.conn.lock();
        let decision: Option<String> = conn
            .query_row(
                "SELECT decision_json FROM attacker_decisions
                 WHERE scenario_id = ?1 AND step = ?2 AND attacker_state = ?3
                   AND defender_action_hash = ?4 AND attacker_context_hash = ?5",
                params![
                    scenario_id,
                    step,
                    attacker_state,
                    defender_action_hash,
                    attacker_context_hash
                ],
                |row| row.get(0),
            )
            .optional()?;
        match decision {
            Some(json) => Ok(Some(serde_json::from_str(&json).map_err(|e| {
                PolicyError::Parse(format!("corrupt cached decision: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Write (or overwrite) a decision. Upserts are atomic, so concurrent
    /// writers for the same key converge on equivalent rows.
    #[allow(clippy::too_many_arguments)]
    pub fn put(
        &self,
        scenario_id: &str,
        step: u32,
        attacker_state: &str,
        defender_action_hash: &str,
        attacker_context_hash: &str,
        decision: &Value,
        model: &str,
        temperature: Option<f64>,
    ) -> Result<(), PolicyError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO attacker_decisions
             (decision_id, scenario_id, step, attacker_state, defender_action_hash,
              attacker_context_hash, decision_json, model, temperature, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                Uuid::new_v4().to_string(),
                scenario_id,
                step,
                attacker_state,
                defender_action_hash,
                attacker_context_hash,
                breachsim_core::canonical_json(decision),
                model,
                temperature,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ],
        )?;
        Ok(())
    }
}

fn migrate(conn: &Connection) -> Result<(), PolicyError> {
    let table_exists: bool = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'attacker_decisions'",
            [],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !table_exists {
        conn.execute_batch(
            "CREATE TABLE attacker_decisions (
                decision_id           TEXT PRIMARY KEY,
                scenario_id           TEXT NOT NULL,
                step                  INTEGER NOT NULL,
                attacker_state        TEXT NOT NULL,
                defender_action_hash  TEXT NOT NULL,
                attacker_context_hash TEXT NOT NULL DEFAULT 'none',
                decision_json         TEXT NOT NULL,
                model                 TEXT,
                temperature           REAL,
                created_at            TEXT
             );
             CREATE UNIQUE INDEX idx_attacker_cache
             ON attacker_decisions
                (scenario_id, step, attacker_state, defender_action_hash, attacker_context_hash);",
        )?;
        return Ok(());
    }

    // Older caches predate context-sensitive keys: add the column and
    // rebuild the unique index around it, preserving existing rows.
    let mut stmt = conn.prepare("PRAGMA table_info(attacker_decisions)")?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;
    if !columns.iter().any(|c| c == "attacker_context_hash") {
        debug!("migrating replay cache schema to context-sensitive keys");
        conn.execute_batch(
            "ALTER TABLE attacker_decisions
                 ADD COLUMN attacker_context_hash TEXT NOT NULL DEFAULT 'none';
             DROP INDEX IF EXISTS idx_attacker_cache;
             CREATE UNIQUE INDEX IF NOT EXISTS idx_attacker_cache
             ON attacker_decisions
                (scenario_id, step, attacker_state, defender_action_hash, attacker_context_hash);",
        )?;
    }
    Ok(())
}
