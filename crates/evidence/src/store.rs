//! SQLite-backed evidence store.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params};
use serde_json::{Map, Value};

use crate::error::EvidenceError;

/// One evidence row as a column-name -> JSON-value map.
pub type Row = Map<String, Value>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS email_logs (
    email_id     TEXT PRIMARY KEY,
    scenario_id  TEXT NOT NULL,
    step         INTEGER NOT NULL,
    sender       TEXT,
    recipient    TEXT,
    subject      TEXT,
    body         TEXT,
    is_phish     INTEGER NOT NULL DEFAULT 0,
    injection_id TEXT,
    trust_tier   TEXT,
    source       TEXT,
    created_at   TEXT
);

CREATE TABLE IF NOT EXISTS auth_logs (
    auth_id      TEXT PRIMARY KEY,
    scenario_id  TEXT NOT NULL,
    step         INTEGER NOT NULL,
    user_id      TEXT,
    host_id      TEXT,
    source_ip    TEXT,
    auth_type    TEXT,
    success      INTEGER NOT NULL DEFAULT 0,
    trust_tier   TEXT,
    source       TEXT,
    created_at   TEXT
);

CREATE TABLE IF NOT EXISTS netflow (
    flow_id        TEXT PRIMARY KEY,
    scenario_id    TEXT NOT NULL,
    step           INTEGER NOT NULL,
    src_host       TEXT,
    dst_host       TEXT,
    dst_domain     TEXT,
    dst_port       INTEGER,
    protocol       TEXT,
    bytes_sent     INTEGER NOT NULL DEFAULT 0,
    bytes_received INTEGER NOT NULL DEFAULT 0,
    trust_tier     TEXT,
    source         TEXT,
    created_at     TEXT
);

CREATE TABLE IF NOT EXISTS process_events (
    event_id       TEXT PRIMARY KEY,
    scenario_id    TEXT NOT NULL,
    step           INTEGER NOT NULL,
    host_id        TEXT,
    user_id        TEXT,
    process_name   TEXT,
    command_line   TEXT,
    parent_process TEXT,
    trust_tier     TEXT,
    source         TEXT,
    created_at     TEXT
);

CREATE TABLE IF NOT EXISTS alerts (
    alert_id       TEXT PRIMARY KEY,
    scenario_id    TEXT NOT NULL,
    step           INTEGER NOT NULL,
    alert_type     TEXT,
    severity       TEXT,
    message        TEXT,
    related_log_id TEXT,
    injection_id   TEXT,
    trust_tier     TEXT,
    source         TEXT,
    created_at     TEXT
);

CREATE TABLE IF NOT EXISTS prompt_injections (
    injection_id       TEXT PRIMARY KEY,
    scenario_id        TEXT NOT NULL,
    surface            TEXT,
    payload            TEXT,
    expected_violation TEXT,
    target_action      TEXT,
    target_params      TEXT,
    evidence_ids       TEXT,
    injection_type     TEXT,
    objective          TEXT,
    source             TEXT
);
";

/// Append-only evidence store for one episode.
///
/// The connection sits behind a mutex so the store can be shared with the
/// async controller; every operation is a short, local SQLite call.
#[derive(Debug)]
pub struct EvidenceStore {
    conn: Mutex<Connection>,
    scenario_id: String,
}

impl EvidenceStore {
    /// Open an in-memory store.
    pub fn in_memory(scenario_id: impl Into<String>) -> Result<Self, EvidenceError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, scenario_id)
    }

    /// Open (or create) a store at the given path.
    pub fn open(
        path: impl AsRef<Path>,
        scenario_id: impl Into<String>,
    ) -> Result<Self, EvidenceError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, scenario_id)
    }

    fn from_connection(
        conn: Connection,
        scenario_id: impl Into<String>,
    ) -> Result<Self, EvidenceError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            scenario_id: scenario_id.into(),
        })
    }

    /// The scenario this store was compiled from.
    #[must_use]
    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    /// Run an arbitrary query and return rows as JSON maps.
    ///
    /// Callers are responsible for restricting this to `SELECT`s; the
    /// defender-facing handler rejects anything else before reaching here.
    pub fn select(&self, sql: &str) -> Result<Vec<Row>, EvidenceError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Map::new();
            for (idx, name) in column_names.iter().enumerate() {
                record.insert(name.clone(), column_value(row.get_ref(idx)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Email ids emitted at a given step.
    pub fn emails_for_step(&self, step: u32) -> Result<Vec<String>, EvidenceError> {
        self.ids_for_step("SELECT email_id FROM email_logs WHERE scenario_id = ?1 AND step = ?2", step)
    }

    /// Alert ids emitted at a given step.
    pub fn alerts_for_step(&self, step: u32) -> Result<Vec<String>, EvidenceError> {
        self.ids_for_step("SELECT alert_id FROM alerts WHERE scenario_id = ?1 AND step = ?2", step)
    }

    fn ids_for_step(&self, sql: &str, step: u32) -> Result<Vec<String>, EvidenceError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map(params![self.scenario_id, step], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Fetch one email row by id.
    pub fn fetch_email(&self, email_id: &str) -> Result<Option<Row>, EvidenceError> {
        self.fetch_one(
            "SELECT * FROM email_logs WHERE scenario_id = ?1 AND email_id = ?2",
            email_id,
        )
    }

    /// Fetch one alert row by id.
    pub fn fetch_alert(&self, alert_id: &str) -> Result<Option<Row>, EvidenceError> {
        self.fetch_one(
            "SELECT * FROM alerts WHERE scenario_id = ?1 AND alert_id = ?2",
            alert_id,
        )
    }

    fn fetch_one(&self, sql: &str, id: &str) -> Result<Option<Row>, EvidenceError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let mut rows = stmt.query(params![self.scenario_id, id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut record = Map::new();
        for (idx, name) in column_names.iter().enumerate() {
            record.insert(name.clone(), column_value(row.get_ref(idx)?));
        }
        Ok(Some(record))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert_email(
        &self,
        email_id: &str,
        step: u32,
        sender: &str,
        recipient: &str,
        subject: &str,
        body: &str,
        is_phish: bool,
        injection_id: Option<&str>,
        trust_tier: Option<&str>,
        source: Option<&str>,
        created_at: &str,
    ) -> Result<(), EvidenceError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO email_logs
             (email_id, scenario_id, step, sender, recipient, subject, body, is_phish,
              injection_id, trust_tier, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                email_id,
                self.scenario_id,
                step,
                sender,
                recipient,
                subject,
                body,
                i64::from(is_phish),
                injection_id,
                trust_tier,
                source,
                created_at,
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert_auth(
        &self,
        step: u32,
        user_id: &str,
        host_id: &str,
        source_ip: Option<&str>,
        auth_type: &str,
        success: bool,
        trust_tier: Option<&str>,
        source: Option<&str>,
        created_at: &str,
    ) -> Result<(), EvidenceError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO auth_logs
             (auth_id, scenario_id, step, user_id, host_id, source_ip, auth_type, success,
              trust_tier, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                format!("auth-{}-{step}", self.scenario_id),
                self.scenario_id,
                step,
                user_id,
                host_id,
                source_ip,
                auth_type,
                i64::from(success),
                trust_tier,
                source,
                created_at,
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert_netflow(
        &self,
        step: u32,
        src_host: &str,
        dst_host: Option<&str>,
        dst_domain: Option<&str>,
        dst_port: Option<i64>,
        protocol: Option<&str>,
        bytes_sent: i64,
        trust_tier: Option<&str>,
        source: Option<&str>,
        created_at: &str,
    ) -> Result<(), EvidenceError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO netflow
             (flow_id, scenario_id, step, src_host, dst_host, dst_domain, dst_port, protocol,
              bytes_sent, bytes_received, trust_tier, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                format!("flow-{}-{step}", self.scenario_id),
                self.scenario_id,
                step,
                src_host,
                dst_host,
                dst_domain,
                dst_port,
                protocol,
                bytes_sent,
                0i64,
                trust_tier,
                source,
                created_at,
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert_process(
        &self,
        step: u32,
        host_id: &str,
        user_id: &str,
        process_name: &str,
        command_line: &str,
        parent_process: Option<&str>,
        trust_tier: Option<&str>,
        source: Option<&str>,
        created_at: &str,
    ) -> Result<(), EvidenceError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO process_events
             (event_id, scenario_id, step, host_id, user_id, process_name, command_line,
              parent_process, trust_tier, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                format!("proc-{}-{step}", self.scenario_id),
                self.scenario_id,
                step,
                host_id,
                user_id,
                process_name,
                command_line,
                parent_process,
                trust_tier,
                source,
                created_at,
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert_alert(
        &self,
        step: u32,
        alert_type: &str,
        severity: &str,
        message: &str,
        injection_id: Option<&str>,
        trust_tier: Option<&str>,
        source: Option<&str>,
        created_at: &str,
    ) -> Result<(), EvidenceError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO alerts
             (alert_id, scenario_id, step, alert_type, severity, message, related_log_id,
              injection_id, trust_tier, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                format!("alert-{}-{step}", self.scenario_id),
                self.scenario_id,
                step,
                alert_type,
                severity,
                message,
                Option::<String>::None,
                injection_id,
                trust_tier,
                source,
                created_at,
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert_prompt_injection(
        &self,
        injection_id: &str,
        surface: &str,
        payload: &str,
        expected_violation: &str,
        target_action: Option<&str>,
        target_params: Option<&str>,
        evidence_ids: Option<&str>,
        injection_type: Option<&str>,
        objective: Option<&str>,
        source: Option<&str>,
    ) -> Result<(), EvidenceError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO prompt_injections
             (injection_id, scenario_id, surface, payload, expected_violation, target_action,
              target_params, evidence_ids, injection_type, objective, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                injection_id,
                self.scenario_id,
                surface,
                payload,
                expected_violation,
                target_action,
                target_params,
                evidence_ids,
                injection_type,
                objective,
                source,
            ],
        )?;
        Ok(())
    }
}

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(hex::encode_blob(b)),
    }
}

// Minimal hex encoding for the (unused in practice) blob column case.
mod hex {
    use std::fmt::Write;

    pub fn encode_blob(bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            let _ = write!(out, "{b:02x}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EvidenceStore {
        EvidenceStore::in_memory("seed-001").unwrap()
    }

    #[test]
    fn select_returns_typed_rows() {
        let s = store();
        s.insert_alert(1, "beacon", "high", "type=beacon host=h-001", None, Some("verified"), None, "2026-01-20T00:01:00Z")
            .unwrap();
        let rows = s.select("SELECT alert_id, step, severity FROM alerts").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["alert_id"], "alert-seed-001-1");
        assert_eq!(rows[0]["step"], 1);
        assert_eq!(rows[0]["severity"], "high");
    }

    #[test]
    fn row_id_patterns() {
        let s = store();
        s.insert_auth(2, "u-001", "h-001", None, "password", true, None, None, "t").unwrap();
        s.insert_netflow(3, "h-001", None, None, Some(443), Some("tcp"), 10, None, None, "t")
            .unwrap();
        s.insert_process(4, "h-001", "u-001", "powershell", "cmd", None, None, None, "t")
            .unwrap();
        let auth = s.select("SELECT auth_id FROM auth_logs").unwrap();
        assert_eq!(auth[0]["auth_id"], "auth-seed-001-2");
        let flow = s.select("SELECT flow_id FROM netflow").unwrap();
        assert_eq!(flow[0]["flow_id"], "flow-seed-001-3");
        let proc = s.select("SELECT event_id FROM process_events").unwrap();
        assert_eq!(proc[0]["event_id"], "proc-seed-001-4");
    }

    #[test]
    fn fetch_email_by_id() {
        let s = store();
        s.insert_email(
            "email-001", 0, "a@evil-mail.com", "u-001@corp.example", "Invoice", "click here",
            true, Some("inj-001"), Some("untrusted"), Some("mail-gw"), "2026-01-20T00:00:00Z",
        )
        .unwrap();
        let row = s.fetch_email("email-001").unwrap().unwrap();
        assert_eq!(row["is_phish"], 1);
        assert_eq!(row["trust_tier"], "untrusted");
        assert!(s.fetch_email("email-999").unwrap().is_none());
    }

    #[test]
    fn emails_and_alerts_for_step() {
        let s = store();
        s.insert_email("email-001", 0, "a", "b", "s", "b", false, None, None, None, "t")
            .unwrap();
        s.insert_alert(0, "phish", "medium", "m", None, None, None, "t").unwrap();
        assert_eq!(s.emails_for_step(0).unwrap(), vec!["email-001"]);
        assert_eq!(s.alerts_for_step(0).unwrap(), vec!["alert-seed-001-0"]);
        assert!(s.emails_for_step(1).unwrap().is_empty());
    }

    #[test]
    fn invalid_sql_is_an_error() {
        let s = store();
        assert!(s.select("SELECT nope FROM missing_table").is_err());
    }
}
