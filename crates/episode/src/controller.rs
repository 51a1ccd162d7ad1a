//! The episode controller.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use breachsim_attacker::policy::{AttackerPolicy, PolicySnapshot};
use breachsim_attacker::state_machine::{ScenarioRefs, advance, apply_attacker_action};
use breachsim_attacker::{AttackerBackend, PolicyManager, ReplayCache, ReplayMode};
use breachsim_core::{
    ActionResult, AttackerAction, AttackerContext, ContainmentState, DefenderAction,
    EpisodeStatus, GroundTruth, Observation, Scenario, StepOutcome, ground_truth_path,
};
use breachsim_evidence::{
    EvidenceStore, compile_seed, emit_graph_action_artifacts, emit_variant_artifacts,
};
use breachsim_oracle::{
    CalibrationMetrics, compute_evidence_gating, collect_known_entities,
    detect_injection_violations, extract_entities_from_evidence, score_report,
};

use crate::config::EpisodeConfig;
use crate::error::EpisodeError;

static ALERT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_]+)=([A-Za-z0-9_.:@-]+)").unwrap_or_else(|e| panic!("regex: {e}"))
});

/// One running episode. Owns its evidence store, containment, and
/// attacker-side state; mutated only through [`Episode::reset`] and
/// [`Episode::step`].
pub struct Episode {
    config: EpisodeConfig,
    scenario: Scenario,
    ground_truth: Option<GroundTruth>,
    known_entities: BTreeSet<String>,

    policy: Arc<dyn AttackerPolicy>,
    manager: PolicyManager,

    store: EvidenceStore,
    episode_id: String,
    max_steps: u32,
    step_count: u32,
    attacker_state: String,
    attacker_context: AttackerContext,
    containment: ContainmentState,

    seen_evidence_ids: BTreeSet<String>,
    content_evidence_ids: BTreeSet<String>,
    injection_violations: Vec<String>,

    trace: Vec<DefenderAction>,
    evidence_trail: Vec<breachsim_oracle::EvidenceExtraction>,

    terminated: bool,
}

impl Episode {
    /// Build an episode by loading the seed (and its sibling ground
    /// truth, when present) from the configured path.
    pub fn from_config(config: EpisodeConfig) -> Result<Self, EpisodeError> {
        let scenario = Scenario::from_file(&config.seed_path)?;
        let gt_path = ground_truth_path(&config.seed_path);
        let ground_truth = if gt_path.exists() {
            Some(GroundTruth::from_file(&gt_path)?)
        } else {
            None
        };
        Self::new(config, scenario, ground_truth)
    }

    /// Build an episode from an in-memory scenario.
    pub fn new(
        config: EpisodeConfig,
        mut scenario: Scenario,
        ground_truth: Option<GroundTruth>,
    ) -> Result<Self, EpisodeError> {
        if config.mask_injections {
            scenario.prompt_injection_payloads.clear();
        }

        let cache = match config.replay_mode {
            ReplayMode::Off => None,
            _ => {
                let path = config.replay_cache_path.as_ref().ok_or_else(|| {
                    EpisodeError::Config("REPLAY_CACHE_PATH is required for replay modes".into())
                })?;
                Some(Arc::new(ReplayCache::open(path)?))
            }
        };
        let manager = PolicyManager::new(
            cache,
            config.replay_mode,
            config.attacker.strict,
            config.attacker.resolved_model(),
            config.attacker.resolved_temperature(),
        );
        let policy = config.attacker.build_policy()?;

        let max_steps = scenario.max_steps_or(config.max_steps);
        let known_entities = collect_known_entities(&scenario);
        let episode_id = Uuid::new_v4().to_string();
        let store = fresh_store(&config, &scenario, &episode_id)?;
        let attacker_state = start_state(&scenario);

        Ok(Self {
            config,
            scenario,
            ground_truth,
            known_entities,
            policy,
            manager,
            store,
            episode_id,
            max_steps,
            step_count: 0,
            attacker_state,
            attacker_context: AttackerContext::new(),
            containment: ContainmentState::new(),
            seen_evidence_ids: BTreeSet::new(),
            content_evidence_ids: BTreeSet::new(),
            injection_violations: Vec::new(),
            trace: Vec::new(),
            evidence_trail: Vec::new(),
            terminated: false,
        })
    }

    /// Begin a fresh episode: new id, fresh evidence store, cleared state.
    pub fn reset(&mut self) -> Result<StepOutcome, EpisodeError> {
        self.episode_id = Uuid::new_v4().to_string();
        self.step_count = 0;
        self.attacker_state = start_state(&self.scenario);
        self.attacker_context = AttackerContext::new();
        self.containment = ContainmentState::new();
        self.seen_evidence_ids.clear();
        self.content_evidence_ids.clear();
        self.injection_violations.clear();
        self.trace.clear();
        self.evidence_trail.clear();
        self.terminated = false;
        self.store = fresh_store(&self.config, &self.scenario, &self.episode_id)?;

        let new_emails = self.store.emails_for_step(0)?;
        let new_alerts = self.store.alerts_for_step(0)?;
        self.record_seen(&new_emails, &new_alerts);

        info!(
            episode_id = %self.episode_id,
            scenario_id = %self.scenario.scenario_id,
            "episode reset"
        );

        let observation = self.observation(
            new_emails,
            new_alerts,
            ActionResult::ok("reset", Value::Object(Map::new())),
            false,
            None,
            &json!({}),
        );
        Ok(StepOutcome {
            observation,
            reward: 0.0,
            done: false,
            info: json!({}),
            state: self.status(),
        })
    }

    /// Run one defender step.
    pub async fn step(&mut self, action: DefenderAction) -> Result<StepOutcome, EpisodeError> {
        // 1. Apply the defender action and record its evidence exposure.
        let result = self.apply_defender_action(&action);
        self.trace.push(action.clone());
        self.evidence_trail
            .push(extract_entities_from_evidence(&result.data, &self.known_entities));

        // 2. Injection detection runs against the now-updated content set.
        let violations = detect_injection_violations(
            &action,
            &self.content_evidence_ids,
            &self.scenario.prompt_injection_payloads,
        );
        if !violations.is_empty() {
            debug!(?violations, "injection violations recorded");
            self.injection_violations.extend(violations);
        }

        // 3. The attacker moves.
        let pre_step_count = self.step_count;
        let attacker_action = self.decide_attacker_action(&action).await?;

        let prior_state = self.attacker_state.clone();
        let advance_result = advance(
            &prior_state,
            &self.containment,
            ScenarioRefs {
                attacker_domain: &self.scenario.attacker_domain,
                patient_zero_host: &self.scenario.patient_zero_host,
                compromised_user: &self.scenario.compromised_user,
            },
            attacker_action.as_ref(),
            &self.attacker_context,
            self.scenario.attack_graph.as_ref(),
        );
        self.attacker_state = advance_result.next_state(&prior_state).to_owned();

        self.step_count += 1;

        // 4. Evidence tied to the attacker action lands at the new step.
        if let Some(attacker_action) = &attacker_action {
            if self.scenario.attack_graph.is_some() {
                emit_graph_action_artifacts(
                    &self.store,
                    &self.scenario,
                    self.step_count,
                    &prior_state,
                    attacker_action,
                )?;
            } else {
                emit_variant_artifacts(
                    &self.store,
                    &self.scenario,
                    self.step_count,
                    attacker_action,
                )?;
            }
        }

        if !advance_result.is_stalled() {
            if let Some(attacker_action) = &attacker_action {
                let effects = advance_result.matched().map(|m| &m.effects);
                apply_attacker_action(&mut self.attacker_context, attacker_action, effects);
            }
        }

        // 5. Surface this step's new evidence.
        let new_emails = self.store.emails_for_step(self.step_count)?;
        let new_alerts = self.store.alerts_for_step(self.step_count)?;
        self.record_seen(&new_emails, &new_alerts);

        // 6. Close out the step.
        let mut info = json!({
            "action_type": action.action_type,
            "attacker_action": attacker_action.as_ref().map_or(Value::Null, AttackerAction::to_value),
            "attacker_stalled": advance_result.is_stalled(),
            "attacker_reason": advance_result.reason(),
            "injection_violations": self.injection_violations,
        });

        let mut reward = 0.0;
        if action.action_type == "submit_report" {
            self.terminated = true;
            if let Some(ground_truth) = &self.ground_truth {
                let report = action
                    .params
                    .get("summary_json")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                // The report step itself carries no efficiency penalty.
                let score = score_report(
                    &report,
                    ground_truth,
                    pre_step_count,
                    &self.injection_violations,
                    Some(&self.containment),
                );
                reward = score.reward;
                info["score_details"] = serde_json::to_value(&score.details).unwrap_or(Value::Null);
                info["blast_radius"] = json!(score.details.blast_radius());
                info["calibration"] =
                    serde_json::to_value(self.calibration()).unwrap_or(Value::Null);
                info!(reward, episode_id = %self.episode_id, "report scored");
            }
        }

        let truncated = self.step_count >= self.max_steps;
        let done = self.terminated || truncated;
        if truncated && !self.terminated {
            info["reason"] = json!("no_report_submitted");
        }

        let observation = self.observation(new_emails, new_alerts, result, done, Some(reward), &info);
        Ok(StepOutcome {
            observation,
            reward,
            done,
            info,
            state: self.status(),
        })
    }

    /// Episode bookkeeping for `GET /state`.
    #[must_use]
    pub fn status(&self) -> EpisodeStatus {
        EpisodeStatus {
            episode_id: self.episode_id.clone(),
            scenario_id: self.scenario.scenario_id.clone(),
            step_count: self.step_count,
            max_steps: self.max_steps,
            terminated: self.terminated,
            truncated: self.step_count >= self.max_steps,
        }
    }

    /// Evidence-gating metrics for the steps taken so far.
    #[must_use]
    pub fn calibration(&self) -> CalibrationMetrics {
        compute_evidence_gating(&self.trace, &self.evidence_trail)
    }

    /// The attacker's current state (tests and diagnostics).
    #[must_use]
    pub fn attacker_state(&self) -> &str {
        &self.attacker_state
    }

    /// The containment executed so far.
    #[must_use]
    pub fn containment(&self) -> &ContainmentState {
        &self.containment
    }

    /// Violation ids recorded so far.
    #[must_use]
    pub fn injection_violations(&self) -> &[String] {
        &self.injection_violations
    }

    async fn decide_attacker_action(
        &mut self,
        defender_action: &DefenderAction,
    ) -> Result<Option<AttackerAction>, EpisodeError> {
        // Graph scenarios are policy-driven. Timeline scenarios advance the
        // linear machine on their own unless a live backend is configured.
        let policy_driven = self.scenario.attack_graph.is_some()
            || self.config.attacker.backend != AttackerBackend::Mock;
        if !policy_driven {
            return Ok(None);
        }
        let snapshot = PolicySnapshot::capture(
            &self.scenario,
            self.step_count,
            &self.containment,
            &self.attacker_context,
        );
        let decision = self
            .manager
            .decide(
                self.policy.as_ref(),
                &self.scenario,
                self.step_count,
                &self.attacker_state,
                defender_action,
                &snapshot,
            )
            .await?;
        Ok(Some(decision))
    }

    fn apply_defender_action(&mut self, action: &DefenderAction) -> ActionResult {
        match action.action_type.as_str() {
            "query_logs" => self.query_logs(action),
            "fetch_email" => self.fetch_email(action),
            "fetch_alert" => self.fetch_alert(action),
            "isolate_host" => {
                let Some(host_id) = action.param_str("host_id") else {
                    return ActionResult::error("host_id required");
                };
                if !self.scenario.host_ids().contains(&host_id) {
                    return ActionResult::error(format!("unknown host_id: {host_id}"));
                }
                self.containment.isolate_host(host_id);
                ActionResult::ok("isolate_host", json!({ "isolated_host": host_id }))
            }
            "block_domain" => {
                let Some(domain) = action.param_str("domain") else {
                    return ActionResult::error("domain required");
                };
                if !self.scenario.domain_names().contains(&domain) {
                    return ActionResult::error(format!("unknown domain: {domain}"));
                }
                self.containment.block_domain(domain);
                ActionResult::ok("block_domain", json!({ "blocked_domain": domain }))
            }
            "reset_user" => {
                let Some(user_id) = action.param_str("user_id") else {
                    return ActionResult::error("user_id required");
                };
                if !self.scenario.user_ids().contains(&user_id) {
                    return ActionResult::error(format!("unknown user_id: {user_id}"));
                }
                self.containment.reset_user(user_id);
                ActionResult::ok("reset_user", json!({ "reset_user": user_id }))
            }
            "submit_report" => {
                ActionResult::ok("submit_report", json!({ "report_received": true }))
            }
            other => ActionResult::error(format!("unknown action type: {other}")),
        }
    }

    fn query_logs(&mut self, action: &DefenderAction) -> ActionResult {
        let sql = action.param_str("sql").unwrap_or_default();
        if !sql.trim().to_lowercase().starts_with("select") {
            return ActionResult::error("only SELECT queries are allowed");
        }
        match self.store.select(sql) {
            Ok(rows) => {
                for row in &rows {
                    for key in ["email_id", "alert_id", "auth_id", "flow_id", "event_id"] {
                        if let Some(id) = row.get(key).and_then(Value::as_str) {
                            self.content_evidence_ids.insert(id.to_owned());
                        }
                    }
                }
                ActionResult::ok("query_logs", json!({ "rows": rows }))
            }
            Err(e) => ActionResult::error(e.to_string()),
        }
    }

    fn fetch_email(&mut self, action: &DefenderAction) -> ActionResult {
        let Some(email_id) = action.param_str("email_id") else {
            return ActionResult::error("email_id required");
        };
        match self.store.fetch_email(email_id) {
            Ok(Some(email)) => {
                self.content_evidence_ids.insert(email_id.to_owned());
                ActionResult::ok(
                    "fetch_email",
                    json!({ "email_id": email_id, "email": email }),
                )
            }
            Ok(None) => ActionResult::error(format!("unknown email_id: {email_id}")),
            Err(e) => ActionResult::error(e.to_string()),
        }
    }

    fn fetch_alert(&mut self, action: &DefenderAction) -> ActionResult {
        let Some(alert_id) = action.param_str("alert_id") else {
            return ActionResult::error("alert_id required");
        };
        match self.store.fetch_alert(alert_id) {
            Ok(Some(alert)) => {
                self.content_evidence_ids.insert(alert_id.to_owned());
                let message = alert.get("message").and_then(Value::as_str).unwrap_or("");
                let parsed = parse_alert_fields(message);
                ActionResult::ok(
                    "fetch_alert",
                    json!({ "alert_id": alert_id, "alert": alert, "parsed": parsed }),
                )
            }
            Ok(None) => ActionResult::error(format!("unknown alert_id: {alert_id}")),
            Err(e) => ActionResult::error(e.to_string()),
        }
    }

    fn record_seen(&mut self, new_emails: &[String], new_alerts: &[String]) {
        self.seen_evidence_ids.extend(new_emails.iter().cloned());
        self.seen_evidence_ids.extend(new_alerts.iter().cloned());
    }

    fn observation(
        &self,
        new_emails: Vec<String>,
        new_alerts: Vec<String>,
        last_action_result: ActionResult,
        done: bool,
        reward: Option<f64>,
        info: &Value,
    ) -> Observation {
        Observation {
            scenario_id: self.scenario.scenario_id.clone(),
            step_index: self.step_count,
            attacker_state: self.attacker_state.clone(),
            containment: self.containment.clone(),
            new_emails,
            new_alerts,
            evidence_seen_ids: self.seen_evidence_ids.iter().cloned().collect(),
            evidence_content_ids: self.content_evidence_ids.iter().cloned().collect(),
            last_action_result,
            done,
            reward,
            metadata: json!({
                "info": info,
                "state": self.status(),
            }),
        }
    }
}

/// Extract `k=v` fields from an alert message for structured access.
fn parse_alert_fields(message: &str) -> Map<String, Value> {
    let mut parsed = Map::new();
    for capture in ALERT_FIELD.captures_iter(message) {
        if let (Some(key), Some(value)) = (capture.get(1), capture.get(2)) {
            parsed.insert(
                key.as_str().to_owned(),
                Value::String(value.as_str().to_owned()),
            );
        }
    }
    parsed
}

fn start_state(scenario: &Scenario) -> String {
    scenario
        .attack_graph
        .as_ref()
        .map_or_else(|| "phish_sent".to_owned(), |g| g.start_state.clone())
}

fn fresh_store(
    config: &EpisodeConfig,
    scenario: &Scenario,
    episode_id: &str,
) -> Result<EvidenceStore, EpisodeError> {
    let store = match &config.evidence_dir {
        Some(dir) => EvidenceStore::open(
            dir.join(format!("{}-{episode_id}.db", scenario.scenario_id)),
            &scenario.scenario_id,
        )?,
        None => EvidenceStore::in_memory(&scenario.scenario_id)?,
    };
    compile_seed(&store, scenario)?;
    Ok(store)
}
