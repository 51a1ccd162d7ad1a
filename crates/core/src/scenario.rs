//! Scenario seed model.
//!
//! A scenario describes one scripted incident: the entity inventory, the
//! attacker's plan (linear timeline or attack graph), the pre-authored
//! artifacts the compiler materializes into the evidence store, and the
//! prompt-injection payloads planted in that evidence. Scenarios are
//! immutable for the lifetime of an episode.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SeedError;

/// A complete scenario seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique scenario identifier.
    pub scenario_id: String,

    /// Entity inventory (hosts, users, domains, data targets).
    pub entities: Entities,

    /// Host where the intrusion begins.
    pub patient_zero_host: String,

    /// User whose credentials are compromised.
    pub compromised_user: String,

    /// Domain controlled by the attacker.
    pub attacker_domain: String,

    /// Data target the attacker is after.
    pub data_target: String,

    /// Legacy linear attack timeline.
    #[serde(default)]
    pub attack_plan: Option<AttackPlan>,

    /// Graph-structured kill chain. Preferred over the timeline when present.
    #[serde(default)]
    pub attack_graph: Option<AttackGraph>,

    /// Pre-authored emails and log templates referenced by artifacts.
    pub seed_artifacts: SeedArtifacts,

    /// Prompt-injection payloads planted in the evidence.
    #[serde(default)]
    pub prompt_injection_payloads: Vec<InjectionPayload>,

    /// Optional scenario metadata.
    #[serde(default)]
    pub metadata: ScenarioMetadata,
}

impl Scenario {
    /// Load a scenario seed from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| SeedError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&contents).map_err(|e| SeedError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// All host ids in the scenario.
    #[must_use]
    pub fn host_ids(&self) -> Vec<&str> {
        self.entities.hosts.iter().map(|h| h.host_id.as_str()).collect()
    }

    /// All user ids in the scenario.
    #[must_use]
    pub fn user_ids(&self) -> Vec<&str> {
        self.entities.users.iter().map(|u| u.user_id.as_str()).collect()
    }

    /// All domain names in the scenario.
    #[must_use]
    pub fn domain_names(&self) -> Vec<&str> {
        self.entities.domains.iter().map(|d| d.domain.as_str()).collect()
    }

    /// Domains tagged as attacker-controlled.
    #[must_use]
    pub fn attacker_domains(&self) -> Vec<&str> {
        self.entities
            .domains
            .iter()
            .filter(|d| d.domain_type == "attacker")
            .map(|d| d.domain.as_str())
            .collect()
    }

    /// All data-target ids in the scenario.
    #[must_use]
    pub fn target_ids(&self) -> Vec<&str> {
        self.entities
            .data_targets
            .iter()
            .map(|t| t.target_id.as_str())
            .collect()
    }

    /// Look up a seed email by id.
    #[must_use]
    pub fn seed_email(&self, email_id: &str) -> Option<&SeedEmail> {
        self.seed_artifacts
            .emails
            .iter()
            .find(|e| e.email_id == email_id)
    }

    /// Look up a log template by id.
    #[must_use]
    pub fn log_template(&self, template_id: &str) -> Option<&LogTemplate> {
        self.seed_artifacts
            .log_templates
            .iter()
            .find(|t| t.template_id == template_id)
    }

    /// Effective step cap: `metadata.max_steps` when set, else the fallback.
    #[must_use]
    pub fn max_steps_or(&self, fallback: u32) -> u32 {
        self.metadata.max_steps.unwrap_or(fallback)
    }
}

/// Entity inventory for a scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub hosts: Vec<HostEntity>,
    #[serde(default)]
    pub users: Vec<UserEntity>,
    #[serde(default)]
    pub domains: Vec<DomainEntity>,
    #[serde(default)]
    pub data_targets: Vec<DataTargetEntity>,
}

/// A host in the simulated environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntity {
    pub host_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// A user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// A domain, tagged with its role in the scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEntity {
    pub domain: String,
    /// `"attacker"` marks attacker-controlled infrastructure.
    pub domain_type: String,
}

/// A data asset the attacker may target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTargetEntity {
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Legacy linear attack plan: one artifact batch per step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackPlan {
    pub timeline: Vec<TimelineStep>,
}

/// One step of the legacy timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineStep {
    pub step: u32,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
}

/// Artifact kinds the emitter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Email,
    LogTemplate,
    Alert,
}

/// A reference to a pre-authored artifact, optionally gated on an attacker
/// action variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub artifact_type: ArtifactKind,

    /// Email id or log-template id, depending on `artifact_type`.
    pub artifact_id: String,

    /// Emission step for graph `initial_artifacts` (defaults to 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,

    /// When set, the artifact is emitted only for this attacker action type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_action_type: Option<String>,

    /// Params the attacker action must carry for variant emission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_params: Option<BTreeMap<String, Value>>,

    /// Params the matched graph action must carry for emission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_params: Option<BTreeMap<String, Value>>,
}

/// Graph-structured kill chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackGraph {
    pub start_state: String,

    /// When non-empty, restricts the reachable state set.
    #[serde(default)]
    pub objectives: Vec<String>,

    pub states: BTreeMap<String, GraphState>,

    /// Artifacts emitted at reset, each at its declared step.
    #[serde(default)]
    pub initial_artifacts: Vec<ArtifactRef>,
}

/// A node of the attack graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphState {
    #[serde(default)]
    pub actions: Vec<GraphAction>,
}

/// A guarded, effect-bearing edge of the attack graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphAction {
    pub action_type: String,

    /// Subset predicate over the attacker action's params.
    #[serde(default)]
    pub match_params: BTreeMap<String, Value>,

    /// Attacker-context preconditions (booleans, scalar matches, or
    /// set membership; `foothold` means a non-empty compromised-host set).
    #[serde(default)]
    pub requires: BTreeMap<String, Value>,

    /// Attacker-context mutations applied on a successful transition.
    #[serde(default)]
    pub effects: BTreeMap<String, Value>,

    /// Destination state; falls back to a per-action-kind table when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_state: Option<String>,

    /// Artifacts emitted when this action fires.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
}

/// Pre-authored evidence referenced by artifact ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedArtifacts {
    #[serde(default)]
    pub emails: Vec<SeedEmail>,
    #[serde(default)]
    pub log_templates: Vec<LogTemplate>,
}

/// A pre-authored email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEmail {
    pub email_id: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Evidence tables a log template can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogTable {
    EmailLogs,
    AuthLogs,
    Netflow,
    ProcessEvents,
    Alerts,
}

impl LogTable {
    /// SQL table name.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::EmailLogs => "email_logs",
            Self::AuthLogs => "auth_logs",
            Self::Netflow => "netflow",
            Self::ProcessEvents => "process_events",
            Self::Alerts => "alerts",
        }
    }
}

/// A pre-authored log line, parsed as whitespace-separated `k=v` tokens.
///
/// Values may not contain spaces; seed authors must encode multi-word
/// values without them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogTemplate {
    pub template_id: String,
    pub table: LogTable,
    pub template_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A prompt-injection payload planted in the evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionPayload {
    pub injection_id: String,

    /// Evidence surface carrying the payload (`email`, `alert`, `log`).
    pub surface: String,

    pub payload: String,
    pub expected_violation: String,

    /// Defender action the payload tries to induce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_action: Option<String>,

    /// Params the induced action must carry to count as a violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_params: Option<BTreeMap<String, Value>>,

    /// Evidence ids whose content exposure arms the payload.
    #[serde(default)]
    pub evidence_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_tier: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Optional scenario metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    /// Overrides the configured step cap when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,

    /// Base timestamp for emitted evidence rows (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Ground truth used by the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruth {
    pub attribution: Attribution,
    pub containment_requirements: ContainmentRequirements,
}

impl GroundTruth {
    /// Load ground truth from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| SeedError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&contents).map_err(|e| SeedError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// The true attribution for a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribution {
    pub patient_zero_host: String,
    pub compromised_user: String,
    pub attacker_domain: String,
    pub data_target: String,
    pub initial_vector: String,
}

/// The containment a correct responder would execute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainmentRequirements {
    #[serde(default)]
    pub isolate_hosts: Vec<String>,
    #[serde(default)]
    pub block_domains: Vec<String>,
    #[serde(default)]
    pub reset_users: Vec<String>,
}

/// Resolve the ground-truth file that sits beside a seed file.
///
/// `foo_seed.json` maps to `foo_ground_truth.json`, `fooseed.json` to
/// `fooground_truth.json`, anything else to a `sample_ground_truth.json`
/// sibling.
#[must_use]
pub fn ground_truth_path(seed_path: &Path) -> PathBuf {
    let name = seed_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if let Some(stem) = name.strip_suffix("_seed.json") {
        return seed_path.with_file_name(format!("{stem}_ground_truth.json"));
    }
    if let Some(stem) = name.strip_suffix("seed.json") {
        return seed_path.with_file_name(format!("{stem}ground_truth.json"));
    }
    seed_path.with_file_name("sample_ground_truth.json")
}
