pub mod action;
pub mod containment;
pub mod context;
pub mod error;
pub mod hashing;
pub mod observe;
pub mod scenario;

pub use action::{AttackerAction, DefenderAction, NO_OP_ACTION_TYPE, containment_target};
pub use containment::ContainmentState;
pub use context::AttackerContext;
pub use error::SeedError;
pub use hashing::{canonical_json, hash_value, sha256_hex};
pub use observe::{ActionResult, EpisodeStatus, Observation, StepOutcome};
pub use scenario::{
    ArtifactKind, ArtifactRef, AttackGraph, AttackPlan, Attribution, ContainmentRequirements,
    DataTargetEntity, DomainEntity, Entities, GraphAction, GraphState, GroundTruth, HostEntity,
    InjectionPayload, LogTable, LogTemplate, Scenario, ScenarioMetadata, SeedArtifacts, SeedEmail,
    TimelineStep, UserEntity, ground_truth_path,
};
