use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::store::DivisionStore;

// ── Constants ──────────────────────────────────────────────────────────

pub const MAX_BRACKET_SIZE: u32 = 1024;
pub const MAX_POOL_COUNT: u32 = 64;
pub const MIN_ROUND_ROBIN_SLOTS: u32 = 2;

// ── Id aliases ─────────────────────────────────────────────────────────

pub type DivisionId = u64;
pub type PhaseId = u64;
pub type SlotId = u64;
pub type PoolId = u64;
pub type RuleId = u64;
pub type EncounterId = u64;
pub type TemplateId = u64;
pub type UnitId = u64;

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedEngine = Arc<Mutex<EngineState>>;

#[derive(Default)]
pub struct EngineState {
    pub store: DivisionStore,
}

pub fn new_shared_engine() -> SharedEngine {
    Arc::new(Mutex::new(EngineState::default()))
}

// ── Authorization context ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Owner,
    Viewer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub role: Role,
}

impl AuthContext {
    pub fn admin() -> Self {
        AuthContext { role: Role::Admin }
    }

    pub fn owner() -> Self {
        AuthContext { role: Role::Owner }
    }

    pub fn viewer() -> Self {
        AuthContext { role: Role::Viewer }
    }

    pub fn can_mutate(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Owner)
    }
}

// ── Domain enums ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseType {
    RoundRobin,
    Pools,
    SingleElimination,
    Bracket,
    DoubleElimination,
    BracketRound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseStatus {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeedingStrategy {
    Snake,
    Sequential,
    CrossPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotType {
    Incoming,
    Advancing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotSourceType {
    Seeded,
    RankFromPhase,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundType {
    Pool,
    Bracket,
    Consolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EncounterStatus {
    Scheduled,
    Bye,
    Completed,
}

// ── Errors ─────────────────────────────────────────────────────────────

/// Engine error taxonomy. Every variant carries a caller-facing sentence;
/// nothing is mutated before a `Validation`, `Parse` or `Forbidden` error is
/// returned. Multi-step generators give no rollback past their first write —
/// callers wrap them in one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Parse(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        EngineError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        EngineError::Parse(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
