use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{ArmyId, Day, Gold, RulerId};

/// Broad class of a failure, deciding who handles it and whether it is logged as a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Bad input shape or range. Recoverable client-side.
    Validation,
    /// Business-rule rejection against current state
    Precondition,
    /// Not enough gold
    Resource,
    /// Stale version
    Concurrency,
    /// Internal consistency fault. Never committed.
    Invariant,
    /// Unknown aggregate id
    NotFound,
    /// A collaborator failed for reasons other than a refusal
    External,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WarfareError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid unit count {0}: must be positive")]
    InvalidUnitCount(i64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient gold: {needed} needed from {account}")]
    InsufficientGold { account: RulerId, needed: Gold },

    #[error("Insufficient funds in ledger for {account}")]
    InsufficientFunds { account: RulerId },

    #[error("Army {0} is disbanded")]
    ArmyDisbanded(ArmyId),

    #[error("Army {0} cannot disband while in battle")]
    CannotDisbandWhileInBattle(ArmyId),

    #[error("Army {army} cannot move while {status}")]
    ArmyNotMovable { army: ArmyId, status: String },

    #[error("{actor} does not command {what}")]
    NotOwner { actor: RulerId, what: String },

    #[error("Mercenary company {0} is already under contract")]
    CompanyUnavailable(String),

    #[error("No contract with {0} on this army")]
    NoSuchContract(String),

    #[error("Siege cannot be assaulted: {0}")]
    SiegeNotAssaultable(String),

    #[error("Siege already advanced on {0}")]
    SiegeAlreadyAdvanced(Day),

    #[error("Army cannot take part: {0}")]
    ArmyUnavailable(String),

    #[error("{0} are already at war")]
    AlreadyAtWar(String),

    #[error("Truce active until {until}")]
    TruceActive { until: Day },

    #[error("No casus belli given")]
    NoCasusBelli,

    #[error("{0} already participates in this war")]
    DuplicateParticipant(RulerId),

    #[error("War goal already achieved")]
    GoalAlreadyAchieved,

    #[error("War cannot be negotiated: {0}")]
    WarNotNegotiable(String),

    #[error("Invalid territory transfer: {0}")]
    InvalidTerritoryTransfer(String),

    #[error("No peace offer pending")]
    NoPendingOffer,

    #[error("{entity} is already in terminal state {status}")]
    TerminalState { entity: &'static str, status: String },

    #[error("Version conflict on {entity}: expected {expected}, found {found}")]
    VersionConflict {
        entity: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WarfareError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn terminal(entity: &'static str, status: impl std::fmt::Debug) -> Self {
        Self::TerminalState {
            entity,
            status: format!("{status:?}"),
        }
    }

    /// Stable error kind, safe to match on across versions
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::InvalidUnitCount(_) => "InvalidUnitCount",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::InsufficientGold { .. } => "InsufficientGold",
            Self::InsufficientFunds { .. } => "InsufficientFunds",
            Self::ArmyDisbanded(_) => "ArmyDisbanded",
            Self::CannotDisbandWhileInBattle(_) => "CannotDisbandWhileInBattle",
            Self::ArmyNotMovable { .. } => "ArmyNotMovable",
            Self::NotOwner { .. } => "NotOwner",
            Self::CompanyUnavailable(_) => "CompanyUnavailable",
            Self::NoSuchContract(_) => "NoSuchContract",
            Self::SiegeNotAssaultable(_) => "SiegeNotAssaultable",
            Self::SiegeAlreadyAdvanced(_) => "SiegeAlreadyAdvanced",
            Self::ArmyUnavailable(_) => "ArmyUnavailable",
            Self::AlreadyAtWar(_) => "AlreadyAtWar",
            Self::TruceActive { .. } => "TruceActive",
            Self::NoCasusBelli => "NoCasusBelli",
            Self::DuplicateParticipant(_) => "DuplicateParticipant",
            Self::GoalAlreadyAchieved => "GoalAlreadyAchieved",
            Self::WarNotNegotiable(_) => "WarNotNegotiable",
            Self::InvalidTerritoryTransfer(_) => "InvalidTerritoryTransfer",
            Self::NoPendingOffer => "NoPendingOffer",
            Self::TerminalState { .. } => "TerminalState",
            Self::VersionConflict { .. } => "VersionConflict",
            Self::InvariantViolation(_) => "InvariantViolation",
            Self::Collaborator(_) => "Collaborator",
            Self::Config(_) => "Config",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidUnitCount(_) | Self::InvalidRequest(_) | Self::Config(_) => {
                ErrorCategory::Validation
            }
            Self::InsufficientGold { .. } | Self::InsufficientFunds { .. } => {
                ErrorCategory::Resource
            }
            Self::VersionConflict { .. } => ErrorCategory::Concurrency,
            Self::InvariantViolation(_) => ErrorCategory::Invariant,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Collaborator(_) => ErrorCategory::External,
            Self::ArmyDisbanded(_)
            | Self::CannotDisbandWhileInBattle(_)
            | Self::ArmyNotMovable { .. }
            | Self::NotOwner { .. }
            | Self::CompanyUnavailable(_)
            | Self::NoSuchContract(_)
            | Self::SiegeNotAssaultable(_)
            | Self::SiegeAlreadyAdvanced(_)
            | Self::ArmyUnavailable(_)
            | Self::AlreadyAtWar(_)
            | Self::TruceActive { .. }
            | Self::NoCasusBelli
            | Self::DuplicateParticipant(_)
            | Self::GoalAlreadyAchieved
            | Self::WarNotNegotiable(_)
            | Self::InvalidTerritoryTransfer(_)
            | Self::NoPendingOffer
            | Self::TerminalState { .. } => ErrorCategory::Precondition,
        }
    }

    /// Whether the handler may re-read state and try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, WarfareError>;
