//! Command requests and responses
//!
//! A request names the acting ruler, the game day and one command. The
//! response is the updated aggregate snapshot or a structured failure.

use serde::{Deserialize, Serialize};

use crate::army::{Army, UnitType};
use crate::battle::{Battle, BattleType, Terrain, Weather};
use crate::core::error::{ErrorCategory, WarfareError};
use crate::core::types::{ArmyId, BattleId, CompanyId, Day, Location, RulerId, Side, SiegeId, WarId};
use crate::mercenary::ExpiryPolicy;
use crate::peace::{AcceptanceEstimate, PeaceTerms};
use crate::siege::{Defenses, Siege, SiegeEquipment};
use crate::store::{Aggregate, Version, Versioned};
use crate::war::{CasusBelli, ParticipantRole, War, WarGoal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub actor: RulerId,
    pub day: Day,
    /// Version of the target aggregate the caller last saw. A stale version
    /// fails with `VersionConflict` and is not retried.
    #[serde(default)]
    pub expected_version: Option<Version>,
    pub command: Command,
}

impl Request {
    pub fn new(actor: RulerId, day: Day, command: Command) -> Self {
        Self {
            actor,
            day,
            expected_version: None,
            command,
        }
    }

    pub fn expecting(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    // Armies
    RaiseArmy {
        name: String,
        location: Location,
    },
    RecruitUnits {
        army: ArmyId,
        unit_type: UnitType,
        count: i64,
    },
    DisbandArmy {
        army: ArmyId,
    },
    MoveArmy {
        army: ArmyId,
        destination: Location,
    },

    // Mercenaries
    HireMercenaries {
        company: CompanyId,
        contract_days: u32,
        /// Army to join; a new army musters at the company's home if None
        join: Option<ArmyId>,
        policy: ExpiryPolicy,
    },
    ExtendContract {
        army: ArmyId,
        company: CompanyId,
        days: u32,
    },

    // Wars
    DeclareWar {
        defender: RulerId,
        casus_belli: CasusBelli,
        goals: Vec<WarGoal>,
        name: Option<String>,
    },
    AddParticipant {
        war: WarId,
        ruler: RulerId,
        side: Side,
        role: ParticipantRole,
    },
    AchieveWarGoal {
        war: WarId,
        goal: usize,
    },
    /// Score adjustment made by one of the war's leaders
    RecordWarScore {
        war: WarId,
        side: Side,
        amount: f32,
        reason: String,
    },

    // Peace
    OfferPeace {
        war: WarId,
        terms: PeaceTerms,
    },
    AcceptPeace {
        war: WarId,
    },
    CommitPeace {
        war: WarId,
        terms: PeaceTerms,
    },

    // Sieges
    BeginSiege {
        war: WarId,
        army: ArmyId,
        target: Location,
        defenses: Defenses,
    },
    BuildSiegeEquipment {
        siege: SiegeId,
        equipment: SiegeEquipment,
    },
    AdvanceSiegeDay {
        siege: SiegeId,
    },
    LaunchAssault {
        siege: SiegeId,
        army: ArmyId,
    },
    LiftSiege {
        siege: SiegeId,
    },

    // Battles
    StartBattle {
        war: Option<WarId>,
        location: Location,
        battle_type: BattleType,
        terrain: Terrain,
        weather: Weather,
        attackers: Vec<ArmyId>,
        defenders: Vec<ArmyId>,
    },
    ResolveBattleDay {
        battle: BattleId,
    },
}

impl Command {
    /// Kind of the existing aggregate this command mutates, if any
    pub fn target_kind(&self) -> Option<&'static str> {
        match self {
            Self::RecruitUnits { .. }
            | Self::DisbandArmy { .. }
            | Self::MoveArmy { .. }
            | Self::ExtendContract { .. }
            | Self::HireMercenaries { join: Some(_), .. } => Some(Army::KIND),
            Self::AddParticipant { .. }
            | Self::AchieveWarGoal { .. }
            | Self::RecordWarScore { .. }
            | Self::OfferPeace { .. }
            | Self::AcceptPeace { .. }
            | Self::CommitPeace { .. } => Some(War::KIND),
            Self::BuildSiegeEquipment { .. }
            | Self::AdvanceSiegeDay { .. }
            | Self::LaunchAssault { .. }
            | Self::LiftSiege { .. } => Some(Siege::KIND),
            Self::ResolveBattleDay { .. } => Some(Battle::KIND),
            Self::RaiseArmy { .. }
            | Self::HireMercenaries { join: None, .. }
            | Self::DeclareWar { .. }
            | Self::BeginSiege { .. }
            | Self::StartBattle { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RaiseArmy { .. } => "RaiseArmy",
            Self::RecruitUnits { .. } => "RecruitUnits",
            Self::DisbandArmy { .. } => "DisbandArmy",
            Self::MoveArmy { .. } => "MoveArmy",
            Self::HireMercenaries { .. } => "HireMercenaries",
            Self::ExtendContract { .. } => "ExtendContract",
            Self::DeclareWar { .. } => "DeclareWar",
            Self::AddParticipant { .. } => "AddParticipant",
            Self::AchieveWarGoal { .. } => "AchieveWarGoal",
            Self::RecordWarScore { .. } => "RecordWarScore",
            Self::OfferPeace { .. } => "OfferPeace",
            Self::AcceptPeace { .. } => "AcceptPeace",
            Self::CommitPeace { .. } => "CommitPeace",
            Self::BeginSiege { .. } => "BeginSiege",
            Self::BuildSiegeEquipment { .. } => "BuildSiegeEquipment",
            Self::AdvanceSiegeDay { .. } => "AdvanceSiegeDay",
            Self::LaunchAssault { .. } => "LaunchAssault",
            Self::LiftSiege { .. } => "LiftSiege",
            Self::StartBattle { .. } => "StartBattle",
            Self::ResolveBattleDay { .. } => "ResolveBattleDay",
        }
    }
}

/// A failed command as the caller sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&WarfareError> for CommandFailure {
    fn from(error: &WarfareError) -> Self {
        Self {
            code: error.code().to_string(),
            category: error.category(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Army(Versioned<Army>),
    War(Versioned<War>),
    Siege(Versioned<Siege>),
    Battle(Versioned<Battle>),
    PeaceOffered {
        war: Versioned<War>,
        estimate: AcceptanceEstimate,
    },
    Failure(CommandFailure),
}

impl Response {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }

    pub fn failure(&self) -> Option<&CommandFailure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Error code of a failed command
    pub fn code(&self) -> Option<&str> {
        self.failure().map(|f| f.code.as_str())
    }

    pub fn army(&self) -> Option<&Versioned<Army>> {
        match self {
            Self::Army(army) => Some(army),
            _ => None,
        }
    }

    pub fn war(&self) -> Option<&Versioned<War>> {
        match self {
            Self::War(war) | Self::PeaceOffered { war, .. } => Some(war),
            _ => None,
        }
    }

    pub fn siege(&self) -> Option<&Versioned<Siege>> {
        match self {
            Self::Siege(siege) => Some(siege),
            _ => None,
        }
    }

    pub fn battle(&self) -> Option<&Versioned<Battle>> {
        match self {
            Self::Battle(battle) => Some(battle),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kinds() {
        let army = ArmyId::new();
        assert_eq!(Command::DisbandArmy { army }.target_kind(), Some("army"));
        let hire = Command::HireMercenaries {
            company: CompanyId::new(),
            contract_days: 30,
            join: None,
            policy: ExpiryPolicy::AutoDisband,
        };
        assert_eq!(hire.target_kind(), None);
        assert_eq!(
            Command::AcceptPeace { war: WarId::new() }.target_kind(),
            Some("war")
        );
    }

    #[test]
    fn test_failure_carries_stable_code() {
        let failure = CommandFailure::from(&WarfareError::NoPendingOffer);
        assert_eq!(failure.code, "NoPendingOffer");
        assert_eq!(failure.category, ErrorCategory::Precondition);
        let response = Response::Failure(failure);
        assert!(!response.is_ok());
        assert_eq!(response.code(), Some("NoPendingOffer"));
    }

    #[test]
    fn test_request_round_trips_as_json() {
        let request = Request::new(
            RulerId(4),
            Day(12),
            Command::RecruitUnits {
                army: ArmyId::new(),
                unit_type: UnitType::MenAtArms,
                count: 50,
            },
        )
        .expecting(3);
        let json = serde_json::to_string(&request).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back.expected_version, Some(3));
        assert_eq!(back.command.name(), "RecruitUnits");
    }
}
