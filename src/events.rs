//! Domain events and the post-commit outbox
//!
//! Operations never write across aggregate boundaries. They queue events
//! instead; the command handler drains the outbox after the originating
//! transaction commits and hands each event to the reaction layer.

use serde::{Deserialize, Serialize};

use crate::army::unit::UnitType;
use crate::battle::{BattleStatus, ParticipantResult};
use crate::core::types::{
    ArmyId, BattleId, CompanyId, Day, Gold, LocationId, RulerId, Side, SiegeId, TreatyId, WarId,
};
use crate::peace::TreatyType;
use crate::siege::{CaptureCause, SiegeEquipment};
use crate::war::{CasusBelli, ParticipantRole, ScoreReason, WarStatus};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    // Armies
    ArmyRaised { army: ArmyId, commander: RulerId, day: Day },
    UnitsRecruited { army: ArmyId, unit_type: UnitType, count: u32, cost: Gold },
    ArmyDisbanded { army: ArmyId, commander: RulerId, day: Day },
    ArmyMoved { army: ArmyId, destination: LocationId, arrives_on: Day },
    ArmyArrived { army: ArmyId, location: LocationId, day: Day },
    ArmyStarved { army: ArmyId, commander: RulerId, day: Day },
    ArmyDestroyed { army: ArmyId, commander: RulerId, day: Day },
    UpkeepUnpaid { army: ArmyId, commander: RulerId, amount: Gold, day: Day },

    // Mercenaries
    MercenariesHired { army: ArmyId, company: CompanyId, payer: RulerId, expires_on: Day },
    ContractExpiring { army: ArmyId, company: CompanyId, expires_on: Day },
    ContractRenewalDue { army: ArmyId, company: CompanyId, leaves_on: Day },
    ContractExpired { army: ArmyId, company: CompanyId, day: Day },
    CompanyReleased { company: CompanyId, army: ArmyId },

    // Sieges
    SiegeStarted { siege: SiegeId, war: WarId, army: ArmyId, target: LocationId, day: Day },
    SiegeEquipmentBuilt { siege: SiegeId, equipment: SiegeEquipment, count: u32 },
    SiegeDayAdvanced { siege: SiegeId, day: Day, fortification: f32, garrison_morale: f32 },
    SiegeBreached { siege: SiegeId, day: Day },
    AssaultResolved {
        siege: SiegeId,
        army: ArmyId,
        success: bool,
        attacker_losses: u32,
        morale_loss: f32,
        day: Day,
    },
    SiegeCaptured {
        siege: SiegeId,
        war: WarId,
        side: Side,
        army: ArmyId,
        commander: RulerId,
        score: f32,
        cause: CaptureCause,
        day: Day,
    },
    SiegeLifted { siege: SiegeId, army: ArmyId, day: Day },
    SiegeAbandoned { siege: SiegeId, war: WarId, side: Side, score: f32, day: Day },

    // Battles
    BattleStarted { battle: BattleId, war: Option<WarId>, armies: Vec<ArmyId>, day: Day },
    BattleDayResolved {
        battle: BattleId,
        battle_day: u32,
        attacker_casualties: u32,
        defender_casualties: u32,
    },
    BattleEnded {
        battle: BattleId,
        war: Option<WarId>,
        status: BattleStatus,
        /// Winning side in war terms
        winner: Option<Side>,
        war_score: f32,
        results: Vec<ParticipantResult>,
        day: Day,
    },

    // Wars
    WarDeclared {
        war: WarId,
        attacker: RulerId,
        defender: RulerId,
        casus_belli: CasusBelli,
        day: Day,
    },
    ParticipantJoined { war: WarId, ruler: RulerId, side: Side, role: ParticipantRole },
    WarGoalAchieved { war: WarId, goal: usize, side: Side },
    WarScoreChanged {
        war: WarId,
        side: Side,
        requested: f32,
        applied: f32,
        attacker_score: f32,
        defender_score: f32,
        reason: ScoreReason,
    },
    PeaceOffered { war: WarId, from: Side, acceptance: i32 },
    PeaceSigned {
        war: WarId,
        treaty: TreatyId,
        treaty_type: TreatyType,
        winner: Option<Side>,
        day: Day,
    },
    WarEnded { war: WarId, status: WarStatus, day: Day },
}

impl DomainEvent {
    /// Stable event type name for publishing
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ArmyRaised { .. } => "ArmyRaised",
            Self::UnitsRecruited { .. } => "UnitsRecruited",
            Self::ArmyDisbanded { .. } => "ArmyDisbanded",
            Self::ArmyMoved { .. } => "ArmyMoved",
            Self::ArmyArrived { .. } => "ArmyArrived",
            Self::ArmyStarved { .. } => "ArmyStarved",
            Self::ArmyDestroyed { .. } => "ArmyDestroyed",
            Self::UpkeepUnpaid { .. } => "UpkeepUnpaid",
            Self::MercenariesHired { .. } => "MercenariesHired",
            Self::ContractExpiring { .. } => "ContractExpiring",
            Self::ContractRenewalDue { .. } => "ContractRenewalDue",
            Self::ContractExpired { .. } => "ContractExpired",
            Self::CompanyReleased { .. } => "CompanyReleased",
            Self::SiegeStarted { .. } => "SiegeStarted",
            Self::SiegeEquipmentBuilt { .. } => "SiegeEquipmentBuilt",
            Self::SiegeDayAdvanced { .. } => "SiegeDayAdvanced",
            Self::SiegeBreached { .. } => "SiegeBreached",
            Self::AssaultResolved { .. } => "AssaultResolved",
            Self::SiegeCaptured { .. } => "SiegeCaptured",
            Self::SiegeLifted { .. } => "SiegeLifted",
            Self::SiegeAbandoned { .. } => "SiegeAbandoned",
            Self::BattleStarted { .. } => "BattleStarted",
            Self::BattleDayResolved { .. } => "BattleDayResolved",
            Self::BattleEnded { .. } => "BattleEnded",
            Self::WarDeclared { .. } => "WarDeclared",
            Self::ParticipantJoined { .. } => "ParticipantJoined",
            Self::WarGoalAchieved { .. } => "WarGoalAchieved",
            Self::WarScoreChanged { .. } => "WarScoreChanged",
            Self::PeaceOffered { .. } => "PeaceOffered",
            Self::PeaceSigned { .. } => "PeaceSigned",
            Self::WarEnded { .. } => "WarEnded",
        }
    }

    /// JSON payload handed to the publisher
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Events queued by a command, in emission order
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    events: Vec<DomainEvent>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = DomainEvent>) {
        self.events.extend(events);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainEvent> {
        self.events.iter()
    }

    pub fn take(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_preserves_order() {
        let mut outbox = Outbox::new();
        let army = ArmyId::new();
        outbox.push(DomainEvent::ArmyRaised {
            army,
            commander: RulerId(1),
            day: Day(0),
        });
        outbox.push(DomainEvent::ArmyDisbanded {
            army,
            commander: RulerId(1),
            day: Day(1),
        });
        let events = outbox.take();
        assert_eq!(events[0].event_type(), "ArmyRaised");
        assert_eq!(events[1].event_type(), "ArmyDisbanded");
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_payload_is_tagged_json() {
        let event = DomainEvent::SiegeBreached {
            siege: SiegeId::new(),
            day: Day(3),
        };
        let payload = event.payload();
        assert!(payload.get("SiegeBreached").is_some());
    }
}
