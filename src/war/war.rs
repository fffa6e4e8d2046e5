//! The War aggregate: sides, participants, goals and the war-score audit log

use serde::{Deserialize, Serialize};

use crate::core::error::WarfareError;
use crate::core::types::{BattleId, Day, RulerId, Side, SiegeId, TerritoryRef, WarId};
use crate::peace::{PeaceOffer, PeaceTreaty};
use crate::store::Aggregate;

/// `AttackerWinning` and `DefenderWinning` are observations on an active war,
/// not gates. The last three states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarStatus {
    Active,
    AttackerWinning,
    DefenderWinning,
    WhitePeace,
    AttackerVictory,
    DefenderVictory,
}

impl WarStatus {
    pub fn is_ongoing(&self) -> bool {
        match self {
            Self::Active | Self::AttackerWinning | Self::DefenderWinning => true,
            Self::WhitePeace | Self::AttackerVictory | Self::DefenderVictory => false,
        }
    }

    pub fn victory(side: Side) -> Self {
        match side {
            Side::Attacker => Self::AttackerVictory,
            Side::Defender => Self::DefenderVictory,
        }
    }
}

/// Stated justification for a war
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasusBelli {
    None,
    ClaimOnTitle,
    BorderDispute,
    HolyWar,
    Liberation,
    Vengeance,
    Conquest,
}

impl CasusBelli {
    /// Legitimacy the declarer gains or loses by declaring
    pub fn legitimacy_delta(&self) -> i32 {
        match self {
            Self::None => 0,
            Self::ClaimOnTitle => 0,
            Self::BorderDispute => -2,
            Self::HolyWar => 5,
            Self::Liberation => 10,
            Self::Vengeance => -5,
            Self::Conquest => -15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Primary,
    Ally,
    Vassal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarParticipant {
    pub ruler: RulerId,
    pub side: Side,
    pub role: ParticipantRole,
    pub is_war_leader: bool,
    /// War score this participant earned for its side
    pub contribution: f32,
    pub joined_on: Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarGoalKind {
    ConquerTerritory,
    EnforceClaim,
    Humiliate,
    Tribute,
    Independence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarGoal {
    pub kind: WarGoalKind,
    /// Side that pursues the goal
    pub side: Side,
    pub target: Option<TerritoryRef>,
    /// War score awarded once achieved
    pub value: f32,
    /// Only ever flips false -> true
    pub is_achieved: bool,
}

impl WarGoal {
    pub fn new(kind: WarGoalKind, side: Side, value: f32) -> Self {
        Self {
            kind,
            side,
            target: None,
            value,
            is_achieved: false,
        }
    }

    pub fn targeting(mut self, territory: TerritoryRef) -> Self {
        self.target = Some(territory);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScoreReason {
    Battle(BattleId),
    SiegeCaptured(SiegeId),
    SiegeAbandoned(SiegeId),
    WarGoal(usize),
    Adjustment(String),
}

/// One audited change to a side's war score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub day: Day,
    pub side: Side,
    pub requested: f32,
    /// What actually moved after clamping to [0, 100]
    pub applied: f32,
    pub reason: ScoreReason,
    pub contributor: Option<RulerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct War {
    pub id: WarId,
    pub name: String,
    pub casus_belli: CasusBelli,
    pub status: WarStatus,
    pub declared_on: Day,
    pub ended_on: Option<Day>,
    pub participants: Vec<WarParticipant>,
    pub goals: Vec<WarGoal>,
    pub score_log: Vec<ScoreEntry>,
    pub pending_offer: Option<PeaceOffer>,
    pub treaty: Option<PeaceTreaty>,
}

impl War {
    /// Sum of the applied deltas for `side`
    pub fn score(&self, side: Side) -> f32 {
        self.score_log
            .iter()
            .filter(|e| e.side == side)
            .map(|e| e.applied)
            .sum::<f32>()
            .clamp(0.0, 100.0)
    }

    pub fn attacker_score(&self) -> f32 {
        self.score(Side::Attacker)
    }

    pub fn defender_score(&self) -> f32 {
        self.score(Side::Defender)
    }

    pub fn participant(&self, ruler: RulerId) -> Option<&WarParticipant> {
        self.participants.iter().find(|p| p.ruler == ruler)
    }

    pub fn side_of(&self, ruler: RulerId) -> Option<Side> {
        self.participant(ruler).map(|p| p.side)
    }

    pub fn leader(&self, side: Side) -> Option<&WarParticipant> {
        self.participants
            .iter()
            .find(|p| p.side == side && p.is_war_leader)
    }

    /// Side `ruler` leads, if any
    pub fn led_side(&self, ruler: RulerId) -> Option<Side> {
        self.participant(ruler)
            .filter(|p| p.is_war_leader)
            .map(|p| p.side)
    }

    /// Whether `a` and `b` fight on opposite sides
    pub fn opposes(&self, a: RulerId, b: RulerId) -> bool {
        match (self.side_of(a), self.side_of(b)) {
            (Some(x), Some(y)) => x != y,
            _ => false,
        }
    }

    /// Whether `a` and `b` were the two war leaders
    pub fn led_by(&self, a: RulerId, b: RulerId) -> bool {
        matches!(
            (self.led_side(a), self.led_side(b)),
            (Some(x), Some(y)) if x != y
        )
    }

    /// First day the leaders may go to war again
    pub fn truce_until(&self) -> Option<Day> {
        self.treaty
            .as_ref()
            .map(|t| t.signed_at.plus(t.truce_days))
    }

    /// Recompute the observational winning sub-state
    pub(crate) fn refresh_status(&mut self, winning_margin: f32) {
        if !self.status.is_ongoing() {
            return;
        }
        let lead = self.attacker_score() - self.defender_score();
        self.status = if lead >= winning_margin {
            WarStatus::AttackerWinning
        } else if -lead >= winning_margin {
            WarStatus::DefenderWinning
        } else {
            WarStatus::Active
        };
    }
}

impl Aggregate for War {
    type Id = WarId;
    const KIND: &'static str = "war";

    fn id(&self) -> WarId {
        self.id
    }

    fn is_terminal(&self) -> bool {
        !self.status.is_ongoing()
    }

    fn terminal_error(&self) -> WarfareError {
        WarfareError::terminal(Self::KIND, self.status)
    }
}
