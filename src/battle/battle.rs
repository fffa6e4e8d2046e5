//! Field battle resolution
//!
//! A battle is fought one day at a time using a symmetric model: each side's
//! casualties are proportional to the other side's effective attack. Phases
//! advance Engagement -> Melee -> Pursuit -> Aftermath, one per day, unless a
//! side routs and the battle skips straight to Pursuit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::terrain::{Terrain, Weather};
use crate::army::army::split_proportionally;
use crate::army::Army;
use crate::core::config::BattleConfig;
use crate::core::error::{Result, WarfareError};
use crate::core::types::{ArmyId, BattleId, Day, Location, RulerId, Side, WarId};
use crate::events::DomainEvent;
use crate::store::Aggregate;
use crate::war::War;

/// Absorbs float noise before casualties are floored
const CASUALTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleStatus {
    Ongoing,
    AttackerVictory,
    DefenderVictory,
    Draw,
    Inconclusive,
}

impl BattleStatus {
    pub fn winner(&self) -> Option<Side> {
        match self {
            Self::AttackerVictory => Some(Side::Attacker),
            Self::DefenderVictory => Some(Side::Defender),
            Self::Ongoing | Self::Draw | Self::Inconclusive => None,
        }
    }

    fn victory(side: Side) -> Self {
        match side {
            Side::Attacker => Self::AttackerVictory,
            Side::Defender => Self::DefenderVictory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BattlePhase {
    Engagement,
    Melee,
    Pursuit,
    Aftermath,
}

impl BattlePhase {
    /// Casualty multiplier for a day fought in this phase
    pub fn intensity(&self) -> f64 {
        match self {
            Self::Engagement => 0.6,
            Self::Melee => 1.0,
            Self::Pursuit => 1.5,
            Self::Aftermath => 0.0,
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::Engagement => Self::Melee,
            Self::Melee => Self::Pursuit,
            Self::Pursuit | Self::Aftermath => Self::Aftermath,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BattleType {
    #[default]
    Pitched,
    Ambush,
    Raid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantOutcome {
    Victory,
    Defeat,
    Routed,
    Withdrew,
}

/// An army's stake in a battle, snapshotted when the battle starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleParticipant {
    pub army: ArmyId,
    pub commander: RulerId,
    pub side: Side,
    pub troops_committed: u32,
    pub casualties: u32,
    pub attack: f32,
    /// Average per-soldier defense
    pub defense: f32,
    pub morale_at_start: f32,
    pub morale_at_end: Option<f32>,
    pub outcome: Option<ParticipantOutcome>,
}

impl BattleParticipant {
    pub fn remaining(&self) -> u32 {
        self.troops_committed - self.casualties
    }

    fn effective_attack(&self) -> f64 {
        if self.troops_committed == 0 {
            return 0.0;
        }
        let share = f64::from(self.remaining()) / f64::from(self.troops_committed);
        f64::from(self.attack) * share * (0.5 + f64::from(self.morale_at_start) / 200.0)
    }
}

/// What a battle did to one army, applied to the army after the battle ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantResult {
    pub army: ArmyId,
    pub commander: RulerId,
    pub side: Side,
    pub troops_committed: u32,
    pub casualties: u32,
    pub morale_loss: f32,
    pub outcome: ParticipantOutcome,
}

/// Ties a battle to a war. `attacker_side` is the war side the battle's
/// attackers fight for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleWar {
    pub war: WarId,
    pub attacker_side: Side,
}

impl BattleWar {
    pub fn war_side(&self, battle_side: Side) -> Side {
        match battle_side {
            Side::Attacker => self.attacker_side,
            Side::Defender => self.attacker_side.opposite(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleLogEntry {
    pub battle_day: u32,
    pub phase: BattlePhase,
    pub attacker_casualties: u32,
    pub defender_casualties: u32,
    pub attacker_remaining: u32,
    pub defender_remaining: u32,
    pub routed: Option<Side>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Battle {
    pub id: BattleId,
    pub war: Option<BattleWar>,
    pub location: Location,
    pub battle_type: BattleType,
    pub terrain: Terrain,
    pub weather: Weather,
    pub status: BattleStatus,
    pub phase: BattlePhase,
    /// Battle days fought so far
    pub day: u32,
    pub started_on: Day,
    pub ended_on: Option<Day>,
    pub attacker_troops_start: u32,
    pub defender_troops_start: u32,
    pub attacker_casualties: u32,
    pub defender_casualties: u32,
    pub terrain_modifiers: BTreeMap<Side, f32>,
    pub weather_modifiers: BTreeMap<Side, f32>,
    /// Side that broke and is being pursued
    pub routed: Option<Side>,
    pub participants: Vec<BattleParticipant>,
    pub log: Vec<BattleLogEntry>,
}

/// Everything needed to open a battle
#[derive(Debug, Clone)]
pub struct BattleSetup<'a> {
    pub war: Option<&'a War>,
    pub location: Location,
    pub battle_type: BattleType,
    pub terrain: Terrain,
    pub weather: Weather,
    pub attackers: &'a [Army],
    pub defenders: &'a [Army],
}

impl Battle {
    /// Snapshot the armies into participants and open the battle
    pub fn start(setup: BattleSetup<'_>, actor: RulerId, day: Day) -> Result<(Self, DomainEvent)> {
        if setup.attackers.is_empty() || setup.defenders.is_empty() {
            return Err(WarfareError::InvalidRequest(
                "a battle needs armies on both sides".into(),
            ));
        }
        if !setup.attackers.iter().any(|a| a.commander == actor) {
            return Err(WarfareError::NotOwner {
                actor,
                what: "any attacking army".into(),
            });
        }

        let mut seen = Vec::new();
        for army in setup.attackers.iter().chain(setup.defenders) {
            if seen.contains(&army.id) {
                return Err(WarfareError::InvalidRequest(format!(
                    "army '{}' listed twice",
                    army.name
                )));
            }
            seen.push(army.id);
            army.ensure_active()?;
            if !army.status.can_engage() {
                return Err(WarfareError::ArmyUnavailable(format!(
                    "army '{}' is {:?}",
                    army.name, army.status
                )));
            }
            if army.troop_count() == 0 {
                return Err(WarfareError::ArmyUnavailable(format!(
                    "army '{}' has no troops",
                    army.name
                )));
            }
        }

        let war = match setup.war {
            Some(war) => Some(Self::war_sides(war, setup.attackers, setup.defenders)?),
            None => None,
        };

        let mut participants = Vec::new();
        for (side, armies) in [
            (Side::Attacker, setup.attackers),
            (Side::Defender, setup.defenders),
        ] {
            participants.extend(armies.iter().map(|army| BattleParticipant {
                army: army.id,
                commander: army.commander,
                side,
                troops_committed: army.troop_count(),
                casualties: 0,
                attack: army.total_attack(),
                defense: army.average_defense(),
                morale_at_start: army.morale,
                morale_at_end: None,
                outcome: None,
            }));
        }
        let start = |side: Side| -> u32 {
            participants
                .iter()
                .filter(|p| p.side == side)
                .map(|p| p.troops_committed)
                .sum()
        };
        let attacker_troops_start = start(Side::Attacker);
        let defender_troops_start = start(Side::Defender);

        let terrain_modifiers = [
            (Side::Attacker, setup.terrain.modifier(false)),
            (Side::Defender, setup.terrain.modifier(true)),
        ]
        .into_iter()
        .collect();
        let weather_factor = setup.weather.combat_modifier();
        let weather_modifiers = [(Side::Attacker, weather_factor), (Side::Defender, weather_factor)]
            .into_iter()
            .collect();

        let battle = Battle {
            id: BattleId::new(),
            war,
            location: setup.location,
            battle_type: setup.battle_type,
            terrain: setup.terrain,
            weather: setup.weather,
            status: BattleStatus::Ongoing,
            phase: BattlePhase::Engagement,
            day: 0,
            started_on: day,
            ended_on: None,
            attacker_troops_start,
            defender_troops_start,
            attacker_casualties: 0,
            defender_casualties: 0,
            terrain_modifiers,
            weather_modifiers,
            routed: None,
            participants,
            log: Vec::new(),
        };
        tracing::info!(
            battle = %battle.id,
            location = %battle.location.name,
            attackers = battle.attacker_troops_start,
            defenders = battle.defender_troops_start,
            "battle started"
        );
        let event = DomainEvent::BattleStarted {
            battle: battle.id,
            war: battle.war.map(|w| w.war),
            armies: battle.participants.iter().map(|p| p.army).collect(),
            day,
        };
        Ok((battle, event))
    }

    fn war_sides(war: &War, attackers: &[Army], defenders: &[Army]) -> Result<BattleWar> {
        if !war.status.is_ongoing() {
            return Err(WarfareError::terminal("war", war.status));
        }
        let side_of = |army: &Army| {
            war.side_of(army.commander).ok_or_else(|| {
                WarfareError::ArmyUnavailable(format!(
                    "army '{}' does not fight in this war",
                    army.name
                ))
            })
        };
        let attacker_side = side_of(&attackers[0])?;
        for army in attackers {
            if side_of(army)? != attacker_side {
                return Err(WarfareError::InvalidRequest(
                    "attacking armies belong to different war sides".into(),
                ));
            }
        }
        for army in defenders {
            if side_of(army)? != attacker_side.opposite() {
                return Err(WarfareError::InvalidRequest(
                    "defending armies must belong to the opposing war side".into(),
                ));
            }
        }
        Ok(BattleWar {
            war: war.id,
            attacker_side,
        })
    }

    pub fn troops_start(&self, side: Side) -> u32 {
        match side {
            Side::Attacker => self.attacker_troops_start,
            Side::Defender => self.defender_troops_start,
        }
    }

    pub fn casualties(&self, side: Side) -> u32 {
        match side {
            Side::Attacker => self.attacker_casualties,
            Side::Defender => self.defender_casualties,
        }
    }

    pub fn remaining(&self, side: Side) -> u32 {
        self.troops_start(side) - self.casualties(side)
    }

    fn loss_rate(&self, side: Side) -> f64 {
        let start = self.troops_start(side);
        if start == 0 {
            return 0.0;
        }
        f64::from(self.casualties(side)) / f64::from(start)
    }

    /// Side strength after morale, losses, ground and weather
    pub fn effective_attack(&self, side: Side) -> f64 {
        let base: f64 = self
            .participants
            .iter()
            .filter(|p| p.side == side)
            .map(|p| p.effective_attack())
            .sum();
        let terrain = self.terrain_modifiers.get(&side).copied().unwrap_or(1.0);
        let weather = self.weather_modifiers.get(&side).copied().unwrap_or(1.0);
        base * f64::from(terrain) * f64::from(weather)
    }

    /// Casualties `side` suffers from its opponent in `phase`
    fn casualties_against(&self, side: Side, phase: BattlePhase, config: &BattleConfig) -> u32 {
        let incoming = self.effective_attack(side.opposite());
        let mitigation = 1.0 + self.average_defense(side) * f64::from(config.defense_mitigation);
        let raw = incoming * f64::from(config.casualty_rate) * phase.intensity() / mitigation;
        let raw = (raw + CASUALTY_EPSILON).floor().max(0.0);
        (raw.min(f64::from(u32::MAX)) as u32).min(self.remaining(side))
    }

    /// Per-soldier defense of the soldiers a side still has standing
    fn average_defense(&self, side: Side) -> f64 {
        let (weighted, troops) = self
            .participants
            .iter()
            .filter(|p| p.side == side)
            .fold((0.0, 0.0), |(w, t), p| {
                let remaining = f64::from(p.remaining());
                (w + f64::from(p.defense) * remaining, t + remaining)
            });
        if troops == 0.0 {
            return 0.0;
        }
        weighted / troops
    }

    fn distribute(&mut self, side: Side, losses: u32) {
        let weights: Vec<u32> = self
            .participants
            .iter()
            .map(|p| if p.side == side { p.remaining() } else { 0 })
            .collect();
        for (p, share) in self
            .participants
            .iter_mut()
            .zip(split_proportionally(losses, &weights))
        {
            p.casualties += share;
        }
        match side {
            Side::Attacker => self.attacker_casualties += losses,
            Side::Defender => self.defender_casualties += losses,
        }
    }

    fn rout_check(&self, side: Side, config: &BattleConfig) -> bool {
        let start = self.troops_start(side);
        let remaining = self.remaining(side);
        remaining > 0 && f64::from(remaining) < f64::from(start) * f64::from(config.rout_threshold)
    }

    /// Every soldier is either still standing or counted as a casualty
    pub fn verify_accounting(&self) -> Result<()> {
        for side in [Side::Attacker, Side::Defender] {
            let members: Vec<_> = self.participants.iter().filter(|p| p.side == side).collect();
            let committed: u32 = members.iter().map(|p| p.troops_committed).sum();
            let lost: u32 = members.iter().map(|p| p.casualties).sum();
            if committed != self.troops_start(side)
                || lost != self.casualties(side)
                || self.casualties(side) > self.troops_start(side)
            {
                return Err(WarfareError::InvariantViolation(format!(
                    "battle {} {side:?} troops unaccounted: start {} casualties {}",
                    self.id,
                    self.troops_start(side),
                    self.casualties(side)
                )));
            }
        }
        Ok(())
    }

    /// Fight one battle day
    pub fn resolve_day(&mut self, day: Day, config: &BattleConfig) -> Result<Vec<DomainEvent>> {
        if self.status != BattleStatus::Ongoing {
            return Err(WarfareError::terminal(Self::KIND, self.status));
        }
        let phase = self.phase;
        self.day += 1;

        let (attacker_losses, defender_losses) = match self.routed {
            // Only the broken side bleeds during a pursuit
            Some(Side::Attacker) => (self.casualties_against(Side::Attacker, phase, config), 0),
            Some(Side::Defender) => (0, self.casualties_against(Side::Defender, phase, config)),
            None => (
                self.casualties_against(Side::Attacker, phase, config),
                self.casualties_against(Side::Defender, phase, config),
            ),
        };
        self.distribute(Side::Attacker, attacker_losses);
        self.distribute(Side::Defender, defender_losses);
        self.verify_accounting()?;

        let newly_routed = if self.routed.is_none() {
            match (
                self.rout_check(Side::Attacker, config),
                self.rout_check(Side::Defender, config),
            ) {
                (true, false) => Some(Side::Attacker),
                (false, true) => Some(Side::Defender),
                _ => None,
            }
        } else {
            None
        };

        self.log.push(BattleLogEntry {
            battle_day: self.day,
            phase,
            attacker_casualties: attacker_losses,
            defender_casualties: defender_losses,
            attacker_remaining: self.remaining(Side::Attacker),
            defender_remaining: self.remaining(Side::Defender),
            routed: newly_routed,
        });
        tracing::debug!(
            battle = %self.id,
            day = self.day,
            ?phase,
            attacker_losses,
            defender_losses,
            "battle day resolved"
        );

        let mut events = vec![DomainEvent::BattleDayResolved {
            battle: self.id,
            battle_day: self.day,
            attacker_casualties: attacker_losses,
            defender_casualties: defender_losses,
        }];

        let attacker_left = self.remaining(Side::Attacker);
        let defender_left = self.remaining(Side::Defender);
        let outcome = if attacker_left == 0 && defender_left == 0 {
            Some(BattleStatus::Draw)
        } else if attacker_left == 0 {
            Some(BattleStatus::DefenderVictory)
        } else if defender_left == 0 {
            Some(BattleStatus::AttackerVictory)
        } else if let Some(routed) = self.routed {
            Some(BattleStatus::victory(routed.opposite()))
        } else if let Some(routed) = newly_routed {
            if phase >= BattlePhase::Pursuit {
                Some(BattleStatus::victory(routed.opposite()))
            } else {
                tracing::info!(battle = %self.id, side = ?routed, "side routed");
                self.routed = Some(routed);
                self.phase = BattlePhase::Pursuit;
                None
            }
        } else if phase.next() == BattlePhase::Aftermath {
            Some(self.judge(config))
        } else {
            self.phase = phase.next();
            None
        };

        if newly_routed.is_some() && self.routed.is_none() {
            self.routed = newly_routed;
        }
        if let Some(status) = outcome {
            events.push(self.conclude(status, day, config));
        }
        Ok(events)
    }

    /// Outcome of a battle fought to the end without a rout
    fn judge(&self, config: &BattleConfig) -> BattleStatus {
        let attacker = self.loss_rate(Side::Attacker);
        let defender = self.loss_rate(Side::Defender);
        let margin = f64::from(config.decisive_margin);
        if defender - attacker > margin {
            BattleStatus::AttackerVictory
        } else if attacker - defender > margin {
            BattleStatus::DefenderVictory
        } else if attacker.min(defender) >= f64::from(config.inconclusive_loss_rate) {
            BattleStatus::Draw
        } else {
            BattleStatus::Inconclusive
        }
    }

    fn conclude(&mut self, status: BattleStatus, day: Day, config: &BattleConfig) -> DomainEvent {
        self.status = status;
        self.phase = BattlePhase::Aftermath;
        self.ended_on = Some(day);
        let winner = status.winner();
        let routed = self.routed;

        let mut results = Vec::with_capacity(self.participants.len());
        for p in &mut self.participants {
            let outcome = match winner {
                Some(side) if side == p.side => ParticipantOutcome::Victory,
                Some(_) if routed == Some(p.side) => ParticipantOutcome::Routed,
                Some(_) => ParticipantOutcome::Defeat,
                None => ParticipantOutcome::Withdrew,
            };
            let rate = if p.troops_committed == 0 {
                0.0
            } else {
                p.casualties as f32 / p.troops_committed as f32
            };
            let mut morale_loss = rate * config.morale_loss_per_casualty_rate;
            if outcome == ParticipantOutcome::Victory {
                morale_loss *= config.victor_morale_factor;
            }
            p.outcome = Some(outcome);
            p.morale_at_end = Some((p.morale_at_start - morale_loss).clamp(0.0, 100.0));
            results.push(ParticipantResult {
                army: p.army,
                commander: p.commander,
                side: p.side,
                troops_committed: p.troops_committed,
                casualties: p.casualties,
                morale_loss,
                outcome,
            });
        }

        let war_score = match winner {
            Some(side) => {
                let enemy_losses = self.casualties(side.opposite()) as f32;
                (config.base_score + enemy_losses / config.casualties_per_point).min(config.max_score)
            }
            None => 0.0,
        };
        tracing::info!(
            battle = %self.id,
            ?status,
            attacker_casualties = self.attacker_casualties,
            defender_casualties = self.defender_casualties,
            "battle ended"
        );
        DomainEvent::BattleEnded {
            battle: self.id,
            war: self.war.map(|w| w.war),
            status,
            winner: match (winner, self.war) {
                (Some(side), Some(war)) => Some(war.war_side(side)),
                _ => None,
            },
            war_score,
            results,
            day,
        }
    }
}

impl Aggregate for Battle {
    type Id = BattleId;
    const KIND: &'static str = "battle";

    fn id(&self) -> BattleId {
        self.id
    }

    fn is_terminal(&self) -> bool {
        self.status != BattleStatus::Ongoing
    }

    fn terminal_error(&self) -> WarfareError {
        WarfareError::terminal(Self::KIND, self.status)
    }
}
