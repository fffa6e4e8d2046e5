//! The Siege aggregate and its resolver
//!
//! A siege wears down a location's walls and starves its garrison one day at
//! a time. It ends when the place falls (assault, walls down, surrender), when
//! the besieger withdraws, or when the besieging army is lost.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::equipment::SiegeEquipment;
use crate::army::{Army, ArmyStatus};
use crate::collaborators::{charge, Treasury};
use crate::core::config::SiegeConfig;
use crate::core::error::{Result, WarfareError};
use crate::core::types::{ArmyId, Day, Location, LocationKind, RulerId, Side, SiegeId, WarId};
use crate::events::DomainEvent;
use crate::store::Aggregate;
use crate::war::War;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiegeStatus {
    Active,
    /// Only held while an assault resolves; never committed
    Assault,
    Breached,
    Captured,
    Lifted,
    Abandoned,
}

impl SiegeStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Captured | Self::Lifted | Self::Abandoned => true,
            Self::Active | Self::Assault | Self::Breached => false,
        }
    }
}

/// How a besieged place fell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureCause {
    Assault,
    WallsFell,
    Surrender,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SiegeLogEvent {
    Began,
    EquipmentBuilt(SiegeEquipment),
    DayAdvanced,
    Breached,
    Assault { success: bool, chance: f32, roll: f32 },
    Captured(CaptureCause),
    Lifted,
    Abandoned,
}

/// One audit line. Deltas are exactly what the entry changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiegeLogEntry {
    pub day: Day,
    pub event: SiegeLogEvent,
    pub fortification_delta: f32,
    pub supplies_delta: f32,
    pub morale_delta: f32,
    pub garrison_delta: i64,
    pub attacker_losses: u32,
}

impl SiegeLogEntry {
    fn note(day: Day, event: SiegeLogEvent) -> Self {
        Self {
            day,
            event,
            fortification_delta: 0.0,
            supplies_delta: 0.0,
            morale_delta: 0.0,
            garrison_delta: 0,
            attacker_losses: 0,
        }
    }
}

/// Starting state of the besieged place
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Defenses {
    pub fortification: f32,
    pub garrison_strength: u32,
    pub garrison_supplies: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Siege {
    pub id: SiegeId,
    pub war: WarId,
    /// War side of the besieger
    pub side: Side,
    pub besieger: ArmyId,
    pub besieger_commander: RulerId,
    pub target: Location,
    pub status: SiegeStatus,
    pub fortification: f32,     // 0 - 100
    pub garrison_strength: u32, // Soldiers on the walls
    pub garrison_morale: f32,   // 0 - 100
    pub supplies: f32,          // 0 - 100
    pub days_besieged: u32,
    /// In-game day of the last advance; a siege advances at most once a day
    #[serde(default)]
    pub last_advanced: Option<Day>,
    /// Sticky once set
    pub has_breach: bool,
    pub equipment: BTreeMap<SiegeEquipment, u32>,
    pub log: Vec<SiegeLogEntry>,
    pub started_on: Day,
    pub ended_on: Option<Day>,
}

/// Open a siege of `target` by `army` in the name of its side of `war`
pub fn begin_siege(
    war: &War,
    army: &Army,
    actor: RulerId,
    target: Location,
    defenses: Defenses,
    day: Day,
) -> Result<(Siege, DomainEvent)> {
    army.ensure_active()?;
    army.ensure_commander(actor)?;
    if !war.status.is_ongoing() {
        return Err(WarfareError::terminal("war", war.status));
    }
    let side = war.side_of(army.commander).ok_or_else(|| {
        WarfareError::ArmyUnavailable(format!("{} is not a participant of this war", army.commander))
    })?;
    if !army.status.can_engage() || army.status == ArmyStatus::Marching {
        return Err(WarfareError::ArmyUnavailable(format!(
            "army is {:?}",
            army.status
        )));
    }
    if army.troop_count() == 0 {
        return Err(WarfareError::ArmyUnavailable("army has no troops".into()));
    }
    if !(0.0..=100.0).contains(&defenses.fortification)
        || !(0.0..=100.0).contains(&defenses.garrison_supplies)
    {
        return Err(WarfareError::InvalidRequest(
            "fortification and supplies must lie in [0, 100]".into(),
        ));
    }

    let siege = Siege {
        id: SiegeId::new(),
        war: war.id,
        side,
        besieger: army.id,
        besieger_commander: army.commander,
        target,
        status: SiegeStatus::Active,
        fortification: defenses.fortification,
        garrison_strength: defenses.garrison_strength,
        garrison_morale: 100.0,
        supplies: defenses.garrison_supplies,
        days_besieged: 0,
        last_advanced: None,
        has_breach: false,
        equipment: BTreeMap::new(),
        log: vec![SiegeLogEntry::note(day, SiegeLogEvent::Began)],
        started_on: day,
        ended_on: None,
    };
    tracing::info!(siege = %siege.id, army = %army.id, target = %siege.target.name, "siege begun");
    let event = DomainEvent::SiegeStarted {
        siege: siege.id,
        war: war.id,
        army: army.id,
        target: siege.target.id,
        day,
    };
    Ok((siege, event))
}

impl Siege {
    pub fn equipment_count(&self, kind: SiegeEquipment) -> u32 {
        self.equipment.get(&kind).copied().unwrap_or(0)
    }

    /// Fortification damage all engines deal in one day
    pub fn daily_damage(&self) -> f32 {
        self.equipment
            .iter()
            .map(|(kind, count)| kind.daily_damage() * *count as f32)
            .sum()
    }

    /// Breaches halve the effective walls; each tower takes off a flat amount
    pub fn assault_difficulty(&self) -> f32 {
        let walls = if self.has_breach {
            self.fortification * 0.5
        } else {
            self.fortification
        };
        let towers: f32 = self
            .equipment
            .iter()
            .map(|(kind, count)| kind.assault_bonus() * *count as f32)
            .sum();
        (walls - towers).max(0.0)
    }

    pub fn can_assault(&self, config: &SiegeConfig) -> bool {
        matches!(self.status, SiegeStatus::Active | SiegeStatus::Breached)
            && (self.has_breach || self.assault_difficulty() < config.assault_threshold)
    }

    /// Chance that an assault by `army` carries the walls
    pub fn assault_chance(&self, army: &Army) -> f32 {
        let attack = army.total_attack() * (0.5 + army.morale / 200.0);
        let defense = self.garrison_strength as f32 * (1.0 + self.fortification / 50.0);
        if attack + defense <= 0.0 {
            return 0.05;
        }
        (attack / (attack + defense)).clamp(0.05, 0.95)
    }

    pub fn ensure_besieger(&self, actor: RulerId) -> Result<()> {
        if actor != self.besieger_commander {
            return Err(WarfareError::NotOwner {
                actor,
                what: format!("the siege of {}", self.target.name),
            });
        }
        Ok(())
    }

    fn capture_score(&self, config: &SiegeConfig) -> f32 {
        match self.target.kind {
            LocationKind::Castle => config.capture_score.castle,
            LocationKind::Town => config.capture_score.town,
            LocationKind::Village => config.capture_score.village,
        }
    }

    fn capture(&mut self, cause: CaptureCause, day: Day, config: &SiegeConfig) -> DomainEvent {
        self.status = SiegeStatus::Captured;
        self.ended_on = Some(day);
        self.log.push(SiegeLogEntry::note(day, SiegeLogEvent::Captured(cause)));
        tracing::info!(siege = %self.id, target = %self.target.name, ?cause, "siege captured");
        DomainEvent::SiegeCaptured {
            siege: self.id,
            war: self.war,
            side: self.side,
            army: self.besieger,
            commander: self.besieger_commander,
            score: self.capture_score(config),
            cause,
            day,
        }
    }

    /// Reject a second advance on `day` or on an earlier day
    pub fn ensure_not_advanced(&self, day: Day) -> Result<()> {
        match self.last_advanced {
            Some(last) if last >= day => Err(WarfareError::SiegeAlreadyAdvanced(last)),
            _ => Ok(()),
        }
    }

    /// One day of siege: engines batter the walls, the garrison eats, and a
    /// starving garrison loses heart. Walls are checked before morale.
    ///
    /// A second call for a day already advanced does nothing.
    pub fn advance_day(&mut self, day: Day, config: &SiegeConfig) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        if !matches!(self.status, SiegeStatus::Active | SiegeStatus::Breached)
            || self.ensure_not_advanced(day).is_err()
        {
            return events;
        }
        self.last_advanced = Some(day);
        self.days_besieged += 1;

        let fortification = (self.fortification - self.daily_damage()).max(0.0);
        let supplies = (self.supplies - config.garrison_daily_consumption).max(0.0);
        let morale = if supplies <= 0.0 {
            (self.garrison_morale - config.starvation_morale_penalty).max(0.0)
        } else {
            self.garrison_morale
        };

        self.log.push(SiegeLogEntry {
            fortification_delta: fortification - self.fortification,
            supplies_delta: supplies - self.supplies,
            morale_delta: morale - self.garrison_morale,
            ..SiegeLogEntry::note(day, SiegeLogEvent::DayAdvanced)
        });
        self.fortification = fortification;
        self.supplies = supplies;
        self.garrison_morale = morale;
        tracing::debug!(
            siege = %self.id,
            fortification,
            supplies,
            morale,
            "siege day advanced"
        );
        events.push(DomainEvent::SiegeDayAdvanced {
            siege: self.id,
            day,
            fortification,
            garrison_morale: morale,
        });

        if !self.has_breach && self.fortification < config.breach_threshold {
            self.has_breach = true;
            self.status = SiegeStatus::Breached;
            self.log.push(SiegeLogEntry::note(day, SiegeLogEvent::Breached));
            tracing::info!(siege = %self.id, "walls breached");
            events.push(DomainEvent::SiegeBreached { siege: self.id, day });
        }

        if self.fortification <= 0.0 {
            events.push(self.capture(CaptureCause::WallsFell, day, config));
        } else if self.garrison_morale <= 0.0 {
            events.push(self.capture(CaptureCause::Surrender, day, config));
        }

        events
    }

    /// Storm the walls with `army`.
    ///
    /// The roll is drawn from a generator seeded by `seed`, the siege id and
    /// the siege's history, so the same state always rolls the same way.
    pub fn launch_assault(
        &mut self,
        actor: RulerId,
        army: &Army,
        day: Day,
        config: &SiegeConfig,
        seed: u64,
    ) -> Result<Vec<DomainEvent>> {
        army.ensure_active()?;
        army.ensure_commander(actor)?;
        if army.status == ArmyStatus::InBattle {
            return Err(WarfareError::ArmyUnavailable(format!(
                "army '{}' is fighting a battle",
                army.name
            )));
        }
        if army.id != self.besieger && army.location.id != self.target.id {
            return Err(WarfareError::ArmyUnavailable(format!(
                "army '{}' is not at {}",
                army.name, self.target.name
            )));
        }
        if army.troop_count() == 0 {
            return Err(WarfareError::ArmyUnavailable("army has no troops".into()));
        }
        if !self.can_assault(config) {
            return Err(WarfareError::SiegeNotAssaultable(format!(
                "status {:?}, difficulty {:.1}",
                self.status,
                self.assault_difficulty()
            )));
        }

        let resume = self.status;
        self.status = SiegeStatus::Assault;

        let chance = self.assault_chance(army);
        let mut rng = ChaCha8Rng::seed_from_u64(
            seed ^ self.id.seed_bits()
                ^ u64::from(self.days_besieged).wrapping_mul(0x9E37_79B9_7F4A_7C15)
                ^ (self.log.len() as u64).rotate_left(32),
        );
        let roll: f32 = rng.gen();
        let success = roll < chance;
        let troops = army.troop_count();

        let mut events = Vec::new();
        let (loss_rate, morale_loss) = if success {
            (config.assault_success_losses, 0.0)
        } else {
            let (lo, hi) = config.assault_failure_losses;
            (rng.gen_range(lo..=hi), config.assault_morale_penalty)
        };
        let attacker_losses = ((troops as f32 * loss_rate).floor() as u32).min(troops);

        let garrison_loss = if success {
            0
        } else {
            (self.garrison_strength as f32 * config.garrison_assault_losses).floor() as u32
        };
        self.garrison_strength = self.garrison_strength.saturating_sub(garrison_loss);
        self.log.push(SiegeLogEntry {
            garrison_delta: -i64::from(garrison_loss),
            attacker_losses,
            ..SiegeLogEntry::note(day, SiegeLogEvent::Assault { success, chance, roll })
        });
        tracing::info!(
            siege = %self.id,
            army = %army.id,
            chance,
            roll,
            success,
            attacker_losses,
            "assault resolved"
        );
        events.push(DomainEvent::AssaultResolved {
            siege: self.id,
            army: army.id,
            success,
            attacker_losses,
            morale_loss,
            day,
        });

        if success {
            events.push(self.capture(CaptureCause::Assault, day, config));
        } else {
            self.status = resume;
        }
        Ok(events)
    }

    /// The besieger withdraws
    pub fn lift(&mut self, actor: RulerId, day: Day) -> Result<DomainEvent> {
        self.ensure_besieger(actor)?;
        self.status = SiegeStatus::Lifted;
        self.ended_on = Some(day);
        self.log.push(SiegeLogEntry::note(day, SiegeLogEvent::Lifted));
        tracing::info!(siege = %self.id, "siege lifted");
        Ok(DomainEvent::SiegeLifted {
            siege: self.id,
            army: self.besieger,
            day,
        })
    }

    /// Lift without a besieger order, e.g. when the war is over
    pub fn withdraw(&mut self, day: Day) -> DomainEvent {
        self.status = SiegeStatus::Lifted;
        self.ended_on = Some(day);
        self.log.push(SiegeLogEntry::note(day, SiegeLogEvent::Lifted));
        DomainEvent::SiegeLifted {
            siege: self.id,
            army: self.besieger,
            day,
        }
    }

    /// The besieging army is gone
    pub fn abandon(&mut self, day: Day, config: &SiegeConfig) -> DomainEvent {
        self.status = SiegeStatus::Abandoned;
        self.ended_on = Some(day);
        self.log.push(SiegeLogEntry::note(day, SiegeLogEvent::Abandoned));
        tracing::info!(siege = %self.id, "siege abandoned");
        DomainEvent::SiegeAbandoned {
            siege: self.id,
            war: self.war,
            side: self.side.opposite(),
            score: config.abandon_score,
            day,
        }
    }

    pub fn build_equipment(
        &mut self,
        actor: RulerId,
        kind: SiegeEquipment,
        day: Day,
        treasury: &dyn Treasury,
    ) -> Result<DomainEvent> {
        self.ensure_besieger(actor)?;
        charge(treasury, actor, kind.build_cost())?;
        let count = self.equipment.entry(kind).or_insert(0);
        *count += 1;
        let count = *count;
        self.log.push(SiegeLogEntry::note(day, SiegeLogEvent::EquipmentBuilt(kind)));
        tracing::info!(siege = %self.id, ?kind, count, "siege equipment built");
        Ok(DomainEvent::SiegeEquipmentBuilt {
            siege: self.id,
            equipment: kind,
            count,
        })
    }
}

impl Aggregate for Siege {
    type Id = SiegeId;
    const KIND: &'static str = "siege";

    fn id(&self) -> SiegeId {
        self.id
    }

    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn terminal_error(&self) -> WarfareError {
        WarfareError::terminal(Self::KIND, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::army::UnitType;
    use crate::collaborators::InMemoryTreasury;
    use crate::core::config::ArmyConfig;
    use crate::core::types::HexCoord;

    fn siege(fortification: f32, supplies: f32) -> Siege {
        Siege {
            id: SiegeId::new(),
            war: WarId::new(),
            side: Side::Attacker,
            besieger: ArmyId::new(),
            besieger_commander: RulerId(1),
            target: Location::castle(9, "Highmoor", HexCoord::new(2, 2)),
            status: SiegeStatus::Active,
            fortification,
            garrison_strength: 100,
            garrison_morale: 100.0,
            supplies,
            days_besieged: 0,
            last_advanced: None,
            has_breach: false,
            equipment: BTreeMap::new(),
            log: Vec::new(),
            started_on: Day(0),
            ended_on: None,
        }
    }

    fn army_at(siege: &Siege, levies: u32) -> Army {
        let mut army = Army::new(
            RulerId(1),
            "Besiegers",
            siege.target.clone(),
            Day(0),
            &ArmyConfig::default(),
        )
        .with_status(ArmyStatus::Besieging);
        army.recruit(UnitType::Levy, levies);
        army
    }

    #[test]
    fn test_trebuchet_breaches_after_two_days() {
        let config = SiegeConfig::default();
        let mut s = siege(35.0, 100.0);
        s.equipment.insert(SiegeEquipment::Trebuchet, 1);

        s.advance_day(Day(1), &config);
        assert_eq!(s.fortification, 30.0);
        assert!(!s.has_breach);

        let events = s.advance_day(Day(2), &config);
        assert!(s.fortification <= 25.0);
        assert!(s.has_breach);
        assert_eq!(s.status, SiegeStatus::Breached);
        assert!(events
            .iter()
            .any(|e| matches!(e, DomainEvent::SiegeBreached { .. })));
    }

    #[test]
    fn test_one_advance_per_day() {
        let config = SiegeConfig::default();
        let mut s = siege(100.0, 100.0);
        s.equipment.insert(SiegeEquipment::Trebuchet, 1);

        assert!(!s.advance_day(Day(1), &config).is_empty());
        assert!(s.advance_day(Day(1), &config).is_empty());
        assert_eq!(s.days_besieged, 1);
        assert_eq!(s.fortification, 95.0);
        assert_eq!(
            s.ensure_not_advanced(Day(1)).unwrap_err().code(),
            "SiegeAlreadyAdvanced"
        );
        assert!(s.ensure_not_advanced(Day(2)).is_ok());
    }

    #[test]
    fn test_log_records_exact_deltas() {
        let config = SiegeConfig::default();
        let mut s = siege(50.0, 1.0);
        s.equipment.insert(SiegeEquipment::Catapult, 2);
        s.advance_day(Day(1), &config);

        let entry = s.log.last().unwrap();
        assert_eq!(entry.fortification_delta, -8.0);
        assert_eq!(entry.supplies_delta, -1.0);
        assert_eq!(entry.morale_delta, -10.0);
    }

    #[test]
    fn test_walls_falling_beats_surrender() {
        let config = SiegeConfig::default();
        let mut s = siege(5.0, 0.0);
        s.garrison_morale = 10.0;
        s.equipment.insert(SiegeEquipment::Trebuchet, 1);

        let events = s.advance_day(Day(1), &config);
        assert_eq!(s.status, SiegeStatus::Captured);
        let cause = events.iter().find_map(|e| match e {
            DomainEvent::SiegeCaptured { cause, .. } => Some(*cause),
            _ => None,
        });
        assert_eq!(cause, Some(CaptureCause::WallsFell));
    }

    #[test]
    fn test_starved_garrison_surrenders() {
        let config = SiegeConfig::default();
        let mut s = siege(80.0, 5.0);
        let mut day = 0;
        while !s.status.is_terminal() {
            day += 1;
            s.advance_day(Day(day), &config);
        }
        // Food runs out on day 2, morale hits zero nine days later
        assert_eq!(day, 11);
        assert!(matches!(
            s.log.last().unwrap().event,
            SiegeLogEvent::Captured(CaptureCause::Surrender)
        ));
    }

    #[test]
    fn test_towers_lower_difficulty() {
        let mut s = siege(60.0, 100.0);
        assert_eq!(s.assault_difficulty(), 60.0);
        s.equipment.insert(SiegeEquipment::SiegeTower, 2);
        assert_eq!(s.assault_difficulty(), 40.0);
        s.has_breach = true;
        assert_eq!(s.assault_difficulty(), 10.0);
    }

    #[test]
    fn test_assault_rejected_on_intact_walls() {
        let config = SiegeConfig::default();
        let mut s = siege(90.0, 100.0);
        let army = army_at(&s, 100);
        let err = s
            .launch_assault(RulerId(1), &army, Day(1), &config, 7)
            .unwrap_err();
        assert_eq!(err.code(), "SiegeNotAssaultable");
        assert_eq!(s.status, SiegeStatus::Active);
    }

    #[test]
    fn test_army_in_battle_cannot_assault() {
        let config = SiegeConfig::default();
        let mut s = siege(20.0, 100.0);
        s.has_breach = true;
        s.status = SiegeStatus::Breached;
        let army = army_at(&s, 300).with_status(ArmyStatus::InBattle);

        let err = s
            .launch_assault(RulerId(1), &army, Day(1), &config, 7)
            .unwrap_err();
        assert_eq!(err.code(), "ArmyUnavailable");
        assert_eq!(s.status, SiegeStatus::Breached);
        assert_eq!(s.log.len(), 0);
    }

    #[test]
    fn test_assault_outcome_is_reproducible() {
        let config = SiegeConfig::default();
        let mut a = siege(20.0, 100.0);
        a.has_breach = true;
        a.status = SiegeStatus::Breached;
        let mut b = a.clone();
        let army = army_at(&a, 300);

        let ea = a.launch_assault(RulerId(1), &army, Day(3), &config, 42).unwrap();
        let eb = b.launch_assault(RulerId(1), &army, Day(3), &config, 42).unwrap();
        assert_eq!(ea, eb);
        assert_eq!(a.status, b.status);
        assert_ne!(a.status, SiegeStatus::Assault);
    }

    #[test]
    fn test_failed_assault_keeps_siege_open() {
        let config = SiegeConfig::default();
        let mut s = siege(20.0, 100.0);
        s.has_breach = true;
        s.status = SiegeStatus::Breached;
        s.garrison_strength = 100_000;
        let army = army_at(&s, 10);

        // Chance is clamped to 5 %, so search for a seed that fails
        let (events, seed_state) = (0..64u64)
            .find_map(|seed| {
                let mut trial = s.clone();
                let events = trial
                    .launch_assault(RulerId(1), &army, Day(1), &config, seed)
                    .ok()?;
                matches!(events[0], DomainEvent::AssaultResolved { success: false, .. })
                    .then_some((events, trial))
            })
            .unwrap();
        assert_eq!(seed_state.status, SiegeStatus::Breached);
        assert_eq!(seed_state.garrison_strength, 90_000);
        match &events[0] {
            DomainEvent::AssaultResolved {
                attacker_losses,
                morale_loss,
                ..
            } => {
                assert!((1..=3).contains(attacker_losses));
                assert_eq!(*morale_loss, 15.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_assault_chance_is_clamped() {
        let s = siege(100.0, 100.0);
        assert_eq!(s.assault_chance(&army_at(&s, 1)), 0.05);
        let mut weak = siege(0.0, 100.0);
        weak.garrison_strength = 0;
        assert_eq!(weak.assault_chance(&army_at(&weak, 1000)), 0.95);
    }

    #[test]
    fn test_only_besieger_lifts_or_builds() {
        let treasury = InMemoryTreasury::with_balances([(RulerId(1), 1_000), (RulerId(2), 1_000)]);
        let mut s = siege(60.0, 100.0);
        assert_eq!(s.lift(RulerId(2), Day(1)).unwrap_err().code(), "NotOwner");
        assert!(s
            .build_equipment(RulerId(2), SiegeEquipment::BatteringRam, Day(1), &treasury)
            .is_err());

        s.build_equipment(RulerId(1), SiegeEquipment::Trebuchet, Day(1), &treasury)
            .unwrap();
        assert_eq!(s.equipment_count(SiegeEquipment::Trebuchet), 1);
        assert_eq!(treasury.balance(RulerId(1)), 400);

        s.lift(RulerId(1), Day(2)).unwrap();
        assert!(s.is_terminal());
    }
}
