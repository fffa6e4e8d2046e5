//! The Army aggregate
//!
//! Armies are groups of units owned by a commander. Attack, defense, troop
//! count and gold upkeep are derived from the units on every read.

use serde::{Deserialize, Serialize};

use super::unit::{ArmyUnit, UnitType};
use crate::core::config::ArmyConfig;
use crate::core::error::{Result, WarfareError};
use crate::core::types::{ArmyId, CompanyId, Day, Gold, Location, RulerId};
use crate::mercenary::{ContractState, MercenaryContract};
use crate::store::Aggregate;

/// Lifecycle of an army. `Disbanded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmyStatus {
    Mustering,
    Marching,
    Encamped,
    Besieging,
    InBattle,
    Disbanded,
}

impl ArmyStatus {
    pub fn is_movable(&self) -> bool {
        match self {
            Self::Mustering | Self::Encamped | Self::Besieging => true,
            Self::Marching | Self::InBattle | Self::Disbanded => false,
        }
    }

    /// Whether the army can be committed to a battle or a siege
    pub fn can_engage(&self) -> bool {
        match self {
            Self::Mustering | Self::Encamped | Self::Besieging | Self::Marching => true,
            Self::InBattle | Self::Disbanded => false,
        }
    }
}

/// An army on the move between two locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarchOrder {
    pub destination: Location,
    pub departed_on: Day,
    pub arrives_on: Day,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Army {
    pub id: ArmyId,
    pub commander: RulerId,
    pub name: String,
    pub status: ArmyStatus,
    pub morale: f32,   // 0 - 100
    pub supplies: f32, // Days remaining, never negative
    pub daily_supply_cost: f32,
    pub location: Location,
    pub units: Vec<ArmyUnit>,
    pub march: Option<MarchOrder>,
    pub contracts: Vec<MercenaryContract>,
    pub raised_on: Day,
    pub days_mustered: u32,
    pub disbanded_on: Option<Day>,
}

impl Army {
    pub fn new(
        commander: RulerId,
        name: impl Into<String>,
        location: Location,
        day: Day,
        config: &ArmyConfig,
    ) -> Self {
        Self {
            id: ArmyId::new(),
            commander,
            name: name.into(),
            status: ArmyStatus::Mustering,
            morale: config.starting_morale,
            supplies: config.starting_supplies,
            daily_supply_cost: config.daily_supply_cost,
            location,
            units: Vec::new(),
            march: None,
            contracts: Vec::new(),
            raised_on: day,
            days_mustered: 0,
            disbanded_on: None,
        }
    }

    pub fn with_units(mut self, units: Vec<ArmyUnit>) -> Self {
        self.units = units;
        self
    }

    pub fn with_status(mut self, status: ArmyStatus) -> Self {
        self.status = status;
        self
    }

    pub fn troop_count(&self) -> u32 {
        self.units.iter().map(|u| u.count).sum()
    }

    pub fn total_attack(&self) -> f32 {
        self.units.iter().map(|u| u.total_attack()).sum()
    }

    pub fn total_defense(&self) -> f32 {
        self.units.iter().map(|u| u.total_defense()).sum()
    }

    /// Per-soldier defense averaged over the whole army
    pub fn average_defense(&self) -> f32 {
        let troops = self.troop_count();
        if troops == 0 {
            return 0.0;
        }
        self.total_defense() / troops as f32
    }

    /// Daily gold owed: unit pay rounded up plus running contracts
    pub fn gold_upkeep(&self) -> Gold {
        let wages: f64 = self.units.iter().map(|u| u.daily_upkeep()).sum();
        let contracts: Gold = self
            .contracts
            .iter()
            .filter(|c| c.state == ContractState::Active)
            .map(|c| c.daily_cost)
            .sum();
        wages.ceil() as Gold + contracts
    }

    /// Hexes per day, limited by the slowest unit
    pub fn march_speed(&self, base_speed: f32) -> f32 {
        self.units
            .iter()
            .filter(|u| u.count > 0)
            .map(|u| u.unit_type.default_properties().march_speed)
            .fold(None, |slowest: Option<f32>, s| {
                Some(slowest.map_or(s, |cur| cur.min(s)))
            })
            .unwrap_or(base_speed)
    }

    pub fn is_disbanded(&self) -> bool {
        self.status == ArmyStatus::Disbanded
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.is_disbanded() {
            return Err(WarfareError::ArmyDisbanded(self.id));
        }
        Ok(())
    }

    pub fn ensure_commander(&self, actor: RulerId) -> Result<()> {
        if self.commander != actor {
            return Err(WarfareError::NotOwner {
                actor,
                what: format!("army '{}'", self.name),
            });
        }
        Ok(())
    }

    /// Add levied soldiers, merging into an existing unit of the same type
    pub fn recruit(&mut self, unit_type: UnitType, count: u32) {
        let existing = self
            .units
            .iter_mut()
            .find(|u| u.unit_type == unit_type && u.company.is_none());
        match existing {
            Some(unit) => unit.reinforce(count),
            None => self.units.push(ArmyUnit::new(unit_type, count)),
        }
    }

    pub fn adjust_morale(&mut self, delta: f32) {
        self.morale = (self.morale + delta).clamp(0.0, 100.0);
    }

    /// Remove `losses` soldiers spread over the units in proportion to their size
    pub fn apply_losses(&mut self, losses: u32) -> Result<()> {
        let troops = self.troop_count();
        if losses > troops {
            return Err(WarfareError::InvariantViolation(format!(
                "army {} asked to lose {losses} of {troops} troops",
                self.id
            )));
        }
        let weights: Vec<u32> = self.units.iter().map(|u| u.count).collect();
        let shares = split_proportionally(losses, &weights);
        for (unit, share) in self.units.iter_mut().zip(shares) {
            unit.take_losses(share);
        }
        Ok(())
    }

    /// Remove every unit of a hired company, returning how many soldiers left
    pub fn remove_company(&mut self, company: CompanyId) -> u32 {
        let leaving: u32 = self
            .units
            .iter()
            .filter(|u| u.company == Some(company))
            .map(|u| u.count)
            .sum();
        self.units.retain(|u| u.company != Some(company));
        self.contracts.retain(|c| c.company != company);
        leaving
    }

    /// Terminal transition. Releases all units and contracts.
    pub fn disband(&mut self, day: Day) -> Vec<CompanyId> {
        let released = self.contracts.iter().map(|c| c.company).collect();
        self.status = ArmyStatus::Disbanded;
        self.units.clear();
        self.contracts.clear();
        self.march = None;
        self.disbanded_on = Some(day);
        released
    }
}

impl Aggregate for Army {
    type Id = ArmyId;
    const KIND: &'static str = "army";

    fn id(&self) -> ArmyId {
        self.id
    }

    fn is_terminal(&self) -> bool {
        self.is_disbanded()
    }

    fn terminal_error(&self) -> WarfareError {
        WarfareError::ArmyDisbanded(self.id)
    }
}

/// Split `total` across `weights` proportionally using largest remainders.
///
/// The shares always sum to `total` when `total <= sum(weights)` and no share
/// exceeds its weight.
pub(crate) fn split_proportionally(total: u32, weights: &[u32]) -> Vec<u32> {
    let sum: u64 = weights.iter().map(|&w| u64::from(w)).sum();
    if sum == 0 || total == 0 {
        return vec![0; weights.len()];
    }
    let total = u64::from(total).min(sum);

    let mut shares: Vec<u64> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(u64, usize)> = Vec::with_capacity(weights.len());
    for (i, &w) in weights.iter().enumerate() {
        let exact = total * u64::from(w);
        shares.push(exact / sum);
        remainders.push((exact % sum, i));
    }

    let mut left = total - shares.iter().sum::<u64>();
    // Largest remainder first, ties to the earlier unit
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, i) in remainders {
        if left == 0 {
            break;
        }
        if shares[i] < u64::from(weights[i]) {
            shares[i] += 1;
            left -= 1;
        }
    }

    shares.into_iter().map(|s| s as u32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HexCoord;

    fn army() -> Army {
        Army::new(
            RulerId(1),
            "Host of the Vale",
            Location::castle(1, "Valewatch", HexCoord::new(0, 0)),
            Day(0),
            &ArmyConfig::default(),
        )
    }

    #[test]
    fn test_new_army_defaults() {
        let a = army();
        assert_eq!(a.status, ArmyStatus::Mustering);
        assert_eq!(a.morale, 100.0);
        assert_eq!(a.supplies, 30.0);
        assert_eq!(a.troop_count(), 0);
    }

    #[test]
    fn test_derived_totals_follow_units() {
        let mut a = army();
        a.recruit(UnitType::Levy, 100);
        a.recruit(UnitType::Knights, 10);
        assert_eq!(a.troop_count(), 110);
        assert_eq!(a.total_attack(), 100.0 * 1.0 + 10.0 * 6.0);

        a.recruit(UnitType::Levy, 50);
        assert_eq!(a.units.len(), 2, "same type merges into one unit");
        assert_eq!(a.troop_count(), 160);
    }

    #[test]
    fn test_gold_upkeep_rounds_up() {
        let mut a = army();
        a.recruit(UnitType::Levy, 10); // 0.5 gold
        assert_eq!(a.gold_upkeep(), 1);
    }

    #[test]
    fn test_march_speed_is_slowest_unit() {
        let mut a = army();
        assert_eq!(a.march_speed(3.0), 3.0);
        a.recruit(UnitType::Cavalry, 10);
        assert_eq!(a.march_speed(3.0), 4.0);
        a.recruit(UnitType::SiegeEngineers, 5);
        assert_eq!(a.march_speed(3.0), 1.0);
    }

    #[test]
    fn test_apply_losses_accounts_every_soldier() {
        let mut a = army();
        a.recruit(UnitType::Levy, 70);
        a.recruit(UnitType::Archers, 30);
        a.apply_losses(15).unwrap();
        assert_eq!(a.troop_count(), 85);
    }

    #[test]
    fn test_apply_losses_beyond_troops_is_invariant_breach() {
        let mut a = army();
        a.recruit(UnitType::Levy, 5);
        let err = a.apply_losses(6).unwrap_err();
        assert_eq!(err.code(), "InvariantViolation");
        assert_eq!(a.troop_count(), 5);
    }

    #[test]
    fn test_disband_releases_units() {
        let mut a = army();
        a.recruit(UnitType::Levy, 5);
        a.disband(Day(4));
        assert!(a.is_disbanded());
        assert!(a.units.is_empty());
        assert_eq!(a.disbanded_on, Some(Day(4)));
    }

    #[test]
    fn test_split_proportionally() {
        assert_eq!(split_proportionally(10, &[50, 50]), vec![5, 5]);
        assert_eq!(split_proportionally(3, &[1, 1, 1, 0]), vec![1, 1, 1, 0]);
        let shares = split_proportionally(7, &[10, 20, 3]);
        assert_eq!(shares.iter().sum::<u32>(), 7);
        assert!(shares.iter().zip([10, 20, 3]).all(|(s, w)| *s <= w));
        assert_eq!(split_proportionally(5, &[]), Vec::<u32>::new());
    }
}
