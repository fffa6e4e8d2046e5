//! Unit types and their default properties
//!
//! An army is an ordered list of units. Attack and defense are per soldier;
//! army totals are always summed from the units, never stored.

use serde::{Deserialize, Serialize};

use crate::core::types::{CompanyId, Gold};

/// Type of military unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Levy,           // Cheap, unreliable
    Militia,        // Town watch, slightly drilled
    MenAtArms,      // Professional foot soldiers
    Knights,        // Armored shock cavalry, expensive
    Archers,        // Ranged, weak in melee
    Crossbowmen,    // Slower, more punch
    Cavalry,        // Fast mounted troops
    SiegeEngineers, // Build and crew siege works
}

/// Default properties for a unit type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitProperties {
    pub attack: f32,             // Per soldier
    pub defense: f32,            // Per soldier
    pub recruit_cost: Gold,      // Per soldier
    pub upkeep_per_soldier: f64, // Gold per day
    pub march_speed: f32,        // Hexes per day
}

impl UnitType {
    pub const ALL: [UnitType; 8] = [
        UnitType::Levy,
        UnitType::Militia,
        UnitType::MenAtArms,
        UnitType::Knights,
        UnitType::Archers,
        UnitType::Crossbowmen,
        UnitType::Cavalry,
        UnitType::SiegeEngineers,
    ];

    /// Get default properties for this unit type
    pub fn default_properties(&self) -> UnitProperties {
        match self {
            UnitType::Levy => UnitProperties {
                attack: 1.0,
                defense: 1.0,
                recruit_cost: 2,
                upkeep_per_soldier: 0.05,
                march_speed: 3.0,
            },
            UnitType::Militia => UnitProperties {
                attack: 1.5,
                defense: 1.5,
                recruit_cost: 4,
                upkeep_per_soldier: 0.08,
                march_speed: 3.0,
            },
            UnitType::MenAtArms => UnitProperties {
                attack: 3.0,
                defense: 3.5,
                recruit_cost: 10,
                upkeep_per_soldier: 0.2,
                march_speed: 2.0, // Heavy kit
            },
            UnitType::Knights => UnitProperties {
                attack: 6.0,
                defense: 5.0,
                recruit_cost: 30,
                upkeep_per_soldier: 0.6,
                march_speed: 3.0,
            },
            UnitType::Archers => UnitProperties {
                attack: 2.5,
                defense: 1.0,
                recruit_cost: 8,
                upkeep_per_soldier: 0.15,
                march_speed: 3.0,
            },
            UnitType::Crossbowmen => UnitProperties {
                attack: 3.0,
                defense: 1.5,
                recruit_cost: 10,
                upkeep_per_soldier: 0.18,
                march_speed: 2.0,
            },
            UnitType::Cavalry => UnitProperties {
                attack: 4.0,
                defense: 2.5,
                recruit_cost: 20,
                upkeep_per_soldier: 0.4,
                march_speed: 4.0,
            },
            UnitType::SiegeEngineers => UnitProperties {
                attack: 0.5,
                defense: 0.5,
                recruit_cost: 15,
                upkeep_per_soldier: 0.3,
                march_speed: 1.0, // Hauling timber and tackle
            },
        }
    }

    pub fn recruit_cost(&self, count: u32) -> Gold {
        self.default_properties().recruit_cost * Gold::from(count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    Ready,
    Depleted, // No soldiers left, kept for the record
}

/// A block of soldiers of one type inside an army
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmyUnit {
    pub unit_type: UnitType,
    pub count: u32,
    pub max_count: u32,
    pub attack: f32,
    pub defense: f32,
    pub status: UnitStatus,
    /// Set when the soldiers belong to a hired company
    pub company: Option<CompanyId>,
}

impl ArmyUnit {
    pub fn new(unit_type: UnitType, count: u32) -> Self {
        let props = unit_type.default_properties();
        Self {
            unit_type,
            count,
            max_count: count,
            attack: props.attack,
            defense: props.defense,
            status: if count > 0 {
                UnitStatus::Ready
            } else {
                UnitStatus::Depleted
            },
            company: None,
        }
    }

    /// Override per-soldier stats (veterans, green troops, scenario setups)
    pub fn with_stats(mut self, attack: f32, defense: f32) -> Self {
        self.attack = attack;
        self.defense = defense;
        self
    }

    pub fn hired_from(mut self, company: CompanyId) -> Self {
        self.company = Some(company);
        self
    }

    pub fn total_attack(&self) -> f32 {
        self.count as f32 * self.attack
    }

    pub fn total_defense(&self) -> f32 {
        self.count as f32 * self.defense
    }

    pub fn daily_upkeep(&self) -> f64 {
        // Hired soldiers are paid through their contract
        if self.company.is_some() {
            return 0.0;
        }
        self.count as f64 * self.unit_type.default_properties().upkeep_per_soldier
    }

    /// Add soldiers; the establishment grows with them
    pub fn reinforce(&mut self, count: u32) {
        self.count += count;
        self.max_count = self.max_count.max(self.count);
        if self.count > 0 {
            self.status = UnitStatus::Ready;
        }
    }

    /// Remove up to `losses` soldiers, returning how many were actually lost
    pub fn take_losses(&mut self, losses: u32) -> u32 {
        let lost = losses.min(self.count);
        self.count -= lost;
        if self.count == 0 {
            self.status = UnitStatus::Depleted;
        }
        lost
    }
}
