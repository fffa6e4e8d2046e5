//! Siege engines and their daily effect on the walls

use serde::{Deserialize, Serialize};

use crate::core::types::Gold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiegeEquipment {
    BatteringRam,
    Catapult,
    Trebuchet,
    SiegeTower,
    Sappers,
}

impl SiegeEquipment {
    pub const ALL: [SiegeEquipment; 5] = [
        SiegeEquipment::BatteringRam,
        SiegeEquipment::Catapult,
        SiegeEquipment::Trebuchet,
        SiegeEquipment::SiegeTower,
        SiegeEquipment::Sappers,
    ];

    /// Fortification points knocked down per day
    pub fn daily_damage(&self) -> f32 {
        match self {
            Self::BatteringRam => 3.0,
            Self::Catapult => 4.0,
            Self::Trebuchet => 5.0,
            Self::SiegeTower => 0.0, // Helps the assault, not the walls
            Self::Sappers => 2.0,
        }
    }

    /// Reduction in assault difficulty while the engine stands
    pub fn assault_bonus(&self) -> f32 {
        match self {
            Self::SiegeTower => 10.0,
            _ => 0.0,
        }
    }

    pub fn build_cost(&self) -> Gold {
        match self {
            Self::BatteringRam => 200,
            Self::Catapult => 400,
            Self::Trebuchet => 600,
            Self::SiegeTower => 300,
            Self::Sappers => 250,
        }
    }
}
