//! Battlefield terrain and weather and how they scale each side's strength

use serde::{Deserialize, Serialize};

/// Ground the battle is fought on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    #[default]
    Plains,
    Forest,
    Hills,
    Mountains,
    Swamp,
    River,
}

impl Terrain {
    /// Defense bonus (additive, defender only)
    pub fn defense_bonus(&self) -> f32 {
        match self {
            Self::Plains => 0.0,
            Self::Forest => 0.2,
            Self::Hills => 0.3,
            Self::Mountains => 0.5,
            Self::Swamp => 0.1,
            Self::River => -0.1, // Harder to defend river crossings
        }
    }

    /// Strength multiplier for the attacking / defending side
    pub fn modifier(&self, defending: bool) -> f32 {
        if defending {
            1.0 + self.defense_bonus()
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    #[default]
    Clear,
    Rain,
    Snow,
    Fog,
    Storm,
}

impl Weather {
    /// Combat effectiveness multiplier, applied to both sides
    pub fn combat_modifier(&self) -> f32 {
        match self {
            Self::Clear => 1.0,
            Self::Rain => 0.8,
            Self::Snow => 0.7,
            Self::Fog => 0.9,
            Self::Storm => 0.6,
        }
    }
}
