//! Rules configuration with documented constants
//!
//! All balance numbers are collected here with explanations of their purpose
//! and how they interact with each other. Defaults are the shipped balance;
//! any section can be overridden from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::{Result, WarfareError};
use crate::core::types::Gold;

/// Configuration for the whole warfare engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WarfareConfig {
    pub army: ArmyConfig,
    pub mercenary: MercenaryConfig,
    pub siege: SiegeConfig,
    pub battle: BattleConfig,
    pub war: WarConfig,
    pub peace: PeaceConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmyConfig {
    /// Gold debited from the commander to raise a new (empty) army
    pub raise_cost: Gold,
    /// Morale of a freshly raised army (0-100)
    pub starting_morale: f32,
    /// Days of supplies a freshly raised army carries
    pub starting_supplies: f32,
    /// Supplies (in days) consumed per daily tick
    pub daily_supply_cost: f32,
    /// Morale lost per day once supplies are exhausted
    ///
    /// At 10.0 a full-morale army starves out in ten days.
    pub starvation_morale_decay: f32,
    /// Morale lost on a day the treasury refuses the upkeep
    pub unpaid_upkeep_morale_penalty: f32,
    /// Daily ticks a Mustering army needs before it is Encamped
    pub muster_days: u32,
    /// Hexes per day for an army without units
    pub base_march_speed: f32,
}

impl Default for ArmyConfig {
    fn default() -> Self {
        Self {
            raise_cost: 500,
            starting_morale: 100.0,
            starting_supplies: 30.0,
            daily_supply_cost: 1.0,
            starvation_morale_decay: 10.0,
            unpaid_upkeep_morale_penalty: 5.0,
            muster_days: 3,
            base_march_speed: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MercenaryConfig {
    /// Days before expiry at which `ContractExpiring` is emitted
    pub expiry_warning_days: u32,
    /// Days a lapsed company under the renegotiate policy waits before leaving
    pub renewal_grace_days: u32,
}

impl Default for MercenaryConfig {
    fn default() -> Self {
        Self {
            expiry_warning_days: 3,
            renewal_grace_days: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiegeConfig {
    /// Fortification level below which the walls are breached (sticky)
    pub breach_threshold: f32,
    /// Assaults are allowed once difficulty drops below this, or on breach
    pub assault_threshold: f32,
    /// Garrison supplies (0-100) eaten per day
    pub garrison_daily_consumption: f32,
    /// Garrison morale lost per day while supplies are exhausted
    pub starvation_morale_penalty: f32,
    /// Attacker losses (fraction of troops) on a successful assault
    pub assault_success_losses: f32,
    /// Attacker losses on a repulsed assault, rolled uniformly in this range
    pub assault_failure_losses: (f32, f32),
    /// Attacker morale lost on a repulsed assault
    pub assault_morale_penalty: f32,
    /// Garrison strength lost (fraction) when it repulses an assault
    pub garrison_assault_losses: f32,
    /// War score for capturing a castle / town / village
    pub capture_score: CaptureScores,
    /// War score awarded to the defending side when a siege is abandoned
    pub abandon_score: f32,
    /// Morale the besieging army regains on capture
    pub capture_morale_bonus: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureScores {
    pub castle: f32,
    pub town: f32,
    pub village: f32,
}

impl Default for CaptureScores {
    fn default() -> Self {
        Self {
            castle: 20.0,
            town: 15.0,
            village: 8.0,
        }
    }
}

impl Default for SiegeConfig {
    fn default() -> Self {
        Self {
            breach_threshold: 30.0,
            assault_threshold: 40.0,
            garrison_daily_consumption: 2.5,
            starvation_morale_penalty: 10.0,
            assault_success_losses: 0.10,
            assault_failure_losses: (0.15, 0.30),
            assault_morale_penalty: 15.0,
            garrison_assault_losses: 0.10,
            capture_score: CaptureScores::default(),
            abandon_score: 5.0,
            capture_morale_bonus: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Fraction of the opposing effective attack converted into casualties per day
    pub casualty_rate: f32,
    /// How strongly average per-soldier defense mitigates casualties
    pub defense_mitigation: f32,
    /// A side whose remaining troops drop below this fraction of its start routs
    pub rout_threshold: f32,
    /// Loss-rate gap that makes an un-routed battle decisive
    pub decisive_margin: f32,
    /// Below this loss rate on both sides an indecisive battle is Inconclusive, above it a Draw
    pub inconclusive_loss_rate: f32,
    /// Morale lost per unit of casualty rate (casualty rate 0.3 → 30 morale at 100.0)
    pub morale_loss_per_casualty_rate: f32,
    /// Fraction of the morale loss the victors actually suffer
    pub victor_morale_factor: f32,
    /// Flat war score for winning a battle
    pub base_score: f32,
    /// Enemy casualties needed for one extra point of war score
    pub casualties_per_point: f32,
    /// Cap on war score from a single battle
    pub max_score: f32,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            casualty_rate: 0.1,
            defense_mitigation: 0.0,
            rout_threshold: 0.2,
            decisive_margin: 0.05,
            inconclusive_loss_rate: 0.15,
            morale_loss_per_casualty_rate: 100.0,
            victor_morale_factor: 0.5,
            base_score: 5.0,
            casualties_per_point: 50.0,
            max_score: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarConfig {
    /// Score at which a side wins outright
    pub victory_threshold: f32,
    /// Lead needed for the AttackerWinning / DefenderWinning sub-states
    pub winning_margin: f32,
    /// Truce length of the default treaty created on outright victory
    pub default_truce_days: u32,
}

impl Default for WarConfig {
    fn default() -> Self {
        Self {
            victory_threshold: 100.0,
            winning_margin: 10.0,
            default_truce_days: 365,
        }
    }
}

/// Weights of the acceptance estimate. All values are percentage points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeaceConfig {
    pub baseline: i32,
    /// Score differential for the small adjustment
    pub minor_score_gap: f32,
    /// Score differential for the large adjustment
    pub major_score_gap: f32,
    pub minor_score_weight: i32,
    pub major_score_weight: i32,
    pub white_peace_bonus: i32,
    pub surrender_bonus: i32,
    /// Per demanded territory
    pub territory_demand_penalty: i32,
    /// Gold increment the payment terms are floored to
    pub gold_increment: Gold,
    /// Points per full increment demanded
    pub gold_demand_step: i32,
    pub gold_demand_cap: i32,
    /// Points per full increment offered
    pub gold_offer_step: i32,
    pub gold_offer_cap: i32,
    pub min_acceptance: i32,
    pub max_acceptance: i32,
    /// War score the winner needs per territory it takes
    pub territory_score_cost: f32,
}

impl Default for PeaceConfig {
    fn default() -> Self {
        Self {
            baseline: 50,
            minor_score_gap: 20.0,
            major_score_gap: 50.0,
            minor_score_weight: 15,
            major_score_weight: 30,
            white_peace_bonus: 20,
            surrender_bonus: 40,
            territory_demand_penalty: 10,
            gold_increment: 500,
            gold_demand_step: 5,
            gold_demand_cap: 20,
            gold_offer_step: 5,
            gold_offer_cap: 15,
            min_acceptance: 5,
            max_acceptance: 95,
            territory_score_cost: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for assault rolls
    pub seed: u64,
    /// How many times a conflicting transaction is re-read and re-tried
    pub max_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_0f_3a7,
            max_conflict_retries: 3,
        }
    }
}

impl WarfareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML. Missing sections and keys fall back to defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: WarfareConfig = toml::from_str(content)
            .map_err(|e| WarfareError::Config(format!("failed to parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WarfareError::Config(format!("failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let peace = &self.peace;
        if peace.min_acceptance > peace.max_acceptance {
            return Err(WarfareError::Config(format!(
                "min_acceptance ({}) must not exceed max_acceptance ({})",
                peace.min_acceptance, peace.max_acceptance
            )));
        }
        if peace.gold_increment == 0 {
            return Err(WarfareError::Config("gold_increment must be positive".into()));
        }
        if peace.minor_score_gap > peace.major_score_gap {
            return Err(WarfareError::Config(
                "minor_score_gap must not exceed major_score_gap".into(),
            ));
        }

        let battle = &self.battle;
        if !(0.0..1.0).contains(&battle.rout_threshold) {
            return Err(WarfareError::Config(format!(
                "rout_threshold ({}) must lie in [0, 1)",
                battle.rout_threshold
            )));
        }
        if battle.casualty_rate <= 0.0 || battle.casualties_per_point <= 0.0 {
            return Err(WarfareError::Config("battle rates must be positive".into()));
        }

        let siege = &self.siege;
        let (lo, hi) = siege.assault_failure_losses;
        if !(0.0..=1.0).contains(&lo) || !(lo..=1.0).contains(&hi) {
            return Err(WarfareError::Config(
                "assault_failure_losses must be an ordered range within [0, 1]".into(),
            ));
        }
        for (name, rate) in [
            ("assault_success_losses", siege.assault_success_losses),
            ("garrison_assault_losses", siege.garrison_assault_losses),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(WarfareError::Config(format!(
                    "{name} ({rate}) must lie in [0, 1]"
                )));
            }
        }
        if !(0.0..=100.0).contains(&siege.breach_threshold) {
            return Err(WarfareError::Config(
                "breach_threshold must lie in [0, 100]".into(),
            ));
        }

        if self.war.victory_threshold <= 0.0 || self.war.victory_threshold > 100.0 {
            return Err(WarfareError::Config(
                "victory_threshold must lie in (0, 100]".into(),
            ));
        }

        if self.army.starvation_morale_decay <= 0.0 {
            return Err(WarfareError::Config(
                "starvation_morale_decay must be positive".into(),
            ));
        }

        Ok(())
    }
}
