//! How likely the receiving side is to accept a set of peace terms
//!
//! The estimate is a sum of percentage-point factors on top of a baseline,
//! clamped so it never claims certainty either way. It reads the war and
//! changes nothing.

use serde::{Deserialize, Serialize};

use super::treaty::{PeaceTerms, TreatyType};
use crate::core::config::PeaceConfig;
use crate::core::types::Side;
use crate::war::War;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceFactor {
    pub label: String,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceEstimate {
    /// Clamped to the configured range
    pub percentage: i32,
    /// Every contribution in the order applied, baseline first
    pub factors: Vec<AcceptanceFactor>,
}

impl AcceptanceEstimate {
    /// Sum of the factors before clamping
    pub fn raw_total(&self) -> i32 {
        self.factors.iter().map(|f| f.points).sum()
    }
}

fn score_points(differential: f32, config: &PeaceConfig) -> i32 {
    if differential >= config.major_score_gap {
        config.major_score_weight
    } else if differential >= config.minor_score_gap {
        config.minor_score_weight
    } else if differential <= -config.major_score_gap {
        -config.major_score_weight
    } else if differential <= -config.minor_score_gap {
        -config.minor_score_weight
    } else {
        0
    }
}

/// Estimate acceptance of `terms` proposed by `proposer` to the other side
pub fn estimate_acceptance(
    war: &War,
    terms: &PeaceTerms,
    proposer: Side,
    config: &PeaceConfig,
) -> AcceptanceEstimate {
    let receiver = proposer.opposite();
    let mut factors = vec![AcceptanceFactor {
        label: "baseline".into(),
        points: config.baseline,
    }];
    let mut add = |label: String, points: i32| {
        if points != 0 {
            factors.push(AcceptanceFactor { label, points });
        }
    };

    let differential = war.score(proposer) - war.score(receiver);
    add(
        format!("war score differential {differential:+.0}"),
        score_points(differential, config),
    );

    match terms.treaty_type {
        TreatyType::WhitePeace => add("white peace".into(), config.white_peace_bonus),
        TreatyType::Surrender if terms.winner == Some(receiver) => {
            add("proposer surrenders".into(), config.surrender_bonus)
        }
        TreatyType::Surrender if terms.winner == Some(proposer) => {
            add("surrender demanded".into(), -config.surrender_bonus)
        }
        TreatyType::Surrender | TreatyType::Negotiated => {}
    }

    let demanded = terms
        .territory_changes
        .iter()
        .filter(|c| c.from == receiver)
        .count() as i32;
    add(
        format!("{demanded} territories demanded"),
        -config.territory_demand_penalty * demanded,
    );

    if let Some(payer) = terms.gold_payer() {
        let increments = i32::try_from(terms.gold_amount() / config.gold_increment.max(1))
            .unwrap_or(i32::MAX);
        let amount = terms.gold_amount();
        if payer == receiver {
            let points = config.gold_demand_step.saturating_mul(increments);
            add(
                format!("{amount} gold demanded"),
                -points.min(config.gold_demand_cap),
            );
        } else {
            let points = config.gold_offer_step.saturating_mul(increments);
            add(
                format!("{amount} gold offered"),
                points.min(config.gold_offer_cap),
            );
        }
    }

    let total: i32 = factors.iter().map(|f| f.points).sum();
    AcceptanceEstimate {
        percentage: total.clamp(config.min_acceptance, config.max_acceptance),
        factors,
    }
}
