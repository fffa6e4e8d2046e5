//! Peace terms, their validation and the signing of a treaty
//!
//! Signing is the only way a war reaches a terminal state. Gold and territory
//! move through the collaborators before the war is marked ended, and a
//! collaborator failure undoes whatever already moved.

use serde::{Deserialize, Serialize};

use super::acceptance::{estimate_acceptance, AcceptanceEstimate};
use crate::collaborators::{charge, refund, Collaborators};
use crate::core::config::{PeaceConfig, WarfareConfig};
use crate::core::error::{Result, WarfareError};
use crate::core::types::{Day, Gold, RulerId, Side, TerritoryRef, TreatyId, WarId};
use crate::events::DomainEvent;
use crate::war::{War, WarStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatyType {
    WhitePeace,
    Surrender,
    Negotiated,
}

/// A territory handed from one side's leader to the other's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryChange {
    pub territory: TerritoryRef,
    pub from: Side,
    pub to: Side,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeaceTerms {
    pub treaty_type: TreatyType,
    /// None for white peace
    pub winner: Option<Side>,
    pub territory_changes: Vec<TerritoryChange>,
    /// Positive: the defender pays the attacker. Negative: the attacker pays.
    pub gold_payment: i64,
    pub truce_days: u32,
}

impl PeaceTerms {
    pub fn white_peace(truce_days: u32) -> Self {
        Self {
            treaty_type: TreatyType::WhitePeace,
            winner: None,
            territory_changes: Vec::new(),
            gold_payment: 0,
            truce_days,
        }
    }

    pub fn surrender(winner: Side, truce_days: u32) -> Self {
        Self {
            treaty_type: TreatyType::Surrender,
            winner: Some(winner),
            territory_changes: Vec::new(),
            gold_payment: 0,
            truce_days,
        }
    }

    /// Side that pays the gold, if any changes hands
    pub fn gold_payer(&self) -> Option<Side> {
        match self.gold_payment.signum() {
            1 => Some(Side::Defender),
            -1 => Some(Side::Attacker),
            _ => None,
        }
    }

    pub fn gold_amount(&self) -> Gold {
        self.gold_payment.unsigned_abs()
    }
}

/// Terms proposed by one side and waiting for the other's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeaceOffer {
    pub from: Side,
    pub terms: PeaceTerms,
    pub acceptance: i32,
    pub offered_on: Day,
}

/// Signed peace. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeaceTreaty {
    pub id: TreatyId,
    pub war: WarId,
    pub treaty_type: TreatyType,
    pub winner: Option<Side>,
    pub gold_payment: i64,
    pub territory_changes: Vec<TerritoryChange>,
    pub truce_days: u32,
    pub signed_at: Day,
}

fn leader_of(war: &War, side: Side) -> Result<RulerId> {
    war.leader(side).map(|p| p.ruler).ok_or_else(|| {
        WarfareError::InvariantViolation(format!("war {} has no {side:?} leader", war.id))
    })
}

/// Check terms against the war as it stands
pub fn validate_terms(war: &War, terms: &PeaceTerms, config: &PeaceConfig) -> Result<()> {
    if !war.status.is_ongoing() {
        return Err(WarfareError::WarNotNegotiable(format!(
            "war already ended as {:?}",
            war.status
        )));
    }

    let winner = match (terms.treaty_type, terms.winner) {
        (TreatyType::WhitePeace, None) => {
            if !terms.territory_changes.is_empty() || terms.gold_payment != 0 {
                return Err(WarfareError::InvalidRequest(
                    "white peace transfers neither territory nor gold".into(),
                ));
            }
            return Ok(());
        }
        (TreatyType::WhitePeace, Some(_)) => {
            return Err(WarfareError::InvalidRequest(
                "white peace has no winner".into(),
            ));
        }
        (_, None) => {
            return Err(WarfareError::InvalidRequest(format!(
                "{:?} treaty needs a winner",
                terms.treaty_type
            )));
        }
        (_, Some(winner)) => winner,
    };
    let loser = winner.opposite();

    for (i, change) in terms.territory_changes.iter().enumerate() {
        if change.from != loser || change.to != winner {
            return Err(WarfareError::InvalidTerritoryTransfer(format!(
                "territory {} must pass from {loser:?} to {winner:?}",
                change.territory.0 .0
            )));
        }
        if terms.territory_changes[..i]
            .iter()
            .any(|c| c.territory == change.territory)
        {
            return Err(WarfareError::InvalidTerritoryTransfer(format!(
                "territory {} listed twice",
                change.territory.0 .0
            )));
        }
    }
    let needed = config.territory_score_cost * terms.territory_changes.len() as f32;
    if war.score(winner) < needed {
        return Err(WarfareError::InvalidTerritoryTransfer(format!(
            "{} territories need {needed} war score, {winner:?} has {}",
            terms.territory_changes.len(),
            war.score(winner)
        )));
    }

    if let Some(payer) = terms.gold_payer() {
        if payer != loser {
            return Err(WarfareError::InvalidRequest(format!(
                "gold must be paid by the losing side ({loser:?})"
            )));
        }
    }
    Ok(())
}

fn move_gold(
    war: &War,
    terms: &PeaceTerms,
    collaborators: &Collaborators,
) -> Result<Option<(RulerId, RulerId)>> {
    let Some(payer_side) = terms.gold_payer() else {
        return Ok(None);
    };
    let payer = leader_of(war, payer_side)?;
    let payee = leader_of(war, payer_side.opposite())?;
    let amount = terms.gold_amount();
    let treasury = collaborators.treasury.as_ref();

    charge(treasury, payer, amount)?;
    if let Err(e) = treasury.credit(payee, amount) {
        refund(treasury, payer, amount);
        return Err(e);
    }
    Ok(Some((payer, payee)))
}

fn undo_gold(moved: Option<(RulerId, RulerId)>, amount: Gold, collaborators: &Collaborators) {
    if let Some((payer, payee)) = moved {
        let treasury = collaborators.treasury.as_ref();
        match treasury.debit(payee, amount) {
            Ok(()) => refund(treasury, payer, amount),
            Err(e) => tracing::error!(%payee, amount, error = %e, "could not take back treaty gold"),
        }
    }
}

fn move_territory(war: &War, terms: &PeaceTerms, collaborators: &Collaborators) -> Result<()> {
    let registry = collaborators.territories.as_ref();
    for (done, change) in terms.territory_changes.iter().enumerate() {
        let from = leader_of(war, change.from)?;
        let to = leader_of(war, change.to)?;
        if let Err(e) = registry.transfer(change.territory, from, to) {
            for undo in terms.territory_changes[..done].iter().rev() {
                let (from, to) = (leader_of(war, undo.to)?, leader_of(war, undo.from)?);
                if let Err(e) = registry.transfer(undo.territory, from, to) {
                    tracing::error!(war = %war.id, error = %e, "territory rollback failed");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Validate `terms`, move gold and territory, and end the war
pub fn sign_treaty(
    war: &mut War,
    terms: PeaceTerms,
    day: Day,
    config: &WarfareConfig,
    collaborators: &Collaborators,
) -> Result<Vec<DomainEvent>> {
    validate_terms(war, &terms, &config.peace)?;

    let moved = move_gold(war, &terms, collaborators)?;
    if let Err(e) = move_territory(war, &terms, collaborators) {
        undo_gold(moved, terms.gold_amount(), collaborators);
        return Err(e);
    }

    let treaty = PeaceTreaty {
        id: TreatyId::new(),
        war: war.id,
        treaty_type: terms.treaty_type,
        winner: terms.winner,
        gold_payment: terms.gold_payment,
        territory_changes: terms.territory_changes,
        truce_days: terms.truce_days,
        signed_at: day,
    };
    war.status = match treaty.winner {
        Some(side) => WarStatus::victory(side),
        None => WarStatus::WhitePeace,
    };
    war.ended_on = Some(day);
    war.pending_offer = None;

    tracing::info!(
        war = %war.id,
        treaty = %treaty.id,
        treaty_type = ?treaty.treaty_type,
        winner = ?treaty.winner,
        truce_days = treaty.truce_days,
        "peace signed"
    );
    let events = vec![
        DomainEvent::PeaceSigned {
            war: war.id,
            treaty: treaty.id,
            treaty_type: treaty.treaty_type,
            winner: treaty.winner,
            day,
        },
        DomainEvent::WarEnded {
            war: war.id,
            status: war.status,
            day,
        },
    ];
    war.treaty = Some(treaty);
    Ok(events)
}

/// Record `terms` as the pending offer of `actor`'s side
pub fn offer_peace(
    war: &mut War,
    actor: RulerId,
    terms: PeaceTerms,
    day: Day,
    config: &PeaceConfig,
) -> Result<(AcceptanceEstimate, DomainEvent)> {
    let from = war.led_side(actor).ok_or_else(|| {
        WarfareError::WarNotNegotiable(format!("{actor} is not a war leader"))
    })?;
    validate_terms(war, &terms, config)?;

    let estimate = estimate_acceptance(war, &terms, from, config);
    war.pending_offer = Some(PeaceOffer {
        from,
        terms,
        acceptance: estimate.percentage,
        offered_on: day,
    });
    tracing::info!(war = %war.id, ?from, acceptance = estimate.percentage, "peace offered");
    let event = DomainEvent::PeaceOffered {
        war: war.id,
        from,
        acceptance: estimate.percentage,
    };
    Ok((estimate, event))
}

/// Sign the pending offer on behalf of the side it was made to
pub fn accept_peace(
    war: &mut War,
    actor: RulerId,
    day: Day,
    config: &WarfareConfig,
    collaborators: &Collaborators,
) -> Result<Vec<DomainEvent>> {
    let offer = war.pending_offer.clone().ok_or(WarfareError::NoPendingOffer)?;
    if war.led_side(actor) != Some(offer.from.opposite()) {
        return Err(WarfareError::WarNotNegotiable(format!(
            "{actor} does not lead the side the offer was made to"
        )));
    }
    sign_treaty(war, offer.terms, day, config, collaborators)
}

/// Sign terms directly, as agreed outside the offer flow
pub fn commit_peace(
    war: &mut War,
    actor: RulerId,
    terms: PeaceTerms,
    day: Day,
    config: &WarfareConfig,
    collaborators: &Collaborators,
) -> Result<Vec<DomainEvent>> {
    if war.led_side(actor).is_none() {
        return Err(WarfareError::WarNotNegotiable(format!(
            "{actor} is not a war leader"
        )));
    }
    sign_treaty(war, terms, day, config, collaborators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryReputation, InMemoryTerritories, InMemoryTreasury, Treasury};
    use crate::core::types::LocationId;
    use crate::war::{declare_war, record_score_delta, CasusBelli, Declaration, ScoreReason};
    use std::sync::Arc;

    struct Fixture {
        war: War,
        treasury: Arc<InMemoryTreasury>,
        territories: Arc<InMemoryTerritories>,
        collaborators: Collaborators,
        config: WarfareConfig,
    }

    const KING: RulerId = RulerId(1);
    const DUKE: RulerId = RulerId(2);

    fn fixture(attacker_score: f32) -> Fixture {
        let treasury = Arc::new(InMemoryTreasury::with_balances([(KING, 0), (DUKE, 1_000)]));
        let territories = Arc::new(InMemoryTerritories::new());
        territories.grant(TerritoryRef(LocationId(10)), DUKE);
        territories.grant(TerritoryRef(LocationId(11)), DUKE);
        let collaborators = Collaborators {
            treasury: treasury.clone(),
            territories: territories.clone(),
            ..Collaborators::in_memory()
        };
        let config = WarfareConfig::default();
        let (mut war, _) = declare_war(
            &[],
            Declaration {
                attacker: KING,
                defender: DUKE,
                casus_belli: CasusBelli::ClaimOnTitle,
                goals: Vec::new(),
                name: None,
            },
            Day(0),
            &InMemoryReputation::new(),
        )
        .unwrap();
        if attacker_score > 0.0 {
            record_score_delta(
                &mut war,
                Side::Attacker,
                attacker_score,
                ScoreReason::Adjustment("setup".into()),
                None,
                Day(1),
                &config,
                &collaborators,
            )
            .unwrap();
        }
        Fixture {
            war,
            treasury,
            territories,
            collaborators,
            config,
        }
    }

    fn cede(territory: u32) -> TerritoryChange {
        TerritoryChange {
            territory: TerritoryRef(LocationId(territory)),
            from: Side::Defender,
            to: Side::Attacker,
        }
    }

    fn victory_terms() -> PeaceTerms {
        PeaceTerms {
            treaty_type: TreatyType::Negotiated,
            winner: Some(Side::Attacker),
            territory_changes: vec![cede(10), cede(11)],
            gold_payment: 400,
            truce_days: 200,
        }
    }

    #[test]
    fn test_signing_moves_gold_and_land() {
        let mut f = fixture(40.0);
        let events =
            commit_peace(&mut f.war, KING, victory_terms(), Day(20), &f.config, &f.collaborators)
                .unwrap();
        assert_eq!(f.war.status, WarStatus::AttackerVictory);
        assert_eq!(f.war.ended_on, Some(Day(20)));
        assert_eq!(f.treasury.balance(KING), 400);
        assert_eq!(f.treasury.balance(DUKE), 600);
        assert_eq!(f.territories.owner(TerritoryRef(LocationId(11))), Some(KING));
        assert_eq!(f.war.truce_until(), Some(Day(220)));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_territory_needs_score() {
        let mut f = fixture(20.0);
        let err = commit_peace(&mut f.war, KING, victory_terms(), Day(20), &f.config, &f.collaborators)
            .unwrap_err();
        assert_eq!(err.code(), "InvalidTerritoryTransfer");
        assert!(f.war.status.is_ongoing());
        assert_eq!(f.treasury.balance(DUKE), 1_000);
    }

    #[test]
    fn test_territory_must_flow_to_winner() {
        let f = fixture(60.0);
        let mut terms = victory_terms();
        terms.territory_changes[0] = TerritoryChange {
            territory: TerritoryRef(LocationId(10)),
            from: Side::Attacker,
            to: Side::Defender,
        };
        let err = validate_terms(&f.war, &terms, &f.config.peace).unwrap_err();
        assert_eq!(err.code(), "InvalidTerritoryTransfer");
    }

    #[test]
    fn test_white_peace_shape() {
        let f = fixture(0.0);
        let mut terms = PeaceTerms::white_peace(365);
        assert!(validate_terms(&f.war, &terms, &f.config.peace).is_ok());
        terms.gold_payment = 10;
        assert_eq!(
            validate_terms(&f.war, &terms, &f.config.peace).unwrap_err().code(),
            "InvalidRequest"
        );
    }

    #[test]
    fn test_winner_cannot_pay() {
        let f = fixture(60.0);
        let mut terms = PeaceTerms::surrender(Side::Attacker, 100);
        terms.gold_payment = -100;
        assert!(validate_terms(&f.war, &terms, &f.config.peace).is_err());
    }

    #[test]
    fn test_failed_transfer_refunds_gold() {
        let mut f = fixture(40.0);
        let mut terms = victory_terms();
        // Territory 12 belongs to nobody, so the registry refuses it
        terms.territory_changes = vec![cede(10), cede(12)];
        let err = commit_peace(&mut f.war, KING, terms, Day(20), &f.config, &f.collaborators);
        assert!(err.is_err());
        assert_eq!(f.treasury.balance(KING), 0);
        assert_eq!(f.treasury.balance(DUKE), 1_000);
        assert_eq!(f.territories.owner(TerritoryRef(LocationId(10))), Some(DUKE));
    }

    #[test]
    fn test_offer_and_accept() {
        let mut f = fixture(0.0);
        let (estimate, _) =
            offer_peace(&mut f.war, DUKE, PeaceTerms::white_peace(365), Day(5), &f.config.peace)
                .unwrap();
        assert_eq!(estimate.percentage, 70);
        assert_eq!(f.war.pending_offer.as_ref().unwrap().from, Side::Defender);

        // The proposer cannot accept its own offer
        let err = accept_peace(&mut f.war, DUKE, Day(6), &f.config, &f.collaborators).unwrap_err();
        assert_eq!(err.code(), "WarNotNegotiable");

        accept_peace(&mut f.war, KING, Day(6), &f.config, &f.collaborators).unwrap();
        assert_eq!(f.war.status, WarStatus::WhitePeace);
        assert!(f.war.pending_offer.is_none());
    }

    #[test]
    fn test_accept_without_offer() {
        let mut f = fixture(0.0);
        let err = accept_peace(&mut f.war, KING, Day(6), &f.config, &f.collaborators).unwrap_err();
        assert_eq!(err, WarfareError::NoPendingOffer);
    }

    #[test]
    fn test_non_leader_cannot_negotiate() {
        let mut f = fixture(0.0);
        let err = commit_peace(
            &mut f.war,
            RulerId(9),
            PeaceTerms::white_peace(10),
            Day(3),
            &f.config,
            &f.collaborators,
        )
        .unwrap_err();
        assert_eq!(err.code(), "WarNotNegotiable");
    }

    #[test]
    fn test_pending_offer_signed_on_victory() {
        let mut f = fixture(40.0);
        let mut terms = victory_terms();
        terms.territory_changes.truncate(1);
        offer_peace(&mut f.war, KING, terms, Day(3), &f.config.peace).unwrap();
        record_score_delta(
            &mut f.war,
            Side::Attacker,
            60.0,
            ScoreReason::Adjustment("decisive".into()),
            None,
            Day(4),
            &f.config,
            &f.collaborators,
        )
        .unwrap();
        let treaty = f.war.treaty.as_ref().unwrap();
        assert_eq!(treaty.treaty_type, TreatyType::Negotiated);
        assert_eq!(treaty.truce_days, 200);
        assert_eq!(f.territories.owner(TerritoryRef(LocationId(10))), Some(KING));
    }
}
