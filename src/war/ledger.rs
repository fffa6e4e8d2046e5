//! War ledger operations: declaration, participants, goals and score
//!
//! War score only ever changes through [`record_score_delta`], which appends
//! an audited entry. Reaching the victory threshold ends the war in the same
//! call.

use super::war::{
    CasusBelli, ParticipantRole, ScoreEntry, ScoreReason, War, WarGoal, WarParticipant, WarStatus,
};
use crate::collaborators::{Collaborators, Reputation};
use crate::core::config::WarfareConfig;
use crate::core::error::{Result, WarfareError};
use crate::core::types::{Day, RulerId, Side, WarId};
use crate::events::DomainEvent;
use crate::peace::{sign_treaty, PeaceTerms, TreatyType};

/// Everything a declaration names
#[derive(Debug, Clone)]
pub struct Declaration {
    pub attacker: RulerId,
    pub defender: RulerId,
    pub casus_belli: CasusBelli,
    pub goals: Vec<WarGoal>,
    pub name: Option<String>,
}

/// Open a war between two leaders.
///
/// `existing` is every war already on record, used for the at-war and truce
/// checks.
pub fn declare_war(
    existing: &[War],
    declaration: Declaration,
    day: Day,
    reputation: &dyn Reputation,
) -> Result<(War, Vec<DomainEvent>)> {
    let Declaration {
        attacker,
        defender,
        casus_belli,
        goals,
        name,
    } = declaration;

    if attacker == defender {
        return Err(WarfareError::InvalidRequest(
            "a ruler cannot declare war on themselves".into(),
        ));
    }
    if casus_belli == CasusBelli::None {
        return Err(WarfareError::NoCasusBelli);
    }
    if goals.iter().any(|g| !g.value.is_finite() || g.value < 0.0 || g.is_achieved) {
        return Err(WarfareError::InvalidRequest(
            "war goals must start unachieved with a non-negative value".into(),
        ));
    }

    for war in existing {
        if war.status.is_ongoing() && war.opposes(attacker, defender) {
            return Err(WarfareError::AlreadyAtWar(format!("{attacker} and {defender}")));
        }
    }
    let truce = existing
        .iter()
        .filter(|w| !w.status.is_ongoing() && w.led_by(attacker, defender))
        .filter_map(|w| w.truce_until())
        .filter(|until| day < *until)
        .max();
    if let Some(until) = truce {
        return Err(WarfareError::TruceActive { until });
    }

    let delta = casus_belli.legitimacy_delta();
    if delta != 0 {
        reputation.adjust_legitimacy(attacker, delta)?;
    }

    let leader = |ruler, side| WarParticipant {
        ruler,
        side,
        role: ParticipantRole::Primary,
        is_war_leader: true,
        contribution: 0.0,
        joined_on: day,
    };
    let war = War {
        id: WarId::new(),
        name: name.unwrap_or_else(|| format!("War of {attacker} against {defender}")),
        casus_belli,
        status: WarStatus::Active,
        declared_on: day,
        ended_on: None,
        participants: vec![leader(attacker, Side::Attacker), leader(defender, Side::Defender)],
        goals,
        score_log: Vec::new(),
        pending_offer: None,
        treaty: None,
    };
    tracing::info!(war = %war.id, %attacker, %defender, ?casus_belli, "war declared");

    let events = vec![
        DomainEvent::WarDeclared {
            war: war.id,
            attacker,
            defender,
            casus_belli,
            day,
        },
        DomainEvent::ParticipantJoined {
            war: war.id,
            ruler: attacker,
            side: Side::Attacker,
            role: ParticipantRole::Primary,
        },
        DomainEvent::ParticipantJoined {
            war: war.id,
            ruler: defender,
            side: Side::Defender,
            role: ParticipantRole::Primary,
        },
    ];
    Ok((war, events))
}

/// Bring an ally or vassal into the war. War leaders are fixed at declaration.
pub fn add_participant(
    war: &mut War,
    side: Side,
    ruler: RulerId,
    role: ParticipantRole,
    day: Day,
) -> Result<DomainEvent> {
    if role == ParticipantRole::Primary {
        return Err(WarfareError::InvalidRequest(
            "each side has exactly one primary participant, set at declaration".into(),
        ));
    }
    if war.participant(ruler).is_some() {
        return Err(WarfareError::DuplicateParticipant(ruler));
    }
    war.participants.push(WarParticipant {
        ruler,
        side,
        role,
        is_war_leader: false,
        contribution: 0.0,
        joined_on: day,
    });
    tracing::info!(war = %war.id, %ruler, ?side, ?role, "participant joined");
    Ok(DomainEvent::ParticipantJoined {
        war: war.id,
        ruler,
        side,
        role,
    })
}

/// Append a score change for `side`, clamping the running total to [0, 100].
///
/// Positive gains are credited to `contributor` when it fights on `side`,
/// otherwise to the side's war leader. Reaching the victory threshold
/// finalizes the war.
#[allow(clippy::too_many_arguments)]
pub fn record_score_delta(
    war: &mut War,
    side: Side,
    amount: f32,
    reason: ScoreReason,
    contributor: Option<RulerId>,
    day: Day,
    config: &WarfareConfig,
    collaborators: &Collaborators,
) -> Result<Vec<DomainEvent>> {
    if !amount.is_finite() {
        return Err(WarfareError::InvalidRequest(format!(
            "war score delta {amount} is not a number"
        )));
    }
    if !war.status.is_ongoing() {
        return Err(WarfareError::terminal("war", war.status));
    }

    let current = war.score(side);
    let applied = (current + amount).clamp(0.0, 100.0) - current;
    war.score_log.push(ScoreEntry {
        day,
        side,
        requested: amount,
        applied,
        reason: reason.clone(),
        contributor,
    });

    if applied > 0.0 {
        let credited = contributor
            .filter(|c| war.side_of(*c) == Some(side))
            .or_else(|| war.leader(side).map(|l| l.ruler));
        if let Some(p) = war
            .participants
            .iter_mut()
            .find(|p| Some(p.ruler) == credited)
        {
            p.contribution += applied;
        }
    }
    war.refresh_status(config.war.winning_margin);
    tracing::debug!(
        war = %war.id,
        ?side,
        requested = amount,
        applied,
        attacker = war.attacker_score(),
        defender = war.defender_score(),
        "war score changed"
    );

    let mut events = vec![DomainEvent::WarScoreChanged {
        war: war.id,
        side,
        requested: amount,
        applied,
        attacker_score: war.attacker_score(),
        defender_score: war.defender_score(),
        reason,
    }];

    if war.score(side) >= config.war.victory_threshold {
        events.extend(finalize_victory(war, side, day, config, collaborators));
    }
    Ok(events)
}

/// Mark a goal achieved and award its value to the goal's side
pub fn achieve_goal(
    war: &mut War,
    actor: RulerId,
    goal: usize,
    day: Day,
    config: &WarfareConfig,
    collaborators: &Collaborators,
) -> Result<Vec<DomainEvent>> {
    let target = war
        .goals
        .get(goal)
        .ok_or_else(|| WarfareError::not_found("war goal", goal))?;
    let side = target.side;
    if war.led_side(actor) != Some(side) {
        return Err(WarfareError::NotOwner {
            actor,
            what: format!("war goal {goal}"),
        });
    }
    if target.is_achieved {
        return Err(WarfareError::GoalAlreadyAchieved);
    }
    let value = target.value;
    war.goals[goal].is_achieved = true;

    let mut events = vec![DomainEvent::WarGoalAchieved {
        war: war.id,
        goal,
        side,
    }];
    events.extend(record_score_delta(
        war,
        side,
        value,
        ScoreReason::WarGoal(goal),
        Some(actor),
        day,
        config,
        collaborators,
    )?);
    Ok(events)
}

/// End the war in `side`'s favor.
///
/// A pending offer naming the same winner is signed as offered; otherwise, or
/// if its terms can no longer be carried out, a plain surrender is imposed.
pub fn finalize_victory(
    war: &mut War,
    side: Side,
    day: Day,
    config: &WarfareConfig,
    collaborators: &Collaborators,
) -> Vec<DomainEvent> {
    if let Some(offer) = war.pending_offer.clone() {
        if offer.terms.winner == Some(side) {
            match sign_treaty(war, offer.terms, day, config, collaborators) {
                Ok(events) => return events,
                Err(e) => {
                    tracing::warn!(war = %war.id, error = %e, "pending offer could not be signed");
                }
            }
        }
    }

    let terms = PeaceTerms {
        treaty_type: TreatyType::Surrender,
        winner: Some(side),
        territory_changes: Vec::new(),
        gold_payment: 0,
        truce_days: config.war.default_truce_days,
    };
    match sign_treaty(war, terms, day, config, collaborators) {
        Ok(events) => events,
        // Nothing to transfer, so signing cannot reach a collaborator
        Err(e) => {
            tracing::error!(war = %war.id, error = %e, "default surrender failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryReputation;
    use crate::war::WarGoalKind;

    fn declaration(attacker: u32, defender: u32) -> Declaration {
        Declaration {
            attacker: RulerId(attacker),
            defender: RulerId(defender),
            casus_belli: CasusBelli::Conquest,
            goals: vec![WarGoal::new(WarGoalKind::Humiliate, Side::Attacker, 30.0)],
            name: None,
        }
    }

    fn war() -> War {
        declare_war(&[], declaration(1, 2), Day(0), &InMemoryReputation::new())
            .unwrap()
            .0
    }

    #[test]
    fn test_declare_applies_legitimacy() {
        let reputation = InMemoryReputation::new();
        let (war, events) = declare_war(&[], declaration(1, 2), Day(0), &reputation).unwrap();
        assert_eq!(reputation.legitimacy(RulerId(1)), -15);
        assert_eq!(war.participants.len(), 2);
        assert!(war.leader(Side::Attacker).is_some());
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_no_casus_belli() {
        let mut d = declaration(1, 2);
        d.casus_belli = CasusBelli::None;
        let err = declare_war(&[], d, Day(0), &InMemoryReputation::new()).unwrap_err();
        assert_eq!(err, WarfareError::NoCasusBelli);
    }

    #[test]
    fn test_already_at_war_either_direction() {
        let existing = vec![war()];
        let rep = InMemoryReputation::new();
        let err = declare_war(&existing, declaration(2, 1), Day(5), &rep).unwrap_err();
        assert_eq!(err.code(), "AlreadyAtWar");
        assert!(declare_war(&existing, declaration(1, 3), Day(5), &rep).is_ok());
    }

    #[test]
    fn test_duplicate_participant() {
        let mut w = war();
        add_participant(&mut w, Side::Attacker, RulerId(5), ParticipantRole::Ally, Day(1)).unwrap();
        let err = add_participant(&mut w, Side::Defender, RulerId(5), ParticipantRole::Vassal, Day(1))
            .unwrap_err();
        assert_eq!(err, WarfareError::DuplicateParticipant(RulerId(5)));
        let err = add_participant(&mut w, Side::Defender, RulerId(6), ParticipantRole::Primary, Day(1))
            .unwrap_err();
        assert_eq!(err.code(), "InvalidRequest");
    }

    #[test]
    fn test_score_clamped_and_audited() {
        let config = WarfareConfig::default();
        let collab = Collaborators::in_memory();
        let mut w = war();
        let reason = || ScoreReason::Adjustment("test".into());

        record_score_delta(&mut w, Side::Defender, -10.0, reason(), None, Day(1), &config, &collab)
            .unwrap();
        assert_eq!(w.defender_score(), 0.0);
        assert_eq!(w.score_log[0].requested, -10.0);
        assert_eq!(w.score_log[0].applied, 0.0);

        record_score_delta(&mut w, Side::Attacker, 15.0, reason(), None, Day(1), &config, &collab)
            .unwrap();
        assert_eq!(w.status, WarStatus::AttackerWinning);
        assert_eq!(w.leader(Side::Attacker).unwrap().contribution, 15.0);
    }

    #[test]
    fn test_reaching_hundred_ends_war() {
        let config = WarfareConfig::default();
        let collab = Collaborators::in_memory();
        let mut w = war();
        let events = record_score_delta(
            &mut w,
            Side::Defender,
            130.0,
            ScoreReason::Adjustment("rout".into()),
            None,
            Day(9),
            &config,
            &collab,
        )
        .unwrap();
        assert_eq!(w.defender_score(), 100.0);
        assert_eq!(w.score_log[0].applied, 100.0);
        assert_eq!(w.status, WarStatus::DefenderVictory);
        let treaty = w.treaty.as_ref().unwrap();
        assert_eq!(treaty.treaty_type, TreatyType::Surrender);
        assert_eq!(treaty.truce_days, 365);
        assert!(events
            .iter()
            .any(|e| matches!(e, DomainEvent::WarEnded { .. })));
    }

    #[test]
    fn test_goal_achieved_once() {
        let config = WarfareConfig::default();
        let collab = Collaborators::in_memory();
        let mut w = war();
        achieve_goal(&mut w, RulerId(1), 0, Day(3), &config, &collab).unwrap();
        assert_eq!(w.attacker_score(), 30.0);
        let err = achieve_goal(&mut w, RulerId(1), 0, Day(4), &config, &collab).unwrap_err();
        assert_eq!(err, WarfareError::GoalAlreadyAchieved);
        assert_eq!(w.attacker_score(), 30.0);
    }

    #[test]
    fn test_contribution_goes_to_contributor() {
        let config = WarfareConfig::default();
        let collab = Collaborators::in_memory();
        let mut w = war();
        add_participant(&mut w, Side::Attacker, RulerId(7), ParticipantRole::Ally, Day(1)).unwrap();
        record_score_delta(
            &mut w,
            Side::Attacker,
            8.0,
            ScoreReason::Adjustment("siege".into()),
            Some(RulerId(7)),
            Day(2),
            &config,
            &collab,
        )
        .unwrap();
        assert_eq!(w.participant(RulerId(7)).unwrap().contribution, 8.0);
        assert_eq!(w.leader(Side::Attacker).unwrap().contribution, 0.0);
    }
}
