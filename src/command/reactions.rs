//! Cross-aggregate consequences of committed events
//!
//! Each reaction runs in its own transaction on the aggregate it changes.
//! A reaction that finds its target already terminal is skipped.

use super::handler::CommandHandler;
use crate::army::ledger::apply_casualties;
use crate::army::ArmyStatus;
use crate::battle::{ParticipantOutcome, ParticipantResult};
use crate::core::error::{ErrorCategory, Result, WarfareError};
use crate::core::types::{ArmyId, BattleId, Day, RulerId, Side, SiegeId, WarId};
use crate::events::DomainEvent;
use crate::siege::Siege;
use crate::store::Versioned;
use crate::war::{record_score_delta, ScoreReason};

/// Follow-up events raised while applying `event` elsewhere
pub(super) fn react(handler: &CommandHandler, event: &DomainEvent, day: Day) -> Vec<DomainEvent> {
    let reactor = Reactor { handler, day };
    match event {
        DomainEvent::SiegeStarted { army, .. } => reactor.army_status(*army, ArmyStatus::Besieging),
        DomainEvent::SiegeCaptured {
            siege,
            war,
            side,
            army,
            commander,
            score,
            ..
        } => {
            let mut events = reactor.score(
                *war,
                *side,
                *score,
                ScoreReason::SiegeCaptured(*siege),
                Some(*commander),
            );
            events.extend(reactor.occupy(*siege, *army));
            events
        }
        DomainEvent::SiegeLifted { army, .. } => reactor.leave_siege(*army),
        DomainEvent::SiegeAbandoned {
            siege,
            war,
            side,
            score,
            ..
        } => reactor.score(*war, *side, *score, ScoreReason::SiegeAbandoned(*siege), None),
        DomainEvent::AssaultResolved {
            army,
            attacker_losses,
            morale_loss,
            ..
        } => reactor.casualties(*army, *attacker_losses, *morale_loss),
        DomainEvent::BattleStarted { armies, .. } => armies
            .iter()
            .flat_map(|army| reactor.army_status(*army, ArmyStatus::InBattle))
            .collect(),
        DomainEvent::BattleEnded {
            battle,
            war,
            winner,
            war_score,
            results,
            ..
        } => reactor.battle_ended(*battle, *war, *winner, *war_score, results),
        DomainEvent::ArmyDisbanded { army, .. }
        | DomainEvent::ArmyStarved { army, .. }
        | DomainEvent::ArmyDestroyed { army, .. } => reactor.end_sieges_of(*army, true),
        DomainEvent::ArmyMoved { army, .. } => reactor.end_sieges_of(*army, false),
        DomainEvent::ContractExpired { company, .. } | DomainEvent::CompanyReleased { company, .. } => {
            handler.market().release(*company);
            Vec::new()
        }
        DomainEvent::WarEnded { war, .. } => reactor.withdraw_from(*war),
        _ => Vec::new(),
    }
}

struct Reactor<'a> {
    handler: &'a CommandHandler,
    day: Day,
}

impl Reactor<'_> {
    /// Log and swallow a failed reaction
    fn settle(&self, what: &str, result: Result<Vec<DomainEvent>>) -> Vec<DomainEvent> {
        match result {
            Ok(events) => events,
            Err(e @ WarfareError::TerminalState { .. }) | Err(e @ WarfareError::ArmyDisbanded(_)) => {
                tracing::debug!(reaction = what, error = %e, "target already ended, skipped");
                Vec::new()
            }
            Err(e) if e.category() == ErrorCategory::Invariant => {
                tracing::error!(reaction = what, error = %e, "reaction broke an invariant");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(reaction = what, error = %e, "reaction failed");
                Vec::new()
            }
        }
    }

    fn army_status(&self, army: ArmyId, status: ArmyStatus) -> Vec<DomainEvent> {
        let result = self.handler.store().armies.transact(army, None, |a| {
            a.status = status;
            if status == ArmyStatus::InBattle {
                a.march = None;
            }
            Ok(Vec::new())
        });
        self.settle("army status", result.map(|(events, _)| events))
    }

    fn score(
        &self,
        war: WarId,
        side: Side,
        amount: f32,
        reason: ScoreReason,
        contributor: Option<RulerId>,
    ) -> Vec<DomainEvent> {
        let handler = self.handler;
        let result = handler.store().wars.transact(war, None, |w| {
            record_score_delta(
                w,
                side,
                amount,
                reason,
                contributor,
                self.day,
                handler.config(),
                handler.collaborators(),
            )
        });
        self.settle("war score", result.map(|(events, _)| events))
    }

    /// The besieger takes up quarters in the captured place
    fn occupy(&self, siege: SiegeId, army: ArmyId) -> Vec<DomainEvent> {
        let handler = self.handler;
        let target = match handler.store().sieges.get(siege) {
            Ok(Versioned { value, .. }) => value.target,
            Err(e) => return self.settle("occupy", Err(e)),
        };
        let bonus = handler.config().siege.capture_morale_bonus;
        let result = handler.store().armies.transact(army, None, |a| {
            if a.status == ArmyStatus::Besieging {
                a.status = ArmyStatus::Encamped;
            }
            a.location = target;
            a.adjust_morale(bonus);
            Ok(Vec::new())
        });
        self.settle("occupy", result.map(|(events, _)| events))
    }

    fn leave_siege(&self, army: ArmyId) -> Vec<DomainEvent> {
        let result = self.handler.store().armies.transact(army, None, |a| {
            if a.status == ArmyStatus::Besieging {
                a.status = ArmyStatus::Encamped;
            }
            Ok(Vec::new())
        });
        self.settle("leave siege", result.map(|(events, _)| events))
    }

    fn casualties(&self, army: ArmyId, losses: u32, morale_loss: f32) -> Vec<DomainEvent> {
        let day = self.day;
        let result = self
            .handler
            .store()
            .armies
            .transact(army, None, |a| apply_casualties(a, losses, morale_loss, day));
        self.settle("casualties", result.map(|(events, _)| events))
    }

    fn battle_ended(
        &self,
        battle: BattleId,
        war: Option<WarId>,
        winner: Option<Side>,
        war_score: f32,
        results: &[ParticipantResult],
    ) -> Vec<DomainEvent> {
        let location = self
            .handler
            .store()
            .battles
            .get(battle)
            .map(|b| b.value.location)
            .ok();

        let day = self.day;
        let mut events = Vec::new();
        for result in results {
            let applied = self.handler.store().armies.transact(result.army, None, |a| {
                let troops = a.troop_count();
                if result.casualties > troops {
                    tracing::warn!(
                        army = %a.id,
                        casualties = result.casualties,
                        troops,
                        "battle losses exceed the army, clamped"
                    );
                }
                let losses = result.casualties.min(troops);
                let events = apply_casualties(a, losses, result.morale_loss, day)?;
                if !a.is_disbanded() {
                    a.status = ArmyStatus::Encamped;
                    if let Some(location) = &location {
                        a.location = location.clone();
                    }
                }
                Ok(events)
            });
            events.extend(self.settle("battle losses", applied.map(|(events, _)| events)));
        }

        if let (Some(war), Some(side)) = (war, winner) {
            if war_score > 0.0 {
                events.extend(self.battle_score(battle, war, side, war_score, results));
            }
        }
        events
    }

    /// Split the battle's war score among the victors by troops committed
    fn battle_score(
        &self,
        battle: BattleId,
        war: WarId,
        side: Side,
        war_score: f32,
        results: &[ParticipantResult],
    ) -> Vec<DomainEvent> {
        let victors: Vec<&ParticipantResult> = results
            .iter()
            .filter(|r| r.outcome == ParticipantOutcome::Victory)
            .collect();
        let committed: u32 = victors.iter().map(|r| r.troops_committed).sum();
        let handler = self.handler;
        let day = self.day;

        let result = handler.store().wars.transact(war, None, |w| {
            if victors.is_empty() || committed == 0 {
                return record_score_delta(
                    w,
                    side,
                    war_score,
                    ScoreReason::Battle(battle),
                    None,
                    day,
                    handler.config(),
                    handler.collaborators(),
                );
            }
            let mut events = Vec::new();
            for victor in &victors {
                if !w.status.is_ongoing() {
                    break;
                }
                let share = war_score * victor.troops_committed as f32 / committed as f32;
                events.extend(record_score_delta(
                    w,
                    side,
                    share,
                    ScoreReason::Battle(battle),
                    Some(victor.commander),
                    day,
                    handler.config(),
                    handler.collaborators(),
                )?);
            }
            Ok(events)
        });
        self.settle("battle score", result.map(|(events, _)| events))
    }

    fn active_sieges(&self, filter: impl Fn(&Siege) -> bool) -> Vec<SiegeId> {
        self.handler
            .store()
            .sieges
            .find(|s| !s.status.is_terminal() && filter(s))
            .into_iter()
            .map(|v| v.value.id)
            .collect()
    }

    /// End the sieges `army` is holding: abandoned if the army is gone,
    /// lifted if it marched off
    fn end_sieges_of(&self, army: ArmyId, lost: bool) -> Vec<DomainEvent> {
        let config = &self.handler.config().siege;
        let day = self.day;
        let mut events = Vec::new();
        for siege in self.active_sieges(|s| s.besieger == army) {
            let result = self.handler.store().sieges.transact(siege, None, |s| {
                Ok(vec![if lost {
                    s.abandon(day, config)
                } else {
                    s.withdraw(day)
                }])
            });
            events.extend(self.settle("end siege", result.map(|(events, _)| events)));
        }
        events
    }

    /// Sieges of a finished war are called off
    fn withdraw_from(&self, war: WarId) -> Vec<DomainEvent> {
        let day = self.day;
        let mut events = Vec::new();
        for siege in self.active_sieges(|s| s.war == war) {
            let result = self
                .handler
                .store()
                .sieges
                .transact(siege, None, |s| Ok(vec![s.withdraw(day)]));
            events.extend(self.settle("withdraw siege", result.map(|(events, _)| events)));
        }
        events
    }
}
