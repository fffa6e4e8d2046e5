//! Daily tick driver
//!
//! One call per in-game day. Armies, sieges and battles are ticked in
//! parallel within each kind; the store's row locks keep a tick and a
//! command on the same aggregate from interleaving.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::handler::CommandHandler;
use crate::army::ledger::daily_upkeep_tick;
use crate::core::error::{ErrorCategory, Result, WarfareError};
use crate::core::types::Day;
use crate::events::DomainEvent;

/// What one day tick touched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayReport {
    pub day: Day,
    pub armies_ticked: usize,
    pub sieges_advanced: usize,
    pub battles_resolved: usize,
    pub events: usize,
}

pub struct DayTicker<'a> {
    handler: &'a CommandHandler,
}

fn skipped(kind: &'static str, result: Result<Vec<DomainEvent>>) -> Option<Vec<DomainEvent>> {
    match result {
        Ok(events) => Some(events),
        Err(WarfareError::TerminalState { .. })
        | Err(WarfareError::ArmyDisbanded(_))
        | Err(WarfareError::SiegeAlreadyAdvanced(_)) => None,
        Err(e) if e.category() == ErrorCategory::Invariant => {
            tracing::error!(kind, error = %e, "tick aborted, nothing committed");
            None
        }
        Err(e) => {
            tracing::warn!(kind, error = %e, "tick failed");
            None
        }
    }
}

impl<'a> DayTicker<'a> {
    pub fn new(handler: &'a CommandHandler) -> Self {
        Self { handler }
    }

    pub fn run_day(&self, day: Day) -> DayReport {
        let store = self.handler.store();
        let config = self.handler.config();
        let treasury = self.handler.collaborators().treasury.as_ref();

        let armies: Vec<Vec<DomainEvent>> = store
            .armies
            .ids()
            .into_par_iter()
            .filter_map(|id| {
                let result = store.armies.transact(id, None, |army| {
                    Ok(daily_upkeep_tick(
                        army,
                        day,
                        &config.army,
                        &config.mercenary,
                        treasury,
                    ))
                });
                skipped("army", result.map(|(events, _)| events))
            })
            .collect();

        let sieges: Vec<Vec<DomainEvent>> = store
            .sieges
            .ids()
            .into_par_iter()
            .filter_map(|id| {
                let result = store.sieges.transact(id, None, |siege| {
                    siege.ensure_not_advanced(day)?;
                    Ok(siege.advance_day(day, &config.siege))
                });
                skipped("siege", result.map(|(events, _)| events))
            })
            .collect();

        let battles: Vec<Vec<DomainEvent>> = store
            .battles
            .ids()
            .into_par_iter()
            .filter_map(|id| {
                let result = store
                    .battles
                    .transact(id, None, |battle| battle.resolve_day(day, &config.battle));
                skipped("battle", result.map(|(events, _)| events))
            })
            .collect();

        let mut report = DayReport {
            day,
            armies_ticked: armies.len(),
            sieges_advanced: sieges.len(),
            battles_resolved: battles.len(),
            events: 0,
        };
        let events: Vec<DomainEvent> = armies
            .into_iter()
            .chain(sieges)
            .chain(battles)
            .flatten()
            .collect();
        report.events = events.len();
        tracing::debug!(
            day = day.0,
            armies = report.armies_ticked,
            sieges = report.sieges_advanced,
            battles = report.battles_resolved,
            events = report.events,
            "day ticked"
        );
        self.handler.dispatch(events, day);
        report
    }
}
