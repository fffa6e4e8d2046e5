//! Army ledger operations
//!
//! Each operation works on one army that the caller already holds under its
//! row lock, and reports what happened as domain events. Gold moves through
//! the treasury before any mutation, so a refusal leaves the army untouched.

use super::army::{Army, ArmyStatus, MarchOrder};
use super::unit::UnitType;
use crate::collaborators::{charge, Treasury};
use crate::core::config::{ArmyConfig, MercenaryConfig};
use crate::core::error::{Result, WarfareError};
use crate::core::types::{Day, Location, RulerId};
use crate::events::DomainEvent;
use crate::mercenary::tick_contracts;

/// Debit the raise cost and muster a new, empty army
pub fn raise_army(
    commander: RulerId,
    name: &str,
    location: Location,
    day: Day,
    config: &ArmyConfig,
    treasury: &dyn Treasury,
) -> Result<(Army, DomainEvent)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WarfareError::InvalidRequest("army name must not be empty".into()));
    }
    charge(treasury, commander, config.raise_cost)?;

    let army = Army::new(commander, name, location, day, config);
    tracing::info!(army = %army.id, %commander, name, "army raised");
    let event = DomainEvent::ArmyRaised {
        army: army.id,
        commander,
        day,
    };
    Ok((army, event))
}

/// Pay for and add `count` soldiers of `unit_type`
pub fn recruit_units(
    army: &mut Army,
    actor: RulerId,
    unit_type: UnitType,
    count: i64,
    treasury: &dyn Treasury,
) -> Result<DomainEvent> {
    let count = u32::try_from(count)
        .ok()
        .filter(|c| *c > 0)
        .ok_or(WarfareError::InvalidUnitCount(count))?;
    army.ensure_active()?;
    army.ensure_commander(actor)?;

    let cost = unit_type.recruit_cost(count);
    charge(treasury, army.commander, cost)?;
    army.recruit(unit_type, count);

    tracing::info!(army = %army.id, ?unit_type, count, cost, "units recruited");
    Ok(DomainEvent::UnitsRecruited {
        army: army.id,
        unit_type,
        count,
        cost,
    })
}

/// Terminal transition. Hired companies go back to the market.
pub fn disband_army(army: &mut Army, actor: RulerId, day: Day) -> Result<Vec<DomainEvent>> {
    army.ensure_active()?;
    army.ensure_commander(actor)?;
    if army.status == ArmyStatus::InBattle {
        return Err(WarfareError::CannotDisbandWhileInBattle(army.id));
    }
    let events = dissolve(
        army,
        day,
        DomainEvent::ArmyDisbanded {
            army: army.id,
            commander: army.commander,
            day,
        },
    );
    tracing::info!(army = %army.id, "army disbanded");
    Ok(events)
}

/// Days to march from the army's location to `destination`
pub fn travel_days(army: &Army, destination: &Location, config: &ArmyConfig) -> u32 {
    let distance = army.location.coord.distance(&destination.coord);
    let speed = army.march_speed(config.base_march_speed).max(f32::EPSILON);
    ((distance as f32 / speed).ceil() as u32).max(1)
}

pub fn move_army(
    army: &mut Army,
    actor: RulerId,
    destination: Location,
    day: Day,
    config: &ArmyConfig,
) -> Result<DomainEvent> {
    army.ensure_commander(actor)?;
    if !army.status.is_movable() {
        return Err(WarfareError::ArmyNotMovable {
            army: army.id,
            status: format!("{:?}", army.status),
        });
    }

    let days = travel_days(army, &destination, config);
    let arrives_on = day.plus(days);
    let event = DomainEvent::ArmyMoved {
        army: army.id,
        destination: destination.id,
        arrives_on,
    };
    tracing::info!(
        army = %army.id,
        from = %army.location.name,
        to = %destination.name,
        days,
        "army marching"
    );
    army.status = ArmyStatus::Marching;
    army.march = Some(MarchOrder {
        destination,
        departed_on: day,
        arrives_on,
    });
    Ok(event)
}

/// One day of upkeep: mustering and marching progress, contracts, supplies,
/// wages and starvation.
///
/// Never fails. A treasury refusal costs morale instead of failing the tick.
pub fn daily_upkeep_tick(
    army: &mut Army,
    day: Day,
    config: &ArmyConfig,
    mercenaries: &MercenaryConfig,
    treasury: &dyn Treasury,
) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    if army.is_disbanded() {
        return events;
    }

    match army.status {
        ArmyStatus::Mustering => {
            army.days_mustered += 1;
            if army.days_mustered >= config.muster_days {
                army.status = ArmyStatus::Encamped;
                tracing::debug!(army = %army.id, "mustering complete");
            }
        }
        ArmyStatus::Marching => {
            if let Some(order) = army.march.take() {
                if day >= order.arrives_on {
                    army.location = order.destination;
                    army.status = ArmyStatus::Encamped;
                    events.push(DomainEvent::ArmyArrived {
                        army: army.id,
                        location: army.location.id,
                        day,
                    });
                } else {
                    army.march = Some(order);
                }
            } else {
                army.status = ArmyStatus::Encamped;
            }
        }
        _ => {}
    }

    let troops_before = army.troop_count();
    events.extend(tick_contracts(army, day, mercenaries));
    if troops_before > 0 && army.troop_count() == 0 && army.status != ArmyStatus::InBattle {
        let disbanded = DomainEvent::ArmyDisbanded {
            army: army.id,
            commander: army.commander,
            day,
        };
        events.extend(dissolve(army, day, disbanded));
        return events;
    }

    army.supplies = (army.supplies - army.daily_supply_cost).max(0.0);

    let upkeep = army.gold_upkeep();
    if let Err(e) = charge(treasury, army.commander, upkeep) {
        tracing::warn!(army = %army.id, upkeep, error = %e, "upkeep unpaid");
        army.adjust_morale(-config.unpaid_upkeep_morale_penalty);
        events.push(DomainEvent::UpkeepUnpaid {
            army: army.id,
            commander: army.commander,
            amount: upkeep,
            day,
        });
    }

    if army.supplies <= 0.0 {
        army.adjust_morale(-config.starvation_morale_decay);
        tracing::debug!(army = %army.id, morale = army.morale, "army starving");
    }

    // An army locked in battle fights on at zero morale
    if army.morale <= 0.0 && army.status != ArmyStatus::InBattle {
        tracing::info!(army = %army.id, "army starved and dissolved");
        let starved = DomainEvent::ArmyStarved {
            army: army.id,
            commander: army.commander,
            day,
        };
        events.extend(dissolve(army, day, starved));
    }

    events
}

/// Apply combat losses and morale loss; an army left without soldiers is destroyed
pub fn apply_casualties(
    army: &mut Army,
    losses: u32,
    morale_loss: f32,
    day: Day,
) -> Result<Vec<DomainEvent>> {
    army.apply_losses(losses)?;
    army.adjust_morale(-morale_loss);
    if army.troop_count() == 0 {
        tracing::info!(army = %army.id, "army destroyed");
        let destroyed = DomainEvent::ArmyDestroyed {
            army: army.id,
            commander: army.commander,
            day,
        };
        return Ok(dissolve(army, day, destroyed));
    }
    Ok(Vec::new())
}

/// Disband and queue the company releases behind `cause`
fn dissolve(army: &mut Army, day: Day, cause: DomainEvent) -> Vec<DomainEvent> {
    let released = army.disband(day);
    let mut events = vec![cause];
    events.extend(released.into_iter().map(|company| DomainEvent::CompanyReleased {
        company,
        army: army.id,
    }));
    events
}
