//! The command handler: one request in, one response out
//!
//! Each command mutates a single aggregate inside one store transaction.
//! Events raised by the transaction are drained after it commits: each is
//! published, then handed to the reaction layer, which may touch other
//! aggregates in transactions of their own.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::reactions;
use super::request::{Command, CommandFailure, Request, Response};
use crate::army::ledger::{disband_army, move_army, raise_army, recruit_units};
use crate::army::Army;
use crate::battle::{Battle, BattleSetup};
use crate::collaborators::{charge, publish, refund, Collaborators};
use crate::core::config::WarfareConfig;
use crate::core::error::{ErrorCategory, Result, WarfareError};
use crate::core::types::{ArmyId, CompanyId, Day, RulerId};
use crate::events::{DomainEvent, Outbox};
use crate::mercenary::{enlist_company, extend_contract, ExpiryPolicy, MercenaryMarket};
use crate::peace::{accept_peace, commit_peace, offer_peace};
use crate::siege::begin_siege;
use crate::store::{Store, Version, Versioned};
use crate::war::{
    achieve_goal, add_participant, declare_war, record_score_delta, Declaration, ScoreReason,
};

pub struct CommandHandler {
    store: Arc<Store>,
    config: Arc<WarfareConfig>,
    market: Arc<MercenaryMarket>,
    collaborators: Collaborators,
    /// Serializes war declarations so two cannot both pass the at-war check
    declarations: Mutex<()>,
}

impl CommandHandler {
    pub fn new(
        config: WarfareConfig,
        market: MercenaryMarket,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            store: Arc::new(Store::new()),
            config: Arc::new(config),
            market: Arc::new(market),
            collaborators,
            declarations: Mutex::new(()),
        }
    }

    /// Default config, default catalog and in-memory collaborators
    pub fn in_memory() -> Self {
        Self::new(
            WarfareConfig::default(),
            MercenaryMarket::default(),
            Collaborators::in_memory(),
        )
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &WarfareConfig {
        &self.config
    }

    pub fn market(&self) -> &MercenaryMarket {
        &self.market
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Run one request to completion, including the reactions it triggers
    pub fn handle(&self, request: Request) -> Response {
        match self.execute(&request) {
            Ok((response, events)) => {
                self.dispatch(events, request.day);
                response
            }
            Err(error) => {
                log_failure(&request, &error);
                Response::Failure(CommandFailure::from(&error))
            }
        }
    }

    /// Apply the command, re-reading and retrying on version conflicts
    fn execute(&self, request: &Request) -> Result<(Response, Vec<DomainEvent>)> {
        let max_retries = self.config.engine.max_conflict_retries;
        let mut attempt = 0;
        loop {
            let mut outbox = Outbox::new();
            match self.apply(request, &mut outbox) {
                Ok(response) => return Ok((response, outbox.take())),
                Err(WarfareError::VersionConflict { entity, .. })
                    if attempt < max_retries && !pinned(request, entity) =>
                {
                    attempt += 1;
                    tracing::debug!(
                        command = request.command.name(),
                        entity,
                        attempt,
                        "version conflict, retrying"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Publish and react to events until nothing new is raised
    pub(crate) fn dispatch(&self, events: Vec<DomainEvent>, day: Day) {
        let mut queue: VecDeque<DomainEvent> = events.into();
        while let Some(event) = queue.pop_front() {
            publish(self.collaborators.publisher.as_ref(), &event);
            queue.extend(reactions::react(self, &event, day));
        }
    }

    fn apply(&self, request: &Request, outbox: &mut Outbox) -> Result<Response> {
        let Request {
            actor,
            day,
            expected_version: expected,
            ref command,
        } = *request;
        let config = &*self.config;
        let treasury = self.collaborators.treasury.as_ref();
        let store = &*self.store;

        let response = match command {
            Command::RaiseArmy { name, location } => {
                let (army, event) =
                    raise_army(actor, name, location.clone(), day, &config.army, treasury)?;
                let snapshot = match store.armies.insert(army) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        refund(treasury, actor, config.army.raise_cost);
                        return Err(e);
                    }
                };
                outbox.push(event);
                Response::Army(snapshot)
            }
            Command::RecruitUnits {
                army,
                unit_type,
                count,
            } => {
                let (event, snapshot) = store.armies.transact(*army, expected, |a| {
                    recruit_units(a, actor, *unit_type, *count, treasury)
                })?;
                outbox.push(event);
                Response::Army(snapshot)
            }
            Command::DisbandArmy { army } => {
                let (events, snapshot) = store
                    .armies
                    .transact(*army, expected, |a| disband_army(a, actor, day))?;
                outbox.extend(events);
                Response::Army(snapshot)
            }
            Command::MoveArmy { army, destination } => {
                let (event, snapshot) = store.armies.transact(*army, expected, |a| {
                    move_army(a, actor, destination.clone(), day, &config.army)
                })?;
                outbox.push(event);
                Response::Army(snapshot)
            }
            Command::HireMercenaries {
                company,
                contract_days,
                join,
                policy,
            } => {
                let snapshot =
                    self.hire(actor, *company, *contract_days, *join, *policy, day, expected, outbox)?;
                Response::Army(snapshot)
            }
            Command::ExtendContract {
                army,
                company,
                days,
            } => {
                let (cost, snapshot) = store.armies.transact(*army, expected, |a| {
                    a.ensure_active()?;
                    a.ensure_commander(actor)?;
                    let cost = extend_contract(a, *company, *days, day)?;
                    charge(treasury, actor, cost)?;
                    Ok(cost)
                })?;
                tracing::info!(army = %army, company = %company, days = *days, cost, "contract extended");
                Response::Army(snapshot)
            }

            Command::DeclareWar {
                defender,
                casus_belli,
                goals,
                name,
            } => {
                let _serial = self.declarations.lock().map_err(|_| {
                    WarfareError::InvariantViolation("declaration lock poisoned".into())
                })?;
                let existing: Vec<_> = store.wars.find(|_| true).into_iter().map(|v| v.value).collect();
                let (war, events) = declare_war(
                    &existing,
                    Declaration {
                        attacker: actor,
                        defender: *defender,
                        casus_belli: *casus_belli,
                        goals: goals.clone(),
                        name: name.clone(),
                    },
                    day,
                    self.collaborators.reputation.as_ref(),
                )?;
                let snapshot = store.wars.insert(war)?;
                outbox.extend(events);
                Response::War(snapshot)
            }
            Command::AddParticipant {
                war,
                ruler,
                side,
                role,
            } => {
                let (event, snapshot) = store.wars.transact(*war, expected, |w| {
                    if w.led_side(actor) != Some(*side) {
                        return Err(WarfareError::NotOwner {
                            actor,
                            what: format!("the {side:?} side of war '{}'", w.name),
                        });
                    }
                    add_participant(w, *side, *ruler, *role, day)
                })?;
                outbox.push(event);
                Response::War(snapshot)
            }
            Command::AchieveWarGoal { war, goal } => {
                let (events, snapshot) = store.wars.transact(*war, expected, |w| {
                    achieve_goal(w, actor, *goal, day, config, &self.collaborators)
                })?;
                outbox.extend(events);
                Response::War(snapshot)
            }
            Command::RecordWarScore {
                war,
                side,
                amount,
                reason,
            } => {
                let (events, snapshot) = store.wars.transact(*war, expected, |w| {
                    if w.led_side(actor).is_none() {
                        return Err(WarfareError::NotOwner {
                            actor,
                            what: format!("score of war {}", w.id),
                        });
                    }
                    record_score_delta(
                        w,
                        *side,
                        *amount,
                        ScoreReason::Adjustment(reason.clone()),
                        Some(actor),
                        day,
                        config,
                        &self.collaborators,
                    )
                })?;
                outbox.extend(events);
                Response::War(snapshot)
            }

            Command::OfferPeace { war, terms } => {
                let ((estimate, event), snapshot) = store.wars.transact(*war, expected, |w| {
                    offer_peace(w, actor, terms.clone(), day, &config.peace)
                })?;
                outbox.push(event);
                Response::PeaceOffered {
                    war: snapshot,
                    estimate,
                }
            }
            Command::AcceptPeace { war } => {
                let (events, snapshot) = store.wars.transact(*war, expected, |w| {
                    accept_peace(w, actor, day, config, &self.collaborators)
                })?;
                outbox.extend(events);
                Response::War(snapshot)
            }
            Command::CommitPeace { war, terms } => {
                let (events, snapshot) = store.wars.transact(*war, expected, |w| {
                    commit_peace(w, actor, terms.clone(), day, config, &self.collaborators)
                })?;
                outbox.extend(events);
                Response::War(snapshot)
            }

            Command::BeginSiege {
                war,
                army,
                target,
                defenses,
            } => {
                let war_read = store.wars.get(*war)?;
                let army_read = store.armies.get(*army)?;
                let (siege, event) = begin_siege(
                    &war_read.value,
                    &army_read.value,
                    actor,
                    target.clone(),
                    *defenses,
                    day,
                )?;
                store.wars.ensure_version(*war, war_read.version)?;
                store.armies.ensure_version(*army, army_read.version)?;
                let snapshot = store.sieges.insert(siege)?;
                outbox.push(event);
                Response::Siege(snapshot)
            }
            Command::BuildSiegeEquipment { siege, equipment } => {
                let (event, snapshot) = store.sieges.transact(*siege, expected, |s| {
                    s.build_equipment(actor, *equipment, day, treasury)
                })?;
                outbox.push(event);
                Response::Siege(snapshot)
            }
            Command::AdvanceSiegeDay { siege } => {
                let (events, snapshot) = store.sieges.transact(*siege, expected, |s| {
                    s.ensure_besieger(actor)?;
                    s.ensure_not_advanced(day)?;
                    Ok(s.advance_day(day, &config.siege))
                })?;
                outbox.extend(events);
                Response::Siege(snapshot)
            }
            Command::LaunchAssault { siege, army } => {
                let army_read = store.armies.get(*army)?;
                let (events, snapshot) = store.sieges.transact(*siege, expected, |s| {
                    let events = s.launch_assault(
                        actor,
                        &army_read.value,
                        day,
                        &config.siege,
                        config.engine.seed,
                    )?;
                    store.armies.ensure_version(*army, army_read.version)?;
                    Ok(events)
                })?;
                outbox.extend(events);
                Response::Siege(snapshot)
            }
            Command::LiftSiege { siege } => {
                let (event, snapshot) = store
                    .sieges
                    .transact(*siege, expected, |s| s.lift(actor, day))?;
                outbox.push(event);
                Response::Siege(snapshot)
            }

            Command::StartBattle {
                war,
                location,
                battle_type,
                terrain,
                weather,
                attackers,
                defenders,
            } => {
                let war_read = war.map(|id| store.wars.get(id)).transpose()?;
                let attacker_reads = read_armies(store, attackers)?;
                let defender_reads = read_armies(store, defenders)?;
                let attacker_armies: Vec<Army> =
                    attacker_reads.iter().map(|v| v.value.clone()).collect();
                let defender_armies: Vec<Army> =
                    defender_reads.iter().map(|v| v.value.clone()).collect();

                let (battle, event) = Battle::start(
                    BattleSetup {
                        war: war_read.as_ref().map(|v| &v.value),
                        location: location.clone(),
                        battle_type: *battle_type,
                        terrain: *terrain,
                        weather: *weather,
                        attackers: &attacker_armies,
                        defenders: &defender_armies,
                    },
                    actor,
                    day,
                )?;
                if let Some(read) = &war_read {
                    store.wars.ensure_version(read.value.id, read.version)?;
                }
                for read in attacker_reads.iter().chain(&defender_reads) {
                    store.armies.ensure_version(read.value.id, read.version)?;
                }
                let snapshot = store.battles.insert(battle)?;
                outbox.push(event);
                Response::Battle(snapshot)
            }
            Command::ResolveBattleDay { battle } => {
                let (events, snapshot) = store.battles.transact(*battle, expected, |b| {
                    if !b.participants.iter().any(|p| p.commander == actor) {
                        return Err(WarfareError::NotOwner {
                            actor,
                            what: format!("a side of the battle at {}", b.location.name),
                        });
                    }
                    b.resolve_day(day, &config.battle)
                })?;
                outbox.extend(events);
                Response::Battle(snapshot)
            }
        };
        Ok(response)
    }

    /// Reserve the company, take the hire fee, then add the company to an
    /// army. Any failure after the reservation hands back both.
    #[allow(clippy::too_many_arguments)]
    fn hire(
        &self,
        actor: RulerId,
        company: CompanyId,
        contract_days: u32,
        join: Option<ArmyId>,
        policy: ExpiryPolicy,
        day: Day,
        expected: Option<Version>,
        outbox: &mut Outbox,
    ) -> Result<Versioned<Army>> {
        if contract_days == 0 {
            return Err(WarfareError::InvalidRequest(
                "a contract must run at least one day".into(),
            ));
        }
        let treasury = self.collaborators.treasury.as_ref();
        let hired = self.market.reserve(company, actor)?;
        if let Err(e) = charge(treasury, actor, hired.hire_cost) {
            self.market.release(company);
            return Err(e);
        }

        let enlisted = match join {
            Some(army) => self
                .store
                .armies
                .transact(army, expected, |a| {
                    a.ensure_active()?;
                    a.ensure_commander(actor)?;
                    Ok(enlist_company(a, &hired, actor, contract_days, policy, day))
                })
                .map(|(event, snapshot)| (vec![event], snapshot)),
            None => {
                let mut army =
                    Army::new(actor, hired.name.as_str(), hired.home.clone(), day, &self.config.army);
                let raised = DomainEvent::ArmyRaised {
                    army: army.id,
                    commander: actor,
                    day,
                };
                let event = enlist_company(&mut army, &hired, actor, contract_days, policy, day);
                self.store
                    .armies
                    .insert(army)
                    .map(|snapshot| (vec![raised, event], snapshot))
            }
        };

        match enlisted {
            Ok((events, snapshot)) => {
                tracing::info!(
                    company = %hired.name,
                    army = %snapshot.value.id,
                    %actor,
                    contract_days,
                    "mercenaries hired"
                );
                outbox.extend(events);
                Ok(snapshot)
            }
            Err(e) => {
                refund(treasury, actor, hired.hire_cost);
                self.market.release(company);
                Err(e)
            }
        }
    }
}

/// Whether a conflict on `entity` came from the caller's own expected version
fn pinned(request: &Request, entity: &'static str) -> bool {
    request.expected_version.is_some() && request.command.target_kind() == Some(entity)
}

fn read_armies(store: &Store, ids: &[ArmyId]) -> Result<Vec<Versioned<Army>>> {
    ids.iter().map(|id| store.armies.get(*id)).collect()
}

fn log_failure(request: &Request, error: &WarfareError) {
    let command = request.command.name();
    match error.category() {
        ErrorCategory::Invariant => {
            tracing::error!(command, actor = %request.actor, %error, "invariant violated, nothing committed")
        }
        ErrorCategory::External => {
            tracing::warn!(command, actor = %request.actor, %error, "collaborator failed")
        }
        _ => tracing::debug!(command, actor = %request.actor, code = error.code(), %error, "command rejected"),
    }
}
