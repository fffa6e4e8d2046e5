//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use arc_warfare::army::{Army, UnitType};
use arc_warfare::battle::Battle;
use arc_warfare::collaborators::{
    Collaborators, InMemoryReputation, InMemoryTerritories, InMemoryTreasury, RecordingPublisher,
};
use arc_warfare::core::types::{ArmyId, Day, HexCoord, Location, RulerId, SiegeId, WarId};
use arc_warfare::mercenary::MercenaryMarket;
use arc_warfare::siege::Siege;
use arc_warfare::war::{CasusBelli, War};
use arc_warfare::{Command, CommandHandler, Request, Response, WarfareConfig};

pub const ALDRIC: RulerId = RulerId(1);
pub const BEREN: RulerId = RulerId(2);
pub const CORWENNA: RulerId = RulerId(3);

pub struct World {
    pub handler: CommandHandler,
    pub treasury: Arc<InMemoryTreasury>,
    pub territories: Arc<InMemoryTerritories>,
    pub reputation: Arc<InMemoryReputation>,
    pub publisher: Arc<RecordingPublisher>,
}

pub fn field() -> Location {
    Location::village(30, "Thornfield", HexCoord::new(0, 0))
}

pub fn castle() -> Location {
    Location::castle(20, "Brackenholm", HexCoord::new(1, 0))
}

pub fn world() -> World {
    world_with(WarfareConfig::default(), 100_000)
}

/// Three rulers, each holding `gold`
pub fn world_with(config: WarfareConfig, gold: u64) -> World {
    let treasury = Arc::new(InMemoryTreasury::with_balances([
        (ALDRIC, gold),
        (BEREN, gold),
        (CORWENNA, gold),
    ]));
    let territories = Arc::new(InMemoryTerritories::new());
    let reputation = Arc::new(InMemoryReputation::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let collaborators = Collaborators {
        treasury: treasury.clone(),
        territories: territories.clone(),
        reputation: reputation.clone(),
        publisher: publisher.clone(),
    };
    World {
        handler: CommandHandler::new(config, MercenaryMarket::default(), collaborators),
        treasury,
        territories,
        reputation,
        publisher,
    }
}

impl World {
    pub fn send(&self, actor: RulerId, day: u32, command: Command) -> Response {
        self.handler.handle(Request::new(actor, Day(day), command))
    }

    /// Raise an army at Thornfield and fill it with `recruits`
    pub fn raise(&self, actor: RulerId, name: &str, recruits: &[(UnitType, i64)]) -> ArmyId {
        let response = self.send(
            actor,
            0,
            Command::RaiseArmy {
                name: name.into(),
                location: field(),
            },
        );
        let army = response.army().expect("army raised").value.id;
        for (unit_type, count) in recruits {
            let response = self.send(
                actor,
                0,
                Command::RecruitUnits {
                    army,
                    unit_type: *unit_type,
                    count: *count,
                },
            );
            assert!(response.is_ok(), "recruit failed: {:?}", response.failure());
        }
        army
    }

    pub fn declare(&self, attacker: RulerId, defender: RulerId, day: u32) -> Response {
        self.send(
            attacker,
            day,
            Command::DeclareWar {
                defender,
                casus_belli: CasusBelli::BorderDispute,
                goals: Vec::new(),
                name: None,
            },
        )
    }

    pub fn war_between(&self, attacker: RulerId, defender: RulerId) -> WarId {
        self.declare(attacker, defender, 0)
            .war()
            .expect("war declared")
            .value
            .id
    }

    pub fn army(&self, id: ArmyId) -> Army {
        self.handler.store().armies.get(id).expect("army stored").value
    }

    pub fn war(&self, id: WarId) -> War {
        self.handler.store().wars.get(id).expect("war stored").value
    }

    pub fn siege(&self, id: SiegeId) -> Siege {
        self.handler.store().sieges.get(id).expect("siege stored").value
    }

    pub fn battles(&self) -> Vec<Battle> {
        self.handler
            .store()
            .battles
            .find(|_| true)
            .into_iter()
            .map(|b| b.value)
            .collect()
    }

    pub fn gold(&self, ruler: RulerId) -> u64 {
        use arc_warfare::collaborators::Treasury;
        self.treasury.balance(ruler)
    }
}
