//! Army and mercenary integration tests

mod common;

use arc_warfare::army::{ArmyStatus, UnitType};
use arc_warfare::battle::{BattleType, Terrain, Weather};
use arc_warfare::core::types::{Day, HexCoord, Location};
use arc_warfare::core::ErrorCategory;
use arc_warfare::mercenary::ExpiryPolicy;
use arc_warfare::{Command, DayTicker};
use common::*;

#[test]
fn test_raise_and_recruit_charge_the_treasury() {
    let world = world();
    let army = world.raise(ALDRIC, "Host of Highcrest", &[(UnitType::MenAtArms, 100)]);

    let stored = world.handler.store().armies.get(army).unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.value.troop_count(), 100);
    assert_eq!(stored.value.status, ArmyStatus::Mustering);
    assert_eq!(world.gold(ALDRIC), 100_000 - 500 - 1_000);
    assert_eq!(world.publisher.count("ArmyRaised"), 1);
    assert_eq!(world.publisher.count("UnitsRecruited"), 1);
}

#[test]
fn test_recruit_rejects_bad_counts() {
    let world = world();
    let army = world.raise(ALDRIC, "Host", &[]);
    for count in [0, -40] {
        let response = world.send(
            ALDRIC,
            1,
            Command::RecruitUnits {
                army,
                unit_type: UnitType::Levy,
                count,
            },
        );
        assert_eq!(response.code(), Some("InvalidUnitCount"));
        assert_eq!(
            response.failure().unwrap().category,
            ErrorCategory::Validation
        );
    }
    assert_eq!(world.army(army).troop_count(), 0);
}

#[test]
fn test_only_the_commander_recruits() {
    let world = world();
    let army = world.raise(ALDRIC, "Host", &[]);
    let response = world.send(
        BEREN,
        1,
        Command::RecruitUnits {
            army,
            unit_type: UnitType::Levy,
            count: 10,
        },
    );
    assert_eq!(response.code(), Some("NotOwner"));
    assert_eq!(world.gold(BEREN), 100_000);
}

#[test]
fn test_disbanding_twice_fails_the_second_time() {
    let world = world();
    let army = world.raise(ALDRIC, "Host", &[(UnitType::Levy, 50)]);

    let first = world.send(ALDRIC, 1, Command::DisbandArmy { army });
    let disbanded = first.army().unwrap().clone();
    assert_eq!(disbanded.value.status, ArmyStatus::Disbanded);
    assert_eq!(disbanded.value.troop_count(), 0);

    let second = world.send(ALDRIC, 2, Command::DisbandArmy { army });
    assert_eq!(second.code(), Some("ArmyDisbanded"));
    let stored = world.handler.store().armies.get(army).unwrap();
    assert_eq!(stored.version, disbanded.version);
    assert_eq!(stored.value.disbanded_on, Some(Day(1)));
}

#[test]
fn test_cannot_disband_in_battle() {
    let world = world();
    let ours = world.raise(ALDRIC, "Host", &[(UnitType::Levy, 200)]);
    let theirs = world.raise(BEREN, "Guard", &[(UnitType::Levy, 200)]);
    let started = world.send(
        ALDRIC,
        1,
        Command::StartBattle {
            war: None,
            location: field(),
            battle_type: BattleType::Raid,
            terrain: Terrain::Plains,
            weather: Weather::Clear,
            attackers: vec![ours],
            defenders: vec![theirs],
        },
    );
    assert!(started.is_ok(), "{:?}", started.failure());
    assert_eq!(world.army(ours).status, ArmyStatus::InBattle);

    let response = world.send(ALDRIC, 1, Command::DisbandArmy { army: ours });
    assert_eq!(response.code(), Some("CannotDisbandWhileInBattle"));
    let response = world.send(
        ALDRIC,
        1,
        Command::MoveArmy {
            army: ours,
            destination: castle(),
        },
    );
    assert_eq!(response.code(), Some("ArmyNotMovable"));
}

#[test]
fn test_march_arrives_on_schedule() {
    let world = world();
    let army = world.raise(ALDRIC, "Host", &[(UnitType::Levy, 100)]);
    let kessel = Location::town(40, "Kessel", HexCoord::new(6, 0));

    let moved = world.send(
        ALDRIC,
        1,
        Command::MoveArmy {
            army,
            destination: kessel.clone(),
        },
    );
    let march = moved.army().unwrap().value.march.clone().unwrap();
    assert_eq!(march.arrives_on, Day(3));

    let again = world.send(
        ALDRIC,
        1,
        Command::MoveArmy {
            army,
            destination: castle(),
        },
    );
    assert_eq!(again.code(), Some("ArmyNotMovable"));

    let ticker = DayTicker::new(&world.handler);
    ticker.run_day(Day(2));
    assert_eq!(world.army(army).status, ArmyStatus::Marching);
    ticker.run_day(Day(3));
    let arrived = world.army(army);
    assert_eq!(arrived.status, ArmyStatus::Encamped);
    assert_eq!(arrived.location, kessel);
    assert!(arrived.march.is_none());
    assert_eq!(world.publisher.count("ArmyArrived"), 1);
}

#[test]
fn test_mustering_completes_after_three_days() {
    let world = world();
    let army = world.raise(ALDRIC, "Host", &[(UnitType::Levy, 10)]);
    let ticker = DayTicker::new(&world.handler);
    ticker.run_day(Day(1));
    ticker.run_day(Day(2));
    assert_eq!(world.army(army).status, ArmyStatus::Mustering);
    ticker.run_day(Day(3));
    let army = world.army(army);
    assert_eq!(army.status, ArmyStatus::Encamped);
    assert_eq!(army.supplies, 27.0);
}

#[test]
fn test_unpaid_upkeep_costs_morale() {
    let world = world_with(Default::default(), 0);
    world.treasury.deposit(ALDRIC, 500 + 2 * 1_000);
    let army = world.raise(ALDRIC, "Host", &[(UnitType::Levy, 1_000)]);
    assert_eq!(world.gold(ALDRIC), 0);

    DayTicker::new(&world.handler).run_day(Day(1));
    let army = world.army(army);
    assert_eq!(army.morale, 95.0);
    assert_eq!(world.publisher.count("UpkeepUnpaid"), 1);
}

#[test]
fn test_hired_company_leaves_when_its_contract_ends() {
    let world = world();
    let company = world
        .handler
        .market()
        .find_by_name("Greyfeather Bowmen")
        .unwrap();
    let hired = world.send(
        ALDRIC,
        0,
        Command::HireMercenaries {
            company: company.id,
            contract_days: 5,
            join: None,
            policy: ExpiryPolicy::AutoDisband,
        },
    );
    let army = hired.army().unwrap().value.clone();
    assert_eq!(army.troop_count(), 200);
    assert_eq!(army.location, company.home);
    assert_eq!(army.name, "Greyfeather Bowmen");
    assert_eq!(world.gold(ALDRIC), 100_000 - 600);
    assert_eq!(
        world.handler.market().get(company.id).unwrap().contracted_by,
        Some(ALDRIC)
    );

    let again = world.send(
        BEREN,
        0,
        Command::HireMercenaries {
            company: company.id,
            contract_days: 5,
            join: None,
            policy: ExpiryPolicy::AutoDisband,
        },
    );
    assert_eq!(again.code(), Some("CompanyUnavailable"));
    assert_eq!(world.gold(BEREN), 100_000);

    let ticker = DayTicker::new(&world.handler);
    for day in 1..=5 {
        ticker.run_day(Day(day));
    }
    let gone = world.army(army.id);
    assert_eq!(gone.status, ArmyStatus::Disbanded);
    assert_eq!(gone.troop_count(), 0);
    assert_eq!(world.publisher.count("ContractExpiring"), 1);
    assert_eq!(world.publisher.count("ContractExpired"), 1);
    assert!(world
        .handler
        .market()
        .get(company.id)
        .unwrap()
        .contracted_by
        .is_none());
}

#[test]
fn test_renewal_keeps_a_lapsed_company() {
    let world = world();
    let army = world.raise(ALDRIC, "Host", &[(UnitType::Levy, 100)]);
    let company = world
        .handler
        .market()
        .find_by_name("Greyfeather Bowmen")
        .unwrap();
    let hired = world.send(
        ALDRIC,
        0,
        Command::HireMercenaries {
            company: company.id,
            contract_days: 2,
            join: Some(army),
            policy: ExpiryPolicy::Renegotiate,
        },
    );
    assert_eq!(hired.army().unwrap().value.troop_count(), 300);

    let ticker = DayTicker::new(&world.handler);
    ticker.run_day(Day(1));
    ticker.run_day(Day(2));
    assert_eq!(world.publisher.count("ContractRenewalDue"), 1);
    assert_eq!(world.army(army).troop_count(), 300);

    let before = world.gold(ALDRIC);
    let extended = world.send(
        ALDRIC,
        3,
        Command::ExtendContract {
            army,
            company: company.id,
            days: 10,
        },
    );
    assert!(extended.is_ok(), "{:?}", extended.failure());
    assert_eq!(world.gold(ALDRIC), before - 200);
    let contract = extended.army().unwrap().value.contracts[0].clone();
    assert_eq!(contract.expires_on, Day(13));

    for day in 3..=8 {
        ticker.run_day(Day(day));
    }
    assert_eq!(world.army(army).troop_count(), 300);
    assert_eq!(world.publisher.count("ContractExpired"), 0);
}

#[test]
fn test_extending_a_missing_contract_fails() {
    let world = world();
    let army = world.raise(ALDRIC, "Host", &[(UnitType::Levy, 100)]);
    let company = world.handler.market().list()[0].clone();
    let response = world.send(
        ALDRIC,
        1,
        Command::ExtendContract {
            army,
            company: company.id,
            days: 5,
        },
    );
    assert_eq!(response.code(), Some("NoSuchContract"));
}

#[test]
fn test_disbanding_releases_hired_companies() {
    let world = world();
    let company = world
        .handler
        .market()
        .find_by_name("Red Lances")
        .unwrap();
    let hired = world.send(
        ALDRIC,
        0,
        Command::HireMercenaries {
            company: company.id,
            contract_days: 30,
            join: None,
            policy: ExpiryPolicy::AutoDisband,
        },
    );
    let army = hired.army().unwrap().value.id;
    world.send(ALDRIC, 1, Command::DisbandArmy { army });
    assert_eq!(world.publisher.count("CompanyReleased"), 1);
    assert!(world
        .handler
        .market()
        .get(company.id)
        .unwrap()
        .contracted_by
        .is_none());
}
