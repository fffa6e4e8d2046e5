//! Headless War Runner
//!
//! Plays a scripted border war between two rulers and an ally through the
//! command handler: armies are raised, a field battle is fought, a castle is
//! besieged, and the side ahead on war score offers terms at the end.

use std::path::PathBuf;
use std::sync::Arc;

use arc_warfare::army::{ArmyStatus, UnitType};
use arc_warfare::battle::{BattleStatus, BattleType, Terrain, Weather};
use arc_warfare::collaborators::{Collaborators, InMemoryTerritories, InMemoryTreasury, Treasury};
use arc_warfare::core::types::{
    ArmyId, Day, HexCoord, Location, LocationId, RulerId, Side, SiegeId, TerritoryRef, WarId,
};
use arc_warfare::mercenary::{ExpiryPolicy, MercenaryMarket};
use arc_warfare::peace::{PeaceTerms, TerritoryChange, TreatyType};
use arc_warfare::siege::{Defenses, SiegeEquipment};
use arc_warfare::war::{CasusBelli, ParticipantRole, WarGoal, WarGoalKind};
use arc_warfare::{Command, CommandHandler, DayTicker, Request, Response, WarfareConfig};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const ALDRIC: RulerId = RulerId(1);
const BEREN: RulerId = RulerId(2);
const CORWENNA: RulerId = RulerId(3);

/// Headless War Runner - one scripted campaign from declaration to peace
#[derive(Parser, Debug)]
#[command(name = "warfare_sim")]
#[command(about = "Run a scripted war through the warfare engine")]
struct Args {
    /// Days to simulate after the declaration
    #[arg(long, default_value_t = 60)]
    days: u32,

    /// Seed for assault rolls (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// TOML config file; built-in defaults when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the final snapshots as JSON instead of a text summary
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Outcome {
    days: u32,
    war: Option<arc_warfare::war::War>,
    armies: Vec<arc_warfare::army::Army>,
    sieges: Vec<arc_warfare::siege::Siege>,
    battles: Vec<arc_warfare::battle::Battle>,
    treasury: Vec<(RulerId, u64)>,
}

/// Unwrap a command response or turn its failure into an error
fn accepted(response: Response, what: &str) -> Result<Response, String> {
    match response.failure() {
        Some(failure) => Err(format!("{what} refused: {} ({})", failure.code, failure.message)),
        None => Ok(response),
    }
}

struct Campaign {
    handler: CommandHandler,
    treasury: Arc<InMemoryTreasury>,
    territories: Arc<InMemoryTerritories>,
    brackenholm: Location,
    thornfield: Location,
}

impl Campaign {
    fn new(config: WarfareConfig) -> Self {
        let treasury = Arc::new(InMemoryTreasury::with_balances([
            (ALDRIC, 40_000),
            (BEREN, 30_000),
            (CORWENNA, 15_000),
        ]));
        let territories = Arc::new(InMemoryTerritories::new());
        let brackenholm = Location::castle(20, "Brackenholm", HexCoord::new(4, 1));
        territories.grant(TerritoryRef(brackenholm.id), BEREN);
        territories.grant(TerritoryRef(LocationId(21)), BEREN);

        let collaborators = Collaborators {
            treasury: treasury.clone(),
            territories: territories.clone(),
            ..Collaborators::in_memory()
        };
        Self {
            handler: CommandHandler::new(config, MercenaryMarket::default(), collaborators),
            treasury,
            territories,
            brackenholm,
            thornfield: Location::village(30, "Thornfield", HexCoord::new(2, 0)),
        }
    }

    fn send(&self, actor: RulerId, day: Day, command: Command) -> Result<Response, String> {
        let what = command.name();
        accepted(self.handler.handle(Request::new(actor, day, command)), what)
    }

    fn raise(&self, actor: RulerId, name: &str, recruits: &[(UnitType, i64)]) -> Result<ArmyId, String> {
        let response = self.send(
            actor,
            Day(0),
            Command::RaiseArmy {
                name: name.into(),
                location: self.thornfield.clone(),
            },
        )?;
        let army = response
            .army()
            .map(|a| a.value.id)
            .ok_or("RaiseArmy returned no army")?;
        for (unit_type, count) in recruits {
            self.send(
                actor,
                Day(0),
                Command::RecruitUnits {
                    army,
                    unit_type: *unit_type,
                    count: *count,
                },
            )?;
        }
        Ok(army)
    }

    fn declare(&self) -> Result<WarId, String> {
        let goal = WarGoal::new(WarGoalKind::ConquerTerritory, Side::Attacker, 25.0)
            .targeting(TerritoryRef(self.brackenholm.id));
        let response = self.send(
            ALDRIC,
            Day(0),
            Command::DeclareWar {
                defender: BEREN,
                casus_belli: CasusBelli::BorderDispute,
                goals: vec![goal],
                name: Some("War of the Bracken March".into()),
            },
        )?;
        let war = response.war().map(|w| w.value.id).ok_or("DeclareWar returned no war")?;
        self.send(
            ALDRIC,
            Day(0),
            Command::AddParticipant {
                war,
                ruler: CORWENNA,
                side: Side::Attacker,
                role: ParticipantRole::Ally,
            },
        )?;
        Ok(war)
    }

    /// Dig in around Brackenholm once the host is free of the field battle
    fn besiege(&self, war: WarId, army: ArmyId, day: Day) -> Result<SiegeId, String> {
        let response = self.send(
            ALDRIC,
            day,
            Command::BeginSiege {
                war,
                army,
                target: self.brackenholm.clone(),
                defenses: Defenses {
                    fortification: 80.0,
                    garrison_strength: 300,
                    garrison_supplies: 70.0,
                },
            },
        )?;
        let siege = response
            .siege()
            .map(|s| s.value.id)
            .ok_or("BeginSiege returned no siege")?;
        for equipment in [
            SiegeEquipment::Trebuchet,
            SiegeEquipment::Trebuchet,
            SiegeEquipment::BatteringRam,
            SiegeEquipment::SiegeTower,
        ] {
            self.send(ALDRIC, day, Command::BuildSiegeEquipment { siege, equipment })?;
        }
        Ok(siege)
    }

    /// Terms the side ahead asks of the side behind
    fn terms(&self, war: WarId) -> Result<(RulerId, PeaceTerms), String> {
        let war = self
            .handler
            .store()
            .wars
            .get(war)
            .map_err(|e| e.to_string())?
            .value;
        let truce = self.handler.config().war.default_truce_days;
        let (attacker, defender) = (war.attacker_score(), war.defender_score());
        if (attacker - defender).abs() < 5.0 {
            return Ok((ALDRIC, PeaceTerms::white_peace(truce)));
        }
        let winner = if attacker > defender { Side::Attacker } else { Side::Defender };
        let proposer = if winner == Side::Attacker { ALDRIC } else { BEREN };
        let mut terms = PeaceTerms {
            treaty_type: TreatyType::Negotiated,
            winner: Some(winner),
            territory_changes: Vec::new(),
            gold_payment: 0,
            truce_days: truce,
        };
        let cost = self.handler.config().peace.territory_score_cost;
        if winner == Side::Attacker && war.score(winner) >= cost {
            terms.territory_changes.push(TerritoryChange {
                territory: TerritoryRef(self.brackenholm.id),
                from: Side::Defender,
                to: Side::Attacker,
            });
        }
        // Loser pays the winner
        terms.gold_payment = if winner == Side::Attacker { 1_000 } else { -1_000 };
        Ok((proposer, terms))
    }

    fn outcome(&self, days: u32, war: WarId) -> Outcome {
        let store = self.handler.store();
        Outcome {
            days,
            war: store.wars.get(war).ok().map(|w| w.value),
            armies: store.armies.find(|_| true).into_iter().map(|a| a.value).collect(),
            sieges: store.sieges.find(|_| true).into_iter().map(|s| s.value).collect(),
            battles: store.battles.find(|_| true).into_iter().map(|b| b.value).collect(),
            treasury: [ALDRIC, BEREN, CORWENNA]
                .into_iter()
                .map(|r| (r, self.treasury.balance(r)))
                .collect(),
        }
    }
}

fn run(args: &Args) -> Result<Outcome, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => WarfareConfig::load(path)?,
        None => WarfareConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.engine.seed = seed;
    }
    let campaign = Campaign::new(config);

    let host = campaign.raise(
        ALDRIC,
        "Host of Highcrest",
        &[(UnitType::MenAtArms, 400), (UnitType::Archers, 300), (UnitType::Knights, 60)],
    )?;
    let banner = campaign.raise(
        CORWENNA,
        "Silver Banner",
        &[(UnitType::Militia, 300), (UnitType::Cavalry, 80)],
    )?;
    let guard = campaign.raise(
        BEREN,
        "Brackenholm Guard",
        &[(UnitType::Levy, 800), (UnitType::Crossbowmen, 250), (UnitType::MenAtArms, 150)],
    )?;
    let sappers = campaign
        .handler
        .market()
        .find_by_name("Saltmarsh Sappers")
        .ok_or("no sapper company on the market")?;
    campaign.send(
        ALDRIC,
        Day(0),
        Command::HireMercenaries {
            company: sappers.id,
            contract_days: 45,
            join: Some(host),
            policy: ExpiryPolicy::Renegotiate,
        },
    )?;

    let war = campaign.declare()?;
    campaign.send(
        ALDRIC,
        Day(1),
        Command::StartBattle {
            war: Some(war),
            location: campaign.thornfield.clone(),
            battle_type: BattleType::Pitched,
            terrain: Terrain::Plains,
            weather: Weather::Clear,
            attackers: vec![host, banner],
            defenders: vec![guard],
        },
    )?;

    let ticker = DayTicker::new(&campaign.handler);
    let mut siege: Option<SiegeId> = None;
    let mut assaulted = false;
    for d in 1..=args.days {
        let day = Day(d);
        let report = ticker.run_day(day);
        tracing::debug!(day = d, events = report.events, "day done");

        let ongoing = campaign
            .handler
            .store()
            .wars
            .get(war)
            .map(|w| w.value.status.is_ongoing())
            .unwrap_or(false);
        if !ongoing {
            tracing::info!(day = d, "war over");
            break;
        }

        let battles_open = !campaign
            .handler
            .store()
            .battles
            .find(|b| b.status == BattleStatus::Ongoing)
            .is_empty();
        let host_free = campaign
            .handler
            .store()
            .armies
            .get(host)
            .map(|a| a.value.status == ArmyStatus::Encamped && a.value.troop_count() > 0)
            .unwrap_or(false);
        if siege.is_none() && !battles_open && host_free {
            match campaign.besiege(war, host, day) {
                Ok(id) => siege = Some(id),
                Err(e) => tracing::warn!(error = %e, "siege not begun"),
            }
        }

        if let (Some(id), false) = (siege, assaulted) {
            let breached = campaign
                .handler
                .store()
                .sieges
                .get(id)
                .map(|s| s.value.has_breach && !s.value.status.is_terminal())
                .unwrap_or(false);
            if breached {
                assaulted = true;
                match campaign.send(ALDRIC, day, Command::LaunchAssault { siege: id, army: host }) {
                    Ok(_) => tracing::info!(day = d, "assault launched"),
                    Err(e) => tracing::warn!(error = %e, "assault refused"),
                }
            }
        }
    }

    let still_on = campaign
        .handler
        .store()
        .wars
        .get(war)
        .map(|w| w.value.status.is_ongoing())
        .unwrap_or(false);
    if still_on {
        let day = Day(args.days + 1);
        let (proposer, terms) = campaign.terms(war)?;
        let response = campaign.send(proposer, day, Command::OfferPeace { war, terms })?;
        if let Response::PeaceOffered { estimate, .. } = &response {
            tracing::info!(acceptance = estimate.percentage, "peace offered");
            let receiver = if proposer == ALDRIC { BEREN } else { ALDRIC };
            if estimate.percentage >= 50 {
                campaign.send(receiver, day, Command::AcceptPeace { war })?;
            }
        }
    }

    let owner = campaign.territories.owner(TerritoryRef(campaign.brackenholm.id));
    tracing::info!(owner = ?owner, "Brackenholm held");
    Ok(campaign.outcome(args.days, war))
}

fn print_summary(outcome: &Outcome) {
    println!("\n=== WAR REPORT ({} days) ===", outcome.days);
    if let Some(war) = &outcome.war {
        println!("{}: {:?}", war.name, war.status);
        println!(
            "  score  attacker {:.1}  defender {:.1}",
            war.attacker_score(),
            war.defender_score()
        );
        if let Some(treaty) = &war.treaty {
            println!(
                "  treaty {:?}, winner {:?}, gold {}, {} territories, truce {} days",
                treaty.treaty_type,
                treaty.winner,
                treaty.gold_payment,
                treaty.territory_changes.len(),
                treaty.truce_days
            );
        }
    }
    println!("\nArmies:");
    for army in &outcome.armies {
        println!(
            "  {:<20} {:<8} {:?}  troops {:>5}  morale {:>5.1}  supplies {:>5.1}",
            army.name,
            army.commander.to_string(),
            army.status,
            army.troop_count(),
            army.morale,
            army.supplies
        );
    }
    println!("\nBattles:");
    for battle in &outcome.battles {
        println!(
            "  {} ({} days) {:?}  losses {} / {}",
            battle.location.name,
            battle.day,
            battle.status,
            battle.attacker_casualties,
            battle.defender_casualties
        );
    }
    println!("\nSieges:");
    for siege in &outcome.sieges {
        println!(
            "  {} {:?}  walls {:.1}  breach {}  day {}",
            siege.target.name, siege.status, siege.fortification, siege.has_breach, siege.days_besieged
        );
    }
    println!("\nTreasury:");
    for (ruler, gold) in &outcome.treasury {
        println!("  {ruler}: {gold}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arc_warfare=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let outcome = run(&args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome);
    }
    Ok(())
}
