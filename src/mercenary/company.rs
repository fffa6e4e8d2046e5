//! Mercenary companies and the contracts that bind them to an army

use serde::{Deserialize, Serialize};

use crate::army::unit::{ArmyUnit, UnitType};
use crate::core::types::{CompanyId, Day, Gold, HexCoord, Location, RulerId};

/// A hireable company in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MercenaryCompany {
    #[serde(default)]
    pub id: CompanyId,
    pub name: String,
    /// 0 - 100. Veteran companies fight above their weight.
    pub reputation: f32,
    pub specialization: UnitType,
    pub hire_cost: Gold,
    pub daily_cost: Gold,
    pub composition: Vec<(UnitType, u32)>,
    /// Where a company hired without a host army musters
    pub home: Location,
    #[serde(default)]
    pub contracted_by: Option<RulerId>,
}

impl MercenaryCompany {
    pub fn troop_count(&self) -> u32 {
        self.composition.iter().map(|(_, n)| n).sum()
    }

    /// Stat multiplier from reputation: 0.75 at 0, 1.0 at 50, 1.25 at 100
    pub fn veterancy(&self) -> f32 {
        1.0 + (self.reputation.clamp(0.0, 100.0) - 50.0) / 200.0
    }

    /// Units as they join an army, tagged with this company
    pub fn muster_units(&self) -> Vec<ArmyUnit> {
        let vet = self.veterancy();
        self.composition
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|&(unit_type, count)| {
                let props = unit_type.default_properties();
                ArmyUnit::new(unit_type, count)
                    .with_stats(props.attack * vet, props.defense * vet)
                    .hired_from(self.id)
            })
            .collect()
    }
}

/// What happens when a contract runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryPolicy {
    /// The company marches off on the expiry day
    AutoDisband,
    /// The company waits a grace period for a renewal before leaving
    Renegotiate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractState {
    Active,
    Lapsed { leaves_on: Day },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MercenaryContract {
    pub company: CompanyId,
    pub company_name: String,
    pub payer: RulerId,
    pub daily_cost: Gold,
    pub expires_on: Day,
    pub policy: ExpiryPolicy,
    pub state: ContractState,
    /// Whether `ContractExpiring` was already emitted for this term
    pub warned: bool,
}

impl MercenaryContract {
    pub fn new(
        company: &MercenaryCompany,
        payer: RulerId,
        contract_days: u32,
        policy: ExpiryPolicy,
        day: Day,
    ) -> Self {
        Self {
            company: company.id,
            company_name: company.name.clone(),
            payer,
            daily_cost: company.daily_cost,
            expires_on: day.plus(contract_days),
            policy,
            state: ContractState::Active,
            warned: false,
        }
    }

    pub fn days_left(&self, today: Day) -> u32 {
        today.until(self.expires_on)
    }
}

/// The companies on offer at the start of a campaign
pub fn default_catalog() -> Vec<MercenaryCompany> {
    vec![
        MercenaryCompany {
            id: CompanyId::new(),
            name: "The Iron Brotherhood".into(),
            reputation: 70.0,
            specialization: UnitType::MenAtArms,
            hire_cost: 1_200,
            daily_cost: 40,
            composition: vec![(UnitType::MenAtArms, 150), (UnitType::Crossbowmen, 50)],
            home: Location::town(900, "Grenmark", HexCoord::new(6, -2)),
            contracted_by: None,
        },
        MercenaryCompany {
            id: CompanyId::new(),
            name: "Red Lances".into(),
            reputation: 60.0,
            specialization: UnitType::Cavalry,
            hire_cost: 1_500,
            daily_cost: 55,
            composition: vec![(UnitType::Cavalry, 120), (UnitType::Knights, 20)],
            home: Location::town(901, "Harrowfield", HexCoord::new(-4, 3)),
            contracted_by: None,
        },
        MercenaryCompany {
            id: CompanyId::new(),
            name: "Greyfeather Bowmen".into(),
            reputation: 45.0,
            specialization: UnitType::Archers,
            hire_cost: 600,
            daily_cost: 20,
            composition: vec![(UnitType::Archers, 200)],
            home: Location::village(902, "Ashby", HexCoord::new(2, 5)),
            contracted_by: None,
        },
        MercenaryCompany {
            id: CompanyId::new(),
            name: "Saltmarsh Sappers".into(),
            reputation: 55.0,
            specialization: UnitType::SiegeEngineers,
            hire_cost: 800,
            daily_cost: 25,
            composition: vec![(UnitType::SiegeEngineers, 60), (UnitType::Levy, 40)],
            home: Location::village(903, "Saltmarsh", HexCoord::new(-6, -1)),
            contracted_by: None,
        },
    ]
}
