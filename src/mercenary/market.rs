//! Mercenary market: the catalog of companies and contract bookkeeping
//!
//! The catalog tracks which companies are under contract. The soldiers
//! themselves live in the hiring army as units tagged with their company.

use ahash::AHashMap;
use serde::Deserialize;
use std::path::Path;
use std::sync::RwLock;

use super::company::{
    default_catalog, ContractState, ExpiryPolicy, MercenaryCompany, MercenaryContract,
};
use crate::army::{Army, ArmyStatus};
use crate::core::config::MercenaryConfig;
use crate::core::error::{Result, WarfareError};
use crate::core::types::{CompanyId, Day, Gold, RulerId};
use crate::events::DomainEvent;

pub struct MercenaryMarket {
    catalog: RwLock<AHashMap<CompanyId, MercenaryCompany>>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(rename = "company")]
    companies: Vec<MercenaryCompany>,
}

impl Default for MercenaryMarket {
    fn default() -> Self {
        Self::new(default_catalog())
    }
}

impl MercenaryMarket {
    pub fn new(companies: Vec<MercenaryCompany>) -> Self {
        Self {
            catalog: RwLock::new(companies.into_iter().map(|c| (c.id, c)).collect()),
        }
    }

    /// Load a catalog from TOML (`[[company]]` tables)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| WarfareError::Config(format!("failed to parse catalog TOML: {e}")))?;
        Ok(Self::new(file.companies))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WarfareError::Config(format!("failed to read catalog file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    fn poisoned() -> WarfareError {
        WarfareError::InvariantViolation("mercenary catalog lock poisoned".into())
    }

    /// All companies, sorted by name
    pub fn list(&self) -> Vec<MercenaryCompany> {
        let mut companies: Vec<_> = match self.catalog.read() {
            Ok(catalog) => catalog.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        companies.sort_by(|a, b| a.name.cmp(&b.name));
        companies
    }

    pub fn get(&self, id: CompanyId) -> Result<MercenaryCompany> {
        let catalog = self.catalog.read().map_err(|_| Self::poisoned())?;
        catalog
            .get(&id)
            .cloned()
            .ok_or_else(|| WarfareError::not_found("mercenary company", id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<MercenaryCompany> {
        self.list().into_iter().find(|c| c.name == name)
    }

    /// Mark a company as contracted to `payer`
    pub fn reserve(&self, id: CompanyId, payer: RulerId) -> Result<MercenaryCompany> {
        let mut catalog = self.catalog.write().map_err(|_| Self::poisoned())?;
        let company = catalog
            .get_mut(&id)
            .ok_or_else(|| WarfareError::not_found("mercenary company", id))?;
        if company.contracted_by.is_some() {
            return Err(WarfareError::CompanyUnavailable(company.name.clone()));
        }
        company.contracted_by = Some(payer);
        Ok(company.clone())
    }

    /// Return a company to the market
    pub fn release(&self, id: CompanyId) {
        if let Ok(mut catalog) = self.catalog.write() {
            if let Some(company) = catalog.get_mut(&id) {
                company.contracted_by = None;
            }
        }
    }
}

/// Add a reserved company's troops and contract to `army`
pub fn enlist_company(
    army: &mut Army,
    company: &MercenaryCompany,
    payer: RulerId,
    contract_days: u32,
    policy: ExpiryPolicy,
    day: Day,
) -> DomainEvent {
    let contract = MercenaryContract::new(company, payer, contract_days, policy, day);
    let expires_on = contract.expires_on;
    army.units.extend(company.muster_units());
    army.contracts.push(contract);
    DomainEvent::MercenariesHired {
        army: army.id,
        company: company.id,
        payer,
        expires_on,
    }
}

/// Extend a contract by `days`, reviving it if it had lapsed. Returns the gold owed.
pub fn extend_contract(army: &mut Army, company: CompanyId, days: u32, day: Day) -> Result<Gold> {
    let contract = army
        .contracts
        .iter_mut()
        .find(|c| c.company == company)
        .ok_or_else(|| WarfareError::NoSuchContract(company.to_string()))?;
    if days == 0 {
        return Err(WarfareError::InvalidRequest(
            "contract extension must be at least one day".into(),
        ));
    }
    let from = contract.expires_on.max(day);
    contract.expires_on = from.plus(days);
    contract.state = ContractState::Active;
    contract.warned = false;
    Ok(contract.daily_cost * Gold::from(days))
}

/// Advance every contract on `army` to `day`.
///
/// Emits the expiry warning ahead of time and applies the expiry policy.
/// Companies that leave are removed from the army; the caller disbands the
/// army if nothing is left.
pub fn tick_contracts(army: &mut Army, day: Day, config: &MercenaryConfig) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    let mut departing: Vec<CompanyId> = Vec::new();

    for contract in army.contracts.iter_mut() {
        match contract.state {
            ContractState::Active => {
                let days_left = contract.days_left(day);
                if days_left == 0 {
                    match contract.policy {
                        ExpiryPolicy::AutoDisband => departing.push(contract.company),
                        ExpiryPolicy::Renegotiate => {
                            let leaves_on = day.plus(config.renewal_grace_days);
                            contract.state = ContractState::Lapsed { leaves_on };
                            events.push(DomainEvent::ContractRenewalDue {
                                army: army.id,
                                company: contract.company,
                                leaves_on,
                            });
                        }
                    }
                } else if days_left <= config.expiry_warning_days && !contract.warned {
                    contract.warned = true;
                    events.push(DomainEvent::ContractExpiring {
                        army: army.id,
                        company: contract.company,
                        expires_on: contract.expires_on,
                    });
                }
            }
            ContractState::Lapsed { leaves_on } => {
                if day >= leaves_on {
                    departing.push(contract.company);
                }
            }
        }
    }

    // Soldiers counted by an ongoing battle stay until it ends
    if army.status == ArmyStatus::InBattle && !departing.is_empty() {
        tracing::debug!(
            army = %army.id,
            companies = departing.len(),
            "mercenary departure deferred until the battle ends"
        );
        return events;
    }

    for company in departing {
        let leaving = army.remove_company(company);
        tracing::info!(
            army = %army.id,
            %company,
            soldiers = leaving,
            "mercenary contract expired"
        );
        events.push(DomainEvent::ContractExpired {
            army: army.id,
            company,
            day,
        });
    }

    events
}
