//! Outbound interfaces the warfare core calls into
//!
//! The gold ledger, territory ownership, ruler legitimacy and notification
//! delivery are owned elsewhere. Calls are synchronous and treated as
//! fallible; retrying them is the collaborator's business.

use ahash::AHashMap;
use std::sync::{Arc, Mutex};

use crate::core::error::{Result, WarfareError};
use crate::core::types::{Account, Gold, RulerId, TerritoryRef};
use crate::events::DomainEvent;

/// Gold ledger. `debit` refuses with `InsufficientFunds`.
pub trait Treasury: Send + Sync {
    fn debit(&self, account: Account, amount: Gold) -> Result<()>;
    fn credit(&self, account: Account, amount: Gold) -> Result<()>;
    fn balance(&self, account: Account) -> Gold;
}

pub trait TerritoryRegistry: Send + Sync {
    fn transfer(&self, territory: TerritoryRef, from: RulerId, to: RulerId) -> Result<()>;
}

pub trait Reputation: Send + Sync {
    fn adjust_legitimacy(&self, ruler: RulerId, delta: i32) -> Result<()>;
}

/// Fire-and-forget notification sink
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event_type: &str, payload: serde_json::Value);
}

/// Debit `amount` for a purchase, turning a ledger refusal into `InsufficientGold`
pub fn charge(treasury: &dyn Treasury, account: Account, amount: Gold) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    treasury.debit(account, amount).map_err(|e| match e {
        WarfareError::InsufficientFunds { account } => WarfareError::InsufficientGold {
            account,
            needed: amount,
        },
        other => other,
    })
}

/// Return gold taken by [`charge`] when a later step fails
pub fn refund(treasury: &dyn Treasury, account: Account, amount: Gold) {
    if amount == 0 {
        return;
    }
    if let Err(e) = treasury.credit(account, amount) {
        tracing::error!(%account, amount, error = %e, "refund failed");
    }
}

/// The set of collaborators the engine is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub treasury: Arc<dyn Treasury>,
    pub territories: Arc<dyn TerritoryRegistry>,
    pub reputation: Arc<dyn Reputation>,
    pub publisher: Arc<dyn EventPublisher>,
}

impl Collaborators {
    /// In-memory collaborators, publishing to the tracing log
    pub fn in_memory() -> Self {
        Self {
            treasury: Arc::new(InMemoryTreasury::new()),
            territories: Arc::new(InMemoryTerritories::new()),
            reputation: Arc::new(InMemoryReputation::new()),
            publisher: Arc::new(TracingPublisher),
        }
    }
}

#[derive(Default)]
pub struct InMemoryTreasury {
    balances: Mutex<AHashMap<Account, Gold>>,
}

impl InMemoryTreasury {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(balances: impl IntoIterator<Item = (Account, Gold)>) -> Self {
        Self {
            balances: Mutex::new(balances.into_iter().collect()),
        }
    }

    pub fn deposit(&self, account: Account, amount: Gold) {
        if let Ok(mut balances) = self.balances.lock() {
            *balances.entry(account).or_insert(0) += amount;
        }
    }
}

impl Treasury for InMemoryTreasury {
    fn debit(&self, account: Account, amount: Gold) -> Result<()> {
        let mut balances = self
            .balances
            .lock()
            .map_err(|_| WarfareError::Collaborator("treasury lock poisoned".into()))?;
        let balance = balances.entry(account).or_insert(0);
        if *balance < amount {
            return Err(WarfareError::InsufficientFunds { account });
        }
        *balance -= amount;
        Ok(())
    }

    fn credit(&self, account: Account, amount: Gold) -> Result<()> {
        let mut balances = self
            .balances
            .lock()
            .map_err(|_| WarfareError::Collaborator("treasury lock poisoned".into()))?;
        *balances.entry(account).or_insert(0) += amount;
        Ok(())
    }

    fn balance(&self, account: Account) -> Gold {
        self.balances
            .lock()
            .ok()
            .and_then(|b| b.get(&account).copied())
            .unwrap_or(0)
    }
}

/// Territory owners keyed by territory
#[derive(Default)]
pub struct InMemoryTerritories {
    owners: Mutex<AHashMap<TerritoryRef, RulerId>>,
}

impl InMemoryTerritories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, territory: TerritoryRef, owner: RulerId) {
        if let Ok(mut owners) = self.owners.lock() {
            owners.insert(territory, owner);
        }
    }

    pub fn owner(&self, territory: TerritoryRef) -> Option<RulerId> {
        self.owners.lock().ok()?.get(&territory).copied()
    }
}

impl TerritoryRegistry for InMemoryTerritories {
    fn transfer(&self, territory: TerritoryRef, from: RulerId, to: RulerId) -> Result<()> {
        let mut owners = self
            .owners
            .lock()
            .map_err(|_| WarfareError::Collaborator("territory lock poisoned".into()))?;
        match owners.get(&territory) {
            Some(owner) if *owner != from => Err(WarfareError::Collaborator(format!(
                "territory {:?} is held by {owner}, not {from}",
                territory.0
            ))),
            _ => {
                owners.insert(territory, to);
                Ok(())
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryReputation {
    legitimacy: Mutex<AHashMap<RulerId, i32>>,
}

impl InMemoryReputation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn legitimacy(&self, ruler: RulerId) -> i32 {
        self.legitimacy
            .lock()
            .ok()
            .and_then(|l| l.get(&ruler).copied())
            .unwrap_or(0)
    }
}

impl Reputation for InMemoryReputation {
    fn adjust_legitimacy(&self, ruler: RulerId, delta: i32) -> Result<()> {
        let mut legitimacy = self
            .legitimacy
            .lock()
            .map_err(|_| WarfareError::Collaborator("reputation lock poisoned".into()))?;
        *legitimacy.entry(ruler).or_insert(0) += delta;
        Ok(())
    }
}

/// Keeps every published event, for tests and replays
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|p| p.iter().map(|(t, _)| t.clone()).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.event_types()
            .iter()
            .filter(|t| t.as_str() == event_type)
            .count()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event_type: &str, payload: serde_json::Value) {
        if let Ok(mut published) = self.published.lock() {
            published.push((event_type.to_string(), payload));
        }
    }
}

/// Writes every event to the log at debug level
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, event_type: &str, payload: serde_json::Value) {
        tracing::debug!(event = event_type, %payload, "published");
    }
}

/// Publish a domain event through any publisher
pub fn publish(publisher: &dyn EventPublisher, event: &DomainEvent) {
    publisher.publish(event.event_type(), event.payload());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LocationId;

    #[test]
    fn test_debit_refuses_overdraft() {
        let treasury = InMemoryTreasury::with_balances([(RulerId(1), 100)]);
        assert!(treasury.debit(RulerId(1), 60).is_ok());
        let err = treasury.debit(RulerId(1), 60).unwrap_err();
        assert_eq!(err.code(), "InsufficientFunds");
        assert_eq!(treasury.balance(RulerId(1)), 40);
    }

    #[test]
    fn test_charge_reports_insufficient_gold() {
        let treasury = InMemoryTreasury::new();
        let err = charge(&treasury, RulerId(3), 500).unwrap_err();
        assert_eq!(
            err,
            WarfareError::InsufficientGold {
                account: RulerId(3),
                needed: 500
            }
        );
        assert!(charge(&treasury, RulerId(3), 0).is_ok());
    }

    #[test]
    fn test_territory_transfer_checks_owner() {
        let registry = InMemoryTerritories::new();
        let t = TerritoryRef(LocationId(4));
        registry.grant(t, RulerId(1));
        assert!(registry.transfer(t, RulerId(2), RulerId(3)).is_err());
        registry.transfer(t, RulerId(1), RulerId(2)).unwrap();
        assert_eq!(registry.owner(t), Some(RulerId(2)));
    }

    #[test]
    fn test_recording_publisher() {
        let publisher = RecordingPublisher::new();
        let event = DomainEvent::ArmyRaised {
            army: crate::core::types::ArmyId::new(),
            commander: RulerId(1),
            day: crate::core::types::Day(0),
        };
        publish(&publisher, &event);
        publish(&publisher, &event);
        assert_eq!(publisher.count("ArmyRaised"), 2);
        assert_eq!(publisher.count("ArmyDisbanded"), 0);
    }
}
