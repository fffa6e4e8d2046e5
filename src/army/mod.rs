//! Armies, their units, and the ledger operations that raise, pay and move them

pub mod army;
pub mod ledger;
pub mod unit;

pub use army::{Army, ArmyStatus, MarchOrder};
pub use unit::{ArmyUnit, UnitProperties, UnitStatus, UnitType};
