//! Sieges: equipment, wall erosion, garrison starvation and assaults

pub mod equipment;
#[allow(clippy::module_inception)]
pub mod siege;

pub use equipment::SiegeEquipment;
pub use siege::{
    begin_siege, CaptureCause, Defenses, Siege, SiegeLogEntry, SiegeLogEvent, SiegeStatus,
};
