//! Field battles between groups of armies
//!
//! Battles are resolved one day at a time. Ending a battle does not touch the
//! armies or the war directly; the outcome travels in a `BattleEnded` event.

#[allow(clippy::module_inception)]
pub mod battle;
pub mod terrain;

pub use battle::{
    Battle, BattleLogEntry, BattleParticipant, BattlePhase, BattleSetup, BattleStatus, BattleType,
    BattleWar, ParticipantOutcome, ParticipantResult,
};
pub use terrain::{Terrain, Weather};
