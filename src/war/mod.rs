//! Wars between rulers: declaration, participants, goals and war score
//!
//! Score moves only through the audited ledger in [`ledger`]; everything
//! else a war knows about the fighting arrives as score deltas.

pub mod ledger;
#[allow(clippy::module_inception)]
pub mod war;

pub use ledger::{
    achieve_goal, add_participant, declare_war, finalize_victory, record_score_delta, Declaration,
};
pub use war::{
    CasusBelli, ParticipantRole, ScoreEntry, ScoreReason, War, WarGoal, WarGoalKind,
    WarParticipant, WarStatus,
};
