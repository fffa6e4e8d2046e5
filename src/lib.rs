//! Arc Warfare - rules engine for armies, sieges, battles, wars and peace

pub mod army;
pub mod battle;
pub mod collaborators;
pub mod command;
pub mod core;
pub mod events;
pub mod mercenary;
pub mod peace;
pub mod siege;
pub mod store;
pub mod war;

pub use command::{Command, CommandHandler, DayTicker, Request, Response};
pub use core::{ErrorCategory, Result, WarfareConfig, WarfareError};
