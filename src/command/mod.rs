//! Command surface of the warfare engine
//!
//! Requests -> CommandHandler -> one aggregate transaction -> events ->
//! reactions on other aggregates. The day ticker feeds the same event drain.

pub mod handler;
mod reactions;
pub mod request;
pub mod ticker;

pub use handler::CommandHandler;
pub use request::{Command, CommandFailure, Request, Response};
pub use ticker::{DayReport, DayTicker};
