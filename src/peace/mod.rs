//! Peace negotiation: acceptance estimates, offers and treaty signing

pub mod acceptance;
pub mod treaty;

pub use acceptance::{estimate_acceptance, AcceptanceEstimate, AcceptanceFactor};
pub use treaty::{
    accept_peace, commit_peace, offer_peace, sign_treaty, validate_terms, PeaceOffer, PeaceTerms,
    PeaceTreaty, TerritoryChange, TreatyType,
};
