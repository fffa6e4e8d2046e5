//! Mercenary companies, their contracts and the hiring market

pub mod company;
pub mod market;

pub use company::{
    default_catalog, ContractState, ExpiryPolicy, MercenaryCompany, MercenaryContract,
};
pub use market::{enlist_company, extend_contract, tick_contracts, MercenaryMarket};
