//! VynX allocation engine: ERC-4626 style share accounting over a set of
//! yield strategies, with APY-weighted allocation, spread-triggered
//! rebalancing, gated harvests and an emergency exit path. Two tiers
//! (balanced and aggressive) run as fully independent vault instances.

pub mod error;
pub mod events;
pub mod math;
pub mod state;
pub mod strategy;
pub mod vault;
pub mod instructions;
pub mod views;
pub mod keeper;
pub mod router;
pub mod sim;

pub use error::ErrorCode;
pub use instructions::*;
pub use state::*;
pub use strategy::{ApySource, RateSource, Strategy, StrategyOutcome};
pub use vault::{Deployment, TierVault};
pub use views::{AllocationView, ApyView};
