pub mod initialize;
pub mod register_strategy;
pub mod deposit;
pub mod withdraw;
pub mod allocate;
pub mod rebalance;
pub mod harvest;
pub mod emergency;

pub use deposit::*;
pub use withdraw::*;
pub use allocate::*;
pub use rebalance::*;
pub use harvest::*;
pub use emergency::*;
