//! In-memory adapters for dry-runs and keeper rehearsals. Handles are cheap
//! clones sharing state, so a caller can keep one after boxing the other into
//! a vault and steer it (accrue profit, force reverts) from the outside.

use anchor_lang::prelude::*;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use crate::error::ErrorCode;
use crate::math::{bps_of, mul_div_down};
use crate::router::SwapVenue;
use crate::strategy::{RateSource, Strategy};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimFailures {
    pub deposit: bool,
    pub withdraw: bool,
    pub harvest: bool,
    pub total_assets: bool,
}

#[derive(Debug, Default)]
struct SimStrategyState {
    assets: u128,
    pending_profit: u128,
    withdraw_haircut_bps: u32,
    compounding: bool,      // Rewards raise `assets` as they accrue, not at harvest
    fail: SimFailures,
}

#[derive(Debug, Clone, Default)]
pub struct SimStrategy {
    state: Arc<Mutex<SimStrategyState>>,
}

fn lock<T>(state: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    state.lock().map_err(|_| ErrorCode::StrategyCallFailed.into())
}

impl SimStrategy {
    pub fn new() -> Self {
        SimStrategy::default()
    }

    pub fn assets(&self) -> u128 {
        lock(&self.state).map(|state| state.assets).unwrap_or(0)
    }

    /// Rewards waiting for the next harvest
    pub fn accrue_profit(&self, profit: u128) {
        if let Ok(mut state) = lock(&self.state) {
            state.pending_profit = state.pending_profit.saturating_add(profit);
            if state.compounding {
                state.assets = state.assets.saturating_add(profit);
            }
        }
    }

    /// Behaves like a rebasing token: accrued rewards count in `total_assets` right away
    pub fn set_compounding(&self, compounding: bool) {
        if let Ok(mut state) = lock(&self.state) {
            state.compounding = compounding;
        }
    }

    /// Changes the position value directly, as a price move or a loss would
    pub fn set_assets(&self, assets: u128) {
        if let Ok(mut state) = lock(&self.state) {
            state.assets = assets;
        }
    }

    /// Fraction of every withdrawal lost to slippage
    pub fn set_withdraw_haircut_bps(&self, bps: u32) {
        if let Ok(mut state) = lock(&self.state) {
            state.withdraw_haircut_bps = bps;
        }
    }

    pub fn set_failures(&self, fail: SimFailures) {
        if let Ok(mut state) = lock(&self.state) {
            state.fail = fail;
        }
    }
}

impl Strategy for SimStrategy {
    fn total_assets(&self) -> Result<u128> {
        let state = lock(&self.state)?;
        require!(!state.fail.total_assets, ErrorCode::StrategyCallFailed);
        Ok(state.assets)
    }

    fn deposit(&mut self, amount: u128) -> Result<()> {
        let mut state = lock(&self.state)?;
        require!(!state.fail.deposit, ErrorCode::StrategyCallFailed);
        state.assets = state.assets.checked_add(amount).ok_or(ErrorCode::MathOverflow)?;
        Ok(())
    }

    fn withdraw(&mut self, amount: u128) -> Result<u128> {
        let mut state = lock(&self.state)?;
        require!(!state.fail.withdraw, ErrorCode::StrategyCallFailed);
        let taken = amount.min(state.assets);
        let haircut = bps_of(taken, state.withdraw_haircut_bps)?;
        state.assets -= taken;
        Ok(taken - haircut)
    }

    fn harvest(&mut self) -> Result<u128> {
        let mut state = lock(&self.state)?;
        require!(!state.fail.harvest, ErrorCode::StrategyCallFailed);
        let profit = state.pending_profit;
        state.pending_profit = 0;
        if !state.compounding {
            state.assets = state.assets.checked_add(profit).ok_or(ErrorCode::MathOverflow)?;
        }
        Ok(profit)
    }

    fn pending_profit(&self) -> Result<u128> {
        let state = lock(&self.state)?;
        require!(!state.fail.harvest, ErrorCode::StrategyCallFailed);
        Ok(state.pending_profit)
    }
}

/// Lending-pool rate feed; `None` behaves like an unreachable pool
#[derive(Debug, Clone, Default)]
pub struct SimRateSource {
    rate_ray: Arc<Mutex<Option<u128>>>,
}

impl SimRateSource {
    pub fn new(rate_ray: Option<u128>) -> Self {
        SimRateSource { rate_ray: Arc::new(Mutex::new(rate_ray)) }
    }

    pub fn set_rate(&self, rate_ray: Option<u128>) {
        if let Ok(mut rate) = lock(&self.rate_ray) {
            *rate = rate_ray;
        }
    }
}

impl RateSource for SimRateSource {
    fn liquidity_rate_ray(&self) -> Result<u128> {
        let rate = lock(&self.rate_ray)?;
        rate.ok_or_else(|| ErrorCode::RateUnavailable.into())
    }
}

/// Fixed-price swap venue: `amount_out = amount_in * numerator / denominator - fee`
#[derive(Debug, Clone, Default)]
pub struct SimSwapVenue {
    prices: BTreeMap<(Pubkey, Pubkey), (u128, u128)>,
    pub fee_bps: u32,
    pub fail_swaps: bool,
}

impl SimSwapVenue {
    pub fn new(fee_bps: u32) -> Self {
        SimSwapVenue { prices: BTreeMap::new(), fee_bps, fail_swaps: false }
    }

    /// Registers a pair in both directions
    pub fn with_price(mut self, token_a: Pubkey, token_b: Pubkey, numerator: u128, denominator: u128) -> Self {
        self.prices.insert((token_a, token_b), (numerator, denominator));
        self.prices.insert((token_b, token_a), (denominator, numerator));
        self
    }
}

impl SwapVenue for SimSwapVenue {
    fn quote(&self, token_in: Pubkey, token_out: Pubkey, amount_in: u128, _pool_fee: u32) -> Result<u128> {
        let (numerator, denominator) = *self
            .prices
            .get(&(token_in, token_out))
            .ok_or(ErrorCode::RateUnavailable)?;
        let gross = mul_div_down(amount_in, numerator, denominator)?;
        Ok(gross - bps_of(gross, self.fee_bps)?)
    }

    fn swap(
        &mut self,
        token_in: Pubkey,
        token_out: Pubkey,
        amount_in: u128,
        pool_fee: u32,
        min_out: u128,
    ) -> Result<u128> {
        require!(!self.fail_swaps, ErrorCode::StrategyCallFailed);
        let amount_out = self.quote(token_in, token_out, amount_in, pool_fee)?;
        require!(amount_out >= min_out, ErrorCode::SlippageExceeded);
        Ok(amount_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;

    #[test]
    fn test_sim_strategy_harvest_compounds() {
        let mut strategy = SimStrategy::new();
        strategy.deposit(10 * WAD).unwrap();
        strategy.accrue_profit(WAD);

        assert_eq!(strategy.pending_profit().unwrap(), WAD);
        assert_eq!(strategy.harvest().unwrap(), WAD);
        assert_eq!(strategy.total_assets().unwrap(), 11 * WAD);
        assert_eq!(strategy.pending_profit().unwrap(), 0);
    }

    #[test]
    fn test_sim_strategy_shared_handle() {
        let strategy = SimStrategy::new();
        let mut boxed: Box<dyn Strategy> = Box::new(strategy.clone());
        boxed.deposit(5).unwrap();
        assert_eq!(strategy.assets(), 5);

        strategy.set_failures(SimFailures { withdraw: true, ..Default::default() });
        assert!(boxed.withdraw(1).is_err());
    }

    #[test]
    fn test_sim_withdraw_haircut() {
        let mut strategy = SimStrategy::new();
        strategy.deposit(10_000).unwrap();
        strategy.set_withdraw_haircut_bps(100);
        assert_eq!(strategy.withdraw(1_000).unwrap(), 990);
        assert_eq!(strategy.assets(), 9_000);
    }
}
