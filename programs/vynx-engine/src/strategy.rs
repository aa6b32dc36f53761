use anchor_lang::prelude::*;
use crate::math::ray_to_bps;
use crate::state::StrategyRecord;

/// Capability surface of one external yield source. Every call may revert;
/// the engine isolates failures per strategy.
pub trait Strategy: Send {
    /// WETH-equivalent value currently managed by the adapter. Rewards that
    /// compound on their own may already show up here before `harvest`.
    fn total_assets(&self) -> Result<u128>;

    fn deposit(&mut self, amount: u128) -> Result<()>;

    /// Returns the WETH actually delivered back. Exit slippage can shrink the
    /// position by more than that.
    fn withdraw(&mut self, amount: u128) -> Result<u128>;

    /// Realizes rewards and compounds them into the position, returns the profit.
    /// The vault books the position from `total_assets` afterwards, so profit
    /// that was already visible there is not counted twice.
    fn harvest(&mut self) -> Result<u128>;

    /// Profit the next `harvest` is expected to realize
    fn pending_profit(&self) -> Result<u128>;
}

/// Live lending rate of an external pool registry, quoted in RAY
pub trait RateSource: Send {
    fn liquidity_rate_ray(&self) -> Result<u128>;
}

pub enum ApySource {
    /// Operator-configured constant
    Fixed(u32),
    /// Constant base plus a live lending rate (yield stacking)
    Stacked { base_bps: u32, rate: Box<dyn RateSource> },
}

impl ApySource {
    pub fn current_bps(&self) -> u32 {
        match self {
            ApySource::Fixed(bps) => *bps,
            ApySource::Stacked { base_bps, rate } => match rate.liquidity_rate_ray() {
                Ok(rate_ray) => base_bps.saturating_add(ray_to_bps(rate_ray)),
                Err(err) => {
                    msg!("Lending rate unavailable ({}), using base {}bps", err, base_bps);
                    *base_bps
                }
            },
        }
    }

    pub fn set_base_bps(&mut self, bps: u32) {
        match self {
            ApySource::Fixed(current) => *current = bps,
            ApySource::Stacked { base_bps, .. } => *base_bps = bps,
        }
    }
}

pub struct StrategySlot {
    pub record: StrategyRecord,
    pub adapter: Box<dyn Strategy>,
    pub apy: ApySource,
}

/// Tagged result of one call made inside a per-strategy failure boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome<T> {
    Completed(T),
    Skipped,
    Failed(String),
}

impl<T> StrategyOutcome<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, StrategyOutcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRateSource;

    #[test]
    fn test_stacked_apy_adds_live_rate() {
        let rate = SimRateSource::new(Some(25_000_000_000_000_000_000_000_000));
        let apy = ApySource::Stacked { base_bps: 400, rate: Box::new(rate.clone()) };
        assert_eq!(apy.current_bps(), 650);

        rate.set_rate(None);
        assert_eq!(apy.current_bps(), 400);
    }

    #[test]
    fn test_fixed_apy_update() {
        let mut apy = ApySource::Fixed(350);
        apy.set_base_bps(375);
        assert_eq!(apy.current_bps(), 375);
    }
}
