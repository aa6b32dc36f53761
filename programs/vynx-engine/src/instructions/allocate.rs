use anchor_lang::prelude::*;
use crate::error::ErrorCode;
use crate::events::Allocated;
use crate::math::{bps_of, mul_div_down, ratio_bps, BPS_DENOMINATOR};
use crate::state::*;
use crate::vault::TierVault;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationStep {
    pub strategy: Pubkey,
    pub amount: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationReport {
    pub requested: u128,
    pub placed: u128,
    pub unplaced: u128,             // Left in the idle buffer
    pub steps: Vec<AllocationStep>,
    pub skipped: Vec<Pubkey>,       // Strategies whose deposit reverted
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithdrawToReport {
    pub requested: u128,
    pub pulled: u128,
    pub shortfall: u128,
    pub skipped: Vec<Pubkey>,       // Strategies whose withdraw reverted
}

struct PlanEntry {
    index: usize,
    want: u128,      // Distance to target, capped by max allocation
    cap: u128,       // Max allocation in assets
    gap_bps: i64,    // target - current, larger means more under-allocated
}

/// APY-weighted targets in basis points, clamped to `[min_alloc_bps, max_alloc_bps]`
/// and renormalized over the unclamped strategies until no bound is violated.
/// Inputs are in registration order; rounding dust goes to the highest-APY
/// unclamped strategy, earliest registered on ties.
pub fn compute_targets(apys: &[u32], min_alloc_bps: u32, max_alloc_bps: u32) -> Vec<u32> {
    let count = apys.len();
    if count == 0 {
        return Vec::new();
    }

    // No yield information at all: split evenly
    let all_zero = apys.iter().all(|apy| *apy == 0);
    let weights: Vec<u128> = apys
        .iter()
        .map(|apy| if all_zero { 1 } else { *apy as u128 })
        .collect();
    let min = min_alloc_bps as u128;
    let max = max_alloc_bps as u128;

    let mut targets: Vec<Option<u128>> = vec![None; count];
    loop {
        let clamped_sum: u128 = targets.iter().flatten().sum();
        let budget = BPS_DENOMINATOR.saturating_sub(clamped_sum);
        let free: Vec<usize> = (0..count).filter(|i| targets[*i].is_none()).collect();
        if free.is_empty() {
            break;
        }

        let free_weight: u128 = free.iter().map(|i| weights[*i]).sum();
        let share = |i: usize| {
            if free_weight == 0 {
                budget / free.len() as u128
            } else {
                budget * weights[i] / free_weight
            }
        };

        let over: Vec<usize> = free.iter().copied().filter(|i| share(*i) > max).collect();
        if !over.is_empty() {
            for i in over {
                targets[i] = Some(max);
            }
            continue;
        }
        let under: Vec<usize> = free.iter().copied().filter(|i| share(*i) < min).collect();
        if !under.is_empty() {
            for i in under {
                targets[i] = Some(min);
            }
            continue;
        }

        for i in &free {
            targets[*i] = Some(share(*i));
        }
        let assigned: u128 = targets.iter().flatten().sum();
        let dust = BPS_DENOMINATOR.saturating_sub(assigned);
        let heaviest = free.iter().copied().fold(None, |best: Option<usize>, i| match best {
            Some(b) if weights[b] >= weights[i] => Some(b),
            _ => Some(i),
        });
        if let (true, Some(top)) = (dust > 0, heaviest) {
            let topped = targets[top].unwrap_or(0).saturating_add(dust);
            targets[top] = Some(topped.min(max));
        }
        break;
    }

    targets.into_iter().map(|target| target.unwrap_or(0) as u32).collect()
}

impl TierVault {
    /// `(slot index, target bps)` for every active strategy, registration order
    pub(crate) fn target_allocations(&self) -> Vec<(usize, u32)> {
        let active = self.active_indices();
        let apys: Vec<u32> = active
            .iter()
            .map(|index| self.strategies[*index].apy.current_bps())
            .collect();
        let targets = compute_targets(&apys, self.config.min_alloc_bps, self.config.max_alloc_bps);
        active.into_iter().zip(targets).collect()
    }

    /// Places `amount` of idle capital into under-allocated strategies
    pub fn allocate(&mut self, amount: u128) -> Result<AllocationReport> {
        require!(amount > 0, ErrorCode::InvalidAmount);
        require!(amount <= self.ledger.idle_buffer, ErrorCode::InsufficientLiquidity);

        let mut report = AllocationReport { requested: amount, ..Default::default() };
        if self.mode != VaultMode::Normal {
            msg!("Allocation skipped: vault {} is {:?}", self.tier.name(), self.mode);
            report.unplaced = amount;
            return Ok(report);
        }

        let targets = self.target_allocations();
        if targets.is_empty() {
            msg!("Allocation skipped: no active strategies");
            report.unplaced = amount;
            return Ok(report);
        }

        let total_after = self.managed_assets()
            .checked_add(amount)
            .ok_or(ErrorCode::MathOverflow)?;
        let tolerance = bps_of(total_after, self.config.allocation_tolerance_bps)?;
        let cap = mul_div_down(self.config.max_alloc_bps as u128, total_after, BPS_DENOMINATOR)?;

        let mut plan = Vec::with_capacity(targets.len());
        for (index, target_bps) in targets {
            let current = self.strategies[index].record.current_assets;
            let current_bps = ratio_bps(current, total_after)?;
            // At or above the ceiling: never topped up, whatever the target says
            if current_bps >= self.config.max_alloc_bps {
                continue;
            }
            let desired = mul_div_down(target_bps as u128, total_after, BPS_DENOMINATOR)?;
            plan.push(PlanEntry {
                index,
                want: desired.min(cap).saturating_sub(current),
                cap,
                gap_bps: target_bps as i64 - current_bps as i64,
            });
        }
        // stable sort keeps registration order among equally under-allocated strategies
        plan.sort_by(|a, b| b.gap_bps.cmp(&a.gap_bps));

        let mut remaining = amount;
        let mut reserved = 0u128;
        for entry in &plan {
            if remaining == 0 {
                break;
            }
            if entry.want <= tolerance {
                continue;
            }
            let put = entry.want.min(remaining);
            remaining -= put;
            if !self.place(entry.index, put, &mut report) {
                // the failed strategy's share is not redistributed
                reserved += put;
            }
        }

        // Rounding and tolerance leftovers go to whoever still has room
        for entry in &plan {
            if remaining == 0 {
                break;
            }
            let strategy = self.strategies[entry.index].record.strategy_id;
            if report.skipped.contains(&strategy) {
                continue;
            }
            let current = self.strategies[entry.index].record.current_assets;
            let put = entry.cap.saturating_sub(current).min(remaining);
            if put == 0 {
                continue;
            }
            if self.place(entry.index, put, &mut report) {
                remaining -= put;
            }
        }

        report.unplaced = remaining + reserved;
        report.placed = amount - report.unplaced;
        msg!(
            "Allocation done: tier={}, requested={}, placed={}, unplaced={}, skipped={}",
            self.tier.name(), amount, report.placed, report.unplaced, report.skipped.len()
        );
        Ok(report)
    }

    fn place(&mut self, index: usize, amount: u128, report: &mut AllocationReport) -> bool {
        let strategy = self.strategies[index].record.strategy_id;
        match self.strategy_deposit(index, amount) {
            Ok(()) => {
                let strategy_assets = self.strategies[index].record.current_assets;
                msg!("Allocated {} to strategy {} (now {})", amount, strategy, strategy_assets);
                emit!(Allocated { tier: self.tier, strategy, amount, strategy_assets });
                report.steps.push(AllocationStep { strategy, amount });
                true
            }
            Err(err) => {
                self.record_strategy_failure(index, "allocate", &err);
                report.skipped.push(strategy);
                false
            }
        }
    }

    /// Active strategy indices in the order `withdraw_to` drains them
    pub(crate) fn withdraw_order(&self) -> Result<Vec<usize>> {
        match &self.config.withdraw_priority {
            WithdrawPriority::OverAllocation => {
                let managed = self.managed_assets();
                let mut ranked = Vec::new();
                for (index, target_bps) in self.target_allocations() {
                    let current_bps = ratio_bps(self.strategies[index].record.current_assets, managed)?;
                    ranked.push((index, current_bps as i64 - target_bps as i64));
                }
                ranked.sort_by(|a, b| b.1.cmp(&a.1));
                Ok(ranked.into_iter().map(|(index, _)| index).collect())
            }
            WithdrawPriority::Configured(sequence) => {
                let active = self.active_indices();
                let mut order: Vec<usize> = sequence
                    .iter()
                    .filter_map(|id| {
                        active.iter().copied().find(|i| self.strategies[*i].record.strategy_id == *id)
                    })
                    .collect();
                for index in active {
                    if !order.contains(&index) {
                        order.push(index);
                    }
                }
                Ok(order)
            }
        }
    }

    /// Pulls `amount` into the idle buffer. Strategies are first drawn down to
    /// their `min_alloc_bps` floor, then drained further only if still short.
    /// The drain pass repeats while it makes progress, so exit slippage is
    /// covered from what the strategies still hold. A shortfall is reported,
    /// never raised.
    pub fn withdraw_to(&mut self, amount: u128) -> Result<WithdrawToReport> {
        require!(amount > 0, ErrorCode::InvalidAmount);

        let mut report = WithdrawToReport { requested: amount, ..Default::default() };
        let order = self.withdraw_order()?;
        let remaining_managed = self.managed_assets().saturating_sub(amount);
        let floor = mul_div_down(self.config.min_alloc_bps as u128, remaining_managed, BPS_DENOMINATOR)?;

        let mut remaining = amount;
        for &index in &order {
            if remaining == 0 {
                break;
            }
            let current = self.strategies[index].record.current_assets;
            let pull = current.saturating_sub(floor).min(remaining);
            if pull > 0 {
                self.pull(index, pull, &mut remaining, &mut report);
            }
        }

        let mut progressed = true;
        while remaining > 0 && progressed {
            progressed = false;
            for &index in &order {
                if remaining == 0 {
                    break;
                }
                let strategy = self.strategies[index].record.strategy_id;
                if report.skipped.contains(&strategy) {
                    continue;
                }
                let pull = self.strategies[index].record.current_assets.min(remaining);
                if pull > 0 && self.pull(index, pull, &mut remaining, &mut report) > 0 {
                    progressed = true;
                }
            }
        }

        report.shortfall = remaining;
        if remaining > 0 {
            msg!("withdraw_to shortfall: requested={}, pulled={}, short={}", amount, report.pulled, remaining);
        }
        Ok(report)
    }

    /// One withdrawal, then the record is re-read so slippage lands in `total_assets`
    fn pull(&mut self, index: usize, amount: u128, remaining: &mut u128, report: &mut WithdrawToReport) -> u128 {
        match self.strategy_withdraw(index, amount) {
            Ok(delivered) => {
                report.pulled = report.pulled.saturating_add(delivered);
                *remaining = remaining.saturating_sub(delivered);
                match self.strategies[index].adapter.total_assets() {
                    Ok(observed) => self.apply_observed_assets(index, observed),
                    Err(err) => msg!(
                        "Strategy {} not re-read after withdraw: {}",
                        self.strategies[index].record.strategy_id, err
                    ),
                }
                delivered
            }
            Err(err) => {
                self.record_strategy_failure(index, "withdraw", &err);
                report.skipped.push(self.strategies[index].record.strategy_id);
                0
            }
        }
    }
}
