//! Requests sent to the exchange but not yet seen on the order stream
//!
//! Placements have no bet id until the stream reports them, so they are
//! matched by side, price and size against the first order the stream
//! shows for a bet id we did not know. Cancels are keyed by bet id and
//! released once the order's remainder drops to the requested size or the
//! order completes.

use std::collections::HashMap;

use rust_decimal::Decimal;
use types::ids::BetId;
use types::order::{calculate_exposure_and_profit, Order, OrderStatus, Side};

use crate::exposure::TemporaryAmounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPlacement {
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCancel {
    pub side: Side,
    /// Exposure the cancel removes
    pub exposure: Decimal,
    /// Remainder the order is left with once the cancel lands
    pub target_size_remaining: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    placements: Vec<PendingPlacement>,
    cancels: HashMap<BetId, PendingCancel>,
}

impl PendingRequests {
    pub fn add_placement(&mut self, side: Side, price: Decimal, size: Decimal) {
        self.placements.push(PendingPlacement { side, price, size });
    }

    /// A second cancel on the same bet adds its exposure and lowers the target.
    pub fn add_cancel(
        &mut self,
        bet_id: BetId,
        side: Side,
        exposure: Decimal,
        target_size_remaining: Decimal,
    ) {
        self.cancels
            .entry(bet_id)
            .and_modify(|pending| {
                pending.exposure += exposure;
                pending.target_size_remaining =
                    pending.target_size_remaining.min(target_size_remaining);
            })
            .or_insert(PendingCancel {
                side,
                exposure,
                target_size_remaining,
            });
    }

    /// Release whatever `order` confirms. `first_seen` is true when the
    /// stream reports this bet id for the first time.
    pub fn confirm(&mut self, bet_id: &BetId, order: &Order, first_seen: bool) {
        if first_seen {
            let position = self.placements.iter().position(|p| {
                order.side == Some(p.side)
                    && order.price == Some(p.price)
                    && order.size == Some(p.size)
            });
            if let Some(position) = position {
                self.placements.remove(position);
            }
        }

        let landed = self.cancels.get(bet_id).is_some_and(|pending| {
            order.status == Some(OrderStatus::ExecutionComplete)
                || order.size_remaining_or_zero() <= pending.target_size_remaining
        });
        if landed {
            self.cancels.remove(bet_id);
        }
    }

    /// Drop cancels for bets that are no longer live.
    pub fn retain_cancels<F>(&mut self, mut is_live: F)
    where
        F: FnMut(&BetId) -> bool,
    {
        self.cancels.retain(|bet_id, _| is_live(bet_id));
    }

    pub fn amounts(&self) -> TemporaryAmounts {
        let mut amounts = self.placements.iter().fold(TemporaryAmounts::default(), |mut acc, p| {
            let exposure = calculate_exposure_and_profit(p.side, p.price, p.size, None);
            acc.back_exposure += exposure.back_exposure;
            acc.back_profit += exposure.back_profit;
            acc.lay_exposure += exposure.lay_exposure;
            acc.lay_profit += exposure.lay_profit;
            acc
        });
        for pending in self.cancels.values() {
            match pending.side {
                Side::Back => amounts.back_cancel += pending.exposure,
                Side::Lay => amounts.lay_cancel += pending.exposure,
            }
        }
        amounts
    }

    pub fn placement_count(&self) -> usize {
        self.placements.len()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty() && self.cancels.is_empty()
    }

    pub fn clear(&mut self) {
        self.placements.clear();
        self.cancels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_placement_released_by_new_bet_only() {
        let mut pending = PendingRequests::default();
        pending.add_placement(Side::Lay, d("2.5"), d("4"));
        assert_eq!(pending.amounts().lay_exposure, d("6"));

        let order = Order::new(BetId::new("7"), Side::Lay, d("2.5"), d("4"), 1);
        pending.confirm(&BetId::new("7"), &order, false);
        assert_eq!(pending.placement_count(), 1);

        let other_price = Order::new(BetId::new("8"), Side::Lay, d("2.6"), d("4"), 1);
        pending.confirm(&BetId::new("8"), &other_price, true);
        assert_eq!(pending.placement_count(), 1);

        pending.confirm(&BetId::new("7"), &order, true);
        assert!(pending.is_empty());
        assert_eq!(pending.amounts(), TemporaryAmounts::default());
    }

    #[test]
    fn test_cancel_released_at_target() {
        let mut pending = PendingRequests::default();
        pending.add_cancel(BetId::new("1"), Side::Back, d("6"), d("4"));
        assert_eq!(pending.amounts().back_cancel, d("6"));

        let mut order = Order::new(BetId::new("1"), Side::Back, d("3.0"), d("10"), 1);
        order.size_remaining = Some(d("5"));
        pending.confirm(&BetId::new("1"), &order, false);
        assert_eq!(pending.cancel_count(), 1);

        order.size_remaining = Some(d("4"));
        pending.confirm(&BetId::new("1"), &order, false);
        assert_eq!(pending.cancel_count(), 0);
    }

    #[test]
    fn test_cancel_released_when_order_completes_or_vanishes() {
        let mut pending = PendingRequests::default();
        pending.add_cancel(BetId::new("1"), Side::Lay, d("3"), Decimal::ZERO);
        pending.add_cancel(BetId::new("2"), Side::Lay, d("2"), Decimal::ZERO);

        let mut done = Order::new(BetId::new("1"), Side::Lay, d("2.5"), d("2"), 1);
        done.status = Some(OrderStatus::ExecutionComplete);
        pending.confirm(&BetId::new("1"), &done, false);
        assert_eq!(pending.amounts().lay_cancel, d("2"));

        pending.retain_cancels(|_| false);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_repeated_cancel_accumulates() {
        let mut pending = PendingRequests::default();
        pending.add_cancel(BetId::new("1"), Side::Back, d("2"), d("8"));
        pending.add_cancel(BetId::new("1"), Side::Back, d("3"), d("5"));
        assert_eq!(pending.cancel_count(), 1);
        assert_eq!(pending.amounts().back_cancel, d("5"));
    }
}
