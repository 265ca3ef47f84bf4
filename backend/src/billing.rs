//! Overlap accounting
//!
//! A subscription is billed `price` for every month it overlaps the reporting
//! window, counting both the first and the last month of the overlap. These
//! functions compute the same figure the PostgreSQL aggregate does, so both
//! repositories agree on totals.

use crate::models::Subscription;
use crate::month::MonthDate;

/// Number of billed months a subscription contributes to a window
///
/// Returns `None` when the subscription does not touch the window: it starts
/// after `window_end`, or it stopped before `window_start`. Open-ended
/// subscriptions are capped at `window_end`.
///
/// The month count is `overlap_start.months_until(overlap_end) + 1`, the same
/// arithmetic as `EXTRACT(YEAR FROM AGE(..)) * 12 + EXTRACT(MONTH FROM AGE(..)) + 1`.
/// No ordering is imposed on the inputs, so an inverted window or a stop month
/// before the start month yields the (possibly non-positive) count that
/// arithmetic produces.
pub fn billed_months(
    start: MonthDate,
    stop: Option<MonthDate>,
    window_start: MonthDate,
    window_end: MonthDate,
) -> Option<i64> {
    if start > window_end {
        return None;
    }
    if matches!(stop, Some(stop) if stop < window_start) {
        return None;
    }

    let overlap_start = start.max(window_start);
    let overlap_end = stop.unwrap_or(window_end).min(window_end);
    Some(overlap_start.months_until(overlap_end) + 1)
}

/// Amount billed for one subscription over a window
pub fn subscription_cost(
    subscription: &Subscription,
    window_start: MonthDate,
    window_end: MonthDate,
) -> i64 {
    billed_months(
        subscription.start_date,
        subscription.stop_date,
        window_start,
        window_end,
    )
    .map_or(0, |months| months * i64::from(subscription.price))
}

/// Sum of [`subscription_cost`] over every subscription
pub fn window_total<'a, I>(subscriptions: I, window_start: MonthDate, window_end: MonthDate) -> i64
where
    I: IntoIterator<Item = &'a Subscription>,
{
    subscriptions
        .into_iter()
        .map(|subscription| subscription_cost(subscription, window_start, window_end))
        .sum()
}
