use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::data::normalizer::{DispatchRecord, PriceRecord};
use crate::engine::validation::CapacityRecord;
use crate::error::EtlError;

/// Serialized with the operator's labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    #[serde(rename = "Vender")]
    Sell,
    #[serde(rename = "Comprar")]
    Buy,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Sell => "Vender",
            Action::Buy => "Comprar",
        })
    }
}

impl Action {
    /// Surplus is sold to the pool; a deficit, or an exact match, is a purchase.
    pub fn for_balance(balance_kwh: i64) -> Self {
        if balance_kwh > 0 {
            Action::Sell
        } else {
            Action::Buy
        }
    }
}

/// Plant-day balance before pricing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantBalance {
    pub date: NaiveDate,
    pub plant_code: String,
    pub capacity_total_kwh: i64,
    pub committed_total_kwh: i64,
    pub balance_kwh: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceRecord {
    pub date: NaiveDate,
    pub plant_code: String,
    pub capacity_total_kwh: i64,
    pub committed_total_kwh: i64,
    pub balance_kwh: i64,
    pub value_cop: i64,
    pub action: Action,
}

type HourKey<'a> = (NaiveDate, &'a str, &'a str);

/// Inner join on (date, hour, plant), then sum per (date, plant).
/// Output is ordered by plant code. Sums that leave the `i64` range fail
/// with [`EtlError::BalanceOverflow`].
pub fn reconcile(
    capacity: &[CapacityRecord],
    dispatch: &[DispatchRecord],
) -> Result<Vec<PlantBalance>, EtlError> {
    let mut capacity_by_hour: HashMap<HourKey<'_>, Vec<i64>> = HashMap::new();
    for c in capacity {
        capacity_by_hour
            .entry((c.date, c.hour.as_str(), c.plant_code.as_str()))
            .or_default()
            .push(c.capacity_kwh);
    }

    let mut totals: BTreeMap<(&str, NaiveDate), (i64, i64)> = BTreeMap::new();
    let mut matched_keys = std::collections::HashSet::new();
    let mut dropped_dispatch = 0usize;

    for d in dispatch {
        let key = (d.date, d.hour.as_str(), d.plant_code.as_str());
        let Some(capacities) = capacity_by_hour.get(&key) else {
            dropped_dispatch += 1;
            continue;
        };
        matched_keys.insert(key);
        let entry = totals.entry((d.plant_code.as_str(), d.date)).or_insert((0, 0));
        // Each joined pair contributes once, as a relational inner join would.
        for cap in capacities {
            let overflow = || EtlError::BalanceOverflow(d.plant_code.clone());
            entry.0 = entry.0.checked_add(*cap).ok_or_else(overflow)?;
            entry.1 = entry.1.checked_add(d.committed_kwh).ok_or_else(overflow)?;
        }
    }

    let dropped_capacity: usize = capacity_by_hour
        .iter()
        .filter(|(k, _)| !matched_keys.contains(*k))
        .map(|(_, v)| v.len())
        .sum();
    if dropped_capacity > 0 || dropped_dispatch > 0 {
        tracing::warn!(dropped_capacity, dropped_dispatch, "Rows without a counterpart were left out of the balance");
    }

    totals
        .into_iter()
        .map(|((code, date), (capacity_total, committed_total))| {
            let balance_kwh = capacity_total
                .checked_sub(committed_total)
                .ok_or_else(|| EtlError::BalanceOverflow(code.to_string()))?;
            Ok(PlantBalance {
                date,
                plant_code: code.to_string(),
                capacity_total_kwh: capacity_total,
                committed_total_kwh: committed_total,
                balance_kwh,
            })
        })
        .collect()
}

/// Monetary value of a balance, rounded half away from zero.
pub fn value_cop(balance_kwh: i64, price: f64) -> i64 {
    (balance_kwh as f64 * price).round() as i64
}

/// Apply the pool price and the buy/sell decision to every plant-day.
pub fn price_balances(balances: Vec<PlantBalance>, price: PriceRecord) -> Vec<BalanceRecord> {
    balances
        .into_iter()
        .map(|b| BalanceRecord {
            value_cop: value_cop(b.balance_kwh, price.price_cop_per_kwh),
            action: Action::for_balance(b.balance_kwh),
            date: b.date,
            plant_code: b.plant_code,
            capacity_total_kwh: b.capacity_total_kwh,
            committed_total_kwh: b.committed_total_kwh,
            balance_kwh: b.balance_kwh,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn cap(code: &str, hour: u32, kwh: i64) -> CapacityRecord {
        CapacityRecord { date: day(), hour: format!("{hour:02}"), capacity_kwh: kwh, plant_code: code.into() }
    }

    fn disp(code: &str, hour: u32, kwh: i64) -> DispatchRecord {
        DispatchRecord { date: day(), hour: format!("{hour:02}"), plant_code: code.into(), committed_kwh: kwh }
    }

    #[test]
    fn zero_balance_is_a_buy() {
        assert_eq!(Action::for_balance(0), Action::Buy);
        assert_eq!(Action::for_balance(1), Action::Sell);
        assert_eq!(Action::for_balance(-1), Action::Buy);
    }

    #[test]
    fn action_uses_operator_labels() {
        assert_eq!(Action::Sell.to_string(), "Vender");
        assert_eq!(serde_json::to_value(Action::Buy).unwrap(), "Comprar");
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(value_cop(10, 1.25), 13);
        assert_eq!(value_cop(-10, 1.25), -13);
        assert_ne!(value_cop(10, 1.25), (10.0f64 * 1.25).round_ties_even() as i64);
        assert_eq!(value_cop(3, 0.1), 0);
        assert_eq!(value_cop(7, 0.5), 4);
    }

    #[test]
    fn join_drops_plants_missing_from_dispatch() {
        let capacity = vec![cap("GVIO", 0, 50), cap("ZPA2", 0, 100), cap("ZPA2", 1, 100)];
        let dispatch = vec![disp("ZPA2", 0, 70), disp("ZPA2", 1, 90), disp("ZPA2", 2, 10)];
        let out = reconcile(&capacity, &dispatch).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].plant_code, "ZPA2");
        assert_eq!(out[0].capacity_total_kwh, 200);
        assert_eq!(out[0].committed_total_kwh, 160);
        assert_eq!(out[0].balance_kwh, 40);
    }

    #[test]
    fn output_is_sorted_by_plant_code() {
        let capacity = vec![cap("ZPA3", 0, 10), cap("GVIO", 0, 10), cap("QUI1", 0, 10)];
        let dispatch = vec![disp("QUI1", 0, 1), disp("ZPA3", 0, 1), disp("GVIO", 0, 1)];
        let codes: Vec<String> = reconcile(&capacity, &dispatch).unwrap().into_iter().map(|b| b.plant_code).collect();
        assert_eq!(codes, vec!["GVIO", "QUI1", "ZPA3"]);
    }

    #[test]
    fn full_day_scenario() {
        let capacity: Vec<_> = (0..24).map(|h| cap("ZPA2", h, 100)).collect();
        let dispatch: Vec<_> = (0..24).map(|h| disp("ZPA2", h, 80)).collect();
        let balances = reconcile(&capacity, &dispatch).unwrap();
        let priced = price_balances(balances, PriceRecord { price_cop_per_kwh: 200.0 });
        assert_eq!(priced.len(), 1);
        let row = &priced[0];
        assert_eq!(row.date, day());
        assert_eq!(row.balance_kwh, 480);
        assert_eq!(row.value_cop, 96000);
        assert_eq!(row.action, Action::Sell);
    }

    #[test]
    fn deficit_is_priced_negative() {
        let balances = reconcile(&[cap("ZPA4", 3, 10)], &[disp("ZPA4", 3, 25)]).unwrap();
        let priced = price_balances(balances, PriceRecord { price_cop_per_kwh: 300.5 });
        assert_eq!(priced[0].balance_kwh, -15);
        assert_eq!(priced[0].value_cop, -4508);
        assert_eq!(priced[0].action, Action::Buy);
    }

    #[test]
    fn capacity_sum_past_i64_range_is_an_error() {
        let huge = i64::MAX / 2 + 1;
        let capacity = vec![cap("ZPA2", 0, huge), cap("ZPA2", 1, huge)];
        let dispatch = vec![disp("ZPA2", 0, 0), disp("ZPA2", 1, 0)];
        assert_eq!(
            reconcile(&capacity, &dispatch).unwrap_err(),
            EtlError::BalanceOverflow("ZPA2".into())
        );
    }

    #[test]
    fn balance_past_i64_range_is_an_error() {
        let capacity = vec![cap("QUI1", 0, i64::MAX)];
        let dispatch = vec![disp("QUI1", 0, -1)];
        assert_eq!(
            reconcile(&capacity, &dispatch).unwrap_err(),
            EtlError::BalanceOverflow("QUI1".into())
        );
    }
}
