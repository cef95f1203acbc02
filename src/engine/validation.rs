use chrono::NaiveDate;
use serde::Serialize;

use crate::data::capacity::{split_timestamp, Cell, RawCapacityRow};
use crate::data::normalizer::{MembershipPolicy, PLANTS_OF_INTEREST};
use crate::error::{CapacityColumn, EtlError};

/// Non-null values each required column must hold: 24 hours × the plants of interest.
pub const MIN_ROWS: usize = 24 * PLANTS_OF_INTEREST.len();

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityRecord {
    pub date: NaiveDate,
    pub hour: String,
    pub capacity_kwh: i64,
    pub plant_code: String,
}

/// Capacity dataset that passed every gate.
#[derive(Debug, Clone)]
pub struct ValidatedCapacity {
    /// The single day the remote feeds are queried for.
    pub query_date: NaiveDate,
    pub records: Vec<CapacityRecord>,
}

/// Run the capacity gates in order. The first failing gate is the only error reported.
pub fn validate(rows: &[RawCapacityRow]) -> Result<ValidatedCapacity, EtlError> {
    check_completeness(rows)?;
    let stamps = parse_dates(rows)?;
    let capacities = cast_capacities(rows)?;
    let query_date = single_date(&stamps)?;
    let codes = check_membership(rows)?;

    let records = stamps
        .into_iter()
        .zip(capacities)
        .zip(codes)
        .map(|(((date, hour), capacity_kwh), plant_code)| CapacityRecord {
            date,
            hour,
            capacity_kwh,
            plant_code,
        })
        .collect();

    Ok(ValidatedCapacity { query_date, records })
}

fn check_completeness(rows: &[RawCapacityRow]) -> Result<(), EtlError> {
    let counts = [
        (CapacityColumn::Date, rows.iter().filter(|r| r.timestamp.is_some()).count()),
        (CapacityColumn::Capacity, rows.iter().filter(|r| !r.capacity.is_empty()).count()),
        (CapacityColumn::PlantCode, rows.iter().filter(|r| r.plant_code.is_some()).count()),
    ];
    match counts.iter().find(|(_, n)| *n < MIN_ROWS) {
        Some((column, n)) => {
            tracing::warn!(column = column.label(), count = n, required = MIN_ROWS, "Incomplete column");
            Err(EtlError::IncompleteDataset(*column))
        }
        None => Ok(()),
    }
}

fn parse_dates(rows: &[RawCapacityRow]) -> Result<Vec<(NaiveDate, String)>, EtlError> {
    rows.iter()
        .map(|r| r.timestamp.as_deref().and_then(split_timestamp).ok_or(EtlError::InvalidDate))
        .collect()
}

fn cast_capacities(rows: &[RawCapacityRow]) -> Result<Vec<i64>, EtlError> {
    rows.iter()
        .map(|r| lossless_i64(&r.capacity).ok_or(EtlError::NonNumericCapacity))
        .collect()
}

fn lossless_i64(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Number(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Some(*f as i64)
        }
        Cell::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn single_date(stamps: &[(NaiveDate, String)]) -> Result<NaiveDate, EtlError> {
    let min = stamps.iter().map(|(d, _)| *d).min();
    let max = stamps.iter().map(|(d, _)| *d).max();
    match (min, max) {
        (Some(min), Some(max)) if min == max => Ok(min),
        (Some(min), Some(max)) => {
            tracing::warn!(%min, %max, "Capacity sheet spans several dates");
            Err(EtlError::MixedDates)
        }
        _ => Err(EtlError::InvalidDate),
    }
}

fn check_membership(rows: &[RawCapacityRow]) -> Result<Vec<String>, EtlError> {
    rows.iter()
        .map(|r| {
            let code = r.plant_code.clone().ok_or(EtlError::UnknownPlantCode)?;
            MembershipPolicy::Strict.admit(&code)?;
            Ok::<_, EtlError>(code)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Full day for every plant of interest: 144 rows.
    fn full_day(date: &str) -> Vec<RawCapacityRow> {
        PLANTS_OF_INTEREST
            .iter()
            .flat_map(|code| {
                (0..24).map(move |h| RawCapacityRow {
                    timestamp: Some(format!("{date} {h:02}:00:00")),
                    capacity: Cell::Number(100.0),
                    plant_code: Some(code.to_string()),
                })
            })
            .collect()
    }

    #[test]
    fn full_day_passes_and_yields_query_date() {
        let rows = full_day("2024-01-01");
        assert_eq!(rows.len(), MIN_ROWS);
        let valid = validate(&rows).unwrap();
        assert_eq!(valid.query_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(valid.records.len(), 144);
        assert_eq!(valid.records[5].hour, "05");
        assert_eq!(valid.records[0].capacity_kwh, 100);
    }

    #[test]
    fn one_missing_value_fails_completeness() {
        let mut rows = full_day("2024-01-01");
        rows[10].capacity = Cell::Empty;
        assert_eq!(
            validate(&rows).unwrap_err(),
            EtlError::IncompleteDataset(CapacityColumn::Capacity)
        );

        let mut rows = full_day("2024-01-01");
        rows.pop();
        assert_eq!(rows.len(), 143);
        assert_eq!(validate(&rows).unwrap_err(), EtlError::IncompleteDataset(CapacityColumn::Date));
    }

    #[test]
    fn surplus_row_with_null_passes_completeness_but_not_later_gates() {
        let mut rows = full_day("2024-01-01");
        rows.push(RawCapacityRow {
            timestamp: Some("2024-01-01 00:00:00".into()),
            capacity: Cell::Number(5.0),
            plant_code: None,
        });
        assert_eq!(validate(&rows).unwrap_err(), EtlError::UnknownPlantCode);
    }

    #[test]
    fn completeness_columns_are_checked_in_order() {
        let mut rows = full_day("2024-01-01");
        rows[0].plant_code = None;
        rows[1].timestamp = None;
        assert_eq!(validate(&rows).unwrap_err(), EtlError::IncompleteDataset(CapacityColumn::Date));
    }

    #[test]
    fn invalid_date_is_reported() {
        let mut rows = full_day("2024-01-01");
        rows.push(RawCapacityRow {
            timestamp: Some("2024-02-30 00:00:00".into()),
            capacity: Cell::Number(1.0),
            plant_code: Some("ZPA2".into()),
        });
        assert_eq!(validate(&rows).unwrap_err(), EtlError::InvalidDate);
    }

    #[test]
    fn fractional_or_text_capacity_is_not_numeric() {
        let mut rows = full_day("2024-01-01");
        rows[3].capacity = Cell::Number(100.5);
        assert_eq!(validate(&rows).unwrap_err(), EtlError::NonNumericCapacity);

        let mut rows = full_day("2024-01-01");
        rows[3].capacity = Cell::Text("cien".into());
        assert_eq!(validate(&rows).unwrap_err(), EtlError::NonNumericCapacity);

        let mut rows = full_day("2024-01-01");
        rows[3].capacity = Cell::Text(" 120 ".into());
        assert_eq!(validate(&rows).unwrap().records[3].capacity_kwh, 120);
    }

    #[test]
    fn two_dates_fail_uniformity() {
        let mut rows = full_day("2024-01-01");
        rows[143].timestamp = Some("2024-01-02 23:00:00".into());
        assert_eq!(validate(&rows).unwrap_err(), EtlError::MixedDates);
    }

    #[test]
    fn unexpected_code_is_never_filtered() {
        let mut rows = full_day("2024-01-01");
        rows[7].plant_code = Some("GUAV".into());
        assert_eq!(validate(&rows).unwrap_err(), EtlError::UnknownPlantCode);
    }

    #[test]
    fn only_first_failing_gate_is_reported() {
        let mut rows = full_day("2024-01-01");
        rows[0].timestamp = Some("garbage".into());
        rows[1].capacity = Cell::Text("n/a".into());
        rows[2].timestamp = Some("2024-01-05 00:00:00".into());
        rows[3].plant_code = Some("XXXX".into());
        assert_eq!(validate(&rows).unwrap_err(), EtlError::InvalidDate);

        rows[0].timestamp = Some("2024-01-01 00:00:00".into());
        assert_eq!(validate(&rows).unwrap_err(), EtlError::NonNumericCapacity);

        rows[1].capacity = Cell::Number(1.0);
        assert_eq!(validate(&rows).unwrap_err(), EtlError::MixedDates);

        rows[2].timestamp = Some("2024-01-01 02:00:00".into());
        assert_eq!(validate(&rows).unwrap_err(), EtlError::UnknownPlantCode);
    }
}
