use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::data::capacity::split_timestamp;
use crate::error::{EtlError, Stage};

/// Generation plants the balance is computed for.
pub const PLANTS_OF_INTEREST: [&str; 6] = ["ZPA2", "ZPA3", "ZPA4", "ZPA5", "GVIO", "QUI1"];

pub type FeedRecord = Map<String, Value>;

pub fn is_plant_of_interest(code: &str) -> bool {
    PLANTS_OF_INTEREST.contains(&code)
}

/// How a dataset treats plant codes outside [`PLANTS_OF_INTEREST`].
///
/// The capacity sheet is authored by the operator for exactly these plants,
/// so a stray code there is an error. Remote feeds cover the whole market and
/// are narrowed down silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipPolicy {
    Strict,
    Filter,
}

impl MembershipPolicy {
    /// `Ok(true)` keeps the row, `Ok(false)` drops it.
    pub fn admit(self, code: &str) -> Result<bool, EtlError> {
        match (self, is_plant_of_interest(code)) {
            (_, true) => Ok(true),
            (MembershipPolicy::Filter, false) => Ok(false),
            (MembershipPolicy::Strict, false) => Err(EtlError::UnknownPlantCode),
        }
    }
}

/// Field names used to reshape a remote feed into (date, hour, code, quantity).
#[derive(Debug, Clone, Copy)]
pub struct ReshapeSpec {
    pub stage: Stage,
    pub timestamp_field: &'static str,
    pub quantity_field: &'static str,
    pub code_field: &'static str,
    pub quantity_label: &'static str,
}

pub const DISPATCH_SPEC: ReshapeSpec = ReshapeSpec {
    stage: Stage::DispatchFetch,
    timestamp_field: "FechaHora",
    quantity_field: "Valor",
    code_field: "CodigoPlanta",
    quantity_label: "Compromiso (kWh)",
};

/// Tag predicates selecting the pool price row.
#[derive(Debug, Clone, Copy)]
pub struct PriceSelector {
    pub variable_field: &'static str,
    pub variable: &'static str,
    pub version_field: &'static str,
    pub version: &'static str,
    pub value_field: &'static str,
}

pub const POOL_PRICE: PriceSelector = PriceSelector {
    variable_field: "CodigoVariable",
    variable: "PPBOGReal",
    version_field: "Version",
    version: "TXR",
    value_field: "Valor",
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRecord {
    pub date: NaiveDate,
    pub hour: String,
    pub plant_code: String,
    pub committed_kwh: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceRecord {
    pub price_cop_per_kwh: f64,
}

/// Reshape the dispatch feed. Codes outside the plant set are handled per `policy`.
pub fn normalize_dispatch(
    records: &[FeedRecord],
    spec: &ReshapeSpec,
    policy: MembershipPolicy,
) -> Result<Vec<DispatchRecord>, EtlError> {
    let mut out = Vec::new();
    for rec in records {
        let code = text_field(rec, spec.code_field)
            .ok_or_else(|| missing(spec.stage, spec.code_field))?;
        if !policy.admit(&code)? {
            continue;
        }
        let raw_ts = text_field(rec, spec.timestamp_field)
            .ok_or_else(|| missing(spec.stage, spec.timestamp_field))?;
        let (date, hour) = split_timestamp(&raw_ts).ok_or_else(|| {
            EtlError::MalformedFeed(spec.stage, format!("bad timestamp {raw_ts:?}"))
        })?;
        let quantity = rec
            .get(spec.quantity_field)
            .and_then(as_i64)
            .ok_or_else(|| {
                EtlError::MalformedFeed(spec.stage, format!("{} is not an integer", spec.quantity_label))
            })?;
        out.push(DispatchRecord { date, hour, plant_code: code, committed_kwh: quantity });
    }
    tracing::debug!(
        kept = out.len(),
        total = records.len(),
        label = spec.quantity_label,
        "Normalized feed"
    );
    Ok(out)
}

/// Pick the single pool price row. Zero or several matches are rejected.
pub fn select_price(records: &[FeedRecord], selector: &PriceSelector) -> Result<PriceRecord, EtlError> {
    let matches: Vec<&FeedRecord> = records
        .iter()
        .filter(|rec| {
            text_field(rec, selector.variable_field).as_deref() == Some(selector.variable)
                && text_field(rec, selector.version_field).as_deref() == Some(selector.version)
        })
        .collect();

    let row = match matches.as_slice() {
        [] => return Err(EtlError::MissingPriceRow),
        [row] => *row,
        many => return Err(EtlError::AmbiguousPriceRow(many.len())),
    };
    let price = row.get(selector.value_field).and_then(as_f64).ok_or_else(|| {
        EtlError::MalformedFeed(Stage::PriceFetch, format!("{} is not a number", selector.value_field))
    })?;
    Ok(PriceRecord { price_cop_per_kwh: price })
}

fn missing(stage: Stage, field: &str) -> EtlError {
    EtlError::MalformedFeed(stage, format!("record without {field}"))
}

fn text_field(rec: &FeedRecord, name: &str) -> Option<String> {
    match rec.get(name)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer cast: floats truncate toward zero, text must be an integer literal.
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<FeedRecord> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn dispatch_is_reshaped_and_silently_filtered() {
        let recs = records(json!([
            {"FechaHora": "2024-01-01 00:00:00", "Valor": 80, "CodigoPlanta": "ZPA2"},
            {"FechaHora": "2024-01-01 01:00:00", "Valor": "75", "CodigoPlanta": "ZPA2"},
            {"FechaHora": "2024-01-01 00:00:00", "Valor": 500, "CodigoPlanta": "GUAV"},
        ]));
        let out = normalize_dispatch(&recs, &DISPATCH_SPEC, MembershipPolicy::Filter).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].hour, "00");
        assert_eq!(out[0].committed_kwh, 80);
        assert_eq!(out[1].committed_kwh, 75);
        assert!(out.iter().all(|r| r.plant_code == "ZPA2"));
    }

    #[test]
    fn strict_policy_rejects_out_of_scope_codes() {
        let recs = records(json!([
            {"FechaHora": "2024-01-01 00:00:00", "Valor": 500, "CodigoPlanta": "GUAV"},
        ]));
        let err = normalize_dispatch(&recs, &DISPATCH_SPEC, MembershipPolicy::Strict).unwrap_err();
        assert_eq!(err, EtlError::UnknownPlantCode);
    }

    #[test]
    fn float_dispatch_values_truncate() {
        let recs = records(json!([
            {"FechaHora": "2024-01-01 05:00:00", "Valor": 80.9, "CodigoPlanta": "QUI1"},
        ]));
        let out = normalize_dispatch(&recs, &DISPATCH_SPEC, MembershipPolicy::Filter).unwrap();
        assert_eq!(out[0].committed_kwh, 80);
    }

    #[test]
    fn dispatch_record_without_value_is_malformed() {
        let recs = records(json!([
            {"FechaHora": "2024-01-01 05:00:00", "CodigoPlanta": "QUI1"},
        ]));
        let err = normalize_dispatch(&recs, &DISPATCH_SPEC, MembershipPolicy::Filter).unwrap_err();
        assert!(matches!(err, EtlError::MalformedFeed(Stage::DispatchFetch, _)));
    }

    #[test]
    fn price_row_is_selected_by_both_tags() {
        let recs = records(json!([
            {"CodigoVariable": "PPBOGReal", "Version": "TX1", "Valor": 150.0},
            {"CodigoVariable": "PPBOGReal", "Version": "TXR", "Valor": "212.37"},
            {"CodigoVariable": "MPO", "Version": "TXR", "Valor": 999.0},
        ]));
        let price = select_price(&recs, &POOL_PRICE).unwrap();
        assert_eq!(price.price_cop_per_kwh, 212.37);
    }

    #[test]
    fn duplicate_price_rows_are_ambiguous() {
        let recs = records(json!([
            {"CodigoVariable": "PPBOGReal", "Version": "TXR", "Valor": 200.0},
            {"CodigoVariable": "PPBOGReal", "Version": "TXR", "Valor": 201.0},
        ]));
        assert_eq!(select_price(&recs, &POOL_PRICE).unwrap_err(), EtlError::AmbiguousPriceRow(2));
    }

    #[test]
    fn absent_price_row_is_reported() {
        let recs = records(json!([
            {"CodigoVariable": "PPBOGReal", "Version": "TX2", "Valor": 200.0},
        ]));
        assert_eq!(select_price(&recs, &POOL_PRICE).unwrap_err(), EtlError::MissingPriceRow);
    }
}
