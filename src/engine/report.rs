use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::engine::reconcile::{Action, BalanceRecord};

pub const CSV_FILE_NAME: &str = "balance_energia.csv";

/// Header row shared by every materialized form.
pub const COLUMNS: [&str; 5] = ["Fecha", "Codigo", "Balance (kWh)", "Compromisos (COP)", "Operacion"];

/// Consolidated view of a balance row; per-plant totals are not materialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    #[serde(rename = "Fecha")]
    pub date: NaiveDate,
    #[serde(rename = "Codigo")]
    pub plant_code: String,
    #[serde(rename = "Balance (kWh)")]
    pub balance_kwh: i64,
    #[serde(rename = "Compromisos (COP)")]
    pub value_cop: i64,
    #[serde(rename = "Operacion")]
    pub action: Action,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub rows: Vec<ReportRow>,
    /// Day the report was produced, used to tag the spreadsheet.
    pub generated_on: NaiveDate,
}

/// Paths of the artifacts written for a later upload.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub csv: PathBuf,
    pub xlsx: PathBuf,
}

pub fn xlsx_file_name(day: NaiveDate) -> String {
    format!("balance_energia_{}.xlsx", day.format("%Y-%m-%d"))
}

/// Today's date in Colombia, where the operator and the market live.
pub fn today_bogota() -> NaiveDate {
    chrono::Utc::now().with_timezone(&chrono_tz::America::Bogota).date_naive()
}

impl Report {
    pub fn from_balances(records: &[BalanceRecord], generated_on: NaiveDate) -> Self {
        let rows = records
            .iter()
            .map(|r| ReportRow {
                date: r.date,
                plant_code: r.plant_code.clone(),
                balance_kwh: r.balance_kwh,
                value_cop: r.value_cop,
                action: r.action,
            })
            .collect();
        Self { rows, generated_on }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.rows).context("serializing report to JSON")
    }

    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        if self.rows.is_empty() {
            wtr.write_record(COLUMNS)?;
        }
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.into_inner()
            .map_err(|e| anyhow::anyhow!("flushing CSV writer: {}", e.error()))
    }

    pub fn to_xlsx(&self) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Balance")?;

        for (col, name) in (0u16..).zip(COLUMNS) {
            sheet.write_string_with_format(0, col, name, &header)?;
        }
        for (row, rec) in (1u32..).zip(&self.rows) {
            sheet.write_string(row, 0, rec.date.format("%Y-%m-%d").to_string())?;
            sheet.write_string(row, 1, &rec.plant_code)?;
            sheet.write_number(row, 2, rec.balance_kwh as f64)?;
            sheet.write_number(row, 3, rec.value_cop as f64)?;
            sheet.write_string(row, 4, rec.action.to_string())?;
        }
        workbook.save_to_buffer().context("rendering XLSX report")
    }

    pub fn xlsx_file_name(&self) -> String {
        xlsx_file_name(self.generated_on)
    }

    /// Write the CSV and the dated XLSX into `dir`, replacing any previous run.
    pub fn write_to(&self, dir: &Path) -> Result<Artifacts> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let csv = dir.join(CSV_FILE_NAME);
        let xlsx = dir.join(self.xlsx_file_name());
        std::fs::write(&csv, self.to_csv()?).with_context(|| format!("writing {}", csv.display()))?;
        std::fs::write(&xlsx, self.to_xlsx()?).with_context(|| format!("writing {}", xlsx.display()))?;
        Ok(Artifacts { csv, xlsx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let records = vec![
            BalanceRecord {
                date: day,
                plant_code: "GVIO".into(),
                capacity_total_kwh: 100,
                committed_total_kwh: 100,
                balance_kwh: 0,
                value_cop: 0,
                action: Action::Buy,
            },
            BalanceRecord {
                date: day,
                plant_code: "ZPA2".into(),
                capacity_total_kwh: 2400,
                committed_total_kwh: 1920,
                balance_kwh: 480,
                value_cop: 96000,
                action: Action::Sell,
            },
        ];
        Report::from_balances(&records, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
    }

    #[test]
    fn csv_has_fixed_column_order() {
        let csv = String::from_utf8(sample().to_csv().unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Fecha,Codigo,Balance (kWh),Compromisos (COP),Operacion"));
        assert_eq!(lines.next(), Some("2024-01-01,GVIO,0,0,Comprar"));
        assert_eq!(lines.next(), Some("2024-01-01,ZPA2,480,96000,Vender"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn empty_csv_still_has_header() {
        let mut report = sample();
        report.rows.clear();
        let csv = String::from_utf8(report.to_csv().unwrap()).unwrap();
        assert_eq!(csv.trim_end(), "Fecha,Codigo,Balance (kWh),Compromisos (COP),Operacion");
    }

    #[test]
    fn json_drops_intermediate_totals() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        let first = json[1].as_object().unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(first["Codigo"], "ZPA2");
        assert_eq!(first["Compromisos (COP)"], 96000);
        assert_eq!(first["Operacion"], "Vender");
        assert_eq!(first["Fecha"], "2024-01-01");
    }

    #[test]
    fn spreadsheet_is_tagged_with_generation_date() {
        let report = sample();
        assert_eq!(report.xlsx_file_name(), "balance_energia_2024-01-02.xlsx");
        let bytes = report.to_xlsx().unwrap();
        // XLSX is a zip container.
        assert_eq!(&bytes[..2], b"PK");
    }
}
