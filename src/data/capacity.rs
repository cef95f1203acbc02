use calamine::{open_workbook_from_rs, Data, Reader, Xlsx, XlsxError};
use chrono::NaiveDate;
use std::io::Cursor;

use crate::error::EtlError;

/// Rows above the data block (title, blank line, headers).
pub const PREAMBLE_ROWS: usize = 4;

const TIMESTAMP_COL: usize = 0;
const CAPACITY_COL: usize = 3;
const CODE_COL: usize = 4;

/// One spreadsheet cell, reduced to what the capacity sheet can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn into_text(self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s),
            Cell::Number(n) => Some(n.to_string()),
        }
    }
}

/// Capacity row as read from the sheet, before any gate has run.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCapacityRow {
    pub timestamp: Option<String>,
    pub capacity: Cell,
    pub plant_code: Option<String>,
}

/// Read the first worksheet of an XLSX payload into an absolute cell grid.
///
/// calamine trims the used range, so the grid is re-anchored at A1 to keep
/// the fixed column offsets and preamble meaningful.
pub fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, EtlError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: XlsxError| EtlError::MalformedSource(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EtlError::MalformedSource("workbook has no worksheet".into()))?
        .map_err(|e| EtlError::MalformedSource(e.to_string()))?;

    let (row0, col0) = match range.start() {
        Some((r, c)) => (r as usize, c as usize),
        None => return Ok(Vec::new()),
    };

    let mut grid: Vec<Vec<Cell>> = vec![Vec::new(); row0];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; col0];
        cells.extend(row.iter().map(convert_cell));
        grid.push(cells);
    }
    Ok(grid)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Cell::Text(naive.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Cell::Number(dt.as_f64()),
        },
    }
}

/// Drop the preamble and keep the timestamp, capacity and plant-code columns.
/// Rows where all three are blank are padding below the data block.
pub fn parse_rows(grid: Vec<Vec<Cell>>) -> Vec<RawCapacityRow> {
    grid.into_iter()
        .skip(PREAMBLE_ROWS)
        .map(|mut row| {
            let mut take = |idx: usize| {
                row.get_mut(idx)
                    .map(|c| std::mem::replace(c, Cell::Empty))
                    .unwrap_or(Cell::Empty)
            };
            let timestamp = take(TIMESTAMP_COL);
            let capacity = take(CAPACITY_COL);
            let code = take(CODE_COL);
            (timestamp, capacity, code)
        })
        .filter(|(t, c, p)| !(t.is_empty() && c.is_empty() && p.is_empty()))
        .map(|(timestamp, capacity, code)| RawCapacityRow {
            timestamp: timestamp.into_text(),
            capacity,
            plant_code: code.into_text().map(|s| s.trim().to_string()),
        })
        .collect()
}

/// Split a composite "YYYY-MM-DD HH..." string into its date and hour parts.
pub fn split_timestamp(raw: &str) -> Option<(NaiveDate, String)> {
    let date = NaiveDate::parse_from_str(raw.get(0..10)?, "%Y-%m-%d").ok()?;
    let hour = raw.get(11..13)?;
    if !hour.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((date, hour.to_string()))
}
