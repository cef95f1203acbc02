use std::fmt;
use thiserror::Error;

/// Remote call site, used to tell the operator which request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Drive,
    DispatchFetch,
    PriceFetch,
    UploadAuth,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Drive => "drive",
            Stage::DispatchFetch => "dispatch_fetch",
            Stage::PriceFetch => "price_fetch",
            Stage::UploadAuth => "upload_auth",
            Stage::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Required columns of the capacity sheet, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityColumn {
    Date,
    Capacity,
    PlantCode,
}

impl CapacityColumn {
    /// Header as printed on the operator's spreadsheet.
    pub fn label(self) -> &'static str {
        match self {
            CapacityColumn::Date => "FECHA",
            CapacityColumn::Capacity => "CAPACIDAD (Kwh)",
            CapacityColumn::PlantCode => "CODIGO",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EtlError {
    #[error("drive authentication failed: {0}")]
    AuthFailure(String),

    #[error("extraction folder is empty")]
    EmptySourceFolder,

    #[error("no file with the expected extension in extraction folder")]
    MissingExpectedFile,

    #[error("capacity workbook is unreadable: {0}")]
    MalformedSource(String),

    #[error("column {} has fewer non-null values than required", .0.label())]
    IncompleteDataset(CapacityColumn),

    #[error("at least one row holds an invalid date")]
    InvalidDate,

    #[error("at least one capacity value is not an integer")]
    NonNumericCapacity,

    #[error("capacity rows span more than one date")]
    MixedDates,

    #[error("capacity rows contain a plant code outside the plants of interest")]
    UnknownPlantCode,

    #[error("request timed out at stage {0}")]
    NetworkTimeout(Stage),

    #[error("connection error at stage {0}")]
    NetworkError(Stage),

    #[error("unexpected payload at stage {0}: {1}")]
    MalformedFeed(Stage, String),

    #[error("price feed has no row for the selected variable and version")]
    MissingPriceRow,

    #[error("price feed has {0} rows for the selected variable and version")]
    AmbiguousPriceRow(usize),

    #[error("energy totals for plant {0} exceed the representable range")]
    BalanceOverflow(String),

    #[error("report upload authentication rejected")]
    UploadAuthFailure,

    #[error("report upload rejected")]
    UploadFailure,

    #[error("saving report to drive failed: {0}")]
    DriveUploadFailure(String),

    #[error("no report artifacts found: {0}")]
    MissingReport(String),

    #[error("writing report artifacts failed: {0}")]
    ReportWrite(String),
}

/// Coarse outcome of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Auth,
    Source,
    Validation,
    Network,
    Upload,
}

impl EtlError {
    pub fn class(&self) -> FailureClass {
        match self {
            EtlError::AuthFailure(_) => FailureClass::Auth,
            EtlError::EmptySourceFolder
            | EtlError::MissingExpectedFile
            | EtlError::MalformedSource(_)
            | EtlError::MissingReport(_)
            | EtlError::ReportWrite(_) => FailureClass::Source,
            EtlError::IncompleteDataset(_)
            | EtlError::InvalidDate
            | EtlError::NonNumericCapacity
            | EtlError::MixedDates
            | EtlError::UnknownPlantCode
            | EtlError::MissingPriceRow
            | EtlError::AmbiguousPriceRow(_)
            | EtlError::BalanceOverflow(_) => FailureClass::Validation,
            EtlError::NetworkTimeout(_) | EtlError::NetworkError(_) | EtlError::MalformedFeed(..) => {
                FailureClass::Network
            }
            EtlError::UploadAuthFailure
            | EtlError::UploadFailure
            | EtlError::DriveUploadFailure(_) => FailureClass::Upload,
        }
    }

    /// Map a transport error from `reqwest` onto the timeout / connection split.
    pub fn from_transport(stage: Stage, err: &reqwest::Error) -> Self {
        tracing::error!(%stage, error = %err, "Remote call failed");
        if err.is_timeout() {
            EtlError::NetworkTimeout(stage)
        } else {
            EtlError::NetworkError(stage)
        }
    }
}
