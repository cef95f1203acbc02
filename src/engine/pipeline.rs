use std::path::PathBuf;

use crate::bot::messages;
use crate::data::capacity;
use crate::data::drive::{FileStore, StoreConnector};
use crate::data::fetcher::{Dataset, MarketData};
use crate::data::normalizer::{self, MembershipPolicy, DISPATCH_SPEC, POOL_PRICE};
use crate::data::upload::ReportUploader;
use crate::engine::progress::{ProgressSink, Status};
use crate::engine::reconcile::{self, BalanceRecord};
use crate::engine::report::{self, Report};
use crate::engine::validation;
use crate::error::EtlError;

const CAPACITY_SUFFIX: &str = ".xlsx";

/// Collaborators and locations a run works against.
pub struct Services {
    pub store: Box<dyn StoreConnector>,
    pub market: Box<dyn MarketData>,
    pub uploader: Box<dyn ReportUploader>,
    pub extraction_folder_id: String,
    pub upload_folder_id: String,
    pub report_dir: PathBuf,
}

/// Full balance run: authenticate, extract, validate, reconcile, price and
/// materialize. Exactly one `stop` is emitted whatever the outcome.
pub async fn run_etl(services: &Services, sink: &dyn ProgressSink) -> Result<Report, EtlError> {
    tracing::info!("Starting energy balance run");
    let result = async {
        let store = services.store.connect().await?;
        sink.status(Status::Ok, messages::AUTH_OK).await;

        let records = extract_and_reconcile(store.as_ref(), services, sink).await?;
        for r in &records {
            tracing::debug!(
                plant = %r.plant_code,
                capacity = r.capacity_total_kwh,
                committed = r.committed_total_kwh,
                balance = r.balance_kwh,
                "Plant balance"
            );
        }
        let report = Report::from_balances(&records, report::today_bogota());
        let artifacts = report
            .write_to(&services.report_dir)
            .map_err(|e| EtlError::ReportWrite(format!("{e:#}")))?;
        tracing::info!(
            plants = report.rows.len(),
            csv = %artifacts.csv.display(),
            xlsx = %artifacts.xlsx.display(),
            "Energy balance computed"
        );

        sink.status(Status::Ok, messages::BALANCE_DONE).await;
        sink.report(&report).await;
        Ok::<_, EtlError>(report)
    }
    .await;
    finish(result, sink).await
}

/// Upload the artifacts of today's run: CSV to FastUpload, XLSX to the Drive upload folder.
pub async fn send_report(services: &Services, sink: &dyn ProgressSink) -> Result<(), EtlError> {
    tracing::info!("Sending energy balance report");
    let result = async {
        let csv_path = services.report_dir.join(report::CSV_FILE_NAME);
        let xlsx_name = report::xlsx_file_name(report::today_bogota());
        let xlsx_path = services.report_dir.join(&xlsx_name);
        let csv = read_artifact(&csv_path)?;
        let xlsx = read_artifact(&xlsx_path)?;

        services.uploader.upload(report::CSV_FILE_NAME, csv).await?;

        let store = services.store.connect().await?;
        store.upload(&services.upload_folder_id, &xlsx_name, xlsx).await?;

        sink.status(Status::Ok, messages::REPORT_SENT).await;
        Ok::<_, EtlError>(())
    }
    .await;
    finish(result, sink).await
}

fn read_artifact(path: &std::path::Path) -> Result<Vec<u8>, EtlError> {
    std::fs::read(path).map_err(|e| EtlError::MissingReport(format!("{}: {e}", path.display())))
}

/// Narrate a failure once, then always close the run.
async fn finish<T>(result: Result<T, EtlError>, sink: &dyn ProgressSink) -> Result<T, EtlError> {
    if let Err(e) = &result {
        tracing::error!(error = %e, class = ?e.class(), "Run failed");
        sink.status(Status::Error, &messages::failure_text(e)).await;
    }
    sink.stop().await;
    result
}

async fn extract_and_reconcile(
    store: &dyn FileStore,
    services: &Services,
    sink: &dyn ProgressSink,
) -> Result<Vec<BalanceRecord>, EtlError> {
    // Capacity sheet
    let files = store.list_folder(&services.extraction_folder_id).await?;
    if files.is_empty() {
        return Err(EtlError::EmptySourceFolder);
    }
    sink.status(Status::Ok, messages::FOLDER_HAS_FILES).await;

    let file = files
        .iter()
        .find(|f| f.name.ends_with(CAPACITY_SUFFIX))
        .ok_or(EtlError::MissingExpectedFile)?;
    sink.status(Status::Ok, messages::FOLDER_HAS_XLSX).await;
    tracing::info!(file = %file.name, id = %file.id, "Downloading capacity sheet");

    let bytes = store.download(&file.id).await?;
    let rows = capacity::parse_rows(capacity::read_workbook(&bytes)?);
    let capacity = validation::validate(&rows)?;
    sink.status(Status::Ok, messages::CAPACITY_LOADED).await;
    tracing::info!(query_date = %capacity.query_date, rows = capacity.records.len(), "Capacity sheet validated");

    // Remote feeds for the same day
    let raw = services.market.fetch_records(Dataset::Dispatch, capacity.query_date).await?;
    let dispatch = normalizer::normalize_dispatch(&raw, &DISPATCH_SPEC, MembershipPolicy::Filter)?;
    sink.status(Status::Ok, messages::DISPATCH_LOADED).await;

    let raw = services.market.fetch_records(Dataset::PoolPrice, capacity.query_date).await?;
    let price = normalizer::select_price(&raw, &POOL_PRICE)?;
    sink.status(Status::Ok, messages::PRICE_LOADED).await;
    tracing::info!(price = price.price_cop_per_kwh, "Pool price selected");

    let balances = reconcile::reconcile(&capacity.records, &dispatch)?;
    Ok(reconcile::price_balances(balances, price))
}
