use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

use crate::data::normalizer::FeedRecord;
use crate::error::{EtlError, Stage};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(7);
const READ_TIMEOUT: Duration = Duration::from_secs(4);

/// Shared HTTP client for every remote collaborator.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .build()?)
}

/// SIMEM public datasets used by the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    /// "Despacho programado recursos de generación"
    Dispatch,
    /// "Precio de bolsa ponderado"
    PoolPrice,
}

impl Dataset {
    pub fn id(self) -> &'static str {
        match self {
            Dataset::Dispatch => "ff027b",
            Dataset::PoolPrice => "96D56E",
        }
    }

    pub fn stage(self) -> Stage {
        match self {
            Dataset::Dispatch => Stage::DispatchFetch,
            Dataset::PoolPrice => Stage::PriceFetch,
        }
    }
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// All records of `dataset` for the single day `day`.
    async fn fetch_records(&self, dataset: Dataset, day: NaiveDate) -> Result<Vec<FeedRecord>, EtlError>;
}

#[derive(Deserialize)]
struct PublicDataResponse {
    result: PublicDataResult,
}

#[derive(Deserialize)]
struct PublicDataResult {
    records: Vec<FeedRecord>,
}

pub struct SimemClient {
    client: reqwest::Client,
    base_url: String,
}

impl SimemClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl MarketData for SimemClient {
    async fn fetch_records(&self, dataset: Dataset, day: NaiveDate) -> Result<Vec<FeedRecord>, EtlError> {
        let stage = dataset.stage();
        let day = day.format("%Y-%m-%d").to_string();
        let url = format!("{}/PublicData", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("startdate", day.as_str()), ("enddate", day.as_str()), ("datasetId", dataset.id())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| EtlError::from_transport(stage, &e))?;

        let body: PublicDataResponse = resp.json().await.map_err(|e| {
            if e.is_decode() {
                EtlError::MalformedFeed(stage, e.to_string())
            } else {
                EtlError::from_transport(stage, &e)
            }
        })?;

        tracing::info!(dataset = dataset.id(), %day, count = body.result.records.len(), "Fetched SIMEM dataset");
        Ok(body.result.records)
    }
}
