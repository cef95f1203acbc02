use anyhow::{Context, Result};
use std::path::PathBuf;

pub struct Config {
    pub teloxide_token: String,
    pub operator_chat_id: i64,
    pub extraction_folder_id: String,
    pub upload_folder_id: String,
    pub fastupload_key_1: String,
    pub fastupload_key_2: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub credentials_path: PathBuf,
    pub report_dir: PathBuf,
    pub simem_base_url: String,
    pub fastupload_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            teloxide_token: required("TELOXIDE_TOKEN")?,
            operator_chat_id: required("OPERATOR_CHAT_ID")?
                .parse()
                .context("OPERATOR_CHAT_ID must be a numeric chat id")?,
            extraction_folder_id: required("EXTRACTION_FOLDER_ID")?,
            upload_folder_id: required("UPLOAD_FOLDER_ID")?,
            fastupload_key_1: required("KEY_1")?,
            fastupload_key_2: required("KEY_2")?,
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            google_client_secret: required("GOOGLE_CLIENT_SECRET")?,
            credentials_path: std::env::var("CREDENTIALS_PATH")
                .unwrap_or_else(|_| "./credential_module.json".into())
                .into(),
            report_dir: std::env::var("REPORT_DIR")
                .unwrap_or_else(|_| "./reports".into())
                .into(),
            simem_base_url: std::env::var("SIMEM_BASE_URL")
                .unwrap_or_else(|_| "https://www.simem.co/backend-files/api".into()),
            fastupload_base_url: std::env::var("FASTUPLOAD_BASE_URL")
                .unwrap_or_else(|_| "https://api.fastupload.io/api/v2".into()),
        })
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} not set"))
}
