use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{EtlError, Stage};

#[async_trait]
pub trait ReportUploader: Send + Sync {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<(), EtlError>;
}

/// FastUpload answers every call with the same envelope.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "_status")]
    status: String,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn is_success(&self) -> bool {
        self.status == "success"
    }
}

struct AccountToken {
    access_token: String,
    account_id: String,
}

pub struct FastUploadClient {
    client: reqwest::Client,
    base_url: String,
    key_1: String,
    key_2: String,
}

impl FastUploadClient {
    pub fn new(client: reqwest::Client, base_url: &str, key_1: String, key_2: String) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string(), key_1, key_2 }
    }

    async fn authorize(&self) -> Result<AccountToken, EtlError> {
        let envelope: Envelope = self
            .client
            .post(format!("{}/authorize", self.base_url))
            .form(&[("key1", self.key_1.as_str()), ("key2", self.key_2.as_str())])
            .send()
            .await
            .map_err(|e| EtlError::from_transport(Stage::UploadAuth, &e))?
            .json()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Unreadable FastUpload authorize response");
                EtlError::UploadAuthFailure
            })?;

        if !envelope.is_success() {
            tracing::error!(status = %envelope.status, "FastUpload rejected the account keys");
            return Err(EtlError::UploadAuthFailure);
        }
        parse_account(&envelope.data).ok_or(EtlError::UploadAuthFailure)
    }
}

/// `account_id` comes back as a number or a string depending on the account.
fn parse_account(data: &Value) -> Option<AccountToken> {
    let access_token = data.get("access_token")?.as_str()?.to_string();
    let account_id = match data.get("account_id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(AccountToken { access_token, account_id })
}

#[async_trait]
impl ReportUploader for FastUploadClient {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<(), EtlError> {
        let account = self.authorize().await?;

        let form = Form::new()
            .text("access_token", account.access_token)
            .text("account_id", account.account_id)
            .part("upload_file", Part::bytes(bytes).file_name(file_name.to_string()));

        let envelope: Envelope = self
            .client
            .post(format!("{}/file/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| EtlError::from_transport(Stage::Upload, &e))?
            .json()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Unreadable FastUpload upload response");
                EtlError::UploadFailure
            })?;

        if !envelope.is_success() {
            tracing::error!(status = %envelope.status, "FastUpload rejected the report");
            return Err(EtlError::UploadFailure);
        }
        tracing::info!(%file_name, "Report uploaded to FastUpload");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn account_id_accepts_number_or_string() {
        let a = parse_account(&json!({"access_token": "tok", "account_id": 42})).unwrap();
        assert_eq!(a.account_id, "42");
        let b = parse_account(&json!({"access_token": "tok", "account_id": "42"})).unwrap();
        assert_eq!(b.account_id, "42");
        assert_eq!(b.access_token, "tok");
    }

    #[test]
    fn incomplete_account_data_is_rejected() {
        assert!(parse_account(&json!({"account_id": 1})).is_none());
        assert!(parse_account(&Value::Null).is_none());
    }

    #[test]
    fn only_literal_success_counts() {
        let ok: Envelope = serde_json::from_str(r#"{"_status":"success","data":{}}"#).unwrap();
        let err: Envelope = serde_json::from_str(r#"{"_status":"error","response":"bad keys"}"#).unwrap();
        assert!(ok.is_success());
        assert!(!err.is_success());
    }
}
