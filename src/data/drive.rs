//! Google Drive access: the OAuth session and the file operations the
//! pipeline needs (list a folder, download a file, store a file).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EtlError, Stage};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Tokens are refreshed this long before their nominal expiry.
const REFRESH_MARGIN_SECS: i64 = 300;

/// File entry as listed by the storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Non-trashed files directly inside `folder_id`, in provider order.
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<StoredFile>, EtlError>;
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, EtlError>;
    async fn upload(&self, folder_id: &str, name: &str, bytes: Vec<u8>) -> Result<(), EtlError>;
}

/// Produces an authenticated [`FileStore`] for one run.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FileStore>, EtlError>;
}

// ── Session ──

/// Credentials file layout, compatible with the oauth2client JSON fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "token_expiry")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Session {
    Unauthenticated,
    Authenticated(StoredCredentials),
    Expired(StoredCredentials),
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl Session {
    pub fn from_credentials(creds: StoredCredentials, now: DateTime<Utc>) -> Self {
        if creds.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
            Session::Authenticated(creds)
        } else {
            Session::Expired(creds)
        }
    }

    /// Missing file means the operator never granted access.
    pub fn load(path: &Path, now: DateTime<Utc>) -> Result<Self, EtlError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Session::Unauthenticated),
            Err(e) => return Err(EtlError::AuthFailure(format!("reading {}: {e}", path.display()))),
        };
        let creds: StoredCredentials = serde_json::from_str(&raw)
            .map_err(|e| EtlError::AuthFailure(format!("parsing {}: {e}", path.display())))?;
        Ok(Self::from_credentials(creds, now))
    }

    pub fn persist(&self, path: &Path) -> Result<(), EtlError> {
        let creds = match self {
            Session::Unauthenticated => return Ok(()),
            Session::Authenticated(c) | Session::Expired(c) => c,
        };
        let raw = serde_json::to_string_pretty(creds).map_err(|e| EtlError::AuthFailure(e.to_string()))?;
        std::fs::write(path, raw)
            .map_err(|e| EtlError::AuthFailure(format!("writing {}: {e}", path.display())))
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        match self {
            Session::Unauthenticated => None,
            Session::Authenticated(c) | Session::Expired(c) => Some(c.expires_at),
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        match self {
            Session::Authenticated(c) => Some(&c.access_token),
            _ => None,
        }
    }

    /// Exchange the refresh token for a new access token. Only an expired
    /// session is refreshed; an authenticated one is returned unchanged.
    pub async fn refresh(self, http: &reqwest::Client, oauth: &OAuthClient) -> Result<Self, EtlError> {
        let creds = match self {
            Session::Unauthenticated => {
                return Err(EtlError::AuthFailure("no stored credentials to refresh".into()))
            }
            Session::Authenticated(c) => return Ok(Session::Authenticated(c)),
            Session::Expired(c) => c,
        };

        let params = [
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("refresh_token", creds.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let resp = http
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| EtlError::AuthFailure(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(EtlError::AuthFailure(format!("token endpoint returned {}", resp.status())));
        }
        let token: TokenResponse = resp.json().await.map_err(|e| EtlError::AuthFailure(e.to_string()))?;

        tracing::info!(expires_in = token.expires_in, "Drive access token refreshed");
        let now = Utc::now();
        Ok(Session::from_credentials(
            StoredCredentials {
                access_token: token.access_token,
                refresh_token: token.refresh_token.unwrap_or(creds.refresh_token),
                expires_at: now + Duration::seconds(token.expires_in),
            },
            now,
        ))
    }
}

// ── Drive client ──

pub struct DriveConnector {
    http: reqwest::Client,
    oauth: OAuthClient,
    credentials_path: PathBuf,
}

impl DriveConnector {
    pub fn new(http: reqwest::Client, oauth: OAuthClient, credentials_path: PathBuf) -> Self {
        Self { http, oauth, credentials_path }
    }
}

#[async_trait]
impl StoreConnector for DriveConnector {
    async fn connect(&self) -> Result<Box<dyn FileStore>, EtlError> {
        let session = match Session::load(&self.credentials_path, Utc::now())? {
            Session::Unauthenticated => {
                return Err(EtlError::AuthFailure(format!(
                    "no credentials at {}",
                    self.credentials_path.display()
                )))
            }
            expired @ Session::Expired(_) => {
                let refreshed = expired.refresh(&self.http, &self.oauth).await?;
                refreshed.persist(&self.credentials_path)?;
                refreshed
            }
            authenticated => authenticated,
        };
        tracing::info!(expires_at = ?session.expiry(), "Drive session ready");
        let token = session
            .access_token()
            .ok_or_else(|| EtlError::AuthFailure("session did not authenticate".into()))?
            .to_string();
        Ok(Box::new(DriveClient { http: self.http.clone(), token }))
    }
}

pub struct DriveClient {
    http: reqwest::Client,
    token: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<StoredFile>,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

impl DriveClient {
    async fn checked(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, EtlError> {
        let resp = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| EtlError::from_transport(Stage::Drive, &e))?;
        match resp.status() {
            s if s.is_success() => Ok(resp),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(EtlError::AuthFailure(format!("drive returned {}", resp.status())))
            }
            s => {
                tracing::error!(status = %s, "Drive request failed");
                Err(EtlError::NetworkError(Stage::Drive))
            }
        }
    }
}

#[async_trait]
impl FileStore for DriveClient {
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<StoredFile>, EtlError> {
        let query = format!("'{folder_id}' in parents and trashed=false");
        let req = self
            .http
            .get(format!("{API_BASE}/files"))
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")]);
        let list: FileList = self
            .checked(req)
            .await?
            .json()
            .await
            .map_err(|e| EtlError::from_transport(Stage::Drive, &e))?;
        Ok(list.files)
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, EtlError> {
        let req = self.http.get(format!("{API_BASE}/files/{file_id}")).query(&[("alt", "media")]);
        let bytes = self
            .checked(req)
            .await?
            .bytes()
            .await
            .map_err(|e| EtlError::from_transport(Stage::Drive, &e))?;
        Ok(bytes.to_vec())
    }

    /// Create the file directly inside `folder_id`, then fill in its content.
    async fn upload(&self, folder_id: &str, name: &str, bytes: Vec<u8>) -> Result<(), EtlError> {
        let to_upload_err = |e: EtlError| EtlError::DriveUploadFailure(e.to_string());

        let req = self
            .http
            .post(format!("{API_BASE}/files"))
            .query(&[("fields", "id")])
            .json(&file_metadata(folder_id, name));
        let created: CreatedFile = self
            .checked(req)
            .await
            .map_err(to_upload_err)?
            .json()
            .await
            .map_err(|e| EtlError::DriveUploadFailure(e.to_string()))?;

        let req = self
            .http
            .patch(format!("{UPLOAD_BASE}/files/{}", created.id))
            .query(&MEDIA_UPLOAD)
            .header(reqwest::header::CONTENT_TYPE, XLSX_MIME)
            .body(bytes);
        self.checked(req).await.map_err(to_upload_err)?;

        tracing::info!(file_id = %created.id, %name, "Report stored in Drive");
        Ok(())
    }
}

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const MEDIA_UPLOAD: [(&str, &str); 1] = [("uploadType", "media")];

/// Metadata of a new file whose single parent is `folder_id`.
fn file_metadata(folder_id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "parents": [folder_id],
        "mimeType": XLSX_MIME,
    })
}
