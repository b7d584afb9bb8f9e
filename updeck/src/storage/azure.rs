use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Response};
use tracing::debug;

use common::StorageConfig;

use super::sas::{self, SasPermissions, SasRequest, SAS_VERSION};
use super::{BlobStore, StorageError};

const REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PROTOCOL: &str = "https";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
/// Lifetime of the tokens used for our own upload/list/delete calls.
const OPERATION_TOKEN_MINUTES: i64 = 15;

/// Fields of a storage account connection string. Keys are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub protocol: Option<String>,
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub endpoint_suffix: Option<String>,
    pub blob_endpoint: Option<String>,
}

impl ConnectionInfo {
    pub fn parse(connection_string: &str) -> Result<Self, StorageError> {
        let mut info = Self::default();

        let segments = connection_string.split(';').map(str::trim).filter(|p| !p.is_empty());
        for (index, pair) in segments.enumerate() {
            // report the position only, segments may hold the key
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                StorageError::Config(format!("connection string segment {} has no '='", index + 1))
            })?;
            let value = Some(value.trim().to_string());

            match key.trim().to_ascii_lowercase().as_str() {
                "defaultendpointsprotocol" => info.protocol = value,
                "accountname" => info.account_name = value,
                "accountkey" => info.account_key = value,
                "endpointsuffix" => info.endpoint_suffix = value,
                "blobendpoint" => info.blob_endpoint = value,
                _ => {}
            }
        }

        Ok(info)
    }

    /// `BlobEndpoint` when given, otherwise `{protocol}://{account}.blob.{suffix}`.
    pub fn endpoint_for(&self, account: &str) -> String {
        match &self.blob_endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!(
                "{}://{}.blob.{}",
                self.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL),
                account,
                self.endpoint_suffix.as_deref().unwrap_or(DEFAULT_ENDPOINT_SUFFIX)
            ),
        }
    }
}

/// Blob container reached over the REST API with service SAS tokens.
pub struct AzureBlobStore {
    client: Client,
    endpoint: String,
    account: String,
    key: Vec<u8>,
    container: String,
}

impl AzureBlobStore {
    /// `account_key` is the base64 key as shown in the portal.
    pub fn new(
        endpoint: impl Into<String>,
        account: impl Into<String>,
        account_key: &str,
        container: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let key = base64::engine::general_purpose::STANDARD
            .decode(account_key.trim())
            .map_err(|e| StorageError::Key(format!("account key is not valid base64: {}", e)))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            account: account.into(),
            key,
            container: container.into(),
        })
    }

    /// Resolves endpoint and credentials from the connection string, letting the explicit
    /// account name and key settings win.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let info = match config.resolve_connection_string() {
            Some(cs) => ConnectionInfo::parse(&cs)?,
            None => ConnectionInfo::default(),
        };

        let account = config
            .account_name
            .clone()
            .or_else(|| info.account_name.clone())
            .ok_or_else(|| StorageError::Config("no storage account name configured".into()))?;

        let explicit_key = config
            .resolve_account_key()
            .map_err(|e| StorageError::Config(e.to_string()))?;
        let key = explicit_key
            .or_else(|| info.account_key.clone())
            .ok_or_else(|| StorageError::Config("no storage account key configured".into()))?;

        let endpoint = info.endpoint_for(&account);
        Self::new(endpoint, account, &key, config.container.clone())
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.container)
    }

    fn blob_url(&self, name: &str) -> String {
        let path: Vec<String> = name
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.container_url(), path.join("/"))
    }

    fn token(
        &self,
        blob: Option<&str>,
        permissions: SasPermissions,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let req = SasRequest {
            account: &self.account,
            container: &self.container,
            blob,
            permissions,
            start,
            expiry,
        };
        sas::token(&req, &self.key)
    }

    fn operation_token(&self, blob: Option<&str>, permissions: SasPermissions) -> Result<String, StorageError> {
        let now = Utc::now();
        // allow for clock skew against the service
        let start = now - Duration::minutes(5);
        self.token(blob, permissions, start, now + Duration::minutes(OPERATION_TOKEN_MINUTES))
    }
}

async fn checked(response: Response, operation: &'static str) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Status {
        operation,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let token = self.operation_token(Some(name), SasPermissions::upload())?;
        let url = format!("{}?{}", self.blob_url(name), token);

        let response = self
            .client
            .put(&url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", SAS_VERSION)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        checked(response, "upload").await?;

        debug!(blob = %name, container = %self.container, "blob written");
        Ok(())
    }

    fn signed_read_url(
        &self,
        name: &str,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let token = self.token(Some(name), SasPermissions::read(), start, expiry)?;
        Ok(format!("{}?{}", self.blob_url(name), token))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let token = self.operation_token(None, SasPermissions::list())?;
            let mut url = format!(
                "{}?restype=container&comp=list&prefix={}&{}",
                self.container_url(),
                urlencoding::encode(prefix),
                token
            );
            if let Some(m) = &marker {
                url.push_str("&marker=");
                url.push_str(&urlencoding::encode(m));
            }

            let response = self
                .client
                .get(&url)
                .header("x-ms-version", SAS_VERSION)
                .send()
                .await?;
            let body = checked(response, "list").await?.text().await?;

            let page = parse_listing(&body)?;
            debug!(prefix = %prefix, page_size = page.names.len(), "blob listing page");
            names.extend(page.names);

            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let token = self.operation_token(Some(name), SasPermissions::delete())?;
        let url = format!("{}?{}", self.blob_url(name), token);

        let response = self
            .client
            .delete(&url)
            .header("x-ms-version", SAS_VERSION)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(name.to_string()));
        }
        checked(response, "delete").await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("azure ({})", self.container_url())
    }
}

/// One page of a List Blobs response.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub names: Vec<String>,
    /// `None` on the last page
    pub next_marker: Option<String>,
}

#[derive(Clone, Copy)]
enum ListingField {
    BlobName,
    NextMarker,
}

pub fn parse_listing(xml: &str) -> Result<ListingPage, StorageError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut page = ListingPage::default();
    let mut in_blob = false;
    let mut field: Option<ListingField> = None;
    let mut text = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| StorageError::Listing(e.to_string()))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Blob" => in_blob = true,
                b"Name" if in_blob => {
                    field = Some(ListingField::BlobName);
                    text.clear();
                }
                b"NextMarker" => {
                    field = Some(ListingField::NextMarker);
                    text.clear();
                }
                _ => {}
            },
            Event::Text(t) if field.is_some() => {
                let unescaped = t.unescape().map_err(|e| StorageError::Listing(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::End(e) => match (e.local_name().as_ref(), field) {
                (b"Blob", _) => in_blob = false,
                (b"Name", Some(ListingField::BlobName)) => {
                    page.names.push(std::mem::take(&mut text));
                    field = None;
                }
                (b"NextMarker", Some(ListingField::NextMarker)) => {
                    let marker = std::mem::take(&mut text);
                    page.next_marker = (!marker.is_empty()).then_some(marker);
                    field = None;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(page)
}
