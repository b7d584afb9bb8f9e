//! Service SAS tokens for blob and container resources.

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::StorageError;

pub const SAS_VERSION: &str = "2020-12-06";

const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasResource {
    Blob,
    Container,
}

impl SasResource {
    fn code(self) -> &'static str {
        match self {
            SasResource::Blob => "b",
            SasResource::Container => "c",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SasPermissions {
    pub read: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl SasPermissions {
    pub fn read() -> Self {
        Self { read: true, ..Self::default() }
    }

    pub fn upload() -> Self {
        Self { create: true, write: true, ..Self::default() }
    }

    pub fn delete() -> Self {
        Self { delete: true, ..Self::default() }
    }

    pub fn list() -> Self {
        Self { list: true, ..Self::default() }
    }

    /// Letters in the order the service expects (`rcwdl`).
    pub fn letters(&self) -> String {
        [
            (self.read, 'r'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.list, 'l'),
        ]
        .iter()
        .filter(|(granted, _)| *granted)
        .map(|(_, letter)| *letter)
        .collect()
    }
}

/// Everything that goes into one token.
#[derive(Debug, Clone)]
pub struct SasRequest<'a> {
    pub account: &'a str,
    pub container: &'a str,
    /// `None` for container-level tokens
    pub blob: Option<&'a str>,
    pub permissions: SasPermissions,
    pub start: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

impl SasRequest<'_> {
    pub fn resource(&self) -> SasResource {
        if self.blob.is_some() {
            SasResource::Blob
        } else {
            SasResource::Container
        }
    }

    fn canonicalized_resource(&self) -> String {
        match self.blob {
            Some(blob) => format!("/blob/{}/{}/{}", self.account, self.container, blob),
            None => format!("/blob/{}/{}", self.account, self.container),
        }
    }
}

/// Newline-joined fields for a 2020-12-06 service SAS. Unused fields stay empty.
pub fn string_to_sign(req: &SasRequest<'_>) -> String {
    let permissions = req.permissions.letters();
    let start = req.start.format(SAS_TIME_FORMAT).to_string();
    let expiry = req.expiry.format(SAS_TIME_FORMAT).to_string();
    let resource = req.canonicalized_resource();

    [
        permissions.as_str(),
        start.as_str(),
        expiry.as_str(),
        resource.as_str(),
        "", // signed identifier
        "", // ip
        "", // protocol
        SAS_VERSION,
        req.resource().code(),
        "", // snapshot time
        "", // encryption scope
        "", // rscc
        "", // rscd
        "", // rsce
        "", // rscl
        "", // rsct
    ]
    .join("\n")
}

/// base64(HMAC-SHA256(key, string_to_sign))
pub fn sign(key: &[u8], string_to_sign: &str) -> Result<String, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::Key(format!("failed to create HMAC: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Query string (without the leading `?`) carrying a signed token.
pub fn token(req: &SasRequest<'_>, key: &[u8]) -> Result<String, StorageError> {
    let signature = sign(key, &string_to_sign(req))?;
    let start = req.start.format(SAS_TIME_FORMAT).to_string();
    let expiry = req.expiry.format(SAS_TIME_FORMAT).to_string();

    Ok(format!(
        "sv={}&st={}&se={}&sr={}&sp={}&sig={}",
        SAS_VERSION,
        urlencoding::encode(&start),
        urlencoding::encode(&expiry),
        req.resource().code(),
        req.permissions.letters(),
        urlencoding::encode(&signature),
    ))
}
