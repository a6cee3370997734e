//! Read-only service SAS for a single blob.

use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

use backupstore_common::StoreError;

use crate::client::BlobServiceClient;
use crate::credential::{SharedKeyCredential, SERVICE_VERSION};

/// Longest lifetime handed out for a signed URL.
pub const MAX_SAS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// `st` is backdated by this many seconds so slightly skewed service clocks
/// accept a freshly minted URL.
const CLOCK_SKEW_ALLOWANCE_SECS: i64 = 300;

const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Fields of a blob service SAS that take part in the signature.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobSas {
    pub permissions: String,
    pub start: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    /// `/blob/<account>/<container>/<blob>`, blob name unencoded.
    pub canonical_resource: String,
    pub protocol: Option<String>,
    pub version: String,
}

impl BlobSas {
    /// Read permission on one blob, valid from `now` (minus clock skew
    /// allowance) until `now + ttl`.
    pub fn read(
        account: &str,
        container: &str,
        blob: &str,
        now: DateTime<Utc>,
        ttl: Duration,
        https_only: bool,
    ) -> Result<Self, StoreError> {
        validate_ttl(ttl)?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::InvalidArgument(format!("ttl: {}", e)))?;
        Ok(Self {
            permissions: "r".to_string(),
            start: now - chrono::Duration::seconds(CLOCK_SKEW_ALLOWANCE_SECS),
            expiry: now + ttl,
            canonical_resource: format!("/blob/{}/{}/{}", account, container, blob),
            protocol: https_only.then(|| "https".to_string()),
            version: SERVICE_VERSION.to_string(),
        })
    }

    /// Newline-joined fields in the order the service recomputes them.
    /// Unused optional fields (identifier, IP range, snapshot, encryption
    /// scope, response header overrides) are present but empty.
    pub fn string_to_sign(&self) -> String {
        let start = format_time(self.start);
        let expiry = format_time(self.expiry);
        [
            self.permissions.as_str(),
            start.as_str(),
            expiry.as_str(),
            self.canonical_resource.as_str(),
            "", // si
            "", // sip
            self.protocol.as_deref().unwrap_or(""),
            self.version.as_str(),
            "b", // sr
            "",  // snapshot time
            "",  // ses
            "",  // rscc
            "",  // rscd
            "",  // rsce
            "",  // rscl
            "",  // rsct
        ]
        .join("\n")
    }

    /// Query string carrying the SAS, signature included.
    pub fn to_query(&self, credential: &SharedKeyCredential) -> String {
        let signature = credential.signature(&self.string_to_sign());
        let mut params = vec![
            ("sv", self.version.clone()),
            ("st", format_time(self.start)),
            ("se", format_time(self.expiry)),
            ("sr", "b".to_string()),
            ("sp", self.permissions.clone()),
        ];
        if let Some(protocol) = &self.protocol {
            params.push(("spr", protocol.clone()));
        }
        params.push(("sig", signature));
        params
            .iter()
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Blob URL with a read SAS appended.
pub fn signed_blob_url(
    client: &BlobServiceClient,
    container: &str,
    blob: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<Url, StoreError> {
    let credential = client.credential();
    let https_only = client.endpoint().scheme() == "https";
    let sas = BlobSas::read(credential.account(), container, blob, now, ttl, https_only)?;

    let mut url = client.blob_url(container, blob)?;
    url.set_query(Some(&sas.to_query(credential)));
    Ok(url)
}

pub fn validate_ttl(ttl: Duration) -> Result<(), StoreError> {
    if ttl.is_zero() {
        Err(StoreError::InvalidArgument(
            "signed URL ttl must be greater than zero".to_string(),
        ))
    } else if ttl > MAX_SAS_TTL {
        Err(StoreError::InvalidArgument(format!(
            "signed URL ttl {:?} exceeds maximum {:?}",
            ttl, MAX_SAS_TTL
        )))
    } else {
        Ok(())
    }
}

pub fn format_time(at: DateTime<Utc>) -> String {
    at.format(SAS_TIME_FORMAT).to_string()
}

/// Inverse of [`format_time`].
pub fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
