//! Shared Key request signing for the Blob service.
//!
//! Every request carries `x-ms-date` and `x-ms-version`; the signature is an
//! HMAC-SHA256 over a canonical rendering of the verb, a fixed list of
//! standard headers, the `x-ms-*` headers and the resource, keyed with the
//! decoded storage account key.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request};
use sha2::Sha256;
use url::Url;

use backupstore_common::ConfigError;

type HmacSha256 = Hmac<Sha256>;

pub const X_MS_DATE: &str = "x-ms-date";
pub const X_MS_VERSION: &str = "x-ms-version";

/// REST API version sent with every request and embedded in SAS tokens.
pub const SERVICE_VERSION: &str = "2021-08-06";

/// Standard headers that take part in the signature, in signing order.
/// Content-Length is handled separately since a zero length signs as empty.
const SIGNED_HEADERS_BEFORE_LENGTH: [&str; 2] = ["content-encoding", "content-language"];
const SIGNED_HEADERS_AFTER_LENGTH: [&str; 8] = [
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Storage account name plus its decoded access key.
#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: Vec<u8>,
}

impl fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl SharedKeyCredential {
    /// `key` is the base64 access key as shown in the portal.
    pub fn new(account: &str, key: &str) -> Result<Self, ConfigError> {
        let key = STANDARD
            .decode(key.trim())
            .map_err(|e| ConfigError::InvalidAccountKey(e.to_string()))?;
        if key.is_empty() {
            return Err(ConfigError::InvalidAccountKey("key is empty".to_string()));
        }
        Ok(Self {
            account: account.to_string(),
            key,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Base64 HMAC-SHA256 of `string_to_sign` under the account key.
    pub fn signature(&self, string_to_sign: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(string_to_sign.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Add the `Authorization` header to a fully built request.
    pub fn sign(&self, request: &mut Request) {
        let string_to_sign =
            string_to_sign(&self.account, request.method(), request.url(), request.headers());
        let value = format!("SharedKey {}:{}", self.account, self.signature(&string_to_sign));
        let value = HeaderValue::from_str(&value).expect("base64 signature is a valid header value");
        request.headers_mut().insert(AUTHORIZATION, value);
    }
}

/// Canonical string a Shared Key signature covers.
pub fn string_to_sign(account: &str, method: &Method, url: &Url, headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or("")
    };

    let mut out = String::new();
    out.push_str(method.as_str());
    out.push('\n');
    for name in SIGNED_HEADERS_BEFORE_LENGTH {
        out.push_str(header(name));
        out.push('\n');
    }
    match header("content-length") {
        "0" => {}
        len => out.push_str(len),
    }
    out.push('\n');
    for name in SIGNED_HEADERS_AFTER_LENGTH {
        out.push_str(header(name));
        out.push('\n');
    }
    out.push_str(&canonicalized_headers(headers));
    out.push_str(&canonicalized_resource(account, url));
    out
}

fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms_headers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if !name.starts_with("x-ms-") {
            continue;
        }
        if let Ok(value) = value.to_str() {
            ms_headers.entry(name).or_default().push(value.trim());
        }
    }
    ms_headers
        .into_iter()
        .map(|(name, values)| format!("{}:{}\n", name, values.join(",")))
        .collect()
}

fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&name);
        resource.push(':');
        resource.push_str(&values.join(","));
    }
    resource
}
