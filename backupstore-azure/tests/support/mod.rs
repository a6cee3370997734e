//! In-process stand-in for the Blob service.
//!
//! Implements the handful of REST calls the adapter makes, checks every
//! Shared Key or SAS signature against the configured account key, and pages
//! listings with a small page size so pagination is always exercised.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use url::Url;

use backupstore_azure::credential::{string_to_sign, SharedKeyCredential};
use backupstore_azure::sas::{parse_time, BlobSas};
use backupstore_common::ConfigMap;

pub const ACCOUNT: &str = "acct1";
pub const ACCOUNT_KEY: &str = "base64secret";
pub const KEY_ENV_VAR: &str = "KEY";

#[derive(Default)]
struct Container {
    blobs: BTreeMap<String, Bytes>,
    staged: HashMap<String, HashMap<String, Bytes>>,
}

pub struct ServiceState {
    credential: SharedKeyCredential,
    page_size: usize,
    containers: Mutex<BTreeMap<String, Container>>,
    calls: Mutex<Vec<&'static str>>,
    failing_marker: Mutex<Option<String>>,
}

pub struct FakeBlobService {
    addr: SocketAddr,
    state: Arc<ServiceState>,
}

impl FakeBlobService {
    pub async fn start(containers: &[&str], page_size: usize) -> Self {
        let state = Arc::new(ServiceState {
            credential: SharedKeyCredential::new(ACCOUNT, ACCOUNT_KEY).unwrap(),
            page_size,
            containers: Mutex::new(
                containers
                    .iter()
                    .map(|name| (name.to_string(), Container::default()))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
            failing_marker: Mutex::new(None),
        });

        let app = Router::new()
            .route("/{container}", any(container_op))
            .route("/{container}/{*blob}", any(blob_op))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Adapter config pointing at this service.
    pub fn config(&self) -> ConfigMap {
        [
            ("storage-account", ACCOUNT.to_string()),
            ("storage-account-key-env-var", KEY_ENV_VAR.to_string()),
            ("subscription-id", "sub1".to_string()),
            ("resource-group", "rg1".to_string()),
            ("storage-account-uri", self.endpoint()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    pub fn stored(&self, container: &str, blob: &str) -> Option<Bytes> {
        let containers = self.state.containers.lock().unwrap();
        containers.get(container)?.blobs.get(blob).cloned()
    }

    /// Answer the List Blobs request carrying `marker` with a 500.
    /// Markers are `page-<n>`, `n` being the index of the page's first entry.
    pub fn fail_listing_at(&self, marker: &str) {
        *self.state.failing_marker.lock().unwrap() = Some(marker.to_string());
    }

    /// Number of calls of one kind, e.g. `"PutBlock"` or `"ListBlobs"`.
    pub fn calls(&self, kind: &str) -> usize {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == kind)
            .count()
    }
}

fn record(state: &ServiceState, kind: &'static str) {
    state.calls.lock().unwrap().push(kind);
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = format!(
        "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>{}</Code><Message>{}</Message></Error>",
        code, message
    );
    Response::builder()
        .status(status)
        .header("x-ms-error-code", code)
        .header(header::CONTENT_TYPE, "application/xml")
        .body(Body::from(body))
        .unwrap()
}

fn auth_failed(message: &str) -> Response {
    error_response(StatusCode::FORBIDDEN, "AuthenticationFailed", message)
}

/// Accept either a valid Shared Key header or a valid read SAS.
fn authorize(
    state: &ServiceState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    canonical_blob: Option<&str>,
) -> Result<(), Response> {
    let url = Url::parse(&format!("http://fake{}", uri)).unwrap();
    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if let Some(sig) = query.get("sig") {
        let Some(resource) = canonical_blob else {
            return Err(auth_failed("SAS is only valid for blobs"));
        };
        if *method != Method::GET && *method != Method::HEAD {
            return Err(auth_failed("SAS grants read access only"));
        }
        let field = |name: &str| query.get(name).cloned().unwrap_or_default();
        let (Some(start), Some(expiry)) = (parse_time(&field("st")), parse_time(&field("se")))
        else {
            return Err(auth_failed("bad SAS times"));
        };
        let sas = BlobSas {
            permissions: field("sp"),
            start,
            expiry,
            canonical_resource: resource.to_string(),
            protocol: query.get("spr").cloned(),
            version: field("sv"),
        };
        if state.credential.signature(&sas.string_to_sign()) != *sig {
            return Err(auth_failed("SAS signature mismatch"));
        }
        let now = Utc::now();
        if now < start || now > expiry || !sas.permissions.contains('r') {
            return Err(auth_failed("SAS not valid now"));
        }
        return Ok(());
    }

    if !headers.contains_key("x-ms-date") || !headers.contains_key("x-ms-version") {
        return Err(auth_failed("missing x-ms-date or x-ms-version"));
    }
    let expected = format!(
        "SharedKey {}:{}",
        ACCOUNT,
        state
            .credential
            .signature(&string_to_sign(ACCOUNT, method, &url, headers))
    );
    let actual = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if actual != expected {
        return Err(auth_failed("Shared Key signature mismatch"));
    }
    Ok(())
}

#[derive(Deserialize)]
struct BlockListIn {
    #[serde(rename = "Latest", default)]
    latest: Vec<String>,
}

async fn blob_op(
    State(state): State<Arc<ServiceState>>,
    Path((container, blob)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let canonical = format!("/blob/{}/{}/{}", ACCOUNT, container, blob);
    if let Err(resp) = authorize(&state, &method, &uri, &headers, Some(&canonical)) {
        return resp;
    }

    let query: HashMap<String, String> = Url::parse(&format!("http://fake{}", uri))
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect();

    let mut containers = state.containers.lock().unwrap();
    let Some(c) = containers.get_mut(&container) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "ContainerNotFound",
            "The specified container does not exist.",
        );
    };

    let not_found = || {
        error_response(
            StatusCode::NOT_FOUND,
            "BlobNotFound",
            "The specified blob does not exist.",
        )
    };

    match (method, query.get("comp").map(String::as_str)) {
        (Method::PUT, None) => {
            record(&state, "PutBlob");
            if headers.get("x-ms-blob-type").and_then(|v| v.to_str().ok()) != Some("BlockBlob") {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "MissingRequiredHeader",
                    "x-ms-blob-type",
                );
            }
            c.blobs.insert(blob, body);
            StatusCode::CREATED.into_response()
        }
        (Method::PUT, Some("block")) => {
            record(&state, "PutBlock");
            let Some(id) = query.get("blockid") else {
                return error_response(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue", "blockid");
            };
            c.staged.entry(blob).or_default().insert(id.clone(), body);
            StatusCode::CREATED.into_response()
        }
        (Method::PUT, Some("blocklist")) => {
            record(&state, "PutBlockList");
            let xml = String::from_utf8_lossy(&body);
            let list: BlockListIn = match quick_xml::de::from_str(&xml) {
                Ok(list) => list,
                Err(_) => {
                    return error_response(StatusCode::BAD_REQUEST, "InvalidXmlDocument", "block list")
                }
            };
            let staged = c.staged.remove(&blob).unwrap_or_default();
            let mut content = Vec::new();
            for id in &list.latest {
                match staged.get(id) {
                    Some(block) => content.extend_from_slice(block),
                    None => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            "InvalidBlockList",
                            "The specified block list is invalid.",
                        )
                    }
                }
            }
            c.blobs.insert(blob, Bytes::from(content));
            StatusCode::CREATED.into_response()
        }
        (Method::HEAD, None) => {
            record(&state, "GetBlobProperties");
            match c.blobs.get(&blob) {
                Some(data) => Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_LENGTH, data.len().to_string())
                    .body(Body::empty())
                    .unwrap(),
                None => not_found(),
            }
        }
        (Method::GET, None) => {
            record(&state, "GetBlob");
            match c.blobs.get(&blob) {
                Some(data) => Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_LENGTH, data.len().to_string())
                    .body(Body::from(data.clone()))
                    .unwrap(),
                None => not_found(),
            }
        }
        (Method::DELETE, None) => {
            record(&state, "DeleteBlob");
            if headers.get("x-ms-delete-snapshots").and_then(|v| v.to_str().ok()) != Some("include")
            {
                return error_response(StatusCode::CONFLICT, "SnapshotsPresent", "snapshots");
            }
            match c.blobs.remove(&blob) {
                Some(_) => StatusCode::ACCEPTED.into_response(),
                None => not_found(),
            }
        }
        _ => error_response(
            StatusCode::BAD_REQUEST,
            "UnsupportedHttpVerb",
            "The resource doesn't support the specified HTTP verb.",
        ),
    }
}

enum Entry {
    Blob(String),
    Prefix(String),
}

async fn container_op(
    State(state): State<Arc<ServiceState>>,
    Path(container): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &method, &uri, &headers, None) {
        return resp;
    }
    let query: HashMap<String, String> = Url::parse(&format!("http://fake{}", uri))
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect();
    let is_list = method == Method::GET
        && query.get("restype").map(String::as_str) == Some("container")
        && query.get("comp").map(String::as_str) == Some("list");
    if !is_list {
        return error_response(StatusCode::BAD_REQUEST, "UnsupportedQueryParameter", "comp");
    }
    record(&state, "ListBlobs");

    let failing = state.failing_marker.lock().unwrap().clone();
    if failing.is_some() && query.get("marker") == failing.as_ref() {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalError",
            "The server encountered an internal error.",
        );
    }

    let containers = state.containers.lock().unwrap();
    let Some(c) = containers.get(&container) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "ContainerNotFound",
            "The specified container does not exist.",
        );
    };

    let prefix = query.get("prefix").cloned().unwrap_or_default();
    let delimiter = query.get("delimiter").cloned().filter(|d| !d.is_empty());

    let mut entries: Vec<Entry> = Vec::new();
    for name in c.blobs.keys().filter(|n| n.starts_with(&prefix)) {
        let rest = &name[prefix.len()..];
        match delimiter.as_deref().and_then(|d| rest.find(d).map(|i| i + d.len())) {
            Some(end) => {
                let group = name[..prefix.len() + end].to_string();
                let duplicate = matches!(entries.last(), Some(Entry::Prefix(last)) if *last == group);
                if !duplicate {
                    entries.push(Entry::Prefix(group));
                }
            }
            None => entries.push(Entry::Blob(name.clone())),
        }
    }

    let start: usize = query
        .get("marker")
        .and_then(|m| m.strip_prefix("page-"))
        .and_then(|m| m.parse().ok())
        .unwrap_or(0);
    let end = (start + state.page_size).min(entries.len());
    let next_marker = if end < entries.len() {
        format!("page-{}", end)
    } else {
        String::new()
    };

    let mut xml = String::from("\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>");
    xml.push_str(&format!(
        "<EnumerationResults ServiceEndpoint=\"http://fake/\" ContainerName=\"{}\">",
        container
    ));
    xml.push_str(&format!("<Prefix>{}</Prefix><Blobs>", escape(&prefix)));
    for entry in entries.get(start..end).unwrap_or(&[]) {
        match entry {
            Entry::Blob(name) => xml.push_str(&format!(
                "<Blob><Name>{}</Name><Properties><BlobType>BlockBlob</BlobType></Properties></Blob>",
                escape(name)
            )),
            Entry::Prefix(name) => {
                xml.push_str(&format!("<BlobPrefix><Name>{}</Name></BlobPrefix>", escape(name)))
            }
        }
    }
    xml.push_str(&format!(
        "</Blobs><NextMarker>{}</NextMarker></EnumerationResults>",
        next_marker
    ));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/xml")
        .body(Body::from(xml))
        .unwrap()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
