//! XML bodies exchanged with the Blob service.

use serde::{Deserialize, Serialize};

use backupstore_common::StoreError;

/// One page of a List Blobs response.
#[derive(Debug, Deserialize)]
pub struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    blobs: Blobs,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Blobs {
    #[serde(rename = "$value", default)]
    items: Vec<BlobItem>,
}

/// Flat listings only contain `Blob`; hierarchical ones interleave
/// `BlobPrefix` entries for each virtual directory.
#[derive(Debug, Deserialize)]
enum BlobItem {
    Blob(NamedEntry),
    BlobPrefix(NamedEntry),
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    #[serde(rename = "Name")]
    name: String,
}

impl EnumerationResults {
    pub fn parse(body: &str) -> Result<Self, StoreError> {
        quick_xml::de::from_str(strip_bom(body))
            .map_err(|e| StoreError::MalformedResponse(format!("List Blobs: {}", e)))
    }

    pub fn blob_names(&self) -> impl Iterator<Item = &str> {
        self.blobs.items.iter().filter_map(|item| match item {
            BlobItem::Blob(entry) => Some(entry.name.as_str()),
            BlobItem::BlobPrefix(_) => None,
        })
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.blobs.items.iter().filter_map(|item| match item {
            BlobItem::BlobPrefix(entry) => Some(entry.name.as_str()),
            BlobItem::Blob(_) => None,
        })
    }

    /// Continuation marker, or `None` once the listing is exhausted.
    pub fn next_marker(&self) -> Option<&str> {
        self.next_marker
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

/// Body of a non-2xx response. Either field may be missing.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "Code", default)]
    pub code: Option<String>,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn parse(body: &str) -> Option<Self> {
        let body = strip_bom(body).trim();
        if body.is_empty() {
            return None;
        }
        quick_xml::de::from_str(body).ok()
    }
}

#[derive(Serialize)]
#[serde(rename = "BlockList")]
struct BlockList<'a> {
    #[serde(rename = "Latest")]
    latest: &'a [String],
}

/// Put Block List body committing `block_ids` in order.
pub fn block_list_body(block_ids: &[String]) -> Result<String, StoreError> {
    let xml = quick_xml::se::to_string(&BlockList { latest: block_ids })
        .map_err(|e| StoreError::InvalidArgument(format!("block list: {}", e)))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>{}", xml))
}

fn strip_bom(body: &str) -> &str {
    body.trim_start_matches('\u{feff}')
}
