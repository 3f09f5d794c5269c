//! Version manifest parsing.
//!
//! Vendor manifests look like
//!
//! ```json
//! {"Releases": [{"Version": "2.1.0", "File": {"Url": "https://..."}}, ...]}
//! ```
//!
//! but are not consistent about the shape of `"File"`: some publish a single
//! object, others a list whose first element carries the URL. The shape is
//! normalized into a [`FileRef`] in one place, [`file_ref`].

use feedwatch_types::{CanonicalRecord, FileRef, Scalar, VERSION_FIELD};
use serde::Deserialize;
use serde_json::Value;

use crate::AdapterError;

pub const RELEASES_FIELD: &str = "Releases";
pub const FILE_FIELD: &str = "File";

/// Copy the requested scalar fields out of a JSON value.
///
/// A non-empty array is replaced by its first element (recursively), a
/// mapping yields the requested fields it contains, anything else yields
/// `None`.
pub fn select_fields(value: &Value, fields: &[&str]) -> Option<CanonicalRecord> {
    match value {
        Value::Array(items) => items.first().and_then(|first| select_fields(first, fields)),
        Value::Object(map) => {
            let mut record = CanonicalRecord::new();
            for field in fields {
                if let Some(scalar) = map.get(*field).and_then(to_scalar) {
                    record.fields.insert((*field).to_string(), scalar);
                }
            }
            Some(record)
        }
        _ => None,
    }
}

fn to_scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(Scalar::Integer)
            .or_else(|| n.as_f64().map(Scalar::Float)),
        Value::String(s) => Some(Scalar::Text(s.clone())),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFile {
    Listed(Vec<RawFileEntry>),
    Single(RawFileEntry),
}

#[derive(Deserialize)]
struct RawFileEntry {
    #[serde(rename = "Url", default)]
    url: Option<String>,
}

/// Normalize a release's `"File"` entry.
///
/// Returns `None` when the release has no `"File"` or it has neither
/// supported shape.
pub fn file_ref(release: &Value) -> Option<FileRef> {
    let raw = RawFile::deserialize(release.get(FILE_FIELD)?).ok()?;
    match raw {
        RawFile::Single(entry) => entry.url.map(FileRef::Single),
        RawFile::Listed(entries) => Some(FileRef::Listed(
            entries.into_iter().filter_map(|e| e.url).collect(),
        )),
    }
}

/// Extract the canonical record from a parsed manifest.
///
/// The first release (in document order) that has a `"Version"` field is
/// used. `Ok(None)` means the manifest lists no such release.
pub fn extract_record(
    document: &Value,
    fields: &[&str],
) -> Result<Option<CanonicalRecord>, AdapterError> {
    let releases = document
        .get(RELEASES_FIELD)
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterError::Format(format!("missing \"{}\" array", RELEASES_FIELD)))?;

    let Some(release) = releases.iter().find(|r| r.get(VERSION_FIELD).is_some()) else {
        return Ok(None);
    };

    Ok(select_fields(release, fields).map(|mut record| {
        record.download_url = file_ref(release)
            .as_ref()
            .and_then(FileRef::primary_url)
            .map(str::to_string);
        record
    }))
}

/// Parse manifest text and extract the canonical record.
pub fn parse_manifest(
    text: &str,
    fields: &[&str],
) -> Result<Option<CanonicalRecord>, AdapterError> {
    let document: Value = serde_json::from_str(text)?;
    extract_record(&document, fields)
}
