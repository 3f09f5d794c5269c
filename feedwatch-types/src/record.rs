//! Canonical records and the state persisted between runs.

use std::collections::BTreeMap;
use std::fmt;

use crate::VERSION_FIELD;

/// A scalar value copied out of a version manifest.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Shorthand for a text scalar.
    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    /// Returns the string if this is a text scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Where a release's download lives.
///
/// Manifests publish `"File"` either as a single object or as a list of
/// objects; both shapes normalize into this enum once, at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    Single(String),
    Listed(Vec<String>),
}

impl FileRef {
    /// The URL to advertise: the single URL, or the first listed one.
    pub fn primary_url(&self) -> Option<&str> {
        match self {
            FileRef::Single(url) => Some(url),
            FileRef::Listed(urls) => urls.first().map(String::as_str),
        }
    }
}

/// The normalized, field-selected form of a version payload.
///
/// Equality only looks at `fields`: the download URL and the tracking-issue
/// number ride along for notification purposes but never make two records
/// differ.
#[derive(Debug, Clone, Default)]
pub struct CanonicalRecord {
    pub fields: BTreeMap<String, Scalar>,
    pub download_url: Option<String>,
    pub issue: Option<u64>,
}

impl CanonicalRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: Scalar) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Builder-style download URL.
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    /// Look up a field.
    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.get(name)
    }

    /// The `"Version"` field, when it is text.
    pub fn version(&self) -> Option<&str> {
        self.get(VERSION_FIELD).and_then(Scalar::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl PartialEq for CanonicalRecord {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

/// The value held in a state slot.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistedValue {
    /// Field map of a canonical record.
    Record(BTreeMap<String, Scalar>),
    /// A bare version string (legacy slots, alert levels).
    Raw(String),
}

/// The last successfully recorded state of a source.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedState {
    pub value: PersistedValue,
    /// Tracking issue opened for this state, if any.
    pub issue: Option<u64>,
}

impl PersistedState {
    /// Persisted form of a canonical record.
    pub fn from_record(record: &CanonicalRecord) -> Self {
        Self {
            value: PersistedValue::Record(record.fields.clone()),
            issue: record.issue,
        }
    }

    /// Persisted form of a raw string.
    pub fn raw(value: impl Into<String>) -> Self {
        Self {
            value: PersistedValue::Raw(value.into()),
            issue: None,
        }
    }

    /// The version this state stands for.
    pub fn version(&self) -> Option<&str> {
        match &self.value {
            PersistedValue::Record(fields) => fields.get(VERSION_FIELD).and_then(Scalar::as_str),
            PersistedValue::Raw(raw) => Some(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_equality_ignores_issue_and_url() {
        let a = CanonicalRecord::new()
            .with_field("Version", Scalar::text("1.0"))
            .with_download_url("https://a");
        let mut b = CanonicalRecord::new().with_field("Version", Scalar::text("1.0"));
        b.issue = Some(12);

        assert_eq!(a, b);
        assert_ne!(a, CanonicalRecord::new().with_field("Version", Scalar::text("1.1")));
    }

    #[test]
    fn test_file_ref_primary_url() {
        assert_eq!(FileRef::Single("https://x".into()).primary_url(), Some("https://x"));
        assert_eq!(
            FileRef::Listed(vec!["https://a".into(), "https://b".into()]).primary_url(),
            Some("https://a")
        );
        assert_eq!(FileRef::Listed(vec![]).primary_url(), None);
    }

    #[test]
    fn test_persisted_version() {
        let record = CanonicalRecord::new().with_field("Version", Scalar::text("2.0.0"));
        assert_eq!(PersistedState::from_record(&record).version(), Some("2.0.0"));
        assert_eq!(PersistedState::raw("5.1").version(), Some("5.1"));

        let numeric = CanonicalRecord::new().with_field("Version", Scalar::Integer(3));
        assert_eq!(PersistedState::from_record(&numeric).version(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_scalar_serde_untagged() {
        let fields: BTreeMap<String, Scalar> =
            serde_json::from_str(r#"{"Version":"2.1.0","Build":42,"Beta":false,"Score":1.5}"#)
                .unwrap();
        assert_eq!(fields["Version"], Scalar::text("2.1.0"));
        assert_eq!(fields["Build"], Scalar::Integer(42));
        assert_eq!(fields["Beta"], Scalar::Bool(false));
        assert_eq!(fields["Score"], Scalar::Float(1.5));

        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"Beta":false,"Build":42,"Score":1.5,"Version":"2.1.0"}"#);
    }
}
