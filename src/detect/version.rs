use feedwatch_types::{CanonicalRecord, PersistedState, PersistedValue};

/// Whether `new` is a change relative to `persisted`.
///
/// An absent record is never a change; an absent persisted state always is.
/// A bare persisted version string is compared against the record's
/// `"Version"` field.
pub fn has_changed(new: Option<&CanonicalRecord>, persisted: Option<&PersistedState>) -> bool {
    let Some(new) = new else {
        return false;
    };

    match persisted.map(|p| &p.value) {
        None => true,
        Some(PersistedValue::Record(fields)) => &new.fields != fields,
        Some(PersistedValue::Raw(raw)) => new.version() != Some(raw.as_str()),
    }
}
