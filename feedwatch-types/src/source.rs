//! Monitored sources.

/// One thing to watch: a named feed and the slot its last state lives in.
///
/// Sources are built from static configuration at start-up and are not
/// modified during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredSource {
    /// Human-readable name, used in notification titles and status lines.
    pub name: String,
    /// URL polled for the current state.
    pub source_url: String,
    /// Name of the durable slot holding the last recorded state.
    pub state_slot: String,
}

impl MonitoredSource {
    /// Create a new monitored source.
    pub fn new(
        name: impl Into<String>,
        source_url: impl Into<String>,
        state_slot: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            state_slot: state_slot.into(),
        }
    }

    /// Default state slot for a source name (`"<name>.json"`).
    pub fn default_slot(name: &str) -> String {
        format!("{}.json", name)
    }

    /// A filesystem and CI friendly identifier derived from the name.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// Lowercase ASCII alphanumerics are kept, every other run of characters
/// collapses to a single `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slot() {
        assert_eq!(MonitoredSource::default_slot("Proton Mail"), "Proton Mail.json");
    }

    #[test]
    fn test_slug() {
        let source = MonitoredSource::new("Proton Drive (macOS)", "https://x", "a.txt");
        assert_eq!(source.slug(), "proton_drive_macos");

        assert_eq!(slugify("--Bridge--"), "bridge");
        assert_eq!(slugify("Atzenbrugg"), "atzenbrugg");
    }
}
