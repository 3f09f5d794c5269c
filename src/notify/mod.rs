//! Notification sinks.
//!
//! A [`Notifier`] turns a [`Notification`] into a delivered alert. Two sinks
//! exist: tracking issues ([`IssueNotifier`], deduplicated by title against
//! the open issues) and email ([`EmailNotifier`]). A sink that cannot be
//! built from the available configuration is replaced by an
//! [`UnavailableNotifier`], which fails with a configuration error only
//! when something actually needs to be sent.

mod email;
mod issue;
pub mod message;

pub use email::EmailNotifier;
pub use issue::IssueNotifier;
pub use message::{flood_notification, version_notification};

use async_trait::async_trait;
use feedwatch_adapters::AdapterError;

/// A human-readable alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Deterministic title; also the deduplication key for issues.
    pub title: String,
    pub body: String,
}

/// What a sink did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A new tracking issue was opened.
    Created { issue: u64 },
    /// An open issue with the same title already exists.
    Duplicate { issue: u64 },
    /// The email was handed to the SMTP server.
    Sent,
}

impl Delivery {
    /// The tracking issue covering this notification, if any.
    pub fn issue(&self) -> Option<u64> {
        match self {
            Delivery::Created { issue } | Delivery::Duplicate { issue } => Some(*issue),
            Delivery::Sent => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Delivery::Created { issue } => format!("issue #{} created", issue),
            Delivery::Duplicate { issue } => format!("already tracked by open issue #{}", issue),
            Delivery::Sent => "email sent".to_string(),
        }
    }
}

/// A notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<Delivery, AdapterError>;
}

/// Stand-in for a sink whose configuration is missing.
#[derive(Debug, Clone)]
pub struct UnavailableNotifier {
    reason: String,
}

impl UnavailableNotifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Notifier for UnavailableNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<Delivery, AdapterError> {
        Err(AdapterError::Config(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_issue() {
        assert_eq!(Delivery::Created { issue: 3 }.issue(), Some(3));
        assert_eq!(Delivery::Duplicate { issue: 4 }.issue(), Some(4));
        assert_eq!(Delivery::Sent.issue(), None);
        assert_eq!(Delivery::Created { issue: 3 }.describe(), "issue #3 created");
    }

    #[tokio::test]
    async fn test_unavailable_is_config_error() {
        let sink = UnavailableNotifier::new("no [issues] section");
        let err = sink
            .notify(&Notification {
                title: "t".into(),
                body: "b".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("no [issues] section"));
    }
}
