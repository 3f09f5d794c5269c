use async_trait::async_trait;
use tracing::info;

use feedwatch_adapters::github::{IssueTracker, NewIssue};
use feedwatch_adapters::AdapterError;

use super::{Delivery, Notification, Notifier};

/// Opens a tracking issue unless one with the same title is still open.
#[derive(Debug, Clone)]
pub struct IssueNotifier<T> {
    tracker: T,
    assignees: Vec<String>,
}

impl<T: IssueTracker> IssueNotifier<T> {
    pub fn new(tracker: T) -> Self {
        Self {
            tracker,
            assignees: Vec::new(),
        }
    }

    pub fn with_assignees(mut self, assignees: Vec<String>) -> Self {
        self.assignees = assignees;
        self
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }
}

#[async_trait]
impl<T: IssueTracker> Notifier for IssueNotifier<T> {
    async fn notify(&self, notification: &Notification) -> Result<Delivery, AdapterError> {
        let open = self.tracker.open_issues().await?;
        if let Some(existing) = open.iter().find(|i| i.title == notification.title) {
            info!(issue = existing.number, title = %notification.title, "Open issue already exists");
            return Ok(Delivery::Duplicate {
                issue: existing.number,
            });
        }

        let issue = NewIssue::new(&notification.title, &notification.body)
            .with_assignees(self.assignees.clone());
        let created = self.tracker.create_issue(&issue).await?;
        info!(issue = created.number, title = %created.title, "Issue created");

        Ok(Delivery::Created {
            issue: created.number,
        })
    }
}
