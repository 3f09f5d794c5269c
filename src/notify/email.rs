use async_trait::async_trait;

use feedwatch_adapters::smtp::SmtpMailer;
use feedwatch_adapters::AdapterError;

use super::{Delivery, Notification, Notifier};

/// Sends the notification as a plain-text email, title as subject.
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    mailer: SmtpMailer,
}

impl EmailNotifier {
    pub fn new(mailer: SmtpMailer) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, notification: &Notification) -> Result<Delivery, AdapterError> {
        self.mailer
            .send(&notification.title, &notification.body)
            .await?;
        Ok(Delivery::Sent)
    }
}
