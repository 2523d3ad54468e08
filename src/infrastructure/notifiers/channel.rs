use tokio::sync::mpsc;

use crate::domain::models::Notification;
use crate::domain::models::NotificationKind;
use crate::domain::models::Notifier;

/// Forwards notifications to whoever owns the receiving end, usually the
/// toast service.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> ChannelNotifier {
        return ChannelNotifier { tx };
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str, kind: NotificationKind) {
        if let Err(err) = self.tx.send(Notification::new(message, kind)) {
            tracing::warn!(error = ?err, "Notification channel is closed");
        }
    }
}
