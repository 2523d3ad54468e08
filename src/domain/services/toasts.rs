#[cfg(test)]
#[path = "toasts_test.rs"]
mod tests;

use anyhow::Result;
use tokio::sync::mpsc;
use yansi::Paint;

use crate::domain::models::Notification;
use crate::domain::models::NotificationKind;

pub fn format_toast(notification: &Notification) -> String {
    let label = format!("[{}]", notification.kind);
    let painted = match notification.kind {
        NotificationKind::Info => Paint::cyan(label),
        NotificationKind::Success => Paint::green(label),
        NotificationKind::Warning => Paint::yellow(label),
        NotificationKind::Error => Paint::red(label),
    };

    return format!("{painted} {}", notification.message);
}

pub struct ToastService {}

impl ToastService {
    /// Renders notifications to stderr until every sender has been dropped.
    pub async fn start(mut rx: mpsc::UnboundedReceiver<Notification>) -> Result<()> {
        while let Some(notification) = rx.recv().await {
            tracing::debug!(kind = %notification.kind, message = %notification.message, "Toast");
            eprintln!("{}", format_toast(&notification));
        }

        return Ok(());
    }
}
