use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn new(message: &str, kind: NotificationKind) -> Notification {
        return Notification {
            message: message.to_string(),
            kind,
        };
    }
}

pub trait Notifier {
    fn notify(&self, message: &str, kind: NotificationKind);
}

pub type NotifierBox = Arc<dyn Notifier + Send + Sync>;
