#[cfg(test)]
#[path = "session_state_test.rs"]
mod tests;

use tokio::sync::watch;

use super::CredentialStore;
use crate::domain::models::Session;
use crate::domain::models::StorageError;
use crate::domain::models::UserProfile;

fn warn_on_storage_err(res: Result<(), StorageError>, transition: &str) {
    if let Err(err) = res {
        tracing::warn!(error = ?err, transition, "Failed to persist session, continuing in memory");
    }
}

/// Owns the current session. Every transition is written through to the
/// credential store and published to subscribers.
pub struct SessionContainer {
    store: CredentialStore,
    state: watch::Sender<Session>,
}

impl SessionContainer {
    pub fn new(store: CredentialStore) -> SessionContainer {
        let session = store.load();
        tracing::debug!(
            authenticated = session.is_authenticated(),
            "Loaded stored session"
        );

        let (state, _) = watch::channel(session);
        return SessionContainer { store, state };
    }

    pub fn current(&self) -> Session {
        return self.state.borrow().clone();
    }

    pub fn is_authenticated(&self) -> bool {
        return self.state.borrow().is_authenticated();
    }

    /// Receivers always see the latest session, including the token the next
    /// outgoing request should carry.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        return self.state.subscribe();
    }

    pub fn set_credentials(&self, user: UserProfile) {
        warn_on_storage_err(self.store.save_user(&user), "set_credentials");
        self.state.send_modify(|session| {
            session.user = Some(user);
        });
    }

    pub fn login(&self, user: UserProfile, token: String) {
        let session = Session::new(user, token);
        warn_on_storage_err(self.store.save(&session), "login");
        self.state.send_replace(session);
    }

    pub fn logout(&self) {
        warn_on_storage_err(self.store.clear(), "logout");
        self.state.send_replace(Session::default());
    }
}
