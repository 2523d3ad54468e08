#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;

use crate::domain::models::Session;
use crate::domain::models::StorageBox;
use crate::domain::models::StorageError;
use crate::domain::models::UserProfile;

pub const USER_KEY: &str = "user";
pub const TOKEN_KEY: &str = "token";

/// Mirrors the session into durable storage. The user is stored as JSON, the
/// token as the raw string.
pub struct CredentialStore {
    storage: StorageBox,
}

impl CredentialStore {
    pub fn new(storage: StorageBox) -> CredentialStore {
        return CredentialStore { storage };
    }

    /// Never fails. Anything unreadable results in an empty session.
    pub fn load(&self) -> Session {
        let user_payload = match self.storage.get(USER_KEY) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = ?err, "Failed to read stored user, starting signed out");
                return Session::default();
            }
        };

        let token = match self.storage.get(TOKEN_KEY) {
            Ok(token) => token.filter(|e| return !e.is_empty()),
            Err(err) => {
                tracing::warn!(error = ?err, "Failed to read stored token, starting signed out");
                return Session::default();
            }
        };

        let user = match user_payload {
            Some(payload) => match serde_json::from_str::<UserProfile>(&payload) {
                Ok(user) => Some(user),
                Err(err) => {
                    tracing::warn!(error = ?err, "Stored user is not valid JSON, starting signed out");
                    return Session::default();
                }
            },
            None => None,
        };

        return Session { user, token };
    }

    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        match &session.user {
            Some(user) => self.save_user(user)?,
            None => self.storage.remove(USER_KEY)?,
        }

        match &session.token {
            Some(token) => self.storage.set(TOKEN_KEY, token)?,
            None => self.storage.remove(TOKEN_KEY)?,
        }

        return Ok(());
    }

    pub fn save_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        let payload = serde_json::to_string(user)?;
        self.storage.set(USER_KEY, &payload)?;
        return Ok(());
    }

    /// Attempts both removals even if one fails, token first, so a partial
    /// failure never leaves a usable token behind. Returns the first error.
    pub fn clear(&self) -> Result<(), StorageError> {
        let token_res = self.storage.remove(TOKEN_KEY);
        let user_res = self.storage.remove(USER_KEY);

        token_res?;
        user_res?;
        return Ok(());
    }
}
