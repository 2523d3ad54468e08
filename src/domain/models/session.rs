use serde_json::Map;
use serde_json::Value;

/// Server defined profile record. The schema belongs to the API.
pub type UserProfile = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    pub user: Option<UserProfile>,
    pub token: Option<String>,
}

impl Session {
    pub fn new(user: UserProfile, token: String) -> Session {
        return Session {
            user: Some(user),
            token: Some(token),
        };
    }

    pub fn is_authenticated(&self) -> bool {
        return self.bearer().is_some();
    }

    /// Token to attach to outgoing requests. Empty tokens count as absent.
    pub fn bearer(&self) -> Option<&str> {
        return self.token.as_deref().filter(|token| return !token.is_empty());
    }

    pub fn display_name(&self) -> Option<String> {
        let user = self.user.as_ref()?;
        for field in ["name", "username", "email"] {
            if let Some(Value::String(val)) = user.get(field) {
                return Some(val.to_string());
            }
        }

        return None;
    }
}
