#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::watch;

use super::EndpointRegistry;
use super::QueryCache;
use super::QuerySubscription;
use super::SessionContainer;
use crate::domain::models::EndpointDefinition;
use crate::domain::models::EndpointKind;
use crate::domain::models::EndpointName;
use crate::domain::models::LoginRequest;
use crate::domain::models::LoginResponse;
use crate::domain::models::NotificationKind;
use crate::domain::models::NotifierBox;
use crate::domain::models::QueryState;
use crate::domain::models::RegisterRequest;
use crate::domain::models::RequestError;
use crate::domain::models::Tag;
use crate::domain::models::UserProfile;
use crate::domain::models::VerifyOtpRequest;

fn to_args<T: Serialize>(payload: &T) -> Result<Value, RequestError> {
    return serde_json::to_value(payload)
        .map_err(|err| return RequestError::InvalidRequest(err.to_string()));
}

fn from_args<T: DeserializeOwned>(args: Value) -> Result<T, RequestError> {
    return serde_json::from_value(args)
        .map_err(|err| return RequestError::InvalidRequest(err.to_string()));
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, RequestError> {
    return serde_json::from_value(data).map_err(|err| return RequestError::Decode(err.to_string()));
}

/// Entry point for everything that talks to the portal API. Cheap to clone;
/// clones share the same cache, session and notifier.
#[derive(Clone)]
pub struct Api {
    registry: Arc<EndpointRegistry>,
    cache: QueryCache,
    session: Arc<SessionContainer>,
    notifier: NotifierBox,
}

impl Api {
    pub fn new(
        registry: EndpointRegistry,
        cache: QueryCache,
        session: Arc<SessionContainer>,
        notifier: NotifierBox,
    ) -> Api {
        return Api {
            registry: Arc::new(registry),
            cache,
            session,
            notifier,
        };
    }

    pub fn session(&self) -> &SessionContainer {
        return &self.session;
    }

    fn definition(
        &self,
        name: EndpointName,
        kind: EndpointKind,
    ) -> Result<&EndpointDefinition, RequestError> {
        let definition = self.registry.get(name)?;
        if definition.kind != kind {
            return Err(RequestError::InvalidRequest(format!(
                "{name} is a {}, not a {kind}",
                definition.kind
            )));
        }

        return Ok(definition);
    }

    /// Subscribes to a query endpoint. Identical arguments share one cache
    /// entry.
    pub fn query(&self, name: EndpointName, args: Value) -> Result<QuerySubscription, RequestError> {
        let definition = self.definition(name, EndpointKind::Query)?;
        let request = definition.build_request(&args)?;
        return Ok(self.cache.subscribe(
            definition.cache_key(&args),
            request,
            definition.provides.clone(),
        ));
    }

    fn report_failure(&self, name: EndpointName, res: &Result<Value, RequestError>) {
        if let Err(err) = res {
            tracing::warn!(endpoint = %name, error = %err, "Mutation failed");
            self.notifier
                .notify(&format!("{name} failed: {err}"), NotificationKind::Error);
        }
    }

    /// Sends a mutation without invalidating anything. Callers invalidate
    /// once any session change the response implies has been applied.
    async fn send_mutation(&self, name: EndpointName, args: Value) -> Result<Value, RequestError> {
        let definition = self.definition(name, EndpointKind::Mutation)?;
        let request = definition.build_request(&args)?;

        let res = self.cache.execute(&request).await;
        self.report_failure(name, &res);
        return res;
    }

    fn invalidate(&self, name: EndpointName) -> Result<(), RequestError> {
        let definition = self.registry.get(name)?;
        self.cache.invalidate_tags(&definition.invalidates);
        return Ok(());
    }

    /// Runs a mutation endpoint and invalidates the tags it declares.
    /// Failures raise an error notification and are returned unchanged.
    pub async fn mutate(&self, name: EndpointName, args: Value) -> Result<Value, RequestError> {
        let definition = self.definition(name, EndpointKind::Mutation)?;
        let request = definition.build_request(&args)?;

        let res = self.cache.mutate(&request, &definition.invalidates).await;
        self.report_failure(name, &res);
        return res;
    }

    pub fn mutation(&self, name: EndpointName) -> MutationHandle {
        return MutationHandle::new(self.clone(), name);
    }

    /// Runs the facade operation behind a mutation endpoint, so handles get
    /// the same session updates and notifications as direct calls.
    async fn run(&self, name: EndpointName, args: Value) -> Result<Value, RequestError> {
        return match name {
            EndpointName::Login => to_args(&self.login(&from_args(args)?).await?),
            EndpointName::Register => self.register(&from_args(args)?).await,
            EndpointName::VerifyOtp => self.verify_otp(&from_args(args)?).await,
            EndpointName::UpdateProfile => self.update_profile(args).await.map(Value::Object),
            EndpointName::SubmitReport => self.submit_report(args).await,
            _ => self.mutate(name, args).await,
        };
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, RequestError> {
        let data = self
            .send_mutation(EndpointName::Login, to_args(credentials)?)
            .await?;
        let res = decode::<LoginResponse>(data);

        if let Ok(res) = &res {
            self.session.login(res.user.clone(), res.token.clone());
            let name = self
                .session
                .current()
                .display_name()
                .unwrap_or_else(|| return credentials.email.to_string());
            self.notifier
                .notify(&format!("Signed in as {name}"), NotificationKind::Success);
        }

        self.invalidate(EndpointName::Login)?;
        return res;
    }

    pub async fn register(&self, registration: &RegisterRequest) -> Result<Value, RequestError> {
        let data = self
            .mutate(EndpointName::Register, to_args(registration)?)
            .await?;
        self.notifier.notify(
            &format!("Registered {}, check your email for a code", registration.email),
            NotificationKind::Success,
        );

        return Ok(data);
    }

    /// Verifies a one time code. Servers that answer with a user and token
    /// sign the session in.
    pub async fn verify_otp(&self, verification: &VerifyOtpRequest) -> Result<Value, RequestError> {
        let data = self
            .send_mutation(EndpointName::VerifyOtp, to_args(verification)?)
            .await?;

        if let Ok(res) = serde_json::from_value::<LoginResponse>(data.clone()) {
            self.session.login(res.user, res.token);
            self.notifier
                .notify("Code verified, you are signed in", NotificationKind::Success);
        } else {
            self.notifier
                .notify("Code verified", NotificationKind::Success);
        }

        self.invalidate(EndpointName::VerifyOtp)?;
        return Ok(data);
    }

    pub async fn update_profile(&self, fields: Value) -> Result<UserProfile, RequestError> {
        let data = self
            .send_mutation(EndpointName::UpdateProfile, fields)
            .await?;
        let user = decode::<UserProfile>(data);

        if let Ok(user) = &user {
            self.session.set_credentials(user.clone());
            self.notifier
                .notify("Profile updated", NotificationKind::Success);
        }

        self.invalidate(EndpointName::UpdateProfile)?;
        return user;
    }

    pub async fn submit_report(&self, report: Value) -> Result<Value, RequestError> {
        let data = self.mutate(EndpointName::SubmitReport, report).await?;
        self.notifier
            .notify("Report submitted", NotificationKind::Success);

        return Ok(data);
    }

    /// Signing out without a session still clears whatever is stored.
    pub fn logout(&self) {
        let was_authenticated = self.session.is_authenticated();
        self.session.logout();
        self.cache.invalidate_tags(&[Tag::Profile]);

        if was_authenticated {
            self.notifier.notify("Signed out", NotificationKind::Info);
        } else {
            self.notifier.notify(
                "No active session, cleared stored credentials",
                NotificationKind::Warning,
            );
        }
    }

    pub fn get_cases(&self) -> Result<QuerySubscription, RequestError> {
        return self.query(EndpointName::GetCases, Value::Object(Map::new()));
    }

    pub fn get_reports(&self) -> Result<QuerySubscription, RequestError> {
        return self.query(EndpointName::GetReports, Value::Object(Map::new()));
    }

    pub fn get_report(&self, id: &str) -> Result<QuerySubscription, RequestError> {
        return self.query(EndpointName::GetReport, json!({ "id": id }));
    }

    pub fn get_profile(&self) -> Result<QuerySubscription, RequestError> {
        return self.query(EndpointName::GetProfile, Value::Object(Map::new()));
    }
}

/// Tracks the state of one mutation endpoint for a consumer.
pub struct MutationHandle {
    api: Api,
    name: EndpointName,
    state: watch::Sender<QueryState>,
}

impl MutationHandle {
    fn new(api: Api, name: EndpointName) -> MutationHandle {
        let (state, _) = watch::channel(QueryState::default());
        return MutationHandle { api, name, state };
    }

    pub fn state(&self) -> QueryState {
        return self.state.borrow().clone();
    }

    pub async fn trigger(&self, args: Value) -> Result<Value, RequestError> {
        self.state.send_modify(|state| {
            state.begin();
        });

        let res = self.api.run(self.name, args).await;
        let settled = res.clone();
        self.state.send_modify(|state| {
            state.settle(settled);
        });

        return res;
    }
}
