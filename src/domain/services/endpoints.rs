#[cfg(test)]
#[path = "endpoints_test.rs"]
mod tests;

use std::collections::HashMap;

use crate::domain::models::EndpointDefinition;
use crate::domain::models::EndpointName;
use crate::domain::models::Method;
use crate::domain::models::RequestError;
use crate::domain::models::Tag;

/// Table of every endpoint the portal talks to.
pub struct EndpointRegistry {
    definitions: HashMap<EndpointName, EndpointDefinition>,
}

impl Default for EndpointRegistry {
    fn default() -> EndpointRegistry {
        return EndpointRegistry::new(vec![
            EndpointDefinition::mutation(EndpointName::Login, Method::Post, "auth/login")
                .invalidates(&[Tag::Profile]),
            EndpointDefinition::mutation(EndpointName::Register, Method::Post, "auth/register"),
            EndpointDefinition::mutation(EndpointName::VerifyOtp, Method::Post, "auth/verify-otp")
                .invalidates(&[Tag::Profile]),
            EndpointDefinition::query(EndpointName::GetProfile, "auth/profile")
                .provides(&[Tag::Profile]),
            EndpointDefinition::mutation(EndpointName::UpdateProfile, Method::Patch, "auth/profile")
                .invalidates(&[Tag::Profile]),
            EndpointDefinition::query(EndpointName::GetCases, "dengue-cases")
                .provides(&[Tag::Cases]),
            EndpointDefinition::query(EndpointName::GetReports, "reports")
                .provides(&[Tag::Reports]),
            EndpointDefinition::query(EndpointName::GetReport, "reports/{id}")
                .provides(&[Tag::Reports]),
            EndpointDefinition::mutation(EndpointName::SubmitReport, Method::Post, "reports")
                .invalidates(&[Tag::Reports, Tag::Cases]),
        ]);
    }
}

impl EndpointRegistry {
    pub fn new(definitions: Vec<EndpointDefinition>) -> EndpointRegistry {
        return EndpointRegistry {
            definitions: definitions
                .into_iter()
                .map(|definition| return (definition.name, definition))
                .collect(),
        };
    }

    pub fn get(&self, name: EndpointName) -> Result<&EndpointDefinition, RequestError> {
        return self.definitions.get(&name).ok_or_else(|| {
            return RequestError::InvalidRequest(format!("no endpoint registered for {name}"));
        });
    }
}
