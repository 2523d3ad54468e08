use strum::IntoEnumIterator;

use super::EndpointRegistry;
use crate::domain::models::EndpointKind;
use crate::domain::models::EndpointName;
use crate::domain::models::Method;
use crate::domain::models::RequestError;
use crate::domain::models::Tag;

#[test]
fn it_registers_every_endpoint() {
    let registry = EndpointRegistry::default();
    for name in EndpointName::iter() {
        assert_eq!(registry.get(name).unwrap().name, name);
    }
}

#[test]
fn it_only_tags_queries_with_provides() {
    let registry = EndpointRegistry::default();
    for name in EndpointName::iter() {
        let definition = registry.get(name).unwrap();
        match definition.kind {
            EndpointKind::Query => {
                assert_eq!(definition.method, Method::Get);
                assert!(definition.invalidates.is_empty());
            }
            EndpointKind::Mutation => assert!(definition.provides.is_empty()),
        }
    }
}

#[test]
fn it_invalidates_cases_on_report_submission() {
    let registry = EndpointRegistry::default();
    let definition = registry.get(EndpointName::SubmitReport).unwrap();

    assert!(definition.invalidates.contains(&Tag::Cases));
    assert!(definition.invalidates.contains(&Tag::Reports));
}

#[test]
fn it_errors_for_unregistered_endpoints() {
    let registry = EndpointRegistry::new(vec![]);

    assert_eq!(
        registry.get(EndpointName::GetCases).unwrap_err(),
        RequestError::InvalidRequest("no endpoint registered for get-cases".to_string())
    );
}
