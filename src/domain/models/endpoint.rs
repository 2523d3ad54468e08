#[cfg(test)]
#[path = "endpoint_test.rs"]
mod tests;

use serde_json::Map;
use serde_json::Value;
use strum::EnumIter;

use super::CacheKey;
use super::Method;
use super::RequestDescriptor;
use super::RequestError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum EndpointName {
    Login,
    Register,
    VerifyOtp,
    GetProfile,
    UpdateProfile,
    GetCases,
    GetReports,
    GetReport,
    SubmitReport,
}

/// Labels linking mutations to the queries they make stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum Tag {
    Cases,
    Reports,
    Profile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EndpointKind {
    Query,
    Mutation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EndpointDefinition {
    pub name: EndpointName,
    pub kind: EndpointKind,
    pub method: Method,
    /// Path relative to the API prefix. `{param}` segments are filled from the
    /// caller's arguments.
    pub path: &'static str,
    pub provides: Vec<Tag>,
    pub invalidates: Vec<Tag>,
}

impl EndpointDefinition {
    pub fn query(name: EndpointName, path: &'static str) -> EndpointDefinition {
        return EndpointDefinition {
            name,
            kind: EndpointKind::Query,
            method: Method::Get,
            path,
            provides: vec![],
            invalidates: vec![],
        };
    }

    pub fn mutation(name: EndpointName, method: Method, path: &'static str) -> EndpointDefinition {
        return EndpointDefinition {
            name,
            kind: EndpointKind::Mutation,
            method,
            path,
            provides: vec![],
            invalidates: vec![],
        };
    }

    pub fn provides(mut self, tags: &[Tag]) -> EndpointDefinition {
        self.provides = tags.to_vec();
        return self;
    }

    pub fn invalidates(mut self, tags: &[Tag]) -> EndpointDefinition {
        self.invalidates = tags.to_vec();
        return self;
    }

    pub fn cache_key(&self, args: &Value) -> CacheKey {
        return CacheKey::new(self.name, args);
    }

    pub fn build_request(&self, args: &Value) -> Result<RequestDescriptor, RequestError> {
        let mut remaining = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                if self.path.contains('{') || self.method.uses_query() {
                    return Err(RequestError::InvalidRequest(format!(
                        "{} expects an object of arguments, got {other}",
                        self.name
                    )));
                }

                return Ok(RequestDescriptor::new(self.method, self.path).with_body(other.clone()));
            }
        };

        let path = self
            .path
            .split('/')
            .map(|segment| {
                let param = match segment.strip_prefix('{').and_then(|e| return e.strip_suffix('}')) {
                    Some(param) => param,
                    None => return Ok(segment.to_string()),
                };

                return match remaining.remove(param) {
                    Some(Value::String(val)) => Ok(val),
                    Some(Value::Number(val)) => Ok(val.to_string()),
                    Some(other) => Err(RequestError::InvalidRequest(format!(
                        "{} path parameter '{param}' must be a string or number, got {other}",
                        self.name
                    ))),
                    None => Err(RequestError::InvalidRequest(format!(
                        "{} is missing path parameter '{param}'",
                        self.name
                    ))),
                };
            })
            .collect::<Result<Vec<String>, RequestError>>()?
            .join("/");

        let mut request = RequestDescriptor::new(self.method, &path);
        if self.method.uses_query() {
            request.query = remaining
                .into_iter()
                .map(|(key, val)| {
                    if let Value::String(text) = val {
                        return (key, text);
                    }
                    return (key, val.to_string());
                })
                .collect();
        } else if !remaining.is_empty() || args.is_object() {
            request.body = Some(Value::Object(remaining));
        }

        return Ok(request);
    }
}
