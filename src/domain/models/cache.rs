use std::fmt;

use serde_json::Map;
use serde_json::Value;

use super::EndpointName;
use super::RequestError;

/// Identity of a cached query, derived from the endpoint and its arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Absent arguments and an empty object name the same request.
    pub fn new(endpoint: EndpointName, args: &Value) -> CacheKey {
        let args = match args {
            Value::Null => Value::Object(Map::new()),
            other => canonical(other),
        };

        return CacheKey(format!("{endpoint}({args})"));
    }
}

/// Rebuilds objects with their keys inserted in sorted order, so the
/// serialized form does not depend on how the caller ordered them.
fn canonical(value: &Value) -> Value {
    return match value {
        Value::Object(map) => {
            let mut keys = map.keys().collect::<Vec<&String>>();
            keys.sort();

            let sorted = keys
                .into_iter()
                .map(|key| return (key.to_string(), canonical(&map[key])))
                .collect::<Map<String, Value>>();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    };
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{}", self.0);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum QueryStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// What a consumer observes for a query or mutation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryState {
    pub status: QueryStatus,
    pub data: Option<Value>,
    pub error: Option<RequestError>,
}

impl QueryState {
    pub fn is_loading(&self) -> bool {
        return self.status == QueryStatus::Loading;
    }

    pub fn is_settled(&self) -> bool {
        return matches!(self.status, QueryStatus::Success | QueryStatus::Error);
    }

    pub fn begin(&mut self) {
        self.status = QueryStatus::Loading;
    }

    /// Applies a settled response. Data from the last success survives an
    /// error.
    pub fn settle(&mut self, res: Result<Value, RequestError>) {
        match res {
            Ok(data) => {
                self.status = QueryStatus::Success;
                self.data = Some(data);
                self.error = None;
            }
            Err(err) => {
                self.status = QueryStatus::Error;
                self.error = Some(err);
            }
        }
    }
}
