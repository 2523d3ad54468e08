use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Methods whose leftover arguments travel in the query string rather
    /// than a JSON body.
    pub fn uses_query(&self) -> bool {
        return matches!(self, Method::Get | Method::Delete);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Relative to the configured base URL and API prefix.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: &str) -> RequestDescriptor {
        return RequestDescriptor {
            method,
            path: path.to_string(),
            query: vec![],
            body: None,
            headers: vec![],
        };
    }

    pub fn with_body(mut self, body: Value) -> RequestDescriptor {
        self.body = Some(body);
        return self;
    }
}
