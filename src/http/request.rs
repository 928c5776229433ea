use std::collections::HashMap;

/// HTTP request methods.
///
/// Spartan itself has no verbs. Bodiless Spartan requests are surfaced to the
/// backend as `GET`, requests carrying data as `POST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
}

/// HTTP-shaped request handed to a backend.
///
/// Built by the Spartan server session from a request line and optional
/// body. `path` never contains the query string; the raw query lives in
/// `query` and is mirrored under the `query` key of `params`.
#[derive(Debug, Clone)]
pub struct Request {
    /// GET, or POST when the request carries data
    pub method: Method,
    /// The request path (e.g. "/index.gmi"), always starting with `/`
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    /// HTTP version used when the request is forwarded upstream
    pub version: String,
    /// Request parameters
    pub params: HashMap<String, String>,
    /// Request headers as key-value pairs
    pub headers: HashMap<String, String>,
    /// Request body (the Spartan data block)
    pub body: Vec<u8>,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    path: Option<String>,
    query: Option<String>,
    params: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }

    /// The method a Spartan request maps to: `POST` when it carries data.
    pub fn for_content_length(content_length: usize) -> Self {
        if content_length == 0 {
            Method::GET
        } else {
            Method::POST
        }
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            path: None,
            query: None,
            params: HashMap::new(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path: self.path.ok_or("path missing")?,
            query: self.query,
            version: "HTTP/1.1".to_string(),
            params: self.params,
            headers: self.headers,
            body: self.body,
        })
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Retrieves a request parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|v| v.as_str())
    }

    /// Path plus `?query` when a query is present, as sent upstream.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}
