use std::time::Duration;

use bytes::Bytes;
use serde::ser::SerializeMap as _;

use crate::HttpRequest;
use crate::error::{Error, Result};

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl From<HttpMethod> for http::Method {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

/// How the body fields are serialized on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BodyEncoding {
    /// A flat JSON object of string values.
    #[default]
    Json,
    /// `application/x-www-form-urlencoded`.
    Form,
}

impl BodyEncoding {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => CONTENT_TYPE_JSON,
            Self::Form => CONTENT_TYPE_FORM,
        }
    }
}

/// Body fields in declaration order. Setting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyFields(Vec<(String, String)>);

impl BodyFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.0.iter().position(|(k, _)| k == name)?;
        Some(self.0.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BodyFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

impl serde::Serialize for BodyFields {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// The request issued by every iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: BodyFields,
    pub encoding: BodyEncoding,
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: BodyFields::new(),
            encoding: BodyEncoding::default(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.body.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The URL must be absolute `http`/`https` with a host.
    pub fn validate(&self) -> Result<()> {
        let parsed =
            url::Url::parse(&self.url).map_err(|_| Error::InvalidUrl(self.url.clone()))?;
        let scheme_ok = matches!(parsed.scheme(), "http" | "https");
        if !scheme_ok || parsed.host_str().is_none_or(str::is_empty) {
            return Err(Error::InvalidUrl(self.url.clone()));
        }
        Ok(())
    }

    /// Serialized body, or `None` when there are no fields.
    pub fn encode_body(&self) -> Result<Option<Bytes>> {
        if self.body.is_empty() {
            return Ok(None);
        }

        let encoded = match self.encoding {
            BodyEncoding::Json => serde_json::to_vec(&self.body)?,
            BodyEncoding::Form => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.body.iter())
                .finish()
                .into_bytes(),
        };
        Ok(Some(Bytes::from(encoded)))
    }

    /// Build the transport request. A `content-type` matching the encoding is added unless one
    /// is already configured.
    pub fn to_http_request(&self) -> Result<HttpRequest> {
        self.validate()?;

        let mut req = HttpRequest::new(self.method.into(), self.url.clone());
        for (name, value) in &self.headers {
            req = req.with_header(name.clone(), value.clone());
        }

        if let Some(body) = self.encode_body()? {
            let has_content_type = self
                .headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                req = req.with_header("content-type", self.encoding.content_type());
            }
            req = req.with_body(body);
        }

        Ok(req.with_timeout(self.timeout))
    }
}

/// Join a base URL and a path with exactly one `/` between them.
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RequestSpec {
        RequestSpec::new(HttpMethod::Post, "http://localhost:8000/user-register")
            .with_field("username", "admin")
            .with_field("password", "p&ss word")
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("post".parse::<HttpMethod>().ok(), Some(HttpMethod::Post));
        assert_eq!("OPTIONS".parse::<HttpMethod>().ok(), Some(HttpMethod::Options));
        assert!("TRACE".parse::<HttpMethod>().is_err());
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
        assert_eq!(http::Method::from(HttpMethod::Patch), http::Method::PATCH);
    }

    #[test]
    fn encoding_parses_and_names_content_type() {
        assert_eq!("FORM".parse::<BodyEncoding>().ok(), Some(BodyEncoding::Form));
        assert_eq!(BodyEncoding::default(), BodyEncoding::Json);
        assert_eq!(BodyEncoding::Json.to_string(), "json");
        assert_eq!(
            BodyEncoding::Form.content_type(),
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn validate_rejects_relative_and_non_http_urls() {
        for bad in ["/user-register", "ftp://host/x", "not a url", "http://"] {
            let spec = RequestSpec::new(HttpMethod::Get, bad);
            assert!(
                matches!(spec.validate(), Err(Error::InvalidUrl(u)) if u == bad),
                "{bad} should be rejected"
            );
        }
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn json_body_is_a_flat_object() {
        let body = sample()
            .encode_body()
            .unwrap_or_else(|e| panic!("encode failed: {e}"))
            .unwrap_or_else(|| panic!("expected a body"));
        let value: serde_json::Value =
            serde_json::from_slice(&body).unwrap_or_else(|e| panic!("bad json: {e}"));
        assert_eq!(value["username"], "admin");
        assert_eq!(value["password"], "p&ss word");
    }

    #[test]
    fn form_body_is_urlencoded() {
        let body = sample()
            .with_encoding(BodyEncoding::Form)
            .encode_body()
            .unwrap_or_else(|e| panic!("encode failed: {e}"))
            .unwrap_or_else(|| panic!("expected a body"));
        assert_eq!(&body[..], b"username=admin&password=p%26ss+word");
    }

    #[test]
    fn fields_keep_declaration_order_on_the_wire() {
        let spec = RequestSpec::new(HttpMethod::Post, "http://localhost/user-register")
            .with_field("username", "admin")
            .with_field("name", "admin")
            .with_field("birthdate", "2024-10-10")
            .with_field("password", "x")
            .with_field("name", "root");

        let body = spec
            .encode_body()
            .unwrap_or_else(|e| panic!("encode failed: {e}"))
            .unwrap_or_else(|| panic!("expected a body"));
        assert_eq!(
            &body[..],
            br#"{"username":"admin","name":"root","birthdate":"2024-10-10","password":"x"}"#
        );
        assert_eq!(spec.body.len(), 4);
        assert_eq!(spec.body.get("name"), Some("root"));
    }

    #[test]
    fn empty_body_encodes_to_nothing() {
        let spec = RequestSpec::new(HttpMethod::Get, "http://localhost/");
        assert!(matches!(spec.encode_body(), Ok(None)));
    }

    #[test]
    fn http_request_gets_content_type_unless_configured() {
        let req = sample()
            .to_http_request()
            .unwrap_or_else(|e| panic!("build failed: {e}"));
        assert_eq!(req.method, http::Method::POST);
        assert!(
            req.headers
                .iter()
                .any(|(k, v)| k == "content-type" && v == "application/json")
        );

        let req = sample()
            .with_header("Content-Type", "text/plain")
            .to_http_request()
            .unwrap_or_else(|e| panic!("build failed: {e}"));
        let content_types = req
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .count();
        assert_eq!(content_types, 1);
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://h:8000/", "/a"), "http://h:8000/a");
        assert_eq!(join_url("http://h:8000", "a"), "http://h:8000/a");
        assert_eq!(join_url("http://h:8000//", ""), "http://h:8000");
    }
}
