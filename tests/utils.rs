use std::fs;
use wiremock::{Match, Request, ResponseTemplate};

/// # Panics
///
/// Will panic if a file can't be read or missing
#[must_use = "This function returns the body of the file as a string"]
pub fn body_from_file(path: &str) -> String {
    fs::read_to_string(path).expect("Failed to read file")
}

/// `200 OK` response carrying the given fixture as `text/xml`
#[must_use]
pub fn xml_response(path: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body_from_file(path), "text/xml")
}

/// Matches requests whose urlencoded body carries `key=value`
pub struct FormParamExactMatcher(String, String);

impl FormParamExactMatcher {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self(key.into(), value.into())
    }
}

/// Expects the form field `key` of a login or device request to equal `value`
pub fn form_param<K, V>(key: K, value: V) -> FormParamExactMatcher
where
    K: Into<String>,
    V: Into<String>,
{
    FormParamExactMatcher::new(key, value)
}

impl Match for FormParamExactMatcher {
    fn matches(&self, request: &Request) -> bool {
        let Self(key, value) = self;
        form_urlencoded::parse(&request.body).any(|(k, v)| k == key.as_str() && v == value.as_str())
    }
}
