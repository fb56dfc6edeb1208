use crate::client::QnapError;
use crate::xml::{Document, normalize};
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

/// HTTP access to the `/cgi-bin/` tree of a device.
///
/// Responses that are not `200 OK` or not XML are reported as `Ok(None)`:
/// firmware variants answer unsupported endpoints that way.
pub(crate) struct Transport {
    client: Client,
    base_url: String,
    debug: bool,
}

impl Transport {
    pub(crate) fn new(
        base_url: String,
        timeout_ms: u64,
        verify_ssl: bool,
        debug: bool,
    ) -> Result<Self, QnapError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .danger_accept_invalid_certs(!verify_ssl)
            .build()?;

        Ok(Self {
            client,
            base_url,
            debug,
        })
    }

    pub(crate) fn debug(&self) -> bool {
        self.debug
    }

    /// Sends a GET request with `query` appended to the path's own query string
    pub(crate) async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        repeatable: &[&str],
    ) -> Result<Option<Document>, QnapError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET from URL: {url}");

        let response = self.client.get(&url).query(query).send().await?;
        self.handle_response(response, repeatable).await
    }

    /// Sends a form-encoded POST request
    pub(crate) async fn post(
        &self,
        path: &str,
        form: &[(&str, &str)],
        repeatable: &[&str],
    ) -> Result<Option<Document>, QnapError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST to URL: {url}");

        let response = self.client.post(&url).form(form).send().await?;
        self.handle_response(response, repeatable).await
    }

    async fn handle_response(
        &self,
        response: Response,
        repeatable: &[&str],
    ) -> Result<Option<Document>, QnapError> {
        let status = response.status();
        debug!("Request executed: {status}");

        if status != StatusCode::OK {
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_xml(&content_type) {
            debug!("Ignoring response with content type {content_type:?}");
            return Ok(None);
        }

        if self.debug {
            debug!("Headers: {:?}", response.headers());
        }

        let body = response.text().await?;
        if self.debug {
            debug!("Response Text: {body}");
        }

        normalize(&body, repeatable).map(Some)
    }
}

fn is_xml(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case("text/xml") || essence.eq_ignore_ascii_case("application/xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_xml() {
        assert!(is_xml("text/xml"));
        assert!(is_xml("text/xml; charset=utf-8"));
        assert!(is_xml("application/xml"));
        assert!(!is_xml("application/json"));
        assert!(!is_xml("text/html"));
        assert!(!is_xml(""));
    }
}
