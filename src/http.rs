//! HTTP transport behind a trait so tests can stub the network.

use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use serde_json::Value;

use crate::error::ArclinkError;

/// A minimal asynchronous HTTP GET client.
///
/// The crate never retries, caches or cancels requests; whatever policy the
/// host application wants lives in its implementation of this trait.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetches the URL, resolving to the response body on a 2xx status.
    async fn get(&self, url: &str) -> Result<Bytes, ArclinkError>;
}

/// [`HttpClient`] backed by [`reqwest`].
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    headers: Vec<(String, String)>,
}

impl ReqwestHttpClient {
    /// Creates a client with the default configuration.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("arclink/0.1")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            headers: Vec::new(),
        }
    }

    /// Adds headers sent with every request, e.g. an `Authorization` token.
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<Bytes, ArclinkError> {
        let mut request = self.client.get(url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            info!(
                "Failed to load {url}: {}, {:?}",
                response.status(),
                response.text().await
            );
            return Err(ArclinkError::Io);
        }

        Ok(response.bytes().await?)
    }
}

/// Fetches a URL and parses the body as JSON, surfacing ArcGIS error
/// envelopes.
///
/// The REST API reports most failures inside a 200 response as
/// `{"error": {"message": ...}}`; that envelope becomes
/// [`ArclinkError::Server`].
pub(crate) async fn fetch_json(
    http: &dyn HttpClient,
    url: &str,
) -> Result<Value, ArclinkError> {
    log::trace!("Requesting {url}");
    let bytes = http.get(url).await?;
    let value: Value = serde_json::from_slice(&bytes)?;
    check_error_envelope(value)
}

/// Converts a response body carrying an error envelope into an error.
pub(crate) fn check_error_envelope(value: Value) -> Result<Value, ArclinkError> {
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown server error")
            .to_string();
        return Err(ArclinkError::Server(message));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn error_envelope_becomes_server_error() {
        let body = json!({"error": {"code": 400, "message": "Invalid token"}});
        let result = check_error_envelope(body);
        assert_matches!(result, Err(ArclinkError::Server(message)) if message == "Invalid token");
    }

    #[test]
    fn envelope_without_message_still_errors() {
        let body = json!({"error": {"code": 500}});
        assert_matches!(check_error_envelope(body), Err(ArclinkError::Server(_)));
    }

    #[test]
    fn plain_body_passes_through() {
        let body = json!({"currentVersion": 10.81});
        assert_eq!(check_error_envelope(body.clone()).expect("ok"), body);
    }
}
