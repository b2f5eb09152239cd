//! Errors shared by the external model providers.

#[derive(Debug)]
pub enum ProviderError {
    /// Request could not be sent or the connection failed.
    Http(String),
    /// Provider answered with a non-success status.
    Api(String),
    /// Response body was not in the expected shape.
    Parse(String),
    /// Provider answered successfully but without content.
    Empty,
    /// Local model failed while running.
    Model(String),
    /// Provider is not configured or not compiled in.
    Unavailable(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Http(e) => write!(f, "HTTP error: {e}"),
            ProviderError::Api(e) => write!(f, "API error: {e}"),
            ProviderError::Parse(e) => write!(f, "Parse error: {e}"),
            ProviderError::Empty => write!(f, "Empty response"),
            ProviderError::Model(e) => write!(f, "Model error: {e}"),
            ProviderError::Unavailable(e) => write!(f, "Provider unavailable: {e}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// POST `body` as JSON and return the raw response text, mapping transport
/// and status failures onto [`ProviderError`].
pub(crate) async fn post_json<B: serde::Serialize + ?Sized>(
    http: &reqwest::Client,
    endpoint: &str,
    api_key: Option<&str>,
    body: &B,
) -> Result<String, ProviderError> {
    let mut request = http.post(endpoint).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Http(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Http(format!("failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(ProviderError::Api(format!("{status}: {body}")));
    }

    Ok(body)
}

/// Client shared by the HTTP providers. Requests time out after 60 seconds.
pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))
}
