#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    #[error("ResultsDB returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("request to ResultsDB failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("invalid CA certificate {path}: {reason}")]
    Certificate { path: String, reason: String },
}

impl UpdaterError {
    /// Builds an API error from a failed response body. ResultsDB reports
    /// problems as `{"message": ...}`; anything else is kept verbatim.
    pub fn api(status: u16, body: &str) -> Self {
        Self::Api {
            status,
            message: extract_message(body),
        }
    }
}

pub fn extract_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => match value.get("message") {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(serde_json::Value::Null) | None => body.to_string(),
            Some(other) => other.to_string(),
        },
        Err(_) => body.to_string(),
    }
}
