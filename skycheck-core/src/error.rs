use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error produced by a [`Transport`](crate::transport::Transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reasons of a single weather lookup.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Invalid request URL: {0}")]
    InvalidRequest(#[from] url::ParseError),

    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("Weather service returned an empty response")]
    EmptyResponse,

    #[error("Failed to decode weather response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Non-success HTTP status; `code` is the provider's own error code when it sent one.
    #[error("Weather service responded with status {status}: {message}")]
    Api { status: u16, code: Option<i64>, message: String },

    /// The lookup task ended without producing a result (panic or runtime shutdown).
    #[error("Weather lookup was interrupted")]
    Interrupted,
}

impl WeatherError {
    pub fn kind(&self) -> WeatherErrorKind {
        match self {
            WeatherError::InvalidRequest(_) => WeatherErrorKind::InvalidRequest,
            WeatherError::Transport(_) => WeatherErrorKind::Transport,
            WeatherError::EmptyResponse => WeatherErrorKind::EmptyResponse,
            WeatherError::Decode(_) => WeatherErrorKind::Decode,
            WeatherError::Api { .. } => WeatherErrorKind::Api,
            WeatherError::Interrupted => WeatherErrorKind::Interrupted,
        }
    }
}

/// Copyable tag for [`WeatherError`], suitable for UI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherErrorKind {
    InvalidRequest,
    Transport,
    EmptyResponse,
    Decode,
    Api,
    Interrupted,
}
