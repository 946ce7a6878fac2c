use serde::ser::Serializer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("json decode error: {0}")]
    SimdJson(#[from] simd_json::Error),
    #[error("render sink closed: {0}")]
    RenderClosed(String),
    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("chart session is not running")]
    SessionNotRunning,
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_display_string() {
        let error = AppError::InvalidArgument("symbol is required".to_string());
        let encoded = simd_json::serde::to_string(&error).expect("error should serialize");
        assert_eq!(encoded, "\"invalid argument: symbol is required\"");
    }
}
