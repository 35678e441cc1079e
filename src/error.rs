use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::network::NetworkId;

/// Main error type for virtual network control
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The network has not adopted a configuration yet (check status first)
    #[error("No configuration for network {0}")]
    NoConfiguration(NetworkId),

    /// Configuration failed structural validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistent state could not be stored, loaded or erased
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or certificate transport failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unknown network id on the status API
    #[error("Network {0} not found")]
    UnknownNetwork(String),
}

/// Failure to create the virtual network device
///
/// Both variants are terminal for a network instance.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TapError {
    #[error("Unable to initialize network device: {0}")]
    InitializationFailed(String),

    #[error("No more network devices available")]
    NoMoreDevices,
}

pub type Result<T> = std::result::Result<T, NetworkError>;

impl NetworkError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            NetworkError::NoConfiguration(_) => StatusCode::SERVICE_UNAVAILABLE,
            NetworkError::Config(_) => StatusCode::BAD_REQUEST,
            NetworkError::UnknownNetwork(_) => StatusCode::NOT_FOUND,
            NetworkError::Persistence(_)
            | NetworkError::Serialization(_)
            | NetworkError::Io(_)
            | NetworkError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            NetworkError::NoConfiguration(_) => "no_configuration",
            NetworkError::Config(_) => "configuration_error",
            NetworkError::Persistence(_) => "persistence_error",
            NetworkError::Serialization(_) => "serialization_error",
            NetworkError::Io(_) => "io_error",
            NetworkError::Transport(_) => "transport_error",
            NetworkError::UnknownNetwork(_) => "unknown_network",
        }
    }
}

/// JSON error body shared by handler errors and middleware failures
pub(crate) fn error_response(
    status_code: StatusCode,
    error_type: &str,
    message: String,
) -> Response {
    let body = json!({
        "error": {
            "code": status_code.as_u16(),
            "message": message,
            "type": error_type,
        }
    });
    (status_code, Json(body)).into_response()
}

impl IntoResponse for NetworkError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.error_type(), self.to_string())
    }
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::NetworkError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::NetworkError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! persistence_error {
    ($msg:expr) => {
        $crate::error::NetworkError::Persistence($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::NetworkError::Persistence(format!($fmt, $($arg)*))
    };
}
