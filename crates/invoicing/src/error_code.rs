use serde::{Deserialize, Serialize};

/// Error code reported by the fiscal authority (or by the local transport).
///
/// Closed set of known codes plus a catch-all, so classification stays total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FelErrorCode {
    InvalidNit,
    ClientIncomplete,
    ConnectionTimeout,
    ServerError,
    DuplicateDocument,
    Other(String),
}

impl FelErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            FelErrorCode::InvalidNit => "invalid_nit",
            FelErrorCode::ClientIncomplete => "client_incomplete",
            FelErrorCode::ConnectionTimeout => "connection_timeout",
            FelErrorCode::ServerError => "server_error",
            FelErrorCode::DuplicateDocument => "duplicate_document",
            FelErrorCode::Other(code) => code,
        }
    }

    /// Operator-facing explanation of the failure.
    pub fn friendly_message(&self) -> &'static str {
        match self {
            FelErrorCode::InvalidNit => {
                "The fiscal authority rejected the client's NIT. Check the tax id on the client record."
            }
            FelErrorCode::ClientIncomplete => {
                "The client record is missing data the fiscal authority requires."
            }
            FelErrorCode::ConnectionTimeout => {
                "The fiscal authority did not answer in time."
            }
            FelErrorCode::ServerError => {
                "The fiscal authority reported an internal error."
            }
            FelErrorCode::DuplicateDocument => {
                "The fiscal authority already holds a document for this invoice."
            }
            FelErrorCode::Other(_) => "The electronic invoice could not be issued.",
        }
    }
}

impl core::fmt::Display for FelErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for FelErrorCode {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "invalid_nit" => FelErrorCode::InvalidNit,
            "client_incomplete" => FelErrorCode::ClientIncomplete,
            "connection_timeout" => FelErrorCode::ConnectionTimeout,
            "server_error" => FelErrorCode::ServerError,
            "duplicate_document" => FelErrorCode::DuplicateDocument,
            _ => FelErrorCode::Other(value.to_string()),
        }
    }
}

impl From<String> for FelErrorCode {
    fn from(value: String) -> Self {
        FelErrorCode::from(value.as_str())
    }
}

impl From<FelErrorCode> for String {
    fn from(value: FelErrorCode) -> Self {
        value.as_str().to_string()
    }
}
