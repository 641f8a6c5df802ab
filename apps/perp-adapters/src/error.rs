//! Error types for the adapter layer.
//!
//! Every adapter surfaces failures as [`AdapterError`]. Transport failures
//! from venue REST APIs are carried as [`HttpError`] so callers can tell a
//! rejected order apart from a network outage.
//!
//! # Error Codes
//!
//! | Code | Retryable | Usage |
//! |------|-----------|-------|
//! | `NOT_IMPLEMENTED` | no | Adapter does not support the operation |
//! | `INVALID_REQUEST` | no | Request failed validation |
//! | `INSUFFICIENT_BALANCE` | no | Wallet balance below required amount |
//! | `MARKET_NOT_FOUND` | no | Unknown market id |
//! | `UNSUPPORTED_NETWORK` | no | Protocol not deployed on the chain |
//! | `VENUE_UNAVAILABLE` | yes | Network error, rate limit, 5xx |
//! | `VENUE_REJECTED` | no | Venue returned a business error |
//! | `RPC_ERROR` | yes | JSON-RPC node failure |
//! | `ENCODING_ERROR` | no | ABI encode/decode or unit conversion failure |
//! | `SIGNING_ERROR` | no | Request or typed-data signing failed |
//! | `CONFIG_ERROR` | no | Invalid or missing configuration |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ProtocolId;

/// Errors from the HTTP transport used by REST-based venues.
#[derive(Debug, Error, Clone)]
pub enum HttpError {
    /// Network-level failure (connect, timeout, TLS).
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be parsed.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Venue returned an error response.
    #[error("API error {status}: {code} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Venue error code.
        code: String,
        /// Venue error message.
        message: String,
    },

    /// Credentials were rejected.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Rate limited.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: u64,
    },

    /// Resource not found.
    #[error("Not found: {path}")]
    NotFound {
        /// Request path.
        path: String,
    },

    /// Max retries exceeded.
    #[error("Max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

/// Errors surfaced by adapters and the router.
#[derive(Debug, Error, Clone)]
pub enum AdapterError {
    /// The adapter does not implement this operation.
    #[error("Method not implemented: {protocol}::{method}")]
    NotImplemented {
        /// Protocol the call was routed to.
        protocol: ProtocolId,
        /// Operation name.
        method: &'static str,
    },

    /// Wallet does not hold enough of a token.
    #[error("Insufficient balance for {token}: required {required}, available {available}")]
    InsufficientBalance {
        /// Token symbol or address.
        token: String,
        /// Amount needed.
        required: String,
        /// Amount held.
        available: String,
    },

    /// Request failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Market id is unknown to the adapter.
    #[error("Market not found: {0}")]
    MarketNotFound(String),

    /// Protocol is not available on the requested chain.
    #[error("{protocol} is not supported on chain {chain_id}")]
    UnsupportedNetwork {
        /// Protocol.
        protocol: ProtocolId,
        /// Requested chain id.
        chain_id: u64,
    },

    /// REST transport failure.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// JSON-RPC failure.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// ABI encoding or decoding failure.
    #[error("ABI error: {0}")]
    Abi(String),

    /// Signing failure.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Numeric conversion failure (decimals, fixed point, overflow).
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Configuration failure.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Operation not supported by the adapter.
    NotImplemented,
    /// Invalid request.
    InvalidRequest,
    /// Wallet balance too low.
    InsufficientBalance,
    /// Unknown market.
    MarketNotFound,
    /// Protocol not deployed on chain.
    UnsupportedNetwork,
    /// Venue temporarily unavailable.
    VenueUnavailable,
    /// Venue rejected the request.
    VenueRejected,
    /// RPC node failure.
    RpcError,
    /// Encoding failure.
    EncodingError,
    /// Signing failure.
    SigningError,
    /// Configuration failure.
    ConfigError,
}

impl ErrorCode {
    /// Error reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::MarketNotFound => "MARKET_NOT_FOUND",
            Self::UnsupportedNetwork => "UNSUPPORTED_NETWORK",
            Self::VenueUnavailable => "VENUE_UNAVAILABLE",
            Self::VenueRejected => "VENUE_REJECTED",
            Self::RpcError => "RPC_ERROR",
            Self::EncodingError => "ENCODING_ERROR",
            Self::SigningError => "SIGNING_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::VenueUnavailable | Self::RpcError)
    }
}

impl AdapterError {
    /// Shorthand for [`AdapterError::NotImplemented`].
    #[must_use]
    pub const fn not_implemented(protocol: ProtocolId, method: &'static str) -> Self {
        Self::NotImplemented { protocol, method }
    }

    /// Map to a stable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotImplemented { .. } => ErrorCode::NotImplemented,
            Self::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            Self::Validation(_) => ErrorCode::InvalidRequest,
            Self::MarketNotFound(_) => ErrorCode::MarketNotFound,
            Self::UnsupportedNetwork { .. } => ErrorCode::UnsupportedNetwork,
            Self::Http(e) => match e {
                HttpError::Network(_)
                | HttpError::RateLimited { .. }
                | HttpError::MaxRetriesExceeded { .. } => ErrorCode::VenueUnavailable,
                HttpError::JsonParse(_) => ErrorCode::EncodingError,
                HttpError::Api { .. }
                | HttpError::AuthenticationFailed
                | HttpError::NotFound { .. } => ErrorCode::VenueRejected,
            },
            Self::Rpc(_) => ErrorCode::RpcError,
            Self::Abi(_) | Self::Conversion(_) => ErrorCode::EncodingError,
            Self::Signing(_) => ErrorCode::SigningError,
            Self::Config(_) => ErrorCode::ConfigError,
        }
    }
}

impl From<alloy::sol_types::Error> for AdapterError {
    fn from(err: alloy::sol_types::Error) -> Self {
        Self::Abi(err.to_string())
    }
}

impl From<alloy::signers::Error> for AdapterError {
    fn from(err: alloy::signers::Error) -> Self {
        Self::Signing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_implemented_message_names_protocol_and_method() {
        let err = AdapterError::not_implemented(ProtocolId::Aevo, "update_position_margin");
        assert_eq!(
            err.to_string(),
            "Method not implemented: AEVO::update_position_margin"
        );
        assert_eq!(err.code(), ErrorCode::NotImplemented);
    }

    #[test]
    fn insufficient_balance_is_not_retryable() {
        let err = AdapterError::InsufficientBalance {
            token: "USDC".to_string(),
            required: "100".to_string(),
            available: "12.5".to_string(),
        };
        assert!(err.to_string().starts_with("Insufficient balance for USDC"));
        assert!(!err.code().is_retryable());
    }

    #[test]
    fn transport_errors_map_to_venue_unavailable() {
        let err: AdapterError = HttpError::RateLimited {
            retry_after_secs: 5,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::VenueUnavailable);
        assert!(err.code().is_retryable());

        let err: AdapterError = HttpError::Api {
            status: 400,
            code: "-1102".to_string(),
            message: "bad quantity".to_string(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::VenueRejected);
    }

    #[test]
    fn error_code_reason_strings() {
        assert_eq!(ErrorCode::InsufficientBalance.reason(), "INSUFFICIENT_BALANCE");
        assert_eq!(ErrorCode::RpcError.reason(), "RPC_ERROR");
        assert!(ErrorCode::RpcError.is_retryable());
    }
}
