//! Per-request authentication hook.

use reqwest::Method;

use crate::error::AdapterError;

/// Adds authentication headers to an outgoing request.
///
/// Called once per attempt, so timestamp-based signatures are regenerated on
/// retries.
pub trait RequestAuth: Send + Sync + std::fmt::Debug {
    /// Headers for `method path_with_query` with serialized `body` ("" when empty).
    fn headers(
        &self,
        method: &Method,
        path_with_query: &str,
        body: &str,
    ) -> Result<Vec<(String, String)>, AdapterError>;
}

/// Public endpoints: no headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl RequestAuth for NoAuth {
    fn headers(
        &self,
        _method: &Method,
        _path_with_query: &str,
        _body: &str,
    ) -> Result<Vec<(String, String)>, AdapterError> {
        Ok(Vec::new())
    }
}
