//! The JSON envelope wrapping every API response.

use serde::Deserialize;

/// `{ "success": ..., "detail": ..., "data": ... }`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    /// Whether the API considers the call successful.
    #[serde(default)]
    pub success: bool,
    /// Human-readable status or error message.
    #[serde(default)]
    pub detail: Option<String>,
    /// The payload. Absent on most errors.
    pub data: Option<T>,
}
