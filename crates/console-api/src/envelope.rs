//! `{ "ok": bool, "data": …, "error": { "code", "message" } }` response wrapper

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub ok: bool,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Unwrap `data`, turning `ok: false` or a missing payload into a
    /// validation error naming `what`.
    pub fn into_data(self, what: &str) -> Result<T> {
        if !self.ok {
            let reason = self
                .error
                .map(|e| match e.message {
                    Some(message) => format!("{} ({message})", e.code),
                    None => e.code,
                })
                .unwrap_or_else(|| "rejected".to_owned());
            return Err(Error::Validation(format!("{what}: {reason}")));
        }
        self.data
            .ok_or_else(|| Error::Validation(format!("{what}: response carried no data")))
    }
}
