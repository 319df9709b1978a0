use serde_json::Value;

use crate::errors::Error;

/// The access/refresh credential pair.
///
/// Only a successful refresh produces one of these; the store persists the
/// two halves together so a completed lifecycle transition never leaves a
/// partial pair behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    /// Extracts the pair from a refresh-endpoint payload, keyed by the same
    /// names used in storage.
    pub fn from_payload(payload: &Value, access_key: &str, refresh_key: &str) -> Result<Self, Error> {
        let access = payload
            .get(access_key)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Config(format!("Refresh payload missing '{}' field", access_key))
            })?;
        let refresh = payload
            .get(refresh_key)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Config(format!("Refresh payload missing '{}' field", refresh_key))
            })?;
        Ok(Self::new(access, refresh))
    }
}
