//! Expiry extraction from a stored JWT credential.
//!
//! Only the `exp` claim is read; the signature is deliberately not verified.
//! The client holds no signing key, and the decision being made here is "did
//! the server reject this call because the token aged out", not "is this
//! token authentic" — the server already made the authenticity call.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::errors::Error;

#[derive(Deserialize)]
struct ExpiryClaims {
    exp: u64,
}

/// Decodes the credential's expiry timestamp, failing on a malformed token
/// or one without an `exp` claim.
pub fn decoded_expiry(credential: &str) -> Result<SystemTime, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    // Expired tokens must still decode; expiry is compared by the caller.
    validation.validate_exp = false;
    validation.validate_aud = false;
    let data = decode::<ExpiryClaims>(credential, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(UNIX_EPOCH + Duration::from_secs(data.claims.exp))
}

/// Whether the credential is decodably expired relative to `now`.
/// A malformed credential is *not* reported as expired; the caller cannot
/// confirm expiry, so the original rejection should pass through instead.
pub fn is_expired(credential: &str, now: SystemTime) -> bool {
    match decoded_expiry(credential) {
        Ok(expires_at) => expires_at <= now,
        Err(_) => false,
    }
}
