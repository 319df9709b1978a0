mod decoder;
mod pair;

pub use decoder::{decoded_expiry, is_expired};
pub use pair::CredentialPair;
