//! Handshake signatures
//!
//! Both the signaling and the media handshake carry
//! `hex(HMAC-SHA256(secret, "<client id>,<session id>,<stream id>"))`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("client secret is not configured")]
    MissingSecret,

    #[error("client secret rejected as HMAC key")]
    InvalidKey,
}

/// The app identity used to sign handshakes
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn sign(&self, session_id: &str, stream_id: &str) -> Result<String, SignatureError> {
        generate_signature(&self.client_secret, &self.client_id, session_id, stream_id)
    }
}

pub fn generate_signature(
    client_secret: &str,
    client_id: &str,
    session_id: &str,
    stream_id: &str,
) -> Result<String, SignatureError> {
    if client_secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }

    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;
    mac.update(format!("{},{},{}", client_id, session_id, stream_id).as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}
