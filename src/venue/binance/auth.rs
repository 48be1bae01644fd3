//! Binance request signing
//!
//! Signed endpoints take the URL-encoded parameters, an HMAC-SHA256 of that
//! exact string keyed by the secret, and the API key in `X-MBX-APIKEY`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::errors::{EngineError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// HMAC-SHA256 of `message`, lowercase hex
///
/// # Arguments
/// * `secret` - API secret key
/// * `message` - The exact query string that will be sent
pub fn sign(secret: &str, message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| EngineError::unauthenticated("binance.invalid_secret"))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Encode `params` and append `&signature=<hex>`
///
/// Parameters must already include `timestamp` and `recvWindow`.
pub fn signed_query(params: &[(&str, String)], secret: &str) -> Result<String> {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
        .finish();
    let signature = sign(secret, &query)?;
    Ok(format!("{}&signature={}", query, signature))
}
