//! HS256 session tokens for the management console. Tokens are IP-bound
//! and live for 24 hours; the signing key is generated per process.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iat: i64,
    pub exp: i64,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JwtError {
    #[error("invalid session token")]
    Invalid,
    #[error("session token expired")]
    Expired,
    #[error("session token bound to a different address")]
    IpMismatch,
}

pub fn generate_signing_key() -> Vec<u8> {
    let mut key = vec![0u8; 32];
    rand::rng().fill_bytes(&mut key);
    key
}

pub fn issue(key: &[u8], client_ip: &str, now: OffsetDateTime) -> Option<(String, SessionClaims)> {
    let claims = SessionClaims {
        iat: now.unix_timestamp(),
        exp: now.unix_timestamp() + TOKEN_LIFETIME_SECS,
        ip: client_ip.to_string(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(key),
    )
    .ok()?;
    Some((token, claims))
}

pub fn verify(token: &str, key: &[u8], client_ip: &str) -> Result<SessionClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    let decoded = decode::<SessionClaims>(token, &DecodingKey::from_secret(key), &validation)
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid,
        })?;

    if decoded.claims.ip != client_ip {
        return Err(JwtError::IpMismatch);
    }
    Ok(decoded.claims)
}
