//! Participant access tokens for collaboration sessions.
//!
//! These are HS256 JWTs scoped to one (session, participant) pair. They are
//! never accepted where a user API token is expected, and API tokens are
//! never accepted here.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const TOKEN_TYPE: &str = "session";
const MIN_SECRET_LEN: usize = 32;
const SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Session id
    pub sid: String,
    /// Participant id
    pub pid: String,
    pub typ: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct MintedSessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl SessionTokens {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "session secret must be at least {MIN_SECRET_LEN} characters"
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn mint(
        &self,
        session_id: &str,
        participant_id: &str,
        valid_for: Duration,
    ) -> Result<MintedSessionToken> {
        let now = Utc::now();
        let expires_at = now + valid_for;
        let claims = SessionClaims {
            sid: session_id.to_string(),
            pid: participant_id.to_string(),
            typ: TOKEN_TYPE.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Config(format!("failed to sign session token: {e}")))?;

        Ok(MintedSessionToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => Error::TokenExpired,
                _ => Error::Unauthorized,
            },
        )?;

        if data.claims.typ != TOKEN_TYPE {
            return Err(Error::Unauthorized);
        }
        Ok(data.claims)
    }
}

/// Random hex secret for signing session tokens.
pub fn generate_session_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}
