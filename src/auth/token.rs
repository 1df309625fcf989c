//! Long-lived API tokens.
//!
//! Format: `ryze_<lookup>_<secret>`. Only an Argon2id hash of the whole
//! string is stored; the lookup part indexes the row.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

use crate::error::{Error, Result};

const ARGON2_MEMORY_KIB: u32 = 19 * 1024;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "ryze";
const LOOKUP_LENGTH: usize = 8;
const SECRET_BYTES: usize = 12;

/// A freshly minted token. `raw` is shown to the caller once and never stored.
pub struct IssuedToken {
    pub raw: String,
    pub lookup: String,
    pub hash: String,
}

pub struct ApiTokenHasher {
    argon2: Argon2<'static>,
}

impl ApiTokenHasher {
    pub fn new() -> Result<Self> {
        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .map_err(|e| Error::Config(format!("invalid argon2 params: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn issue(&self) -> Result<IssuedToken> {
        let lookup = uuid::Uuid::new_v4().simple().to_string()[..LOOKUP_LENGTH].to_string();

        let mut secret = [0u8; SECRET_BYTES];
        rand::thread_rng().fill(&mut secret);

        let raw = format!("{TOKEN_PREFIX}_{lookup}_{}", hex::encode(secret));
        let hash = self.hash(&raw)?;
        Ok(IssuedToken { raw, lookup, hash })
    }

    fn hash(&self, raw: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(raw.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| Error::Config(format!("failed to hash token: {e}")))
    }

    pub fn verify(&self, raw: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("invalid hash format: {e}")))?;

        match self.argon2.verify_password(raw.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify token: {e}"))),
        }
    }
}

/// Checks the token shape and returns its lookup part.
pub fn token_lookup(raw: &str) -> Result<&str> {
    let rest = raw
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|r| r.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;

    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;
    let well_formed = lookup.len() == LOOKUP_LENGTH
        && secret.len() == SECRET_BYTES * 2
        && secret.chars().all(|c| c.is_ascii_hexdigit());

    if !well_formed {
        return Err(Error::InvalidTokenFormat);
    }
    Ok(lookup)
}
