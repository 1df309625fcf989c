mod helpers;
mod middleware;
mod session_token;
mod token;

pub use middleware::{AuthError, RequireAdmin, RequireParticipant, RequireUser};
pub use session_token::{
    MintedSessionToken, SessionClaims, SessionTokens, generate_session_secret,
};
pub use token::{ApiTokenHasher, IssuedToken, token_lookup};
