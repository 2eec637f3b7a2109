//! Token verification error types.

use carbridge_core::PrincipalKind;
use thiserror::Error;

/// Errors that can occur while verifying or minting a bearer token.
///
/// None of these are retried.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer token was presented.
    #[error("no credential presented")]
    NoCredential,

    /// No secret in the ring verified the token's signature.
    #[error("token rejected by every configured secret")]
    AllSecretsRejected,

    /// The signature verified but the token has expired.
    #[error("token expired")]
    Expired,

    /// A token signed with a configured secret carries no `exp` claim.
    #[error("token has no expiry")]
    MissingExpiry,

    /// The token belongs to a different kind of principal.
    #[error("expected {expected} token, got {}", actual.map_or_else(|| "unrecognized".to_string(), |k| k.to_string()))]
    WrongPrincipalKind {
        expected: PrincipalKind,
        actual: Option<PrincipalKind>,
    },

    /// The token carries no subject under any known claim name.
    #[error("token has no subject claim")]
    MissingSubject,

    /// A token could not be signed.
    #[error("token signing failed: {0}")]
    Signing(String),
}
