//! Bearer token verification.
//!
//! Tokens are HS256 JWTs issued by several generations of the platform. The
//! signing secret has been rotated more than once and some clients still hold
//! tokens signed with the original hard-coded default, so verification tries
//! an ordered [`SecretRing`]: the current secret, then retired secrets, then
//! (optionally) the legacy default. The first secret whose signature verifies
//! decides the outcome.
//!
//! Only tokens signed with the legacy default may omit `exp`; that
//! generation never set it. Any token signed with a configured secret must
//! carry one.
//!
//! Claim names drifted too. The subject may be under `id`, `userId`,
//! `customerId` or `sub`; the principal kind comes from `role` or `type`.

mod error;

pub use error::AuthError;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use carbridge_core::{AdminRole, PrincipalKind, Role};

use crate::identifier;

/// Default secret used by the first generation of the platform.
pub const LEGACY_JWT_SECRET: &str = "your-secret-key";

/// Claim names that may hold the subject id, in priority order.
pub const SUBJECT_CLAIMS: [&str; 4] = ["id", "userId", "customerId", "sub"];

/// Where a secret in the ring came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Current,
    /// Position in `JWT_PREVIOUS_SECRETS`.
    Previous(usize),
    Legacy,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::Previous(i) => write!(f, "previous[{i}]"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

/// Ordered list of accepted signing secrets.
#[derive(Clone)]
pub struct SecretRing {
    secrets: Vec<(SecretSource, SecretString)>,
}

impl std::fmt::Debug for SecretRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.secrets.iter().map(|(source, _)| source))
            .finish()
    }
}

impl SecretRing {
    /// Build a ring in priority order: current, previous, legacy.
    #[must_use]
    pub fn new(
        current: Option<SecretString>,
        previous: Vec<SecretString>,
        accept_legacy: bool,
    ) -> Self {
        let mut secrets = Vec::with_capacity(previous.len() + 2);
        if let Some(current) = current {
            secrets.push((SecretSource::Current, current));
        }
        secrets.extend(
            previous
                .into_iter()
                .enumerate()
                .map(|(i, s)| (SecretSource::Previous(i), s)),
        );
        if accept_legacy {
            secrets.push((
                SecretSource::Legacy,
                SecretString::from(LEGACY_JWT_SECRET.to_string()),
            ));
        }
        Self { secrets }
    }

    /// Secret sources in the order they are tried.
    #[must_use]
    pub fn sources(&self) -> Vec<SecretSource> {
        self.secrets.iter().map(|(source, _)| *source).collect()
    }

    /// The secret new tokens are signed with: the first in the ring.
    #[must_use]
    pub fn signing_secret(&self) -> Option<&SecretString> {
        self.secrets.first().map(|(_, secret)| secret)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

/// A verified caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    /// Canonical subject id (object ids as lowercase hex).
    pub subject_id: String,
    pub role: Role,
    pub kind: PrincipalKind,
    /// Lowercased `email` claim, when present.
    pub email: Option<String>,
    /// Every claim the token carried.
    pub issued_fields: Map<String, Value>,
}

/// Verifies bearer tokens against a [`SecretRing`].
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    ring: SecretRing,
    leeway_seconds: u64,
}

impl TokenVerifier {
    #[must_use]
    pub const fn new(ring: SecretRing, leeway_seconds: u64) -> Self {
        Self {
            ring,
            leeway_seconds,
        }
    }

    #[must_use]
    pub const fn ring(&self) -> &SecretRing {
        &self.ring
    }

    /// Verify `credential` and require a principal of `expected` kind.
    ///
    /// # Errors
    ///
    /// - `NoCredential` if the credential is absent or blank
    /// - `AllSecretsRejected` if no secret verifies the signature
    /// - `Expired` if a secret verifies it but `exp` has passed
    /// - `MissingExpiry` if a configured (non-legacy) secret verifies it and
    ///   it has no `exp`
    /// - `WrongPrincipalKind` if the token is for another kind of principal
    /// - `MissingSubject` if no subject claim is present
    pub fn verify(
        &self,
        credential: Option<&str>,
        expected: PrincipalKind,
    ) -> Result<Principal, AuthError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NoCredential)?;

        let claims = self.decode(token)?;
        principal_from_claims(claims, expected)
    }

    fn decode(&self, token: &str) -> Result<Map<String, Value>, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_seconds;
        // `exp` is checked when present; its absence is judged per secret below.
        validation.required_spec_claims.clear();

        for (source, secret) in &self.ring.secrets {
            let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
            match jsonwebtoken::decode::<Map<String, Value>>(token, &key, &validation) {
                Ok(data) => {
                    if *source != SecretSource::Legacy && !data.claims.contains_key("exp") {
                        debug!(secret = %source, "Token verified but has no expiry");
                        return Err(AuthError::MissingExpiry);
                    }
                    debug!(secret = %source, "Token verified");
                    return Ok(data.claims);
                }
                // Signatures are checked before claims, so expiry means this
                // secret signed the token.
                Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                    debug!(secret = %source, "Token verified but expired");
                    return Err(AuthError::Expired);
                }
                Err(e) => {
                    debug!(secret = %source, error = %e, "Secret rejected token");
                }
            }
        }

        Err(AuthError::AllSecretsRejected)
    }
}

/// Derive the principal kind and role from the claims.
fn role_from_claims(claims: &Map<String, Value>) -> Option<Role> {
    let role = claims.get("role").and_then(Value::as_str);
    let token_type = claims.get("type").and_then(Value::as_str);

    if let Some(admin) = role.and_then(|r| r.parse::<AdminRole>().ok()) {
        return Some(Role::Admin(admin));
    }
    let says_customer =
        |v: Option<&str>| v.is_some_and(|v| v.trim().eq_ignore_ascii_case("customer"));
    if says_customer(role) || says_customer(token_type) {
        return Some(Role::Customer);
    }
    if role.is_none() && token_type.is_none() && claims.contains_key("customerId") {
        return Some(Role::Customer);
    }
    None
}

fn subject_from_claims(claims: &Map<String, Value>) -> Option<String> {
    SUBJECT_CLAIMS.iter().find_map(|name| {
        let value = claims.get(*name)?;
        match value {
            Value::Number(n) => Some(n.to_string()),
            other => identifier::canonical(other),
        }
    })
}

fn principal_from_claims(
    claims: Map<String, Value>,
    expected: PrincipalKind,
) -> Result<Principal, AuthError> {
    let role = role_from_claims(&claims).ok_or(AuthError::WrongPrincipalKind {
        expected,
        actual: None,
    })?;
    if role.kind() != expected {
        return Err(AuthError::WrongPrincipalKind {
            expected,
            actual: Some(role.kind()),
        });
    }

    let subject_id = subject_from_claims(&claims).ok_or(AuthError::MissingSubject)?;
    let email = claims
        .get("email")
        .and_then(Value::as_str)
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());

    Ok(Principal {
        subject_id,
        role,
        kind: role.kind(),
        email,
        issued_fields: claims,
    })
}

/// Claims written into newly minted tokens.
///
/// Uses the names the storefront and admin console read today: `id` for the
/// subject, `role` for admins, `type` for customers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    /// Claims for an admin token valid for `ttl`.
    #[must_use]
    pub fn admin(subject: impl Into<String>, role: AdminRole, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: subject.into(),
            role: Some(role.to_string()),
            token_type: Some("admin".to_string()),
            email: None,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    /// Claims for a customer token valid for `ttl`.
    #[must_use]
    pub fn customer(subject: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: subject.into(),
            role: Some("customer".to_string()),
            token_type: Some("customer".to_string()),
            email: None,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Sign `claims` with `secret` (HS256).
///
/// # Errors
///
/// Returns `AuthError::Signing` if encoding fails.
pub fn mint(claims: &TokenClaims, secret: &SecretString) -> Result<String, AuthError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn sign(claims: &Value, key: &str) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(key.as_bytes()),
        )
        .unwrap()
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(
            SecretRing::new(
                Some(secret("current-key")),
                vec![secret("rotated-key")],
                true,
            ),
            0,
        )
    }

    fn future_exp() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_ring_order() {
        let ring = SecretRing::new(Some(secret("a")), vec![secret("b"), secret("c")], true);
        assert_eq!(
            ring.sources(),
            vec![
                SecretSource::Current,
                SecretSource::Previous(0),
                SecretSource::Previous(1),
                SecretSource::Legacy
            ]
        );
        assert_eq!(ring.signing_secret().unwrap().expose_secret(), "a");
    }

    #[test]
    fn test_ring_debug_hides_secrets() {
        let ring = SecretRing::new(Some(secret("hunter2-signing")), vec![], false);
        assert!(!format!("{ring:?}").contains("hunter2"));
    }

    #[test]
    fn test_current_secret_admin_token() {
        let token = sign(
            &json!({ "id": "a1", "role": "super_admin", "email": "Boss@Example.com", "exp": future_exp() }),
            "current-key",
        );
        let principal = verifier().verify(Some(&token), PrincipalKind::Admin).unwrap();
        assert_eq!(principal.subject_id, "a1");
        assert_eq!(principal.role, Role::Admin(AdminRole::SuperAdmin));
        assert_eq!(principal.email.as_deref(), Some("boss@example.com"));
        assert_eq!(principal.issued_fields["role"], json!("super_admin"));
    }

    #[test]
    fn test_rotated_secret_authenticates() {
        let token = sign(
            &json!({ "userId": "c9", "type": "customer", "exp": future_exp() }),
            "rotated-key",
        );
        let principal = verifier()
            .verify(Some(&token), PrincipalKind::Customer)
            .unwrap();
        assert_eq!(principal.subject_id, "c9");
        assert_eq!(principal.kind, PrincipalKind::Customer);
    }

    #[test]
    fn test_legacy_secret_can_be_disabled() {
        let token = sign(&json!({ "id": "a1", "role": "admin" }), LEGACY_JWT_SECRET);
        assert!(verifier().verify(Some(&token), PrincipalKind::Admin).is_ok());

        let strict = TokenVerifier::new(SecretRing::new(Some(secret("current-key")), vec![], false), 0);
        assert!(matches!(
            strict.verify(Some(&token), PrincipalKind::Admin),
            Err(AuthError::AllSecretsRejected)
        ));
    }

    #[test]
    fn test_expiry_required_outside_legacy_secret() {
        for key in ["current-key", "rotated-key"] {
            let token = sign(&json!({ "id": "a1", "role": "admin" }), key);
            assert!(matches!(
                verifier().verify(Some(&token), PrincipalKind::Admin),
                Err(AuthError::MissingExpiry)
            ));
        }
    }

    #[test]
    fn test_unlisted_secret_rejected() {
        let token = sign(&json!({ "id": "a1", "role": "admin" }), "attacker-key");
        assert!(matches!(
            verifier().verify(Some(&token), PrincipalKind::Admin),
            Err(AuthError::AllSecretsRejected)
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            verifier().verify(Some("not.a.jwt"), PrincipalKind::Admin),
            Err(AuthError::AllSecretsRejected)
        ));
    }

    #[test]
    fn test_missing_credential() {
        assert!(matches!(
            verifier().verify(None, PrincipalKind::Admin),
            Err(AuthError::NoCredential)
        ));
        assert!(matches!(
            verifier().verify(Some("   "), PrincipalKind::Admin),
            Err(AuthError::NoCredential)
        ));
    }

    #[test]
    fn test_expired_token() {
        let token = sign(
            &json!({ "id": "a1", "role": "admin", "exp": Utc::now().timestamp() - 3600 }),
            "rotated-key",
        );
        assert!(matches!(
            verifier().verify(Some(&token), PrincipalKind::Admin),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn test_wrong_principal_kind() {
        let token = sign(&json!({ "id": "c1", "type": "customer", "exp": future_exp() }), "current-key");
        assert!(matches!(
            verifier().verify(Some(&token), PrincipalKind::Admin),
            Err(AuthError::WrongPrincipalKind {
                expected: PrincipalKind::Admin,
                actual: Some(PrincipalKind::Customer)
            })
        ));

        let token = sign(&json!({ "id": "x1", "exp": future_exp() }), "current-key");
        for kind in [PrincipalKind::Admin, PrincipalKind::Customer] {
            assert!(matches!(
                verifier().verify(Some(&token), kind),
                Err(AuthError::WrongPrincipalKind { actual: None, .. })
            ));
        }
    }

    #[test]
    fn test_customer_id_only_token_is_customer() {
        let token = sign(
            &json!({ "customerId": { "$oid": "64f1c2a9e4b0a1b2c3d4e5a1" }, "exp": future_exp() }),
            "current-key",
        );
        let principal = verifier()
            .verify(Some(&token), PrincipalKind::Customer)
            .unwrap();
        assert_eq!(principal.subject_id, "64f1c2a9e4b0a1b2c3d4e5a1");
    }

    #[test]
    fn test_missing_subject() {
        let token = sign(&json!({ "role": "manager", "exp": future_exp() }), "current-key");
        assert!(matches!(
            verifier().verify(Some(&token), PrincipalKind::Admin),
            Err(AuthError::MissingSubject)
        ));
    }

    #[test]
    fn test_minted_tokens_verify() {
        let key = secret("current-key");
        let token = mint(
            &TokenClaims::admin("a7", AdminRole::Staff, Duration::hours(1)),
            &key,
        )
        .unwrap();
        let principal = verifier().verify(Some(&token), PrincipalKind::Admin).unwrap();
        assert_eq!(principal.role, Role::Admin(AdminRole::Staff));

        let token = mint(
            &TokenClaims::customer("c7", Duration::hours(1)).with_email("c7@example.com"),
            &key,
        )
        .unwrap();
        let principal = verifier()
            .verify(Some(&token), PrincipalKind::Customer)
            .unwrap();
        assert_eq!(principal.subject_id, "c7");
        assert_eq!(principal.email.as_deref(), Some("c7@example.com"));
    }
}
