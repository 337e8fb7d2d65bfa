//! Session token issuance and verification
//!
//! Tokens are JWTs signed with HMAC-SHA256 using a process-wide secret.
//! The algorithm is pinned on the server: a token whose header names any
//! other algorithm is rejected before its claims are looked at.
//! Tokens are stateless and cannot be revoked before they expire.

use bookshelf_core::{AuthConfig, Role, MAX_TOKEN_TTL_SECS};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// The only algorithm tokens are signed and accepted with
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Identity claims embedded in a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the username
    pub sub: String,
    /// Role granted at issuance
    pub role: Role,
    /// Issued at timestamp (Unix epoch seconds)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch seconds)
    pub exp: u64,
    /// Token issuer
    pub iss: String,
    /// Signing key identifier, reserved for key rotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl Claims {
    pub fn username(&self) -> &str {
        &self.sub
    }
}

/// Token issuance and verification errors
///
/// Callers outside this module only ever learn that a token is invalid;
/// the variant is for internal logs.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Signing secret is empty")]
    MissingSecret,

    #[error("Token lifetime {0}s is out of range")]
    InvalidTtl(u64),

    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Unsupported signing algorithm")]
    UnsupportedAlgorithm,

    #[error("Token has expired")]
    Expired,

    #[error("Unexpected token issuer")]
    InvalidIssuer,

    #[error("Failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),

    #[error("System time error: {0}")]
    Clock(#[from] std::time::SystemTimeError),
}

/// Token service configuration
#[derive(Clone)]
pub struct TokenConfig {
    /// HMAC signing secret
    pub secret: String,
    /// Token lifetime in seconds
    pub ttl_secs: u64,
    /// Issuer written into and required from every token
    pub issuer: String,
    /// Signing key identifier
    pub key_id: Option<String>,
}

impl From<&AuthConfig> for TokenConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            ttl_secs: config.token_ttl_secs,
            issuer: config.issuer.clone(),
            key_id: config.key_id.clone(),
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .field("issuer", &self.issuer)
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Issues and verifies session tokens
///
/// Owns the signing key material. Built once at startup and shared
/// read-only between requests.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
    issuer: String,
    key_id: Option<String>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &SIGNING_ALGORITHM)
            .field("ttl_secs", &self.ttl_secs)
            .field("issuer", &self.issuer)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

fn now_secs() -> Result<u64, TokenError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

impl TokenService {
    /// Create a token service
    ///
    /// An empty secret or a lifetime outside `1..=MAX_TOKEN_TTL_SECS` is
    /// rejected.
    pub fn new(config: TokenConfig) -> Result<Self, TokenError> {
        if config.secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&config.ttl_secs) {
            return Err(TokenError::InvalidTtl(config.ttl_secs));
        }

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            ttl_secs: config.ttl_secs,
            issuer: config.issuer,
            key_id: config.key_id,
        })
    }

    /// Lifetime of issued tokens in seconds
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Issue a token for `username` carrying `role`
    ///
    /// The token expires `ttl_secs` after issuance. Nothing is recorded
    /// server-side.
    pub fn issue(&self, username: &str, role: Role) -> Result<String, TokenError> {
        let now = now_secs()?;
        let exp = now
            .checked_add(self.ttl_secs)
            .ok_or(TokenError::InvalidTtl(self.ttl_secs))?;

        let claims = Claims {
            sub: username.to_string(),
            role,
            iat: now,
            exp,
            iss: self.issuer.clone(),
            kid: self.key_id.clone(),
        };

        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let mut header = Header::new(SIGNING_ALGORITHM);
        header.kid = claims.kid.clone();

        encode(&header, claims, &self.encoding_key).map_err(TokenError::Encoding)
    }

    /// Verify a token and return its claims
    ///
    /// The signature (and pinned algorithm) is checked before any claim is
    /// decoded; expiry is checked after. A token is expired once
    /// `exp <= now`.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    TokenError::UnsupportedAlgorithm
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
                _ => TokenError::Malformed,
            })?;

        let claims = token_data.claims;
        if claims.exp <= now_secs()? {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TokenConfig {
        TokenConfig {
            secret: "test-secret-key".to_string(),
            ttl_secs: 3600,
            issuer: "bookshelf".to_string(),
            key_id: None,
        }
    }

    fn service() -> TokenService {
        TokenService::new(test_config()).unwrap()
    }

    fn claims_at(iat: u64, exp: u64) -> Claims {
        Claims {
            sub: "jae".to_string(),
            role: Role::Manager,
            iat,
            exp,
            iss: "bookshelf".to_string(),
            kid: None,
        }
    }

    #[test]
    fn test_issue_and_verify_token() {
        let tokens = service();
        let token = tokens.issue("jae", Role::Supervisor).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.username(), "jae");
        assert_eq!(claims.role, Role::Supervisor);
        assert_eq!(claims.iss, "bookshelf");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(claims.kid.is_none());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let config = TokenConfig {
            secret: String::new(),
            ..test_config()
        };
        assert!(matches!(
            TokenService::new(config),
            Err(TokenError::MissingSecret)
        ));
    }

    #[test]
    fn test_ttl_out_of_range_rejected() {
        for ttl_secs in [0, MAX_TOKEN_TTL_SECS + 1, u64::MAX] {
            let config = TokenConfig {
                ttl_secs,
                ..test_config()
            };
            assert!(matches!(
                TokenService::new(config),
                Err(TokenError::InvalidTtl(t)) if t == ttl_secs
            ));
        }
    }

    #[test]
    fn test_longest_ttl_issues_valid_token() {
        let tokens = TokenService::new(TokenConfig {
            ttl_secs: MAX_TOKEN_TTL_SECS,
            ..test_config()
        })
        .unwrap();

        let token = tokens.issue("jae", Role::User).unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, MAX_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_invalid_token() {
        let tokens = service();
        assert!(matches!(
            tokens.verify("invalid.token.here"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(tokens.verify(""), Err(TokenError::Malformed)));
    }

    #[test]
    fn test_wrong_secret() {
        let other = TokenService::new(TokenConfig {
            secret: "another-secret".to_string(),
            ..test_config()
        })
        .unwrap();

        let token = other.issue("jae", Role::User).unwrap();
        assert!(matches!(
            service().verify(&token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expired_token() {
        let tokens = service();
        let now = now_secs().unwrap();

        // Validly signed, expired an hour ago
        let token = tokens.sign(&claims_at(now - 7200, now - 3600)).unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_token_expiring_now_is_rejected() {
        let tokens = service();
        let now = now_secs().unwrap();

        let token = tokens.sign(&claims_at(now - 60, now)).unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let tokens = service();
        let now = now_secs().unwrap();

        // Same secret, different HMAC algorithm
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims_at(now, now + 600),
            &EncodingKey::from_secret(b"test-secret-key"),
        )
        .unwrap();

        assert!(matches!(
            tokens.verify(&token),
            Err(TokenError::UnsupportedAlgorithm)
        ));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let tokens = service();
        let valid = tokens.issue("jae", Role::User).unwrap();
        let payload = valid.split('.').nth(1).unwrap();

        // {"alg":"none","typ":"JWT"}
        let forged = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{payload}.");
        assert!(tokens.verify(&forged).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let tokens = service();
        let now = now_secs().unwrap();
        let mut claims = claims_at(now, now + 600);
        claims.iss = "someone-else".to_string();

        let token = tokens.sign(&claims).unwrap();
        assert!(matches!(
            tokens.verify(&token),
            Err(TokenError::InvalidIssuer)
        ));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let tokens = service();
        let now = now_secs().unwrap();

        let token = encode(
            &Header::new(SIGNING_ALGORITHM),
            &serde_json::json!({
                "sub": "jae",
                "role": "superuser",
                "iat": now,
                "exp": now + 600,
                "iss": "bookshelf",
            }),
            &EncodingKey::from_secret(b"test-secret-key"),
        )
        .unwrap();

        assert!(matches!(tokens.verify(&token), Err(TokenError::Malformed)));
    }

    #[test]
    fn test_key_id_in_header_and_claims() {
        let tokens = TokenService::new(TokenConfig {
            key_id: Some("2026-10".to_string()),
            ..test_config()
        })
        .unwrap();

        let token = tokens.issue("jae", Role::User).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("2026-10"));
        assert_eq!(header.alg, SIGNING_ALGORITHM);

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.kid.as_deref(), Some("2026-10"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", test_config());
        assert!(!debug.contains("test-secret-key"));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;
        use proptest::sample::Index;

        const B64URL: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

        fn role_strategy() -> impl Strategy<Value = Role> {
            prop::sample::select(Role::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn issued_tokens_verify_to_same_identity(
                username in "[a-zA-Z0-9_.@-]{1,32}",
                role in role_strategy(),
            ) {
                let tokens = service();
                let token = tokens.issue(&username, role).unwrap();
                let claims = tokens.verify(&token).unwrap();
                prop_assert_eq!(claims.sub, username);
                prop_assert_eq!(claims.role, role);
            }

            #[test]
            fn any_altered_character_invalidates_token(
                role in role_strategy(),
                position in any::<Index>(),
                replacement in any::<Index>(),
            ) {
                let tokens = service();
                let token = tokens.issue("jae", role).unwrap();

                let mut bytes = token.into_bytes();
                let candidates: Vec<usize> = bytes
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| **b != b'.')
                    .map(|(i, _)| i)
                    .collect();
                let at = *position.get(&candidates);

                let mut new = B64URL[replacement.index(B64URL.len())];
                if new == bytes[at] {
                    new = if new == b'A' { b'B' } else { b'A' };
                }
                bytes[at] = new;

                let tampered = String::from_utf8(bytes).unwrap();
                prop_assert!(tokens.verify(&tampered).is_err());
            }
        }
    }
}
