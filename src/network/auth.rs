//! Connection Authentication
//!
//! Decides which account a connection acts for, and whether that account is
//! the bet authority.
//!
//! ## Token mode
//!
//! With a verification key configured, callers present a JWT issued by an
//! external identity provider. The `sub` claim is hashed into an
//! [`AccountId`]; an optional `role` claim marks the bet authority:
//!
//! ```text
//! role       sub maps to authority?   result
//! bettor     no                       bettor
//! authority  yes                      authority
//! authority  no                       RoleMismatch
//! bettor     yes                      RoleMismatch
//! ```
//!
//! ## Declared mode
//!
//! Without a key, bettors name their own account id. The authority id cannot
//! be declared unless `allow_declared_authority` is set, which is meant for
//! local development only.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::ledger::account::AccountId;

/// Clock skew tolerated on `exp`, in seconds.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// Authentication configuration.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Required `iss` claim, if any.
    pub issuer: Option<String>,
    /// Required `aud` claim, if any.
    pub audience: Option<String>,
    /// RS256 public key (PEM). Takes precedence over `secret`.
    pub public_key_pem: Option<String>,
    /// HS256 shared secret.
    pub secret: Option<String>,
    /// Clock skew tolerated on expiry.
    pub leeway_secs: u64,
    /// Declared mode only: let a client claim the authority id without a token.
    pub allow_declared_authority: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            public_key_pem: None,
            secret: None,
            leeway_secs: DEFAULT_LEEWAY_SECS,
            allow_declared_authority: false,
        }
    }
}

impl AuthConfig {
    /// Create config from `MULTIBET_JWT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let leeway_secs = match lookup("MULTIBET_JWT_LEEWAY_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: "MULTIBET_JWT_LEEWAY_SECS",
                value: raw,
            })?,
            None => DEFAULT_LEEWAY_SECS,
        };

        Ok(Self {
            issuer: lookup("MULTIBET_JWT_ISSUER"),
            audience: lookup("MULTIBET_JWT_AUDIENCE"),
            public_key_pem: lookup("MULTIBET_JWT_PUBLIC_KEY_PEM"),
            secret: lookup("MULTIBET_JWT_SECRET"),
            leeway_secs,
            allow_declared_authority: lookup("MULTIBET_ALLOW_DECLARED_AUTHORITY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    /// Is a verification key configured?
    pub fn verifies_tokens(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }

    fn verifier(&self) -> Result<Option<(DecodingKey, Validation)>, AuthError> {
        let (key, algorithm) = match (&self.public_key_pem, &self.secret) {
            (Some(pem), _) => (
                DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| AuthError::InvalidKey(e.to_string()))?,
                Algorithm::RS256,
            ),
            (None, Some(secret)) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
            (None, None) => return Ok(None),
        };

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.leeway = self.leeway_secs;
        if let Some(ref issuer) = self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match self.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Some((key, validation)))
    }
}

/// What a token says its bearer may do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Places value on bets.
    #[default]
    Bettor,
    /// Creates, funds and resolves bets.
    Authority,
}

/// Claims read from a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity-provider subject.
    #[serde(default)]
    pub sub: String,
    /// Expiry (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Requested role.
    #[serde(default)]
    pub role: Role,
}

impl TokenClaims {
    /// Account the token speaks for.
    pub fn account_id(&self) -> AccountId {
        AccountId::from_subject(&self.sub)
    }
}

/// Account a connection acts for after authentication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Acting account.
    pub account: AccountId,
    /// Is it the bet authority?
    pub is_authority: bool,
}

/// Authentication errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// A token was sent but the server has no verification key.
    #[error("token authentication not configured")]
    NotConfigured,
    /// Token mode requires a token.
    #[error("token required")]
    TokenRequired,
    /// Declared mode requires an account id.
    #[error("account id required")]
    AccountRequired,
    /// Declared account id does not parse.
    #[error("invalid account id {0:?}")]
    InvalidAccount(String),
    /// The authority id was declared without a token.
    #[error("the authority account requires token authentication")]
    AuthorityRequiresToken,
    /// The `role` claim disagrees with the configured authority.
    #[error("token role does not match account {0}")]
    RoleMismatch(AccountId),
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Signature does not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// Wrong `iss`.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Wrong `aud`.
    #[error("invalid audience")]
    InvalidAudience,
    /// A required claim is absent or empty.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Any other decoding failure.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// The configured public key is unusable.
    #[error("invalid verification key: {0}")]
    InvalidKey(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
            _ => AuthError::InvalidToken(err.to_string()),
        }
    }
}

/// Maps auth requests onto ledger identities.
///
/// The verification key is parsed once, at construction.
pub struct Authenticator {
    authority: AccountId,
    verifier: Option<(DecodingKey, Validation)>,
    allow_declared_authority: bool,
}

impl Authenticator {
    /// Build from config for a ledger owned by `authority`.
    pub fn new(config: &AuthConfig, authority: AccountId) -> Result<Self, AuthError> {
        Ok(Self {
            authority,
            verifier: config.verifier()?,
            allow_declared_authority: config.allow_declared_authority,
        })
    }

    /// Does this authenticator require tokens?
    pub fn verifies_tokens(&self) -> bool {
        self.verifier.is_some()
    }

    /// Can the authority id be declared without a token?
    pub fn allows_declared_authority(&self) -> bool {
        self.verifier.is_none() && self.allow_declared_authority
    }

    /// Resolve a connection's identity from its token or declared account id.
    pub fn authenticate(
        &self,
        token: Option<&str>,
        declared: Option<&str>,
    ) -> Result<Identity, AuthError> {
        match (&self.verifier, token) {
            (Some((key, validation)), Some(token)) => {
                let claims = decode::<TokenClaims>(token, key, validation)?.claims;
                self.identity_from_claims(&claims)
            }
            (Some(_), None) => Err(AuthError::TokenRequired),
            (None, Some(_)) => Err(AuthError::NotConfigured),
            (None, None) => self.declared_identity(declared),
        }
    }

    fn identity_from_claims(&self, claims: &TokenClaims) -> Result<Identity, AuthError> {
        if claims.sub.is_empty() {
            return Err(AuthError::MissingClaim("sub".into()));
        }

        let account = claims.account_id();
        let is_authority = account == self.authority;
        match (claims.role, is_authority) {
            (Role::Authority, true) | (Role::Bettor, false) => Ok(Identity { account, is_authority }),
            _ => Err(AuthError::RoleMismatch(account)),
        }
    }

    fn declared_identity(&self, declared: Option<&str>) -> Result<Identity, AuthError> {
        let raw = declared.ok_or(AuthError::AccountRequired)?;
        let account =
            AccountId::parse(raw.trim()).ok_or_else(|| AuthError::InvalidAccount(raw.to_string()))?;

        let is_authority = account == self.authority;
        if is_authority && !self.allow_declared_authority {
            return Err(AuthError::AuthorityRequiresToken);
        }
        Ok(Identity { account, is_authority })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
    use serde_json::json;
    use std::collections::BTreeMap;

    const SECRET: &str = "ledger-test-secret";
    const ADMIN_SUB: &str = "admin@bookmaker";

    fn token(claims: serde_json::Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn token_mode() -> Authenticator {
        let config = AuthConfig { secret: Some(SECRET.into()), ..Default::default() };
        Authenticator::new(&config, AccountId::from_subject(ADMIN_SUB)).unwrap()
    }

    fn declared_mode(allow_declared_authority: bool) -> Authenticator {
        let config = AuthConfig { allow_declared_authority, ..Default::default() };
        Authenticator::new(&config, AccountId::new([0xAA; 16])).unwrap()
    }

    fn in_an_hour() -> u64 {
        get_current_timestamp() + 3600
    }

    #[test]
    fn test_bettor_token_maps_subject_to_account() {
        let auth = token_mode();
        let jwt = token(json!({ "sub": "bettor-7", "exp": in_an_hour() }));

        let identity = auth.authenticate(Some(&jwt), None).unwrap();
        assert_eq!(identity.account, AccountId::from_subject("bettor-7"));
        assert!(!identity.is_authority);
    }

    #[test]
    fn test_declared_id_ignored_in_token_mode() {
        let auth = token_mode();
        let jwt = token(json!({ "sub": "bettor-7", "exp": in_an_hour() }));
        let other = AccountId::new([3; 16]).to_string();

        let identity = auth.authenticate(Some(&jwt), Some(&other)).unwrap();
        assert_eq!(identity.account, AccountId::from_subject("bettor-7"));
        assert_eq!(auth.authenticate(None, Some(&other)), Err(AuthError::TokenRequired));
    }

    #[test]
    fn test_authority_role_for_configured_authority() {
        let auth = token_mode();
        let jwt = token(json!({ "sub": ADMIN_SUB, "exp": in_an_hour(), "role": "authority" }));

        let identity = auth.authenticate(Some(&jwt), None).unwrap();
        assert!(identity.is_authority);
        assert_eq!(identity.account, AccountId::from_subject(ADMIN_SUB));
    }

    #[test]
    fn test_role_must_match_authority() {
        let auth = token_mode();

        // Anyone can write role=authority into a claim set; the subject decides.
        let impostor = token(json!({ "sub": "bettor-7", "exp": in_an_hour(), "role": "authority" }));
        assert_eq!(
            auth.authenticate(Some(&impostor), None),
            Err(AuthError::RoleMismatch(AccountId::from_subject("bettor-7")))
        );

        // The authority's subject without the role is refused too.
        let unmarked = token(json!({ "sub": ADMIN_SUB, "exp": in_an_hour() }));
        assert!(matches!(
            auth.authenticate(Some(&unmarked), None),
            Err(AuthError::RoleMismatch(_))
        ));
    }

    #[test]
    fn test_expiry_and_leeway() {
        let auth = token_mode();
        let now = get_current_timestamp();

        let stale = token(json!({ "sub": "bettor-7", "exp": now - 3600 }));
        assert_eq!(auth.authenticate(Some(&stale), None), Err(AuthError::Expired));

        let skewed = token(json!({ "sub": "bettor-7", "exp": now - 10 }));
        assert!(auth.authenticate(Some(&skewed), None).is_ok());
    }

    #[test]
    fn test_required_claims() {
        let auth = token_mode();

        let no_exp = token(json!({ "sub": "bettor-7" }));
        assert_eq!(
            auth.authenticate(Some(&no_exp), None),
            Err(AuthError::MissingClaim("exp".into()))
        );

        let empty_sub = token(json!({ "sub": "", "exp": in_an_hour() }));
        assert_eq!(
            auth.authenticate(Some(&empty_sub), None),
            Err(AuthError::MissingClaim("sub".into()))
        );
    }

    #[test]
    fn test_foreign_tokens_rejected() {
        let auth = token_mode();

        let forged = encode(
            &Header::default(),
            &json!({ "sub": ADMIN_SUB, "exp": in_an_hour(), "role": "authority" }),
            &EncodingKey::from_secret(b"someone-else"),
        )
        .unwrap();
        assert_eq!(auth.authenticate(Some(&forged), None), Err(AuthError::InvalidSignature));
        assert!(matches!(
            auth.authenticate(Some("not-a-jwt"), None),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_audience_checked_when_configured() {
        let config = AuthConfig {
            secret: Some(SECRET.into()),
            audience: Some("multibet".into()),
            ..Default::default()
        };
        let auth = Authenticator::new(&config, AccountId::from_subject(ADMIN_SUB)).unwrap();

        let wrong = token(json!({ "sub": "bettor-7", "exp": in_an_hour(), "aud": "casino" }));
        assert_eq!(auth.authenticate(Some(&wrong), None), Err(AuthError::InvalidAudience));

        let right = token(json!({ "sub": "bettor-7", "exp": in_an_hour(), "aud": "multibet" }));
        assert!(auth.authenticate(Some(&right), None).is_ok());
    }

    #[test]
    fn test_declared_bettor() {
        let auth = declared_mode(false);
        let bettor = AccountId::new([1; 16]);

        let identity = auth.authenticate(None, Some(&bettor.to_uuid_string())).unwrap();
        assert_eq!(identity, Identity { account: bettor, is_authority: false });

        assert_eq!(auth.authenticate(None, None), Err(AuthError::AccountRequired));
        assert_eq!(
            auth.authenticate(None, Some("nobody")),
            Err(AuthError::InvalidAccount("nobody".into()))
        );
        assert_eq!(auth.authenticate(Some("a.b.c"), None), Err(AuthError::NotConfigured));
    }

    #[test]
    fn test_declared_authority_needs_dev_flag() {
        let authority = AccountId::new([0xAA; 16]).to_string();

        assert_eq!(
            declared_mode(false).authenticate(None, Some(&authority)),
            Err(AuthError::AuthorityRequiresToken)
        );

        let dev = declared_mode(true);
        assert!(dev.allows_declared_authority());
        assert!(dev.authenticate(None, Some(&authority)).unwrap().is_authority);
    }

    #[test]
    fn test_bad_public_key() {
        let config = AuthConfig {
            public_key_pem: Some("not a pem document".into()),
            ..Default::default()
        };
        assert!(matches!(
            Authenticator::new(&config, AccountId::default()),
            Err(AuthError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: BTreeMap<&str, &str> = BTreeMap::from([
            ("MULTIBET_JWT_SECRET", "s3cret"),
            ("MULTIBET_JWT_AUDIENCE", "multibet"),
            ("MULTIBET_JWT_LEEWAY_SECS", "5"),
        ]);
        let config = AuthConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert!(config.verifies_tokens());
        assert_eq!(config.audience.as_deref(), Some("multibet"));
        assert_eq!(config.leeway_secs, 5);
        assert!(!config.allow_declared_authority);

        let bad = AuthConfig::from_lookup(|name| {
            (name == "MULTIBET_JWT_LEEWAY_SECS").then(|| "soon".to_string())
        });
        assert_eq!(
            bad.unwrap_err(),
            ConfigError::InvalidValue { name: "MULTIBET_JWT_LEEWAY_SECS", value: "soon".into() }
        );
    }
}
