//! Realm configuration.
//!
//! All settings are immutable after construction. Secrets (the client shared
//! secret and HMAC key material) are held as [`SecretString`] so they are
//! zeroized on drop and redacted from `Debug` output; they are deserialized
//! from plain strings but never serialized back out.

use std::collections::HashMap;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::RealmError;

/// Default clock-skew tolerance applied to `exp`/`nbf` boundaries.
pub const DEFAULT_ALLOWED_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Default time-to-live for token cache entries.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(20 * 60);

/// Default maximum number of token cache entries.
pub const DEFAULT_CACHE_SIZE: usize = 100_000;

/// Default TTL for the JWKS key-set cache.
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(600);

/// How the realm authenticates the *client* that forwarded the bearer token,
/// independently of the end-user JWT itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthenticationType {
    /// No client credential expected; presenting one is an error.
    #[default]
    None,
    /// The client must present a shared secret matching the configured one.
    SharedSecret,
}

/// Which kind of JWT this realm accepts. Surfaced in user metadata under
/// `jwt_token_type` and controls which fallback claim names apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// OpenID Connect ID Token; registered claim names apply directly.
    #[default]
    IdToken,
    /// OAuth 2.0 access token; issuers often relocate `sub`/`aud`, so the
    /// fallback claim-name map applies.
    AccessToken,
}

impl TokenType {
    /// Stable tag string, as stored in user metadata.
    pub fn value(&self) -> &'static str {
        match self {
            TokenType::IdToken => "id_token",
            TokenType::AccessToken => "access_token",
        }
    }
}

/// One claim-mapping setting: the claim to read and an optional capture
/// pattern applied to its string value(s).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimSetting {
    /// Claim name; dotted names navigate nested objects.
    pub claim: Option<String>,
    /// Optional regex; capture group 1 (or the whole match) replaces the raw
    /// value, and non-matching values are treated as absent.
    pub pattern: Option<String>,
}

impl ClaimSetting {
    /// A setting that reads `claim` verbatim.
    pub fn claim(name: impl Into<String>) -> Self {
        Self {
            claim: Some(name.into()),
            pattern: None,
        }
    }
}

/// The five claim mappings the realm consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimSettings {
    /// Principal (required at realm construction).
    pub principal: ClaimSetting,
    /// Group names fed to the role mapper.
    pub groups: ClaimSetting,
    /// Distinguished name fed to the role mapper.
    pub dn: ClaimSetting,
    /// E-mail address.
    pub mail: ClaimSetting,
    /// Human-readable full name.
    pub name: ClaimSetting,
}

/// Token cache sizing. The cache is enabled iff both values are non-zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Expire-after-write TTL; zero disables the cache.
    pub ttl: Duration,
    /// Maximum entry count; zero disables the cache.
    pub size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl CacheConfig {
    /// Whether these settings produce a live cache.
    pub fn is_enabled(&self) -> bool {
        self.ttl > Duration::ZERO && self.size > 0
    }
}

/// Immutable configuration for one JWT realm instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmConfig {
    /// Realm instance name, used in log lines and error messages.
    pub name: String,
    /// Position in the realm chain, surfaced in usage stats.
    pub order: i32,
    /// Expected `iss` claim value.
    pub allowed_issuer: String,
    /// Accepted `aud` values; the token's audience must intersect these.
    pub allowed_audiences: Vec<String>,
    /// Signature algorithms accepted in the JWT header.
    pub allowed_signature_algorithms: Vec<Algorithm>,
    /// Kind of JWT this realm accepts.
    pub token_type: TokenType,
    /// Tolerance added to the `exp` boundary and subtracted from `nbf`.
    pub allowed_clock_skew: Duration,
    /// Copy allowed claims into user metadata under `jwt_claim_<name>`.
    pub populate_user_metadata: bool,
    /// Client-authentication scheme.
    pub client_authentication_type: ClientAuthenticationType,
    /// Shared secret, required iff the scheme is `shared_secret`.
    #[serde(
        default,
        skip_serializing,
        deserialize_with = "deserialize_opt_secret"
    )]
    pub client_authentication_shared_secret: Option<SecretString>,
    /// Token cache sizing.
    pub cache: CacheConfig,
    /// Claim mappings.
    pub claims: ClaimSettings,
    /// Aliases for registered claim names, applied for `access_token` realms
    /// (e.g. `{"sub": "client_id"}`).
    pub fallback_claims: HashMap<String, String>,
    /// Symmetric key for the HS* algorithm family.
    #[serde(
        default,
        skip_serializing,
        deserialize_with = "deserialize_opt_secret"
    )]
    pub hmac_key: Option<SecretString>,
    /// JWKS endpoint for asymmetric algorithm families.
    pub jwks_uri: Option<String>,
    /// TTL for the fetched JWKS key set.
    pub jwks_cache_ttl: Duration,
    /// Names of realms role resolution is delegated to, in lookup order.
    /// Empty means this realm performs its own role mapping.
    pub authorization_realms: Vec<String>,
}

impl RealmConfig {
    /// A configuration with the common defaults filled in: `sub` as the
    /// principal claim, `groups` for groups, a 60s clock skew, and the cache
    /// enabled at its default sizing.
    pub fn new(
        name: impl Into<String>,
        allowed_issuer: impl Into<String>,
        allowed_audiences: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            order: 0,
            allowed_issuer: allowed_issuer.into(),
            allowed_audiences,
            allowed_signature_algorithms: vec![Algorithm::HS256],
            token_type: TokenType::IdToken,
            allowed_clock_skew: DEFAULT_ALLOWED_CLOCK_SKEW,
            populate_user_metadata: true,
            client_authentication_type: ClientAuthenticationType::None,
            client_authentication_shared_secret: None,
            cache: CacheConfig::default(),
            claims: ClaimSettings::default(),
            fallback_claims: HashMap::new(),
            hmac_key: None,
            jwks_uri: None,
            jwks_cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            authorization_realms: Vec::new(),
        }
    }

    /// Validate settings that can only be checked in combination.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::Configuration`] for incompatible client-auth
    /// settings, a missing issuer/audience, or key material that does not
    /// cover the allowed algorithm families.
    pub fn validate(&self) -> Result<(), RealmError> {
        if self.allowed_issuer.is_empty() {
            return Err(RealmError::configuration(&self.name, "allowed issuer must be set"));
        }
        if self.allowed_audiences.is_empty() {
            return Err(RealmError::configuration(
                &self.name,
                "at least one allowed audience must be set",
            ));
        }
        if self.allowed_signature_algorithms.is_empty() {
            return Err(RealmError::configuration(
                &self.name,
                "at least one signature algorithm must be allowed",
            ));
        }

        let secret_present = self
            .client_authentication_shared_secret
            .as_ref()
            .is_some_and(|s| !s.expose_secret().is_empty());
        match self.client_authentication_type {
            ClientAuthenticationType::SharedSecret if !secret_present => {
                return Err(RealmError::configuration(
                    &self.name,
                    "client authentication type is [shared_secret], \
                     but no shared secret is configured",
                ));
            }
            ClientAuthenticationType::None if secret_present => {
                return Err(RealmError::configuration(
                    &self.name,
                    "client authentication type is [none], \
                     but a shared secret is configured",
                ));
            }
            _ => {}
        }

        let wants_hmac = self
            .allowed_signature_algorithms
            .iter()
            .any(|a| is_hmac_algorithm(*a));
        let wants_pkc = self
            .allowed_signature_algorithms
            .iter()
            .any(|a| !is_hmac_algorithm(*a));
        if wants_hmac && self.hmac_key.is_none() {
            return Err(RealmError::configuration(
                &self.name,
                "an HMAC algorithm is allowed, but no HMAC key is configured",
            ));
        }
        if wants_pkc && self.jwks_uri.is_none() {
            return Err(RealmError::configuration(
                &self.name,
                "an asymmetric algorithm is allowed, but no JWKS endpoint is configured",
            ));
        }
        Ok(())
    }
}

/// Whether `alg` belongs to the symmetric HS* family.
pub(crate) fn is_hmac_algorithm(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

fn deserialize_opt_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    // Treat an empty string the same as an absent secret.
    Ok(value.filter(|s| !s.is_empty()).map(SecretString::new))
}
