//! JWT signature and standard-claim validation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::claims::ClaimsSet;
use crate::config::{is_hmac_algorithm, RealmConfig, TokenType};
use crate::error::{AuthError, RealmError};
use crate::jwt::jwks::JwksClient;
use crate::realm::RefreshHook;
use crate::token::JwtAuthenticationToken;

/// Validates serialized JWTs against the realm's configured keys, algorithms,
/// issuer, audiences, and temporal bounds.
///
/// Owns the key material: HMAC keys for the HS* family (swappable at runtime)
/// and a [`JwksClient`] for asymmetric families. Any observed key change —
/// a JWKS refresh replacing keys or an HMAC key swap — fires the
/// cache-invalidation hook supplied at construction, exactly once per change.
pub struct JwtAuthenticator {
    realm_name: String,
    token_type: TokenType,
    allowed_algorithms: Vec<Algorithm>,
    allowed_issuer: String,
    allowed_audiences: Vec<String>,
    allowed_clock_skew: Duration,
    fallback_claim_names: HashMap<String, String>,
    hmac_keys: RwLock<Vec<DecodingKey>>,
    jwks_client: Option<JwksClient>,
    reload_hook: RefreshHook,
    verifications: AtomicU64,
}

impl JwtAuthenticator {
    /// Build the authenticator from realm configuration.
    ///
    /// `reload_hook` is the realm's cache invalidation; it is shared with the
    /// JWKS client for rotation events.
    pub fn new(config: &RealmConfig, reload_hook: RefreshHook) -> Result<Self, RealmError> {
        let hmac_keys = match &config.hmac_key {
            Some(key) => vec![DecodingKey::from_secret(key.expose_secret().as_bytes())],
            None => Vec::new(),
        };
        let jwks_client = config.jwks_uri.as_ref().map(|uri| {
            JwksClient::new(uri.clone(), config.jwks_cache_ttl, Some(reload_hook.clone()))
        });

        // Access tokens frequently relocate the registered claims; ID tokens
        // use them as-is.
        let fallback_claim_names = match config.token_type {
            TokenType::IdToken => HashMap::new(),
            TokenType::AccessToken => {
                let mut names = HashMap::new();
                names.insert("sub".to_string(), "sub".to_string());
                names.insert("aud".to_string(), "aud".to_string());
                names.extend(config.fallback_claims.clone());
                names
            }
        };

        Ok(Self {
            realm_name: config.name.clone(),
            token_type: config.token_type,
            allowed_algorithms: config.allowed_signature_algorithms.clone(),
            allowed_issuer: config.allowed_issuer.clone(),
            allowed_audiences: config.allowed_audiences.clone(),
            allowed_clock_skew: config.allowed_clock_skew,
            fallback_claim_names,
            hmac_keys: RwLock::new(hmac_keys),
            jwks_client,
            reload_hook,
            verifications: AtomicU64::new(0),
        })
    }

    /// Aliases for registered claim names, consumed by claim parsers.
    pub fn fallback_claim_names(&self) -> &HashMap<String, String> {
        &self.fallback_claim_names
    }

    /// The token type tag this realm accepts.
    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    /// Validate a serialized JWT and return its claims.
    ///
    /// Checks, in order: parseability, the algorithm allowlist, the signature
    /// against every candidate key, then issuer, audience, `exp`, and `nbf`
    /// with the configured clock-skew tolerance. When all candidate keys fail
    /// the signature check and a JWKS endpoint is configured, the key set is
    /// refreshed once and validation retried — the signing key may have
    /// rotated since the last fetch.
    ///
    /// # Errors
    ///
    /// An [`AuthError`] naming the first check that failed.
    pub async fn authenticate(
        &self,
        token: &JwtAuthenticationToken,
    ) -> Result<ClaimsSet, AuthError> {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        let serialized = token.serialized_jwt().expose_secret();
        let header =
            decode_header(serialized).map_err(|e| AuthError::Malformed(e.to_string()))?;
        if !self.allowed_algorithms.contains(&header.alg) {
            return Err(AuthError::AlgorithmNotAllowed(format!("{:?}", header.alg)));
        }

        match self.verify(serialized, &header).await {
            Err(err) if self.should_retry_with_fresh_jwks(&header, &err) => {
                debug!(
                    realm = %self.realm_name,
                    error = %err,
                    "JWT verification failed, refreshing JWKS and retrying"
                );
                let client = self
                    .jwks_client
                    .as_ref()
                    .expect("retry implies a JWKS client");
                client.refresh().await?;
                self.verify(serialized, &header).await
            }
            other => other,
        }
    }

    /// Swap the HMAC key material, invalidating any cached authentications.
    pub fn rotate_hmac_key(&self, key: &SecretString) {
        let mut keys = self
            .hmac_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *keys = vec![DecodingKey::from_secret(key.expose_secret().as_bytes())];
        drop(keys);
        debug!(realm = %self.realm_name, "HMAC key material replaced");
        (self.reload_hook)();
    }

    /// Shut down: the JWKS client stops fetching and drops its key cache.
    pub fn close(&self) {
        if let Some(client) = &self.jwks_client {
            client.close();
        }
    }

    /// Number of verification attempts since construction. Diagnostic only.
    pub(crate) fn verification_count(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }

    fn should_retry_with_fresh_jwks(&self, header: &Header, err: &AuthError) -> bool {
        self.jwks_client.is_some()
            && !is_hmac_algorithm(header.alg)
            && matches!(err, AuthError::InvalidSignature | AuthError::KeySource(_))
    }

    async fn verify(&self, serialized: &str, header: &Header) -> Result<ClaimsSet, AuthError> {
        let keys = self.candidate_keys(header).await?;
        if keys.is_empty() {
            return Err(AuthError::KeySource(format!(
                "no key available for algorithm [{:?}] kid=[{}]",
                header.alg,
                header.kid.as_deref().unwrap_or("<none>")
            )));
        }

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.allowed_issuer]);
        let audiences: Vec<&str> = self.allowed_audiences.iter().map(String::as_str).collect();
        validation.set_audience(&audiences);
        validation.leeway = self.allowed_clock_skew.as_secs();
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        for key in &keys {
            match decode::<serde_json::Value>(serialized, key, &validation) {
                Ok(data) => {
                    return match data.claims {
                        serde_json::Value::Object(map) => Ok(ClaimsSet::new(map)),
                        _ => Err(AuthError::Malformed(
                            "JWT payload is not a claims object".to_string(),
                        )),
                    };
                }
                // Key-specific failures: the next candidate key may verify.
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(map_validation_error(&e)),
            }
        }
        Err(AuthError::InvalidSignature)
    }

    async fn candidate_keys(&self, header: &Header) -> Result<Vec<DecodingKey>, AuthError> {
        if is_hmac_algorithm(header.alg) {
            return Ok(self
                .hmac_keys
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone());
        }
        let client = self.jwks_client.as_ref().ok_or_else(|| {
            AuthError::KeySource("no JWKS endpoint configured for asymmetric algorithms".to_string())
        })?;
        let jwks = client.get_jwks().await?;
        let keys = match &header.kid {
            Some(kid) => jwks
                .find(kid)
                .and_then(|jwk| DecodingKey::from_jwk(jwk).ok())
                .into_iter()
                .collect(),
            None => jwks
                .keys
                .iter()
                .filter_map(|jwk| DecodingKey::from_jwk(jwk).ok())
                .collect(),
        };
        Ok(keys)
    }
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("realm_name", &self.realm_name)
            .field("token_type", &self.token_type)
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("allowed_issuer", &self.allowed_issuer)
            .field("allowed_audiences", &self.allowed_audiences)
            .field("jwks_client", &self.jwks_client)
            .finish()
    }
}

fn map_validation_error(error: &jsonwebtoken::errors::Error) -> AuthError {
    match error.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
        ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "iss" => AuthError::IssuerMismatch,
            "aud" => AuthError::AudienceMismatch,
            other => AuthError::Malformed(format!("missing required claim [{other}]")),
        },
        _ => AuthError::Malformed(error.to_string()),
    }
}
