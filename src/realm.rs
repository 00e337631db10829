//! The JWT realm: composition of client authentication, the token cache, JWT
//! validation, claim parsing, and role resolution.
//!
//! A [`JwtRealm`] is constructed from immutable configuration, wired to the
//! other realms via [`initialize`](JwtRealm::initialize), and then serves
//! authentication until [`close`](Realm::close). The token cache is the only
//! mutable shared state; it is invalidated whenever the JWT authenticator
//! observes a key-material change or the role mapper reports that its
//! mappings changed.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, error, trace};

use crate::cache::{JwtCache, TokenFingerprint};
use crate::claims::{ClaimParser, ClaimsSet};
use crate::client_auth::validate_client_authentication;
use crate::config::RealmConfig;
use crate::delegated::{DelegatedAuthorizationSupport, LicenseState};
use crate::error::{ClaimError, RealmError};
use crate::jwt::JwtAuthenticator;
use crate::metadata::build_user_metadata;
use crate::token::{AuthenticationToken, JwtAuthenticationToken};
use crate::types::{AuthenticationResult, ExpiringUser, User, UserData};

/// Callback fired when cached authentications must be discarded: key
/// rotation, role-mapping changes, or an explicit `expire_all`.
pub type RefreshHook = Arc<dyn Fn() + Send + Sync>;

/// A pluggable identity provider in the authentication framework.
///
/// [`JwtRealm`] implements this; delegated authorization consumes it to look
/// users up in other configured realms.
#[async_trait]
pub trait Realm: Send + Sync {
    /// Realm instance name, unique within the framework.
    fn name(&self) -> &str;

    /// Position in the realm chain.
    fn order(&self) -> i32;

    /// Realm type tag (e.g. `"jwt"`).
    fn realm_type(&self) -> &'static str;

    /// Whether this realm can judge the given credential at all.
    fn supports(&self, token: &AuthenticationToken) -> bool;

    /// Authenticate a credential.
    ///
    /// Rejected credentials are `Ok(Unsuccessful { .. })`; the `Err` channel
    /// is reserved for infrastructure failures.
    async fn authenticate(
        &self,
        token: &AuthenticationToken,
    ) -> Result<AuthenticationResult, RealmError>;

    /// Look up a user by name without a credential (run-as, delegated
    /// authorization). Realms that cannot do this return `Ok(None)`.
    async fn lookup_user(&self, username: &str) -> Result<Option<User>, RealmError>;

    /// Drop cached authentications for one principal.
    fn expire(&self, username: &str) -> Result<(), RealmError>;

    /// Drop all cached authentications.
    fn expire_all(&self) -> Result<(), RealmError>;

    /// Usage statistics as a JSON-shaped mapping.
    async fn usage_stats(&self) -> Result<Value, RealmError>;

    /// Release held resources. Safe to call on an uninitialized realm.
    fn close(&self);
}

/// Resolves role names for an authenticated user.
///
/// The realm registers a [`RefreshHook`] through
/// [`notify_on_change`](RoleMapper::notify_on_change) so mapping changes
/// invalidate the token cache; neither side owns the other.
#[async_trait]
pub trait RoleMapper: Send + Sync {
    /// Map `(principal, dn, groups, metadata)` to a role set.
    ///
    /// # Errors
    ///
    /// A failure here is an infrastructure failure and propagates through the
    /// realm's `Err` channel, not as an unsuccessful result.
    async fn resolve_roles(&self, user_data: &UserData) -> Result<Vec<String>, RealmError>;

    /// Register a callback to run whenever the mapping rules change.
    fn notify_on_change(&self, hook: RefreshHook) {
        let _ = hook;
    }
}

/// JWT bearer-token authentication realm.
///
/// Authenticates serialized JWTs presented as bearer credentials, optionally
/// guarded by a client shared secret, and derives a user principal and roles
/// from configured claim mappings. Repeat authentications of the same token
/// are served from a bounded TTL cache keyed by the token's SHA-256
/// fingerprint.
pub struct JwtRealm {
    config: RealmConfig,
    role_mapper: Arc<dyn RoleMapper>,
    jwt_authenticator: JwtAuthenticator,
    jwt_cache: Option<Arc<JwtCache>>,
    claim_parser_principal: ClaimParser,
    claim_parser_groups: ClaimParser,
    claim_parser_dn: ClaimParser,
    claim_parser_mail: ClaimParser,
    claim_parser_name: ClaimParser,
    delegated: RwLock<Option<DelegatedAuthorizationSupport>>,
}

/// Realm type tag for JWT realms.
pub const JWT_REALM_TYPE: &str = "jwt";

impl JwtRealm {
    /// Construct the realm from configuration and a role mapper.
    ///
    /// Registers the cache-invalidation hook with the role mapper and the JWT
    /// authenticator, so mapping changes and key rotation both clear the
    /// token cache. The realm refuses to serve until
    /// [`initialize`](Self::initialize) has run.
    ///
    /// # Errors
    ///
    /// [`RealmError::Configuration`] for invalid settings, including a
    /// principal claim that cannot be resolved.
    pub fn new(config: RealmConfig, role_mapper: Arc<dyn RoleMapper>) -> Result<Self, RealmError> {
        config.validate()?;

        let jwt_cache = if config.cache.is_enabled() {
            Some(Arc::new(JwtCache::new(config.cache.ttl, config.cache.size)))
        } else {
            debug!(realm = %config.name, "JWT cache is disabled by configuration");
            None
        };

        let refresh_hook: RefreshHook = {
            let cache = jwt_cache.clone();
            let realm_name = config.name.clone();
            Arc::new(move || invalidate_jwt_cache(&realm_name, cache.as_deref()))
        };
        role_mapper.notify_on_change(refresh_hook.clone());

        let jwt_authenticator = JwtAuthenticator::new(&config, refresh_hook)?;
        let fallback_names = jwt_authenticator.fallback_claim_names();
        let principal_fallbacks = vec![fallback_names
            .get("sub")
            .cloned()
            .unwrap_or_else(|| "sub".to_string())];
        let groups_fallbacks = vec![fallback_names
            .get("groups")
            .cloned()
            .unwrap_or_else(|| "groups".to_string())];

        let claim_parser_principal = ClaimParser::for_setting(
            &config,
            "claims.principal",
            &config.claims.principal,
            &principal_fallbacks,
            true,
        )?;
        let claim_parser_groups = ClaimParser::for_setting(
            &config,
            "claims.groups",
            &config.claims.groups,
            &groups_fallbacks,
            false,
        )?;
        let claim_parser_dn =
            ClaimParser::for_setting(&config, "claims.dn", &config.claims.dn, &[], false)?;
        let claim_parser_mail =
            ClaimParser::for_setting(&config, "claims.mail", &config.claims.mail, &[], false)?;
        let claim_parser_name =
            ClaimParser::for_setting(&config, "claims.name", &config.claims.name, &[], false)?;

        Ok(Self {
            config,
            role_mapper,
            jwt_authenticator,
            jwt_cache,
            claim_parser_principal,
            claim_parser_groups,
            claim_parser_dn,
            claim_parser_mail,
            claim_parser_name,
            delegated: RwLock::new(None),
        })
    }

    /// Wire delegated authorization from the full realm list and the license.
    ///
    /// Must be called exactly once before the realm serves requests.
    ///
    /// # Errors
    ///
    /// [`RealmError::AlreadyInitialized`] on a second call;
    /// [`RealmError::Configuration`] when a configured authorization realm
    /// does not exist.
    pub fn initialize(
        &self,
        all_realms: &[Arc<dyn Realm>],
        license: &LicenseState,
    ) -> Result<(), RealmError> {
        let mut guard = self
            .delegated
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Err(RealmError::AlreadyInitialized(self.config.name.clone()));
        }
        *guard = Some(DelegatedAuthorizationSupport::new(
            all_realms,
            &self.config,
            license,
        )?);
        Ok(())
    }

    fn delegated_support(&self) -> Result<DelegatedAuthorizationSupport, RealmError> {
        let guard = self
            .delegated
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(delegated) => Ok(delegated.clone()),
            None => {
                error!(realm = %self.config.name, "realm used before initialize");
                Err(RealmError::NotInitialized(self.config.name.clone()))
            }
        }
    }

    fn ensure_initialized(&self) -> Result<(), RealmError> {
        self.delegated_support().map(drop)
    }

    fn try_authenticate_with_cache(
        &self,
        token_principal: &str,
        cache: &JwtCache,
        key: &TokenFingerprint,
    ) -> Option<User> {
        match cache.get(key) {
            None => {
                trace!(
                    realm = %self.config.name,
                    token = %token_principal,
                    "JWT cache miss"
                );
                None
            }
            Some(expiring) => {
                if SystemTime::now() < expiring.exp {
                    trace!(
                        realm = %self.config.name,
                        token = %token_principal,
                        principal = %expiring.user.principal,
                        "JWT cache hit"
                    );
                    Some(expiring.user)
                } else {
                    // The JWT expired before its cache entry; removal is left
                    // to the TTL/size policy.
                    trace!(
                        realm = %self.config.name,
                        token = %token_principal,
                        principal = %expiring.user.principal,
                        "JWT cache entry holds an expired JWT"
                    );
                    None
                }
            }
        }
    }

    fn claim_failure(
        &self,
        setting: &str,
        token_principal: &str,
        cause: ClaimError,
    ) -> AuthenticationResult {
        let message = format!(
            "realm [{}] could not parse [{setting}] for token=[{token_principal}]",
            self.config.name
        );
        debug!(realm = %self.config.name, token = %token_principal, error = %cause, "claim parsing failed");
        AuthenticationResult::unsuccessful(message, Some(cause.into()))
    }

    async fn process_validated_jwt(
        &self,
        token_principal: &str,
        cache_key: Option<TokenFingerprint>,
        claims: &ClaimsSet,
        delegated: &DelegatedAuthorizationSupport,
    ) -> Result<AuthenticationResult, RealmError> {
        let principal = match self.claim_parser_principal.get_claim_value(claims) {
            Ok(Some(principal)) if !principal.is_empty() => principal,
            Ok(_) => {
                let message = format!(
                    "realm [{}] no principal found for token=[{token_principal}] parser=[{}]",
                    self.config.name, self.claim_parser_principal
                );
                debug!(realm = %self.config.name, token = %token_principal, "no principal in JWT claims");
                return Ok(AuthenticationResult::unsuccessful(message, None));
            }
            Err(cause) => {
                return Ok(self.claim_failure("claims.principal", token_principal, cause));
            }
        };

        let result = if delegated.has_delegation() {
            delegated.resolve(&principal).await?
        } else {
            let metadata = build_user_metadata(
                claims,
                self.jwt_authenticator.token_type(),
                self.config.populate_user_metadata,
            );
            let groups = match self.claim_parser_groups.get_claim_values(claims) {
                Ok(groups) => groups,
                Err(cause) => return Ok(self.claim_failure("claims.groups", token_principal, cause)),
            };
            let dn = match self.claim_parser_dn.get_claim_value(claims) {
                Ok(dn) => dn,
                Err(cause) => return Ok(self.claim_failure("claims.dn", token_principal, cause)),
            };
            let mail = match self.claim_parser_mail.get_claim_value(claims) {
                Ok(mail) => mail,
                Err(cause) => return Ok(self.claim_failure("claims.mail", token_principal, cause)),
            };
            let full_name = match self.claim_parser_name.get_claim_value(claims) {
                Ok(name) => name,
                Err(cause) => return Ok(self.claim_failure("claims.name", token_principal, cause)),
            };
            let user_data = UserData {
                principal: principal.clone(),
                dn,
                groups,
                metadata: metadata.clone(),
                realm: self.config.name.clone(),
            };
            let roles = self.role_mapper.resolve_roles(&user_data).await?;
            AuthenticationResult::success(User {
                principal,
                roles,
                full_name,
                email: mail,
                metadata,
                enabled: true,
            })
        };

        if let AuthenticationResult::Success(user) = &result {
            debug!(
                realm = %self.config.name,
                principal = %user.principal,
                roles = ?user.roles,
                "authentication succeeded"
            );
            if let (Some(cache), Some(key)) = (self.jwt_cache.as_deref(), cache_key) {
                if let Some(exp) = claims.expiration_time() {
                    let adjusted =
                        UNIX_EPOCH + Duration::from_secs(exp) + self.config.allowed_clock_skew;
                    cache.put(
                        key,
                        ExpiringUser {
                            user: user.clone(),
                            exp: adjusted,
                        },
                    );
                }
            }
        }
        Ok(result)
    }

}

#[async_trait]
impl Realm for JwtRealm {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn order(&self) -> i32 {
        self.config.order
    }

    fn realm_type(&self) -> &'static str {
        JWT_REALM_TYPE
    }

    fn supports(&self, token: &AuthenticationToken) -> bool {
        matches!(token, AuthenticationToken::Jwt(_))
    }

    async fn authenticate(
        &self,
        token: &AuthenticationToken,
    ) -> Result<AuthenticationResult, RealmError> {
        let jwt_token: &JwtAuthenticationToken = match token {
            AuthenticationToken::Jwt(jwt_token) => jwt_token,
            AuthenticationToken::Other { scheme } => {
                trace!(realm = %self.config.name, scheme = %scheme, "unsupported token type");
                return Ok(AuthenticationResult::unsuccessful(
                    format!(
                        "realm [{}] does not support authentication token type [{scheme}]",
                        self.config.name
                    ),
                    None,
                ));
            }
        };
        let delegated = self.delegated_support()?;
        let token_principal = jwt_token.principal();

        if let Err(cause) = validate_client_authentication(
            self.config.client_authentication_type,
            self.config.client_authentication_shared_secret.as_ref(),
            jwt_token.client_authentication_shared_secret(),
        ) {
            let message = format!(
                "realm [{}] client authentication failed for token=[{token_principal}]",
                self.config.name
            );
            debug!(
                realm = %self.config.name,
                token = %token_principal,
                error = %cause,
                "client authentication failed"
            );
            return Ok(AuthenticationResult::unsuccessful(message, Some(cause.into())));
        }
        trace!(
            realm = %self.config.name,
            token = %token_principal,
            "client authentication succeeded"
        );

        let cache_key = self
            .jwt_cache
            .as_ref()
            .map(|_| TokenFingerprint::of(jwt_token.serialized_jwt().expose_secret().as_bytes()));
        if let (Some(cache), Some(key)) = (self.jwt_cache.as_deref(), cache_key.as_ref()) {
            if let Some(user) = self.try_authenticate_with_cache(token_principal, cache, key) {
                if delegated.has_delegation() {
                    return delegated.resolve(&user.principal).await;
                }
                return Ok(AuthenticationResult::success(user));
            }
        }

        let claims = match self.jwt_authenticator.authenticate(jwt_token).await {
            Ok(claims) => claims,
            Err(cause) => {
                let message = format!(
                    "realm [{}] JWT validation failed for token=[{token_principal}]",
                    self.config.name
                );
                debug!(
                    realm = %self.config.name,
                    token = %token_principal,
                    error = %cause,
                    "JWT validation failed"
                );
                return Ok(AuthenticationResult::unsuccessful(message, Some(cause)));
            }
        };

        self.process_validated_jwt(token_principal, cache_key, &claims, &delegated)
            .await
    }

    async fn lookup_user(&self, _username: &str) -> Result<Option<User>, RealmError> {
        self.ensure_initialized()?;
        // Run-as and delegated-authorization reverse lookups are not
        // supported by JWT realms.
        Ok(None)
    }

    fn expire(&self, username: &str) -> Result<(), RealmError> {
        self.ensure_initialized()?;
        if let Some(cache) = self.jwt_cache.as_deref() {
            trace!(realm = %self.config.name, principal = %username, "expiring JWT cache entries");
            cache.remove_if(|expiring| expiring.user.principal == username);
            trace!(realm = %self.config.name, principal = %username, "expired JWT cache entries");
        }
        Ok(())
    }

    fn expire_all(&self) -> Result<(), RealmError> {
        self.ensure_initialized()?;
        invalidate_jwt_cache(&self.config.name, self.jwt_cache.as_deref());
        Ok(())
    }

    async fn usage_stats(&self) -> Result<Value, RealmError> {
        self.ensure_initialized()?;
        let size = self
            .jwt_cache
            .as_deref()
            .map(|cache| cache.count() as i64)
            .unwrap_or(-1);
        Ok(serde_json::json!({
            "name": self.config.name,
            "order": self.config.order,
            "jwt.cache": { "size": size },
        }))
    }

    fn close(&self) {
        self.jwt_authenticator.close();
    }
}

impl std::fmt::Debug for JwtRealm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtRealm")
            .field("name", &self.config.name)
            .field("order", &self.config.order)
            .field("cache_enabled", &self.jwt_cache.is_some())
            .field("jwt_authenticator", &self.jwt_authenticator)
            .finish()
    }
}

/// Clear the cache, logging rather than propagating any trouble: keys may
/// have rotated concurrently and a failed invalidation must not take the
/// authenticator down with it.
fn invalidate_jwt_cache(realm_name: &str, cache: Option<&JwtCache>) {
    let Some(cache) = cache else {
        return;
    };
    trace!(realm = %realm_name, "invalidating JWT cache");
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        cache.invalidate_all();
    }));
    match outcome {
        Ok(()) => debug!(realm = %realm_name, "invalidated JWT cache"),
        Err(_) => tracing::warn!(realm = %realm_name, "failed to invalidate JWT cache"),
    }
}
