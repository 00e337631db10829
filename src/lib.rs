//! # jwt-realm — JWT Bearer-Token Authentication Realm
//!
//! A pluggable identity provider that accepts an incoming request's bearer
//! JWT plus an optional client-authentication secret, validates the token,
//! derives a user principal and roles from configured claim mappings, and
//! returns an authentication result to the surrounding framework.
//!
//! ## Key Features
//!
//! - **JWT validation** — signature verification against symmetric HMAC keys
//!   and/or a JWKS endpoint, with issuer/audience checks and clock-skew
//!   tolerant `exp`/`nbf` handling
//! - **Token cache** — bounded, TTL-expiring cache keyed by the SHA-256
//!   fingerprint of the raw token, serving repeat authentications without
//!   re-verification
//! - **Client authentication** — an orthogonal shared-secret check with
//!   constant-time comparison
//! - **Claim mapping** — configurable claim-path expressions with fallback
//!   names and optional capture patterns for principal, groups, dn, mail,
//!   and name
//! - **Delegated authorization** — role resolution deferred to other
//!   configured realms, behind a license gate
//! - **Key-rotation safety** — JWKS refreshes and HMAC key swaps invalidate
//!   the token cache through a per-realm hook
//!
//! ## Architecture
//!
//! - [`realm`] — the [`JwtRealm`] orchestrator and the [`Realm`] /
//!   [`RoleMapper`] seams
//! - [`jwt`] — signature and standard-claim validation, JWKS fetching
//! - [`cache`] — the fingerprint-keyed token cache
//! - [`claims`] — claims set and claim parsers
//! - [`client_auth`] — the client shared-secret check
//! - [`metadata`] — claim-to-user-metadata filtering
//! - [`delegated`] — delegated authorization strategy
//! - [`config`] / [`types`] / [`error`] — settings, core types, and the
//!   two-channel error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use secrecy::SecretString;
//! use jwt_realm::{
//!     AuthenticationToken, ClaimSetting, JwtAuthenticationToken, JwtRealm,
//!     LicenseState, Realm, RealmConfig, RealmError, RoleMapper, UserData,
//! };
//!
//! struct GroupRoleMapper;
//!
//! #[async_trait]
//! impl RoleMapper for GroupRoleMapper {
//!     async fn resolve_roles(&self, user_data: &UserData) -> Result<Vec<String>, RealmError> {
//!         Ok(user_data.groups.iter().map(|g| format!("role_{g}")).collect())
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = RealmConfig::new(
//!     "jwt1",
//!     "https://issuer.example.com",
//!     vec!["my-service".to_string()],
//! );
//! config.hmac_key = Some(SecretString::new("shared-hmac-key-material".into()));
//! config.claims.principal = ClaimSetting::claim("sub");
//!
//! let realm = JwtRealm::new(config, Arc::new(GroupRoleMapper))?;
//! realm.initialize(&[], &LicenseState::new(false))?;
//!
//! let token = AuthenticationToken::Jwt(JwtAuthenticationToken::new(
//!     "eyJ0eXAiOiJKV1QiLCJhbGciOiJIUzI1NiJ9...".to_string(),
//!     None,
//! ));
//! let result = realm.authenticate(&token).await?;
//! if let Some(user) = result.user() {
//!     println!("authenticated {} with roles {:?}", user.principal, user.roles);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod claims;
pub mod client_auth;
pub mod config;
pub mod delegated;
pub mod error;
pub mod jwt;
pub mod metadata;
pub mod realm;
pub mod token;
pub mod types;

#[doc(inline)]
pub use cache::{JwtCache, TokenFingerprint};
#[doc(inline)]
pub use claims::{ClaimParser, ClaimsSet};
#[doc(inline)]
pub use client_auth::validate_client_authentication;
#[doc(inline)]
pub use config::{
    CacheConfig, ClaimSetting, ClaimSettings, ClientAuthenticationType, RealmConfig, TokenType,
};
#[doc(inline)]
pub use delegated::{DelegatedAuthorizationSupport, LicenseState};
#[doc(inline)]
pub use error::{AuthError, ClaimError, ClientAuthError, RealmError, RealmResult};
#[doc(inline)]
pub use jwt::{JwksClient, JwtAuthenticator};
#[doc(inline)]
pub use metadata::build_user_metadata;
#[doc(inline)]
pub use realm::{JwtRealm, Realm, RefreshHook, RoleMapper, JWT_REALM_TYPE};
#[doc(inline)]
pub use token::{AuthenticationToken, JwtAuthenticationToken};
#[doc(inline)]
pub use types::{AuthenticationResult, ExpiringUser, User, UserData};
