//! Error types for the JWT realm.
//!
//! Failures travel on two channels, and the distinction matters:
//!
//! - **Validation failures** (`AuthError`, `ClientAuthError`, `ClaimError`)
//!   mean the presented credential was rejected. They are surfaced as an
//!   [`AuthenticationResult::Unsuccessful`](crate::types::AuthenticationResult)
//!   value with the error attached as the diagnostic cause, and are only ever
//!   logged at debug level.
//! - **Infrastructure failures** (`RealmError`) mean the realm itself could
//!   not carry out the operation — broken configuration, uninitialized state,
//!   a role-mapper or delegated-authorization realm raising. These propagate
//!   through the `Err` channel of the async operation.
//!
//! Configuration errors are raised at construction time and are fatal to the
//! realm factory.

use thiserror::Error;

/// Result alias for realm-level (infrastructure) operations.
pub type RealmResult<T> = Result<T, RealmError>;

/// Infrastructure and configuration failures.
#[derive(Debug, Error)]
pub enum RealmError {
    /// Invalid settings detected while constructing the realm.
    #[error("realm [{realm}] configuration error: {message}")]
    Configuration {
        /// Realm instance name.
        realm: String,
        /// What was wrong with the settings.
        message: String,
    },

    /// An operation was invoked before `initialize` was called.
    #[error("realm [{0}] has not been initialized")]
    NotInitialized(String),

    /// `initialize` was called a second time.
    #[error("realm [{0}] has already been initialized")]
    AlreadyInitialized(String),

    /// The role mapper raised while resolving roles.
    #[error("realm [{realm}] role mapping failed: {message}")]
    RoleMapping {
        /// Realm instance name.
        realm: String,
        /// Underlying failure description.
        message: String,
    },

    /// A delegated authorization realm raised during lookup.
    #[error("realm [{realm}] delegated authorization failed: {message}")]
    Delegation {
        /// Realm instance name.
        realm: String,
        /// Underlying failure description.
        message: String,
    },
}

impl RealmError {
    /// Shorthand for a construction-time configuration error.
    pub fn configuration(realm: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            realm: realm.into(),
            message: message.into(),
        }
    }
}

/// JWT validation failures.
///
/// Every variant here turns into an unsuccessful authentication result, never
/// an `Err` — a rejected token is a normal outcome, not a realm failure.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The input could not be parsed as a JWT.
    #[error("malformed JWT: {0}")]
    Malformed(String),

    /// The `alg` header is not in the realm's allowlist.
    #[error("signature algorithm [{0}] is not allowed")]
    AlgorithmNotAllowed(String),

    /// No configured key verified the signature.
    #[error("JWT signature verification failed")]
    InvalidSignature,

    /// The `iss` claim did not match the configured issuer.
    #[error("issuer mismatch")]
    IssuerMismatch,

    /// The `aud` claim did not intersect the configured audiences.
    #[error("audience mismatch")]
    AudienceMismatch,

    /// `exp` (plus allowed clock skew) is in the past.
    #[error("JWT has expired")]
    Expired,

    /// `nbf` (minus allowed clock skew) is in the future.
    #[error("JWT is not valid yet")]
    NotYetValid,

    /// The signing keys could not be retrieved (e.g. JWKS endpoint failure).
    #[error("signing key retrieval failed: {0}")]
    KeySource(String),

    /// The sidecar client credential was rejected.
    #[error(transparent)]
    ClientAuth(#[from] ClientAuthError),

    /// A configured claim had an unusable shape.
    #[error(transparent)]
    Claim(#[from] ClaimError),
}

/// Client-authentication failures.
///
/// Messages deliberately never include the configured secret.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientAuthError {
    /// Scheme is `none` but the request carried a client secret.
    #[error("client authentication is disabled, but a client shared secret was presented")]
    UnexpectedSecret,

    /// Scheme is `shared_secret` but no secret was presented.
    #[error("a client shared secret is required, but none was presented")]
    MissingSecret,

    /// The presented secret did not match the configured one.
    #[error("the presented client shared secret did not match")]
    SecretMismatch,
}

/// Claim extraction failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
    /// The claim value could not be read with the expected type.
    #[error("claim [{claim}] has an unexpected shape: {detail}")]
    WrongShape {
        /// Claim name as resolved by the parser.
        claim: String,
        /// What was found instead.
        detail: String,
    },
}

impl ClaimError {
    pub(crate) fn wrong_shape(claim: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::WrongShape {
            claim: claim.into(),
            detail: detail.into(),
        }
    }
}
