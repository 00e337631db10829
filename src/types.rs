//! Core authentication types: users, results, and role-mapping inputs.

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// An authenticated user as produced by the realm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The authenticated subject identifier.
    pub principal: String,
    /// Resolved role names.
    pub roles: Vec<String>,
    /// Human-readable full name, if a name claim was mapped.
    pub full_name: Option<String>,
    /// E-mail address, if a mail claim was mapped.
    pub email: Option<String>,
    /// Filtered claim metadata (see the metadata builder).
    pub metadata: HashMap<String, serde_json::Value>,
    /// Always `true` for users minted by this realm.
    pub enabled: bool,
}

impl User {
    /// A user with the given principal and roles and no optional fields.
    pub fn new(principal: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            principal: principal.into(),
            roles,
            full_name: None,
            email: None,
            metadata: HashMap::new(),
            enabled: true,
        }
    }
}

/// A cached authenticated user together with the adjusted JWT expiration
/// (`exp + allowed_clock_skew`), used to notice the JWT expiring before the
/// cache entry does.
#[derive(Debug, Clone)]
pub struct ExpiringUser {
    /// The cached user.
    pub user: User,
    /// Wall-clock instant after which the underlying JWT is no longer valid.
    pub exp: SystemTime,
}

/// Inputs handed to the role mapper: everything it may key mapping rules on.
#[derive(Debug, Clone)]
pub struct UserData {
    /// Authenticated principal.
    pub principal: String,
    /// Distinguished name, if a dn claim was mapped.
    pub dn: Option<String>,
    /// Group names, if a groups claim was mapped.
    pub groups: Vec<String>,
    /// Filtered claim metadata.
    pub metadata: HashMap<String, serde_json::Value>,
    /// Name of the realm performing the mapping.
    pub realm: String,
}

/// Outcome of an authentication attempt.
///
/// Validation failures are values on this type, not errors: a rejected token
/// is a normal outcome. The realm never emits [`AuthenticationResult::Continue`];
/// the variant exists because the surrounding framework's realm chain uses it.
#[derive(Debug)]
pub enum AuthenticationResult {
    /// The credential was verified and a user resolved.
    Success(User),
    /// The credential was rejected.
    Unsuccessful {
        /// Operator-facing message; never contains secrets.
        message: String,
        /// Diagnostic cause, logged at debug level only.
        cause: Option<AuthError>,
    },
    /// The realm cannot judge this credential; try the next realm.
    Continue,
}

impl AuthenticationResult {
    /// A successful result carrying `user`.
    pub fn success(user: User) -> Self {
        AuthenticationResult::Success(user)
    }

    /// An unsuccessful result with a message and optional diagnostic cause.
    pub fn unsuccessful(message: impl Into<String>, cause: Option<AuthError>) -> Self {
        AuthenticationResult::Unsuccessful {
            message: message.into(),
            cause,
        }
    }

    /// Whether this result carries an authenticated user.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthenticationResult::Success(_))
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthenticationResult::Success(user) => Some(user),
            _ => None,
        }
    }
}
