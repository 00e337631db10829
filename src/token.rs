//! Authentication tokens handed to the realm by the transport layer.
//!
//! The transport extracts `Authorization: Bearer <jwt>` and the optional
//! `ES-Client-Authentication: SharedSecret <secret>` header and hands the
//! realm an already-parsed credential. The serialized JWT is treated as a
//! secret throughout; the only non-secret derived from it before validation
//! is a display principal used in log messages.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};

/// Scheme of the end-user authentication header.
pub const BEARER_SCHEME: &str = "Bearer";

/// Scheme of the client authentication header.
pub const SHARED_SECRET_SCHEME: &str = "SharedSecret";

/// A credential extracted from an incoming request.
///
/// This realm only supports [`AuthenticationToken::Jwt`]; any other variant
/// produces an unsuccessful result without touching the validation path.
#[derive(Debug)]
pub enum AuthenticationToken {
    /// A bearer JWT, optionally accompanied by a client shared secret.
    Jwt(JwtAuthenticationToken),
    /// A credential produced for some other realm type.
    Other {
        /// Scheme or type tag, for diagnostics only.
        scheme: String,
    },
}

impl AuthenticationToken {
    /// Display principal for log messages.
    pub fn principal(&self) -> &str {
        match self {
            AuthenticationToken::Jwt(token) => token.principal(),
            AuthenticationToken::Other { scheme } => scheme,
        }
    }
}

/// A bearer JWT plus the optional sidecar client credential.
pub struct JwtAuthenticationToken {
    principal: String,
    serialized_jwt: SecretString,
    client_authentication_shared_secret: Option<SecretString>,
}

impl JwtAuthenticationToken {
    /// Wrap a serialized JWT and an optional client shared secret.
    ///
    /// The display principal is derived from the *unverified* `iss` and `sub`
    /// of the payload; it is only ever used in log messages and carries no
    /// authentication weight.
    pub fn new(serialized_jwt: impl Into<String>, client_secret: Option<SecretString>) -> Self {
        let serialized_jwt = serialized_jwt.into();
        let principal = display_principal(&serialized_jwt);
        Self {
            principal,
            serialized_jwt: SecretString::new(serialized_jwt),
            client_authentication_shared_secret: client_secret,
        }
    }

    /// Display principal for log messages; not a validated identity.
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// The serialized JWT. Callers expose it only at the verification seam.
    pub fn serialized_jwt(&self) -> &SecretString {
        &self.serialized_jwt
    }

    /// The client shared secret presented alongside the JWT, if any.
    pub fn client_authentication_shared_secret(&self) -> Option<&SecretString> {
        self.client_authentication_shared_secret.as_ref()
    }
}

// Keeps the JWT and client secret out of Debug output.
impl std::fmt::Debug for JwtAuthenticationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticationToken")
            .field("principal", &self.principal)
            .field("serialized_jwt", &"<redacted>")
            .field(
                "client_authentication_shared_secret",
                &self.client_authentication_shared_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Best-effort `"<iss>/<sub>"` from the unverified payload, for logging.
fn display_principal(serialized_jwt: &str) -> String {
    let mut parts = serialized_jwt.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return "<unrecognized-jwt>".to_string(),
    };
    let decoded = match URL_SAFE_NO_PAD.decode(payload) {
        Ok(bytes) => bytes,
        Err(_) => return "<unrecognized-jwt>".to_string(),
    };
    let claims: serde_json::Value = match serde_json::from_slice(&decoded) {
        Ok(value) => value,
        Err(_) => return "<unrecognized-jwt>".to_string(),
    };
    let iss = claims.get("iss").and_then(|v| v.as_str()).unwrap_or("<no-iss>");
    let sub = claims.get("sub").and_then(|v| v.as_str()).unwrap_or("<no-sub>");
    format!("{iss}/{sub}")
}
