//! Shared test infrastructure: token minting, mock JWKS endpoints, and spy
//! collaborators for the realm's seams.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::SecretString;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jwt_realm::{
    AuthenticationResult, AuthenticationToken, ClaimSetting, JwtAuthenticationToken, Realm,
    RealmConfig, RealmError, RoleMapper, RefreshHook, User, UserData,
};

/// HMAC key shared by most test tokens.
pub const HMAC_KEY: &str = "integration-test-hmac-key-0123456789abcdef";

/// Issuer all test configurations expect.
pub const ISSUER: &str = "https://issuer.example.com";

/// Audience all test configurations expect.
pub const AUDIENCE: &str = "test-service";

/// Current Unix timestamp.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs()
}

/// Standard claims for `sub`, expiring `exp_offset_secs` from now.
pub fn base_claims(sub: &str, exp_offset_secs: i64) -> Value {
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": sub,
        "exp": (current_timestamp() as i64 + exp_offset_secs) as u64,
        "groups": ["g1"],
    })
}

/// Mint an HS256 bearer token for the given claims.
pub fn bearer_token(claims: &Value) -> AuthenticationToken {
    bearer_token_with_client_secret(claims, None)
}

/// Mint an HS256 bearer token carrying a client shared secret.
pub fn bearer_token_with_client_secret(
    claims: &Value,
    client_secret: Option<&str>,
) -> AuthenticationToken {
    let jwt = encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(HMAC_KEY.as_bytes()),
    )
    .expect("failed to encode test JWT");
    AuthenticationToken::Jwt(JwtAuthenticationToken::new(
        jwt,
        client_secret.map(|s| SecretString::new(s.to_string())),
    ))
}

/// Realm configuration for the HS256 happy path: cache on, no client auth,
/// principal read from `sub`.
pub fn realm_config(name: &str) -> RealmConfig {
    let mut config = RealmConfig::new(name, ISSUER, vec![AUDIENCE.to_string()]);
    config.hmac_key = Some(SecretString::new(HMAC_KEY.into()));
    config.claims.principal = ClaimSetting::claim("sub");
    config.cache.ttl = std::time::Duration::from_secs(600);
    config.cache.size = 100;
    config
}

/// Role mapper that returns fixed roles and counts invocations — the spy for
/// observing whether the validation path ran.
pub struct CountingRoleMapper {
    roles: Vec<String>,
    calls: AtomicUsize,
    hook: Mutex<Option<RefreshHook>>,
}

impl CountingRoleMapper {
    pub fn with_roles(roles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            roles: roles.iter().map(|r| r.to_string()).collect(),
            calls: AtomicUsize::new(0),
            hook: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Simulate a mapping-rules change, firing the realm's refresh hook.
    pub fn fire_mapping_change(&self) {
        let guard = self.hook.lock().unwrap();
        if let Some(hook) = guard.as_ref() {
            hook();
        }
    }
}

#[async_trait]
impl RoleMapper for CountingRoleMapper {
    async fn resolve_roles(&self, _user_data: &UserData) -> Result<Vec<String>, RealmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.roles.clone())
    }

    fn notify_on_change(&self, hook: RefreshHook) {
        *self.hook.lock().unwrap() = Some(hook);
    }
}

/// A minimal realm serving `lookup_user` from a fixed user table, recording
/// every lookup — the delegated-authorization collaborator.
pub struct StubLookupRealm {
    name: String,
    users: HashMap<String, User>,
    lookups: Mutex<Vec<String>>,
}

impl StubLookupRealm {
    pub fn new(name: &str, users: &[User]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            users: users
                .iter()
                .map(|u| (u.principal.clone(), u.clone()))
                .collect(),
            lookups: Mutex::new(Vec::new()),
        })
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Realm for StubLookupRealm {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        0
    }

    fn realm_type(&self) -> &'static str {
        "native"
    }

    fn supports(&self, _token: &AuthenticationToken) -> bool {
        false
    }

    async fn authenticate(
        &self,
        _token: &AuthenticationToken,
    ) -> Result<AuthenticationResult, RealmError> {
        Ok(AuthenticationResult::Continue)
    }

    async fn lookup_user(&self, username: &str) -> Result<Option<User>, RealmError> {
        self.lookups.lock().unwrap().push(username.to_string());
        Ok(self.users.get(username).cloned())
    }

    fn expire(&self, _username: &str) -> Result<(), RealmError> {
        Ok(())
    }

    fn expire_all(&self) -> Result<(), RealmError> {
        Ok(())
    }

    async fn usage_stats(&self) -> Result<Value, RealmError> {
        Ok(json!({ "name": self.name }))
    }

    fn close(&self) {}
}

/// An RSA key pair rendered as `(jwk, signing_key)` for JWKS-backed tests.
pub struct RsaTestKey {
    pub kid: String,
    pub jwk: Value,
    pub encoding_key: EncodingKey,
}

impl RsaTestKey {
    /// Generate a fresh 2048-bit key under the given `kid`.
    pub fn generate(kid: &str) -> Self {
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;
        use rsa::RsaPrivateKey;

        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate RSA key");
        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("failed to encode private key");
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).expect("unusable RSA private key PEM");

        let public_key = private_key.to_public_key();
        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
        let jwk = json!({
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": kid,
            "n": n,
            "e": e,
        });

        Self {
            kid: kid.to_string(),
            jwk,
            encoding_key,
        }
    }

    /// Mint an RS256 bearer token signed by this key.
    pub fn bearer_token(&self, claims: &Value) -> AuthenticationToken {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        let jwt = encode(&header, claims, &self.encoding_key).expect("failed to encode RS256 JWT");
        AuthenticationToken::Jwt(JwtAuthenticationToken::new(jwt, None))
    }
}

/// Serve the given JWKs from a freshly started mock server at `/jwks`.
pub async fn serve_jwks(server: &MockServer, jwks: &[&Value]) {
    let keys: Vec<Value> = jwks.iter().map(|jwk| (*jwk).clone()).collect();
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
        .mount(server)
        .await;
}
