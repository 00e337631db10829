//! JWT validation infrastructure.
//!
//! Two layers:
//!
//! - [`jwks`] fetches and caches the JSON Web Key Set for asymmetric
//!   signature families, and notices key rotation.
//! - [`authenticator`] owns the key material (symmetric and JWKS-backed),
//!   verifies signatures against the configured algorithm allowlist, and
//!   checks the standard temporal and identity claims with clock-skew
//!   tolerance.
//!
//! The authenticator is constructed with a cache-invalidation hook: any key
//! rotation it observes fires the hook exactly once per change event, so the
//! realm's token cache never outlives the keys that minted its entries.

pub mod authenticator;
pub mod jwks;

pub use authenticator::JwtAuthenticator;
pub use jwks::JwksClient;
