//! Client authentication: the second, orthogonal credential check.
//!
//! Besides the end-user JWT, the transport may forward a client credential
//! (`ES-Client-Authentication: SharedSecret <secret>`). Validation is a pure
//! function over the configured scheme and the two secrets.
//!
//! The shared-secret comparison is timing-attack resistant: both secrets are
//! digested to a fixed 32 bytes first, then compared with
//! `subtle::ConstantTimeEq`, so comparison time is independent of where a
//! mismatch occurs and of the secret lengths.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::ClientAuthenticationType;
use crate::error::ClientAuthError;

/// Validate the presented client credential against the configured scheme.
///
/// - Scheme [`None`](ClientAuthenticationType::None): the presented secret
///   must be absent or empty.
/// - Scheme [`SharedSecret`](ClientAuthenticationType::SharedSecret): the
///   presented secret must be present and match the configured one under a
///   constant-time comparison.
///
/// # Errors
///
/// A [`ClientAuthError`] naming which check failed; the configured secret
/// never appears in the error.
pub fn validate_client_authentication(
    client_authentication_type: ClientAuthenticationType,
    configured_secret: Option<&SecretString>,
    presented_secret: Option<&SecretString>,
) -> Result<(), ClientAuthError> {
    let presented = presented_secret
        .map(|s| s.expose_secret().as_str())
        .filter(|s| !s.is_empty());
    match client_authentication_type {
        ClientAuthenticationType::None => match presented {
            None => Ok(()),
            Some(_) => Err(ClientAuthError::UnexpectedSecret),
        },
        ClientAuthenticationType::SharedSecret => {
            // Realm construction guarantees a configured secret for this
            // scheme; a missing one here must read as a mismatch, not a pass.
            let configured = configured_secret
                .map(|s| s.expose_secret().as_str())
                .filter(|s| !s.is_empty())
                .ok_or(ClientAuthError::SecretMismatch)?;
            let presented = presented.ok_or(ClientAuthError::MissingSecret)?;
            if digest(presented).ct_eq(&digest(configured)).into() {
                Ok(())
            } else {
                Err(ClientAuthError::SecretMismatch)
            }
        }
    }
}

#[inline]
fn digest(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn secret(value: &str) -> SecretString {
        SecretString::new(value.to_string())
    }

    #[test]
    fn scheme_none_accepts_absent_secret() {
        let result =
            validate_client_authentication(ClientAuthenticationType::None, None, None);
        assert!(result.is_ok());
    }

    #[test]
    fn scheme_none_accepts_empty_secret() {
        let presented = secret("");
        let result = validate_client_authentication(
            ClientAuthenticationType::None,
            None,
            Some(&presented),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn scheme_none_rejects_presented_secret() {
        let presented = secret("unexpected");
        let result = validate_client_authentication(
            ClientAuthenticationType::None,
            None,
            Some(&presented),
        );
        assert_eq!(result.unwrap_err(), ClientAuthError::UnexpectedSecret);
    }

    #[test]
    fn shared_secret_accepts_matching_secret() {
        let configured = secret("S3cr3t");
        let presented = secret("S3cr3t");
        let result = validate_client_authentication(
            ClientAuthenticationType::SharedSecret,
            Some(&configured),
            Some(&presented),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn shared_secret_rejects_missing_secret() {
        let configured = secret("S3cr3t");
        let result = validate_client_authentication(
            ClientAuthenticationType::SharedSecret,
            Some(&configured),
            None,
        );
        assert_eq!(result.unwrap_err(), ClientAuthError::MissingSecret);
    }

    #[test]
    fn shared_secret_rejects_mismatch() {
        let configured = secret("S3cr3t");
        let presented = secret("wrong");
        let result = validate_client_authentication(
            ClientAuthenticationType::SharedSecret,
            Some(&configured),
            Some(&presented),
        );
        assert_eq!(result.unwrap_err(), ClientAuthError::SecretMismatch);
    }

    #[test]
    fn shared_secret_without_configured_secret_is_a_mismatch() {
        let presented = secret("anything");
        let result = validate_client_authentication(
            ClientAuthenticationType::SharedSecret,
            None,
            Some(&presented),
        );
        assert_eq!(result.unwrap_err(), ClientAuthError::SecretMismatch);
    }

    #[test]
    fn error_messages_do_not_reveal_the_secret() {
        let configured = secret("hunter2-configured-secret");
        let presented = secret("wrong");
        let err = validate_client_authentication(
            ClientAuthenticationType::SharedSecret,
            Some(&configured),
            Some(&presented),
        )
        .unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }

    #[test]
    fn comparison_is_constant_time() {
        // Mismatches at the first byte and at the last byte should take the
        // same time. May be noisy on loaded machines; the threshold is far
        // below anything exploitable over a network.
        let configured = secret("sk_live_1234567890abcdef");
        let wrong_prefix = secret("xk_live_1234567890abcdef");
        let wrong_suffix = secret("sk_live_1234567890abcdex");

        for _ in 0..1_000 {
            let _ = validate_client_authentication(
                ClientAuthenticationType::SharedSecret,
                Some(&configured),
                Some(&wrong_prefix),
            );
            let _ = validate_client_authentication(
                ClientAuthenticationType::SharedSecret,
                Some(&configured),
                Some(&wrong_suffix),
            );
        }

        let start = Instant::now();
        for _ in 0..10_000 {
            let _ = validate_client_authentication(
                ClientAuthenticationType::SharedSecret,
                Some(&configured),
                Some(&wrong_prefix),
            );
        }
        let prefix_time = start.elapsed();

        let start = Instant::now();
        for _ in 0..10_000 {
            let _ = validate_client_authentication(
                ClientAuthenticationType::SharedSecret,
                Some(&configured),
                Some(&wrong_suffix),
            );
        }
        let suffix_time = start.elapsed();

        let diff_ns =
            (prefix_time.as_nanos() as i128 - suffix_time.as_nanos() as i128).abs() / 10_000;
        assert!(
            diff_ns < 1_000,
            "timing difference too large: {diff_ns}ns per comparison"
        );
    }
}
