//! Delegated authorization: role resolution deferred to other realms.
//!
//! When `authorization_realms` is configured (and licensed), this realm
//! authenticates the JWT but asks the named realms to produce the user for
//! the extracted principal, instead of running its own claim mapping and role
//! mapper. Unlicensed or unconfigured delegation collapses to a no-op variant
//! so the orchestrator's branching stays single-shape.

use std::sync::Arc;

use tracing::debug;

use crate::config::RealmConfig;
use crate::error::RealmError;
use crate::realm::Realm;
use crate::types::AuthenticationResult;

/// Narrow surface of the licensing layer: whether delegated authorization is
/// available to this deployment.
#[derive(Debug, Clone, Copy)]
pub struct LicenseState {
    delegated_authorization_allowed: bool,
}

impl LicenseState {
    /// A license state with the given delegated-authorization entitlement.
    pub fn new(delegated_authorization_allowed: bool) -> Self {
        Self {
            delegated_authorization_allowed,
        }
    }

    /// Whether delegated authorization may be used.
    pub fn allows_delegated_authorization(&self) -> bool {
        self.delegated_authorization_allowed
    }
}

/// Resolves users through the configured authorization realms, or acts as a
/// no-op when delegation is unconfigured or unlicensed.
#[derive(Clone)]
pub struct DelegatedAuthorizationSupport {
    realm_name: String,
    lookup_realms: Vec<Arc<dyn Realm>>,
}

impl DelegatedAuthorizationSupport {
    /// Wire delegation from the full realm list.
    ///
    /// The configured `authorization_realms` names are resolved against
    /// `all_realms`, preserving configured order. Unconfigured delegation, or
    /// a license that does not allow it, produces the no-op variant.
    ///
    /// # Errors
    ///
    /// [`RealmError::Configuration`] when a configured name matches no realm.
    pub fn new(
        all_realms: &[Arc<dyn Realm>],
        config: &RealmConfig,
        license: &LicenseState,
    ) -> Result<Self, RealmError> {
        if config.authorization_realms.is_empty() {
            return Ok(Self {
                realm_name: config.name.clone(),
                lookup_realms: Vec::new(),
            });
        }
        if !license.allows_delegated_authorization() {
            debug!(
                realm = %config.name,
                "delegated authorization is configured but not licensed; \
                 falling back to role mapping"
            );
            return Ok(Self {
                realm_name: config.name.clone(),
                lookup_realms: Vec::new(),
            });
        }
        let mut lookup_realms = Vec::with_capacity(config.authorization_realms.len());
        for name in &config.authorization_realms {
            let realm = all_realms
                .iter()
                .find(|realm| realm.name() == name)
                .ok_or_else(|| {
                    RealmError::configuration(
                        &config.name,
                        format!("authorization realm [{name}] does not exist"),
                    )
                })?;
            lookup_realms.push(Arc::clone(realm));
        }
        Ok(Self {
            realm_name: config.name.clone(),
            lookup_realms,
        })
    }

    /// Whether role resolution is delegated at all.
    pub fn has_delegation(&self) -> bool {
        !self.lookup_realms.is_empty()
    }

    /// Look the principal up in the configured realms, in order.
    ///
    /// The first realm that knows the principal wins. A principal unknown to
    /// every realm is an unsuccessful result, not an error.
    ///
    /// # Errors
    ///
    /// Propagates the first realm lookup that raises.
    pub async fn resolve(&self, principal: &str) -> Result<AuthenticationResult, RealmError> {
        for realm in &self.lookup_realms {
            if let Some(user) = realm.lookup_user(principal).await? {
                debug!(
                    realm = %self.realm_name,
                    delegated_to = %realm.name(),
                    principal = %principal,
                    "delegated authorization resolved principal"
                );
                return Ok(AuthenticationResult::success(user));
            }
        }
        let names: Vec<&str> = self.lookup_realms.iter().map(|r| r.name()).collect();
        Ok(AuthenticationResult::unsuccessful(
            format!(
                "realm [{}] could not resolve principal [{principal}] \
                 in any authorization realm {names:?}",
                self.realm_name
            ),
            None,
        ))
    }
}

impl std::fmt::Debug for DelegatedAuthorizationSupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.lookup_realms.iter().map(|r| r.name()).collect();
        f.debug_struct("DelegatedAuthorizationSupport")
            .field("realm_name", &self.realm_name)
            .field("lookup_realms", &names)
            .finish()
    }
}
