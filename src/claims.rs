//! Validated JWT claims and configurable claim extraction.
//!
//! A [`ClaimsSet`] is the payload of a JWT that already passed signature and
//! standard-claim validation. [`ClaimParser`] turns one realm claim setting
//! (`claims.principal`, `claims.groups`, ...) into a pure function over a
//! claims set, resolving the configured name, falling back to standard-claim
//! aliases, and optionally post-processing values with a capture pattern.

use regex::Regex;
use serde_json::{Map, Value};

use crate::config::{ClaimSetting, RealmConfig};
use crate::error::{ClaimError, RealmError};

/// The claims mapping of a validated JWT.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimsSet {
    claims: Map<String, Value>,
}

impl ClaimsSet {
    /// Wrap a claims object.
    pub fn new(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// Look up a claim. A dotted name resolves the literal flat name first,
    /// then navigates nested objects segment by segment.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.claims.get(name) {
            return Some(value);
        }
        if !name.contains('.') {
            return None;
        }
        let mut current = self.claims.get(name.split('.').next()?)?;
        for segment in name.split('.').skip(1) {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Iterate over all top-level claims.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.claims.iter()
    }

    /// Registered `exp` claim, as epoch seconds.
    pub fn expiration_time(&self) -> Option<u64> {
        self.claims.get("exp").and_then(Value::as_u64)
    }

    /// Registered `nbf` claim, as epoch seconds.
    pub fn not_before(&self) -> Option<u64> {
        self.claims.get("nbf").and_then(Value::as_u64)
    }

    /// Registered `iat` claim, as epoch seconds.
    pub fn issued_at(&self) -> Option<u64> {
        self.claims.get("iat").and_then(Value::as_u64)
    }

    /// Registered `iss` claim.
    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    /// Registered `aud` claim; a scalar audience is lifted to one element.
    pub fn audiences(&self) -> Vec<&str> {
        match self.claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(auds)) => auds.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Extracts one configured claim from a [`ClaimsSet`].
///
/// Immutable once constructed. An optional-and-unconfigured parser always
/// reports the claim as absent.
#[derive(Debug)]
pub struct ClaimParser {
    setting_name: String,
    claim_name: Option<String>,
    pattern: Option<Regex>,
}

impl ClaimParser {
    /// Resolve the parser for one claim setting.
    ///
    /// The explicitly configured claim name wins; otherwise the fallback
    /// names are tried in order. If nothing resolves and the claim is
    /// `required`, construction fails with a configuration error.
    ///
    /// `fallback_names` are the aliases supplied by the JWT authenticator
    /// for the realm's token type (e.g. `principal -> sub`).
    pub fn for_setting(
        config: &RealmConfig,
        setting_name: &str,
        setting: &ClaimSetting,
        fallback_names: &[String],
        required: bool,
    ) -> Result<Self, RealmError> {
        let claim_name = setting
            .claim
            .clone()
            .or_else(|| fallback_names.first().cloned());
        if claim_name.is_none() && required {
            return Err(RealmError::configuration(
                &config.name,
                format!("setting [{setting_name}] is required, but no claim name is configured"),
            ));
        }
        let pattern = match &setting.pattern {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                RealmError::configuration(
                    &config.name,
                    format!("setting [{setting_name}] has an invalid pattern: {e}"),
                )
            })?),
            None => None,
        };
        Ok(Self {
            setting_name: setting_name.to_string(),
            claim_name,
            pattern,
        })
    }

    /// The resolved claim name, if any.
    pub fn claim_name(&self) -> Option<&str> {
        self.claim_name.as_deref()
    }

    /// Extract a single string value.
    ///
    /// A one-element list of strings unwraps to its element; a multi-element
    /// list is a shape error; numbers and booleans are not coerced and read
    /// as absent. The capture pattern, if any, is applied last — a
    /// non-matching value is absent.
    ///
    /// # Errors
    ///
    /// [`ClaimError::WrongShape`] when the claim is a multi-element list.
    pub fn get_claim_value(&self, claims: &ClaimsSet) -> Result<Option<String>, ClaimError> {
        let name = match &self.claim_name {
            Some(name) => name,
            None => return Ok(None),
        };
        let raw = match claims.get(name) {
            Some(value) => value,
            None => return Ok(None),
        };
        let value = match raw {
            Value::String(s) => s.as_str(),
            Value::Array(items) => match items.as_slice() {
                [] => return Ok(None),
                [Value::String(s)] => s.as_str(),
                [_] => return Ok(None),
                _ => {
                    return Err(ClaimError::wrong_shape(
                        name.clone(),
                        format!("expected a single value, found [{}]", items.len()),
                    ));
                }
            },
            _ => return Ok(None),
        };
        Ok(self.apply_pattern(value))
    }

    /// Extract a list of string values.
    ///
    /// A scalar string lifts to a one-element list; an absent claim is the
    /// empty list. The capture pattern, if any, is applied per element and
    /// non-matching elements are dropped.
    ///
    /// # Errors
    ///
    /// [`ClaimError::WrongShape`] when the claim, or any list element, is not
    /// a string.
    pub fn get_claim_values(&self, claims: &ClaimsSet) -> Result<Vec<String>, ClaimError> {
        let name = match &self.claim_name {
            Some(name) => name,
            None => return Ok(Vec::new()),
        };
        let raw = match claims.get(name) {
            Some(value) => value,
            None => return Ok(Vec::new()),
        };
        let values: Vec<&str> = match raw {
            Value::Null => return Ok(Vec::new()),
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => values.push(s.as_str()),
                        other => {
                            return Err(ClaimError::wrong_shape(
                                name.clone(),
                                format!("expected string elements, found [{other}]"),
                            ));
                        }
                    }
                }
                values
            }
            other => {
                return Err(ClaimError::wrong_shape(
                    name.clone(),
                    format!("expected a string or list of strings, found [{other}]"),
                ));
            }
        };
        Ok(values
            .into_iter()
            .filter_map(|v| self.apply_pattern(v))
            .collect())
    }

    fn apply_pattern(&self, value: &str) -> Option<String> {
        match &self.pattern {
            None => Some(value.to_string()),
            Some(pattern) => {
                let captures = pattern.captures(value)?;
                let matched = captures.get(1).or_else(|| captures.get(0))?;
                Some(matched.as_str().to_string())
            }
        }
    }
}

impl std::fmt::Display for ClaimParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.claim_name {
            Some(name) => write!(f, "{}=[{}]", self.setting_name, name),
            None => write!(f, "{}=[<unset>]", self.setting_name),
        }
    }
}
