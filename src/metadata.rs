//! User-metadata construction from validated claims.

use std::collections::HashMap;

use serde_json::Value;

use crate::claims::ClaimsSet;
use crate::config::TokenType;

/// Key under which the realm's token type tag is always recorded.
pub const TOKEN_TYPE_KEY: &str = "jwt_token_type";

/// Prefix applied to claim names copied into user metadata.
pub const CLAIM_KEY_PREFIX: &str = "jwt_claim_";

/// Build the user-metadata mapping for a validated claims set.
///
/// The result always contains `jwt_token_type`. When `populate` is set, each
/// claim whose value passes the type filter is added under
/// `jwt_claim_<name>`. The filter admits strings, booleans, numbers, and
/// sequences whose every element is one of those scalars; nested maps, nulls,
/// and heterogeneous sequences are dropped silently.
pub fn build_user_metadata(
    claims: &ClaimsSet,
    token_type: TokenType,
    populate: bool,
) -> HashMap<String, Value> {
    let mut metadata = HashMap::new();
    metadata.insert(
        TOKEN_TYPE_KEY.to_string(),
        Value::String(token_type.value().to_string()),
    );
    if populate {
        for (name, value) in claims.iter() {
            if is_allowed_claim_value(value) {
                metadata.insert(format!("{CLAIM_KEY_PREFIX}{name}"), value.clone());
            }
        }
    }
    metadata
}

/// Scalars and homogeneous scalar sequences only; no nesting, no nulls.
fn is_allowed_claim_value(value: &Value) -> bool {
    match value {
        Value::String(_) | Value::Bool(_) | Value::Number(_) => true,
        Value::Array(items) => items
            .iter()
            .all(|item| matches!(item, Value::String(_) | Value::Bool(_) | Value::Number(_))),
        Value::Null | Value::Object(_) => false,
    }
}
